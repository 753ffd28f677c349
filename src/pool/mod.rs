//! Device pool subsystem
//!
//! Turns any number of independently-lived devices into one non-blocking
//! snapshot table:
//!
//! 1. [`debounce`] - Per-signal bounce suppression
//! 2. [`worker`] - One polling state machine per open device
//! 3. [`device_pool`] - Matching, lifecycle, and snapshot publication
//!
//! # Architecture
//!
//! ```text
//! Enumerator ──► DevicePool ──► Worker ──► DebounceFilter ──► Slot
//!  (discover)    (match/diff)   (poll)      (stabilize)     (publish)
//!                                                             │
//!                              fetch_nowait ◄─────────────────┘
//! ```
//!
//! Each worker runs as its own tokio task writing into an exclusively
//! owned slot, so one stalled device never delays another device's
//! updates or a caller's fetch.

pub mod debounce;
pub mod device_pool;
pub mod worker;
