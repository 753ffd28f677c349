use crate::device::state::HatDirection;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Addresses one signal of one device inside its filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignalId {
    Axis(u16),
    Button(u16),
    Hat(u8),
}

/// A raw or stable reading for one signal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SignalValue {
    Axis(f32),
    Button(bool),
    Hat(HatDirection),
}

impl SignalValue {
    // Axis readings are "equal" within an epsilon so analog noise at the
    // limit of hardware resolution cannot restart the candidate clock
    // forever.
    fn matches(&self, other: &SignalValue, axis_epsilon: f32) -> bool {
        match (self, other) {
            (SignalValue::Axis(a), SignalValue::Axis(b)) => (a - b).abs() <= axis_epsilon,
            _ => self == other,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Pending {
    value: SignalValue,
    since: Instant,
}

#[derive(Debug, Clone, Copy)]
struct SignalChannel {
    stable: SignalValue,
    pending: Option<Pending>,
}

/// Per-device bounce suppression.
///
/// Each signal runs a two-state machine: a *stable* value that callers
/// see, and at most one *pending* candidate. A candidate is promoted only
/// after it has been observed continuously for the whole window; any
/// differing observation restarts its clock, and an observation equal to
/// the stable value abandons it. Continuous persistence (not cumulative
/// dwell time) is what actually suppresses contact bounce, at the cost of
/// up to one window of latency on genuine fast transitions.
#[derive(Debug)]
pub struct DebounceFilter {
    window: Duration,
    axis_epsilon: f32,
    channels: HashMap<SignalId, SignalChannel>,
}

impl DebounceFilter {
    pub fn new(window: Duration, axis_epsilon: f32) -> Self {
        Self {
            window,
            axis_epsilon,
            channels: HashMap::new(),
        }
    }

    /// Feeds one observation made at `now`.
    ///
    /// Returns the new stable value when this observation changed it, which
    /// happens on the very first observation of a signal (there is nothing
    /// yet to protect) or when a candidate has persisted for the full
    /// window. Returns `None` otherwise.
    pub fn apply(&mut self, id: SignalId, value: SignalValue, now: Instant) -> Option<SignalValue> {
        let Some(channel) = self.channels.get_mut(&id) else {
            self.channels.insert(
                id,
                SignalChannel {
                    stable: value,
                    pending: None,
                },
            );
            return Some(value);
        };

        if value.matches(&channel.stable, self.axis_epsilon) {
            // Bounce returned to the stable value before persisting.
            channel.pending = None;
            return None;
        }

        match channel.pending {
            Some(pending) if value.matches(&pending.value, self.axis_epsilon) => {
                if now.duration_since(pending.since) >= self.window {
                    channel.stable = value;
                    channel.pending = None;
                    Some(value)
                } else {
                    None
                }
            }
            _ => {
                channel.pending = Some(Pending { value, since: now });
                None
            }
        }
    }

    /// Last promoted value for a signal, if it has ever produced one.
    pub fn stable(&self, id: SignalId) -> Option<SignalValue> {
        self.channels.get(&id).map(|channel| channel.stable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_millis(100);
    const EPSILON: f32 = 0.01;

    fn filter() -> DebounceFilter {
        DebounceFilter::new(WINDOW, EPSILON)
    }

    fn at(start: Instant, offset_ms: u64) -> Instant {
        start + Duration::from_millis(offset_ms)
    }

    #[test]
    fn first_observation_is_stable_immediately() {
        let mut filter = filter();
        let start = Instant::now();
        let emitted = filter.apply(SignalId::Button(288), SignalValue::Button(false), start);
        assert_eq!(emitted, Some(SignalValue::Button(false)));
        assert_eq!(
            filter.stable(SignalId::Button(288)),
            Some(SignalValue::Button(false))
        );
    }

    #[test]
    fn change_promotes_only_after_continuous_window() {
        let mut filter = filter();
        let start = Instant::now();
        let id = SignalId::Button(288);

        filter.apply(id, SignalValue::Button(false), start);
        assert_eq!(filter.apply(id, SignalValue::Button(true), at(start, 10)), None);
        assert_eq!(filter.apply(id, SignalValue::Button(true), at(start, 60)), None);
        // Window measured from when the candidate was first seen.
        assert_eq!(
            filter.apply(id, SignalValue::Button(true), at(start, 111)),
            Some(SignalValue::Button(true))
        );
        assert_eq!(filter.stable(id), Some(SignalValue::Button(true)));
    }

    #[test]
    fn alternation_faster_than_window_never_publishes() {
        // true/false flips every 10ms for half a second: the stable value
        // must not move once during the whole burst.
        let mut filter = filter();
        let start = Instant::now();
        let id = SignalId::Button(288);

        filter.apply(id, SignalValue::Button(false), start);
        for tick in 1..50u64 {
            let value = SignalValue::Button(tick % 2 == 1);
            assert_eq!(filter.apply(id, value, at(start, tick * 10)), None);
        }
        assert_eq!(filter.stable(id), Some(SignalValue::Button(false)));
    }

    #[test]
    fn flips_then_hold_publishes_once_after_the_hold() {
        // Contact bounce: flips inside 50ms, then a 150ms hold with a
        // 100ms window. The press lands exactly once, after the hold.
        let mut filter = filter();
        let start = Instant::now();
        let id = SignalId::Button(288);

        filter.apply(id, SignalValue::Button(false), start);
        assert_eq!(filter.apply(id, SignalValue::Button(true), at(start, 10)), None);
        assert_eq!(filter.apply(id, SignalValue::Button(false), at(start, 20)), None);
        assert_eq!(filter.apply(id, SignalValue::Button(true), at(start, 30)), None);
        assert_eq!(filter.apply(id, SignalValue::Button(false), at(start, 40)), None);
        // Hold starts here.
        assert_eq!(filter.apply(id, SignalValue::Button(true), at(start, 50)), None);
        assert_eq!(filter.apply(id, SignalValue::Button(true), at(start, 100)), None);
        assert_eq!(
            filter.apply(id, SignalValue::Button(true), at(start, 200)),
            Some(SignalValue::Button(true))
        );
        // Further identical reads are quiet.
        assert_eq!(filter.apply(id, SignalValue::Button(true), at(start, 300)), None);
    }

    #[test]
    fn returning_to_stable_abandons_the_candidate() {
        let mut filter = filter();
        let start = Instant::now();
        let id = SignalId::Button(288);

        filter.apply(id, SignalValue::Button(false), start);
        filter.apply(id, SignalValue::Button(true), at(start, 10));
        // Back to stable: the candidate must not survive with its old clock.
        filter.apply(id, SignalValue::Button(false), at(start, 20));
        // A fresh press immediately after must wait the full window again.
        assert_eq!(filter.apply(id, SignalValue::Button(true), at(start, 30)), None);
        assert_eq!(filter.apply(id, SignalValue::Button(true), at(start, 120)), None);
        assert_eq!(
            filter.apply(id, SignalValue::Button(true), at(start, 131)),
            Some(SignalValue::Button(true))
        );
    }

    #[test]
    fn new_candidate_resets_the_clock() {
        let mut filter = filter();
        let start = Instant::now();
        let id = SignalId::Hat(0);

        filter.apply(id, SignalValue::Hat(HatDirection::Centered), start);
        filter.apply(id, SignalValue::Hat(HatDirection::Up), at(start, 10));
        // A different direction mid-window abandons the first candidate.
        filter.apply(id, SignalValue::Hat(HatDirection::Left), at(start, 60));
        assert_eq!(
            filter.apply(id, SignalValue::Hat(HatDirection::Left), at(start, 120)),
            None
        );
        assert_eq!(
            filter.apply(id, SignalValue::Hat(HatDirection::Left), at(start, 161)),
            Some(SignalValue::Hat(HatDirection::Left))
        );
    }

    #[test]
    fn axis_noise_within_epsilon_does_not_restart_the_clock() {
        let mut filter = filter();
        let start = Instant::now();
        let id = SignalId::Axis(0);

        filter.apply(id, SignalValue::Axis(0.0), start);
        filter.apply(id, SignalValue::Axis(0.5), at(start, 10));
        // Jitter around the candidate, all within epsilon.
        assert_eq!(filter.apply(id, SignalValue::Axis(0.505), at(start, 50)), None);
        assert_eq!(
            filter.apply(id, SignalValue::Axis(0.498), at(start, 111)),
            Some(SignalValue::Axis(0.498))
        );
    }

    #[test]
    fn axis_noise_around_stable_is_discarded() {
        let mut filter = filter();
        let start = Instant::now();
        let id = SignalId::Axis(0);

        filter.apply(id, SignalValue::Axis(0.0), start);
        assert_eq!(filter.apply(id, SignalValue::Axis(0.004), at(start, 10)), None);
        assert_eq!(filter.apply(id, SignalValue::Axis(-0.007), at(start, 20)), None);
        assert_eq!(filter.stable(id), Some(SignalValue::Axis(0.0)));
    }

    #[test]
    fn signals_are_independent() {
        let mut filter = filter();
        let start = Instant::now();

        filter.apply(SignalId::Button(288), SignalValue::Button(false), start);
        filter.apply(SignalId::Button(289), SignalValue::Button(false), start);
        filter.apply(SignalId::Button(288), SignalValue::Button(true), at(start, 10));
        // Button 289 promotes on its own schedule regardless of 288's
        // pending candidate.
        filter.apply(SignalId::Button(289), SignalValue::Button(true), at(start, 20));
        assert_eq!(
            filter.apply(SignalId::Button(289), SignalValue::Button(true), at(start, 125)),
            Some(SignalValue::Button(true))
        );
        assert_eq!(
            filter.stable(SignalId::Button(288)),
            Some(SignalValue::Button(false))
        );
    }
}
