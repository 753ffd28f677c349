use crate::device::description::DeviceDescription;
use crate::device::enumerator::DeviceItem;
use crate::device::joystick::{DeviceError, Joystick};
use crate::device::state::JoystickState;
use crate::pool::debounce::{DebounceFilter, SignalId, SignalValue};
use chrono::Local;
use statum::{machine, state, transition};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Publication slot for one device. The worker is the only writer; the
/// pool's fetch path is the only reader. `None` means no debounced reading
/// has been produced yet, or the device has disconnected.
pub type SnapshotSlot = Arc<Mutex<Option<JoystickState>>>;

// Define worker states using statum's state macro
#[state]
#[derive(Debug, Clone)]
pub enum WorkerState {
    Initializing,
    Polling,
}

/// One polling activity: owns one joystick, its debounce filter, and its
/// publication slot. Runs independently of every other device so a stalled
/// handle never delays the rest of the pool.
#[machine]
pub struct DeviceWorker<WorkerState> {
    // Discovered identity this worker is bound to
    item: DeviceItem,

    // Shared read-only configuration
    description: Arc<DeviceDescription>,

    // Per-signal bounce suppression
    filter: DebounceFilter,

    // Open handle, present once initialized
    joystick: Option<Joystick>,

    // Debounced state accumulated so far
    published: JoystickState,

    // Slot the pool reads from
    slot: SnapshotSlot,

    // Stop signal shared with the pool
    cancel: CancellationToken,

    poll_interval: Duration,
}

impl DeviceWorker<Initializing> {
    pub fn create(
        item: DeviceItem,
        description: Arc<DeviceDescription>,
        filter: DebounceFilter,
        slot: SnapshotSlot,
        cancel: CancellationToken,
        poll_interval: Duration,
    ) -> Self {
        debug!("Creating worker for {}", item.name);
        Self::builder()
            .item(item)
            .description(description)
            .filter(filter)
            .published(JoystickState::new())
            .slot(slot)
            .cancel(cancel)
            .poll_interval(poll_interval)
            .build()
    }
}

#[transition]
impl DeviceWorker<Initializing> {
    /// Opens the device and transitions to Polling. An open failure leaves
    /// the device skipped; the pool retries on the next reset.
    pub fn initialize(mut self) -> Result<DeviceWorker<Polling>, DeviceError> {
        let joystick = Joystick::open_with_description(&self.item.path, &self.description)?;
        info!(
            "Opened {} at {} for monitoring",
            self.item.name,
            self.item.path.display()
        );
        self.joystick = Some(joystick);
        Ok(self.transition())
    }
}

impl DeviceWorker<Polling> {
    /// Polls the device until cancelled or disconnected.
    ///
    /// Each tick drains the newest raw events, feeds every signal through
    /// the debounce filter, and republishes the merged debounced state when
    /// any signal's stable value moved. On disconnect the slot is cleared
    /// so the device drops out of subsequent fetches, and the handle is
    /// released on every exit path.
    pub async fn run_poll_loop(&mut self) {
        let cancel = self.cancel.clone();
        let mut ticker = tokio::time::interval(self.poll_interval);
        info!("Started monitoring {}", self.item.name);

        // Throughput stats, logged periodically
        let mut reads: u64 = 0;
        let mut publishes: u64 = 0;
        let mut last_stats = Local::now();
        let stats_interval = chrono::Duration::seconds(30);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("Stop requested for {}", self.item.name);
                    break;
                }
                _ = ticker.tick() => {
                    let Some(joystick) = self.joystick.as_mut() else {
                        break;
                    };
                    match joystick.read_latest() {
                        Ok(raw) => {
                            reads += 1;
                            if self.apply_raw(raw, Instant::now()) {
                                self.publish();
                                publishes += 1;
                            }
                        }
                        Err(DeviceError::Disconnected(reason)) => {
                            warn!("Lost {}: {}", self.item.name, reason);
                            self.slot.lock().unwrap().take();
                            break;
                        }
                        Err(e) => {
                            warn!("Stopping {} after read failure: {}", self.item.name, e);
                            self.slot.lock().unwrap().take();
                            break;
                        }
                    }

                    let now = Local::now();
                    if now - last_stats > stats_interval {
                        debug!(
                            "{} stats: {} reads, {} publishes in last {} seconds",
                            self.item.name,
                            reads,
                            publishes,
                            stats_interval.num_seconds()
                        );
                        reads = 0;
                        publishes = 0;
                        last_stats = now;
                    }
                }
            }
        }

        if let Some(mut joystick) = self.joystick.take() {
            joystick.close();
        }
        info!("Stopped monitoring {}", self.item.name);
    }

    // Feeds one raw snapshot through the filter. True when any stable
    // value changed.
    fn apply_raw(&mut self, raw: JoystickState, now: Instant) -> bool {
        let mut changed = false;

        for (&code, &value) in &raw.axes {
            if let Some(SignalValue::Axis(stable)) =
                self.filter.apply(SignalId::Axis(code), SignalValue::Axis(value), now)
            {
                self.published.axes.insert(code, stable);
                changed = true;
            }
        }

        for (&code, &pressed) in &raw.buttons {
            if let Some(SignalValue::Button(stable)) =
                self.filter
                    .apply(SignalId::Button(code), SignalValue::Button(pressed), now)
            {
                self.published.buttons.insert(code, stable);
                changed = true;
            }
        }

        for (&index, &direction) in &raw.hats {
            if let Some(SignalValue::Hat(stable)) =
                self.filter.apply(SignalId::Hat(index), SignalValue::Hat(direction), now)
            {
                self.published.hats.insert(index, stable);
                changed = true;
            }
        }

        changed
    }

    fn publish(&self) {
        *self.slot.lock().unwrap() = Some(self.published.clone());
    }
}
