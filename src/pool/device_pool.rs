use crate::device::description::{ConfigError, DeviceDescription};
use crate::device::enumerator::{list_devices, DeviceItem};
use crate::device::state::JoystickState;
use crate::pool::debounce::DebounceFilter;
use crate::pool::worker::{DeviceWorker, SnapshotSlot};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Tuning knobs for a pool.
///
/// The poll interval bounds how stale a published snapshot can be on top
/// of the debounce window; the axis epsilon is the tolerance under which
/// two analog readings count as the same value for debouncing.
#[derive(Clone, Debug)]
pub struct PoolSettings {
    /// Per-device polling cadence in milliseconds.
    pub poll_interval_ms: u64,

    /// Analog equality tolerance in normalized units.
    pub axis_epsilon: f32,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: 10,
            axis_epsilon: 0.01,
        }
    }
}

/// Pool-level errors.
///
/// Only construction can fail; per-device trouble at runtime is logged
/// and contained to the affected device.
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    #[error("Config error: {0}")]
    ConfigError(#[from] ConfigError),

    #[error("Invalid debounce window: {0}")]
    InvalidDebounce(String),

    #[error("Fetch timed out: {0}")]
    FetchTimeout(String),
}

// One live device: its discovered identity, its publication slot, and the
// means to stop its worker.
struct DeviceEntry {
    item: DeviceItem,
    slot: SnapshotSlot,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Orchestrates one polling worker per matched device and publishes their
/// debounced snapshots for non-blocking retrieval.
///
/// Construction loads the descriptions but opens nothing; [`reset`]
/// reconciles the live worker set against the currently attached hardware
/// and may be called at any time, including after [`stop`] to pick
/// replugged devices back up.
///
/// [`reset`]: DevicePool::reset
/// [`stop`]: DevicePool::stop
pub struct DevicePool {
    descriptions: Vec<Arc<DeviceDescription>>,
    debounce_window: Duration,
    settings: PoolSettings,
    entries: RwLock<HashMap<String, DeviceEntry>>,
    last_fetched: Mutex<HashMap<String, JoystickState>>,
    // reset and stop are structural changes; only one runs at a time.
    structural: tokio::sync::Mutex<()>,
}

impl DevicePool {
    /// Loads every description and validates the debounce window. Any
    /// unreadable or invalid description is fatal here: a pool without its
    /// descriptions cannot match anything.
    pub fn new<P: AsRef<Path>>(
        description_paths: &[P],
        debounce_seconds: f64,
    ) -> Result<Self, PoolError> {
        Self::with_settings(description_paths, debounce_seconds, PoolSettings::default())
    }

    pub fn with_settings<P: AsRef<Path>>(
        description_paths: &[P],
        debounce_seconds: f64,
        settings: PoolSettings,
    ) -> Result<Self, PoolError> {
        if !debounce_seconds.is_finite() || debounce_seconds <= 0.0 {
            return Err(PoolError::InvalidDebounce(format!(
                "debounce_seconds must be a positive number, got {}",
                debounce_seconds
            )));
        }
        if description_paths.is_empty() {
            return Err(ConfigError::ValidationError(
                "at least one device description is required".to_string(),
            )
            .into());
        }

        let mut descriptions = Vec::new();
        let mut names = HashSet::new();
        for path in description_paths {
            let description = DeviceDescription::from_toml(path)?;
            if !names.insert(description.device_name.clone()) {
                return Err(ConfigError::ValidationError(format!(
                    "duplicate device_name \"{}\" in {}",
                    description.device_name,
                    path.as_ref().display()
                ))
                .into());
            }
            info!(
                "Loaded description \"{}\" from {}",
                description.device_name,
                path.as_ref().display()
            );
            descriptions.push(Arc::new(description));
        }

        Ok(Self {
            descriptions,
            debounce_window: Duration::from_secs_f64(debounce_seconds),
            settings,
            entries: RwLock::new(HashMap::new()),
            last_fetched: Mutex::new(HashMap::new()),
            structural: tokio::sync::Mutex::new(()),
        })
    }

    /// Reconciles the live worker set against the attached hardware.
    ///
    /// Enumerates, matches each discovered device against the descriptions
    /// (first match wins, one device per description, unmatched devices
    /// ignored), then diffs against the running workers: devices that are
    /// gone or rebound are torn down, surviving ones are left untouched,
    /// and new matches are opened and spawned. Devices that cannot be
    /// opened are skipped with a warning and retried on the next call.
    /// Calling this twice with unchanged hardware does no work the second
    /// time. Returns the names of the devices being monitored.
    pub async fn reset(&self) -> Vec<String> {
        let _structural = self.structural.lock().await;

        let discovered = list_devices();
        let matched = match_descriptions(&self.descriptions, &discovered);
        let desired: HashMap<String, (Arc<DeviceDescription>, DeviceItem)> = matched
            .into_iter()
            .map(|(description, item)| (description.device_name.clone(), (description, item)))
            .collect();

        // Collect workers to tear down: device gone, bound to a different
        // path now, or the worker already exited on its own.
        let stale: Vec<(String, DeviceEntry)> = {
            let mut entries = self.entries.write().unwrap();
            let names: Vec<String> = entries.keys().cloned().collect();
            names
                .into_iter()
                .filter_map(|name| {
                    let keep = desired
                        .get(&name)
                        .map_or(false, |(_, item)| entries[&name].item.path == item.path)
                        && !entries[&name].handle.is_finished();
                    if keep {
                        None
                    } else {
                        entries.remove(&name).map(|entry| (name, entry))
                    }
                })
                .collect()
        };
        for (name, entry) in stale {
            entry.cancel.cancel();
            if let Err(e) = entry.handle.await {
                warn!("Worker for {} ended abnormally: {}", name, e);
            }
            debug!("Tore down worker for {}", name);
        }

        // Spawn workers for newly matched devices.
        for (name, (description, item)) in desired {
            if self.entries.read().unwrap().contains_key(&name) {
                continue;
            }
            let slot: SnapshotSlot = Arc::new(Mutex::new(None));
            let cancel = CancellationToken::new();
            let filter = DebounceFilter::new(self.debounce_window, self.settings.axis_epsilon);
            let worker = DeviceWorker::create(
                item.clone(),
                description,
                filter,
                Arc::clone(&slot),
                cancel.clone(),
                Duration::from_millis(self.settings.poll_interval_ms.max(1)),
            );
            match worker.initialize() {
                Ok(mut polling) => {
                    let handle = tokio::spawn(async move { polling.run_poll_loop().await });
                    self.entries
                        .write()
                        .unwrap()
                        .insert(name, DeviceEntry { item, slot, cancel, handle });
                }
                Err(e) => {
                    warn!("Skipping {}: {}", name, e);
                }
            }
        }

        let entries = self.entries.read().unwrap();
        let mut names: Vec<String> = entries.keys().cloned().collect();
        names.sort();
        info!("Pool monitoring {} device(s): {:?}", names.len(), names);
        names
    }

    /// Returns the latest published snapshot per device without waiting
    /// for or triggering any hardware read.
    ///
    /// Purely an in-memory merge of the per-device slots, so it returns in
    /// bounded time no matter what the hardware is doing. Devices that
    /// have not published yet, or that disconnected, are omitted.
    pub fn fetch_nowait(&self) -> HashMap<String, JoystickState> {
        let snapshot = self.merge_snapshots();
        *self.last_fetched.lock().unwrap() = snapshot.clone();
        snapshot
    }

    /// Waits until the merged snapshot differs from the last one fetched,
    /// then returns it.
    ///
    /// Polls the published table on a short interval; never touches the
    /// hardware itself. With no devices being monitored the current (empty
    /// or last published) table comes back immediately. Errors with
    /// [`PoolError::FetchTimeout`] when a limit is given and nothing
    /// changes within it.
    pub async fn fetch(
        &self,
        timeout: Option<Duration>,
    ) -> Result<HashMap<String, JoystickState>, PoolError> {
        let started = Instant::now();
        loop {
            let current = self.merge_snapshots();

            if self.entries.read().unwrap().is_empty() {
                *self.last_fetched.lock().unwrap() = current.clone();
                return Ok(current);
            }

            {
                let mut last = self.last_fetched.lock().unwrap();
                if current != *last {
                    *last = current.clone();
                    return Ok(current);
                }
            }

            if let Some(limit) = timeout {
                if started.elapsed() > limit {
                    return Err(PoolError::FetchTimeout(format!(
                        "no state change within {:?}",
                        limit
                    )));
                }
            }

            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    /// Stops every worker, closes every handle, and clears the published
    /// table. The pool can be [`reset`](DevicePool::reset) again afterwards.
    pub async fn stop(&self) {
        let _structural = self.structural.lock().await;

        let drained: Vec<(String, DeviceEntry)> =
            { self.entries.write().unwrap().drain().collect() };
        for (name, entry) in drained {
            entry.cancel.cancel();
            if let Err(e) = entry.handle.await {
                warn!("Worker for {} ended abnormally: {}", name, e);
            }
            debug!("Stopped worker for {}", name);
        }
        self.last_fetched.lock().unwrap().clear();
        info!("Device pool stopped");
    }

    /// Names of the devices currently being monitored.
    pub fn device_names(&self) -> Vec<String> {
        let entries = self.entries.read().unwrap();
        let mut names: Vec<String> = entries.keys().cloned().collect();
        names.sort();
        names
    }

    fn merge_snapshots(&self) -> HashMap<String, JoystickState> {
        let entries = self.entries.read().unwrap();
        entries
            .iter()
            .filter_map(|(name, entry)| {
                entry
                    .slot
                    .lock()
                    .unwrap()
                    .as_ref()
                    .map(|state| (name.clone(), state.clone()))
            })
            .collect()
    }
}

impl Drop for DevicePool {
    fn drop(&mut self) {
        // Workers exit on their next poll tick; nothing to await here.
        if let Ok(entries) = self.entries.read() {
            for entry in entries.values() {
                entry.cancel.cancel();
            }
        }
    }
}

/// Binds discovered devices to descriptions.
///
/// Discovery order is path-sorted and descriptions keep their load order,
/// so the binding is deterministic: each device takes the first
/// still-unbound description that matches it, and each description binds
/// at most one device.
fn match_descriptions(
    descriptions: &[Arc<DeviceDescription>],
    discovered: &[DeviceItem],
) -> Vec<(Arc<DeviceDescription>, DeviceItem)> {
    let mut bound = vec![false; descriptions.len()];
    let mut matched = Vec::new();
    for item in discovered {
        let hit = descriptions
            .iter()
            .enumerate()
            .find(|(index, description)| !bound[*index] && description.matches(item));
        match hit {
            Some((index, description)) => {
                bound[index] = true;
                matched.push((Arc::clone(description), item.clone()));
            }
            None => {
                debug!("No description matches {} ({})", item.name, item.path.display());
            }
        }
    }
    matched
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::path::PathBuf;
    use tempfile::NamedTempFile;

    fn write_toml(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    fn description(device_name: &str, name_contains: Option<&str>) -> Arc<DeviceDescription> {
        Arc::new(DeviceDescription {
            device_name: device_name.to_string(),
            author: None,
            created: None,
            description: None,
            match_rule: name_contains.map(|fragment| {
                crate::device::description::MatchRule {
                    name: None,
                    name_contains: Some(fragment.to_string()),
                    vendor_id: None,
                    product_id: None,
                }
            }),
            axes: Vec::new(),
            buttons: Vec::new(),
            hats: Vec::new(),
        })
    }

    fn item(path: &str, name: &str) -> DeviceItem {
        DeviceItem {
            path: PathBuf::from(path),
            name: name.to_string(),
            vendor_id: 0x044f,
            product_id: 0xb10a,
        }
    }

    #[test]
    fn new_rejects_non_positive_debounce() {
        let file = write_toml("device_name = \"X\"\n");
        for bad in [0.0, -0.5, f64::NAN, f64::INFINITY] {
            let result = DevicePool::new(&[file.path()], bad);
            assert!(matches!(result, Err(PoolError::InvalidDebounce(_))), "{}", bad);
        }
    }

    #[test]
    fn new_rejects_empty_description_list() {
        let paths: Vec<PathBuf> = Vec::new();
        let result = DevicePool::new(&paths, 0.1);
        assert!(matches!(
            result,
            Err(PoolError::ConfigError(ConfigError::ValidationError(_)))
        ));
    }

    #[test]
    fn new_propagates_missing_description_file() {
        let result = DevicePool::new(&["/nonexistent/stick.toml"], 0.1);
        assert!(matches!(
            result,
            Err(PoolError::ConfigError(ConfigError::ReadError(_)))
        ));
    }

    #[test]
    fn new_rejects_duplicate_device_names() {
        let first = write_toml("device_name = \"Same\"\n");
        let second = write_toml("device_name = \"Same\"\n");
        let result = DevicePool::new(&[first.path(), second.path()], 0.1);
        assert!(matches!(
            result,
            Err(PoolError::ConfigError(ConfigError::ValidationError(_)))
        ));
    }

    #[test]
    fn matching_is_first_match_wins_in_description_order() {
        let descriptions = vec![
            description("Broad", Some("Stick")),
            description("Narrow", Some("Test Stick")),
        ];
        let discovered = vec![item("/dev/input/event3", "Test Stick")];
        let matched = match_descriptions(&descriptions, &discovered);
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].0.device_name, "Broad");
    }

    #[test]
    fn matching_binds_each_description_once() {
        let descriptions = vec![description("Stick", Some("Stick"))];
        let discovered = vec![
            item("/dev/input/event3", "Test Stick A"),
            item("/dev/input/event4", "Test Stick B"),
        ];
        let matched = match_descriptions(&descriptions, &discovered);
        // The second physical device stays unbound until the first is gone.
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].1.path, PathBuf::from("/dev/input/event3"));
    }

    #[test]
    fn matching_leaves_later_descriptions_for_later_devices() {
        let descriptions = vec![
            description("First", Some("Stick")),
            description("Second", Some("Stick")),
        ];
        let discovered = vec![
            item("/dev/input/event3", "Stick A"),
            item("/dev/input/event4", "Stick B"),
        ];
        let matched = match_descriptions(&descriptions, &discovered);
        assert_eq!(matched.len(), 2);
        assert_eq!(matched[0].0.device_name, "First");
        assert_eq!(matched[1].0.device_name, "Second");
    }

    #[test]
    fn matching_ignores_unmatched_devices() {
        let descriptions = vec![description("Stick", Some("Stick"))];
        let discovered = vec![item("/dev/input/event2", "Gamepad")];
        assert!(match_descriptions(&descriptions, &discovered).is_empty());
    }

    // Lifecycle tests use descriptions that match no real hardware so they
    // are deterministic on any host.
    fn unmatchable_pool() -> (DevicePool, NamedTempFile) {
        let file = write_toml(
            r#"
device_name = "No Such Device"

[match]
name = "stickpool test fixture that matches nothing"
"#,
        );
        let pool = DevicePool::new(&[file.path()], 0.1).unwrap();
        (pool, file)
    }

    #[tokio::test]
    async fn fetch_nowait_is_empty_before_reset() {
        let (pool, _file) = unmatchable_pool();
        assert!(pool.fetch_nowait().is_empty());
    }

    #[tokio::test]
    async fn reset_is_idempotent_without_hardware_changes() {
        let (pool, _file) = unmatchable_pool();
        let first = pool.reset().await;
        let second = pool.reset().await;
        assert_eq!(first, second);
        assert!(pool.device_names().is_empty());
    }

    #[tokio::test]
    async fn stop_clears_the_published_table() {
        let (pool, _file) = unmatchable_pool();
        pool.reset().await;
        pool.stop().await;
        assert!(pool.fetch_nowait().is_empty());
        assert!(pool.device_names().is_empty());
    }

    #[tokio::test]
    async fn stop_without_reset_is_safe() {
        let (pool, _file) = unmatchable_pool();
        pool.stop().await;
        pool.stop().await;
    }

    #[tokio::test]
    async fn fetch_returns_immediately_with_no_monitored_devices() {
        let (pool, _file) = unmatchable_pool();
        let result = pool.fetch(Some(Duration::from_secs(5))).await.unwrap();
        assert!(result.is_empty());
    }
}
