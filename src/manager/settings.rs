//! Manager timing knobs.

use std::time::Duration;

use crate::control::ControlServerSettings;
use crate::watcher::WatchSettings;

/// Lowest rescan interval the manager accepts.
pub const MIN_RESCAN_INTERVAL: Duration = Duration::from_secs(60);

/// Default rescan interval.
pub const DEFAULT_RESCAN_INTERVAL: Duration = Duration::from_secs(300);

#[derive(Debug, Clone)]
pub struct ManagerSettings {
    pub watch: WatchSettings,
    /// Cadence of the cross-folder drain.
    pub drain_interval: Duration,
    /// How often the rescan loop wakes to check whether a rescan is due.
    pub rescan_check_interval: Duration,
    pub rescan_interval: Duration,
    /// Backoff step per consecutive failed rescan cycle.
    pub error_backoff: Duration,
    pub max_backoff: Duration,
    /// Bound on joining each background loop during stop.
    pub join_timeout: Duration,
    /// Pause between starting the watches and the second rescan pass.
    pub grace_delay: Duration,
    /// Control channel endpoint; `None` runs without one.
    pub control: Option<ControlServerSettings>,
}

impl Default for ManagerSettings {
    fn default() -> Self {
        Self {
            watch: WatchSettings::default(),
            drain_interval: Duration::from_millis(500),
            rescan_check_interval: Duration::from_secs(10),
            rescan_interval: DEFAULT_RESCAN_INTERVAL,
            error_backoff: Duration::from_secs(60),
            max_backoff: Duration::from_secs(300),
            join_timeout: Duration::from_secs(5),
            grace_delay: Duration::from_millis(500),
            control: None,
        }
    }
}

impl ManagerSettings {
    /// Sleep after `consecutive_errors` failed cycles in a row.
    #[must_use]
    pub fn backoff(&self, consecutive_errors: u32) -> Duration {
        self.error_backoff
            .saturating_mul(consecutive_errors.max(1))
            .min(self.max_backoff)
    }
}
