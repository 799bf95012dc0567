//! Configuration settings and validation.

use crate::control::ControlServerSettings;
use crate::manager::{ManagerSettings, MIN_RESCAN_INTERVAL};
use crate::watcher::{TrackerSettings, WatchSettings};
use crate::{Error, Result};
use std::path::PathBuf;
use std::time::Duration;

/// Control socket used when none is configured.
#[must_use]
pub fn default_socket_path() -> PathBuf {
    std::env::temp_dir().join("hotfolder.sock")
}

/// Main configuration for the hotfolder service.
#[derive(Debug, Clone)]
pub struct Config {
    /// JSON file holding the hotfolder list.
    pub folders_file: PathBuf,

    /// License file. Without one the service runs licensed.
    pub license_file: Option<PathBuf>,

    /// Control channel socket.
    pub socket_path: PathBuf,

    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Emit JSON log lines.
    pub log_json: bool,

    /// Seconds between full rescans of every watched folder.
    pub rescan_interval_secs: u64,

    /// Quiet period before a file counts as stable, in milliseconds.
    pub stability_window_ms: u64,

    /// Seconds a stable file waits for its partner; `None` waits forever.
    pub partner_wait_timeout_secs: Option<u64>,

    /// Coalescing delay for raw file notifications, in milliseconds.
    pub debounce_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            folders_file: PathBuf::from("./hotfolders.json"),
            license_file: None,
            socket_path: default_socket_path(),
            log_level: "info".to_string(),
            log_json: false,
            rescan_interval_secs: 300,
            stability_window_ms: 2000,
            partner_wait_timeout_secs: None,
            debounce_ms: 250,
        }
    }
}

impl Config {
    /// Create a new configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration value is invalid.
    pub fn validate(&self) -> Result<()> {
        if self.rescan_interval_secs < MIN_RESCAN_INTERVAL.as_secs() {
            return Err(Error::config(format!(
                "rescan_interval_secs must be at least {}",
                MIN_RESCAN_INTERVAL.as_secs()
            )));
        }

        if self.stability_window_ms == 0 {
            return Err(Error::config("stability_window_ms cannot be 0"));
        }

        // Validate log level
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(Error::config(format!(
                "invalid log level '{}', must be one of: {}",
                self.log_level,
                valid_levels.join(", ")
            )));
        }

        if self.socket_path.as_os_str().is_empty() {
            return Err(Error::config("socket_path cannot be empty"));
        }

        if self.partner_wait_timeout_secs == Some(0) {
            return Err(Error::config(
                "partner_wait_timeout_secs cannot be 0, omit it to wait forever",
            ));
        }

        Ok(())
    }

    /// Runtime settings for the manager, control channel included.
    #[must_use]
    pub fn manager_settings(&self) -> ManagerSettings {
        let watch = WatchSettings {
            debounce: Duration::from_millis(self.debounce_ms),
            tracker: TrackerSettings {
                stability_window: Duration::from_millis(self.stability_window_ms),
                partner_wait_timeout: self.partner_wait_timeout_secs.map(Duration::from_secs),
            },
            ..WatchSettings::default()
        };

        ManagerSettings {
            watch,
            rescan_interval: Duration::from_secs(self.rescan_interval_secs),
            control: Some(ControlServerSettings::new(&self.socket_path)),
            ..ManagerSettings::default()
        }
    }
}
