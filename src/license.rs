//! License collaborator.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use serde::Deserialize;

/// Decides whether folders may be watched. Must be cheap to call.
pub trait LicenseCheck: Send + Sync {
    fn is_licensed(&self) -> bool;
}

/// A switchable in-process license flag.
#[derive(Debug)]
pub struct StaticLicense {
    licensed: AtomicBool,
}

impl StaticLicense {
    #[must_use]
    pub const fn new(licensed: bool) -> Self {
        Self {
            licensed: AtomicBool::new(licensed),
        }
    }

    /// Flip the flag; takes effect on the next check.
    pub fn set(&self, licensed: bool) {
        self.licensed.store(licensed, Ordering::SeqCst);
    }
}

impl Default for StaticLicense {
    fn default() -> Self {
        Self::new(true)
    }
}

impl LicenseCheck for StaticLicense {
    fn is_licensed(&self) -> bool {
        self.licensed.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Deserialize)]
struct LicenseFile {
    licensee: String,
    #[serde(default)]
    expires_at: Option<DateTime<Utc>>,
}

/// License read from a JSON file on every check.
///
/// The file holds `licensee` and an optional RFC 3339 `expires_at`. A
/// missing, unreadable or expired file is unlicensed.
#[derive(Debug, Clone)]
pub struct FileLicense {
    path: PathBuf,
}

impl FileLicense {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn check_at(&self, now: DateTime<Utc>) -> bool {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) => {
                tracing::debug!(path = %self.path.display(), error = %e, "License file unreadable");
                return false;
            }
        };

        let license: LicenseFile = match serde_json::from_str(&content) {
            Ok(license) => license,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "License file is invalid");
                return false;
            }
        };

        if license.licensee.trim().is_empty() {
            return false;
        }

        match license.expires_at {
            Some(expires) if expires <= now => {
                tracing::warn!(licensee = %license.licensee, %expires, "License expired");
                false
            }
            _ => true,
        }
    }
}

impl LicenseCheck for FileLicense {
    fn is_licensed(&self) -> bool {
        self.check_at(Utc::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_static_license_switches() {
        let license = StaticLicense::default();
        assert!(license.is_licensed());
        license.set(false);
        assert!(!license.is_licensed());
    }

    #[test]
    fn test_file_license_states() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("license.json");
        let license = FileLicense::new(&path);

        assert!(!license.is_licensed());

        std::fs::write(&path, r#"{"licensee": "ACME"}"#).unwrap();
        assert!(license.is_licensed());

        std::fs::write(
            &path,
            r#"{"licensee": "ACME", "expires_at": "2000-01-01T00:00:00Z"}"#,
        )
        .unwrap();
        assert!(!license.is_licensed());

        std::fs::write(
            &path,
            r#"{"licensee": "ACME", "expires_at": "2100-01-01T00:00:00Z"}"#,
        )
        .unwrap();
        assert!(license.is_licensed());

        std::fs::write(&path, "not json").unwrap();
        assert!(!license.is_licensed());

        std::fs::write(&path, r#"{"licensee": "  "}"#).unwrap();
        assert!(!license.is_licensed());
    }
}
