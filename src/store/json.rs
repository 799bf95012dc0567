//! JSON file backed store, shared with the configuration editor.

use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{FolderDescriptor, FolderStore};
use crate::error::StoreError;
use crate::Result;

/// On-disk layout: `{"hotfolders": [...], ...}`.
#[derive(Debug, Default, Serialize, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    hotfolders: Vec<FolderDescriptor>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

/// Folder store reading and writing the editor's JSON configuration file.
///
/// Every `list()` re-reads the file so the engine always sees the editor's
/// latest save.
#[derive(Debug)]
pub struct JsonFolderStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonFolderStore {
    /// Create a store for the given file. The file need not exist yet.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_file(&self) -> Result<ConfigFile> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %self.path.display(), "No hotfolder configuration yet");
                return Ok(ConfigFile::default());
            }
            Err(e) => {
                return Err(StoreError::Read {
                    path: self.path.display().to_string(),
                    reason: e.to_string(),
                }
                .into())
            }
        };

        if content.trim().is_empty() {
            return Ok(ConfigFile::default());
        }

        serde_json::from_str(&content).map_err(|e| {
            StoreError::Parse {
                path: self.path.display().to_string(),
                reason: e.to_string(),
            }
            .into()
        })
    }
}

impl FolderStore for JsonFolderStore {
    fn list(&self) -> Result<Vec<FolderDescriptor>> {
        let file = self.read_file()?;
        tracing::debug!(
            path = %self.path.display(),
            count = file.hotfolders.len(),
            "Loaded hotfolder configuration"
        );
        Ok(file.hotfolders)
    }

    fn persist(&self, descriptors: &[FolderDescriptor]) -> Result<()> {
        let _guard = self.write_lock.lock();

        // Keep top-level keys owned by the editor. An unreadable file is
        // never overwritten.
        let mut file = self.read_file()?;
        file.hotfolders = descriptors.to_vec();

        let write_err = |e: &dyn std::fmt::Display| StoreError::Write {
            path: self.path.display().to_string(),
            reason: e.to_string(),
        };

        let json = serde_json::to_string_pretty(&file).map_err(|e| write_err(&e))?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| write_err(&e))?;
            }
        }

        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json).map_err(|e| write_err(&e))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| write_err(&e))?;

        tracing::debug!(
            path = %self.path.display(),
            count = descriptors.len(),
            "Saved hotfolder configuration"
        );
        Ok(())
    }
}
