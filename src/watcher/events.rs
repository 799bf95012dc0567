//! File system event types and batching.

#![allow(clippy::missing_const_for_fn)]

use std::path::{Path, PathBuf};

/// File system event types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileEvent {
    /// File was created or modified.
    Changed(PathBuf),
    /// File is gone.
    Removed(PathBuf),
}

impl FileEvent {
    /// Classify a notified path by what is on disk now.
    ///
    /// Directories yield `None`.
    #[must_use]
    pub fn classify(path: PathBuf) -> Option<Self> {
        match std::fs::metadata(&path) {
            Ok(meta) if meta.is_dir() => None,
            Ok(_) => Some(Self::Changed(path)),
            Err(_) => Some(Self::Removed(path)),
        }
    }

    /// Get the path associated with this event.
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            Self::Changed(p) | Self::Removed(p) => p,
        }
    }
}

/// Batch of file events for one folder, in arrival order per kind.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct EventBatch {
    /// Created or modified files.
    pub changed: Vec<PathBuf>,
    /// Files that disappeared.
    pub removed: Vec<PathBuf>,
}

impl EventBatch {
    /// Create a new empty batch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an event to the batch.
    pub fn add(&mut self, event: FileEvent) {
        match event {
            FileEvent::Changed(path) => {
                self.removed.retain(|p| p != &path);
                if !self.changed.contains(&path) {
                    self.changed.push(path);
                }
            }
            FileEvent::Removed(path) => {
                self.changed.retain(|p| p != &path);
                if !self.removed.contains(&path) {
                    self.removed.push(path);
                }
            }
        }
    }

    /// Check if batch is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.changed.is_empty() && self.removed.is_empty()
    }

    /// Get total number of events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.changed.len() + self.removed.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_classify() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("a.pdf");
        fs::write(&file, "a").unwrap();

        assert_eq!(
            FileEvent::classify(file.clone()),
            Some(FileEvent::Changed(file))
        );
        assert_eq!(FileEvent::classify(tmp.path().to_path_buf()), None);

        let gone = tmp.path().join("gone.pdf");
        assert_eq!(
            FileEvent::classify(gone.clone()),
            Some(FileEvent::Removed(gone))
        );
    }

    #[test]
    fn test_batch_dedups_changes() {
        let mut batch = EventBatch::new();
        batch.add(FileEvent::Changed(PathBuf::from("/a.pdf")));
        batch.add(FileEvent::Changed(PathBuf::from("/b.pdf")));
        batch.add(FileEvent::Changed(PathBuf::from("/a.pdf")));

        assert_eq!(batch.changed.len(), 2);
        assert!(batch.removed.is_empty());
    }

    #[test]
    fn test_batch_latest_kind_wins() {
        let mut batch = EventBatch::new();
        batch.add(FileEvent::Changed(PathBuf::from("/a.pdf")));
        batch.add(FileEvent::Removed(PathBuf::from("/a.pdf")));
        assert!(batch.changed.is_empty());
        assert_eq!(batch.removed, vec![PathBuf::from("/a.pdf")]);

        batch.add(FileEvent::Changed(PathBuf::from("/a.pdf")));
        assert_eq!(batch.changed, vec![PathBuf::from("/a.pdf")]);
        assert!(batch.removed.is_empty());
    }

    #[test]
    fn test_batch_len_and_empty() {
        let mut batch = EventBatch::new();
        assert!(batch.is_empty());
        assert_eq!(batch.len(), 0);

        batch.add(FileEvent::Changed(PathBuf::from("/a.pdf")));
        batch.add(FileEvent::Removed(PathBuf::from("/b.pdf")));

        assert!(!batch.is_empty());
        assert_eq!(batch.len(), 2);
        assert_eq!(FileEvent::Removed(PathBuf::from("/b.pdf")).path(), Path::new("/b.pdf"));
    }
}
