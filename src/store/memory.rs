//! In-process folder store.

use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::RwLock;

use super::{FolderDescriptor, FolderStore};
use crate::Result;

/// Folder store held in memory, for embedding the engine and for tests.
#[derive(Debug, Default)]
pub struct MemoryFolderStore {
    descriptors: RwLock<Vec<FolderDescriptor>>,
    persists: AtomicUsize,
}

impl MemoryFolderStore {
    /// Create a store with an initial list.
    #[must_use]
    pub fn new(descriptors: Vec<FolderDescriptor>) -> Self {
        Self {
            descriptors: RwLock::new(descriptors),
            persists: AtomicUsize::new(0),
        }
    }

    /// Replace the list as an editor would, without counting a persist.
    pub fn replace(&self, descriptors: Vec<FolderDescriptor>) {
        *self.descriptors.write() = descriptors;
    }

    /// Number of `persist` calls so far.
    #[must_use]
    pub fn persist_count(&self) -> usize {
        self.persists.load(Ordering::Relaxed)
    }
}

impl FolderStore for MemoryFolderStore {
    fn list(&self) -> Result<Vec<FolderDescriptor>> {
        Ok(self.descriptors.read().clone())
    }

    fn persist(&self, descriptors: &[FolderDescriptor]) -> Result<()> {
        *self.descriptors.write() = descriptors.to_vec();
        self.persists.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}
