//! Folder descriptor store.
//!
//! The engine never constructs descriptors itself. It reads a fresh
//! snapshot on every consumer pass and only writes back license-driven
//! state changes.

mod descriptor;
mod json;
mod memory;

pub use descriptor::{
    apply_license, DisabledReason, FolderDescriptor, FolderId, FolderState, PairRole, PairingRule,
};
pub use json::JsonFolderStore;
pub use memory::MemoryFolderStore;

use crate::Result;

/// Read/write contract the engine needs from the configuration store.
pub trait FolderStore: Send + Sync {
    /// Fresh snapshot of every configured hotfolder.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store cannot be read.
    fn list(&self) -> Result<Vec<FolderDescriptor>>;

    /// Fresh snapshot of the enabled hotfolders.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store cannot be read.
    fn list_enabled(&self) -> Result<Vec<FolderDescriptor>> {
        Ok(self
            .list()?
            .into_iter()
            .filter(FolderDescriptor::is_enabled)
            .collect())
    }

    /// Look up a single hotfolder.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store cannot be read.
    fn get(&self, id: &str) -> Result<Option<FolderDescriptor>> {
        Ok(self.list()?.into_iter().find(|d| d.id == id))
    }

    /// Replace the stored list.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store cannot be written.
    fn persist(&self, descriptors: &[FolderDescriptor]) -> Result<()>;
}
