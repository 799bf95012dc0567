//! Processing collaborator seam.
//!
//! The engine delivers each [`ReadyUnit`] exactly once to a
//! [`UnitProcessor`]; what happens to the document is up to the
//! implementation.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context};

use crate::store::FolderDescriptor;
use crate::watcher::ReadyUnit;

/// Opaque "process a document unit" operation.
///
/// Called on the blocking pool, possibly concurrently for different
/// folders. Failures are logged by the engine and never retried; the
/// unit's files stay wherever the implementation left them.
pub trait UnitProcessor: Send + Sync + 'static {
    /// Process one unit for the folder it was detected in.
    ///
    /// # Errors
    ///
    /// Returns an error if the unit could not be processed.
    fn process_unit(&self, unit: &ReadyUnit, folder: &FolderDescriptor) -> anyhow::Result<()>;

    /// Clean up any shared temporary workspace. Called periodically.
    ///
    /// # Errors
    ///
    /// Returns an error if cleanup fails.
    fn cleanup_workspace(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Moves every file of a unit into the folder's output directory.
#[derive(Debug, Default, Clone, Copy)]
pub struct MoveProcessor;

impl MoveProcessor {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl UnitProcessor for MoveProcessor {
    fn process_unit(&self, unit: &ReadyUnit, folder: &FolderDescriptor) -> anyhow::Result<()> {
        let Some(output) = folder.output_path.as_deref() else {
            bail!("hotfolder '{}' has no output path", folder.label());
        };

        std::fs::create_dir_all(output)
            .with_context(|| format!("failed to create '{}'", output.display()))?;

        for path in unit.paths() {
            let target = target_path(output, path)?;
            move_file(path, &target)?;
            tracing::info!(
                folder = %folder.label(),
                from = %path.display(),
                to = %target.display(),
                "Moved file"
            );
        }

        Ok(())
    }
}

fn target_path(output: &Path, source: &Path) -> anyhow::Result<PathBuf> {
    let name = source
        .file_name()
        .with_context(|| format!("'{}' has no file name", source.display()))?;
    Ok(output.join(name))
}

/// Rename, falling back to copy + remove across filesystems.
fn move_file(from: &Path, to: &Path) -> anyhow::Result<()> {
    if std::fs::rename(from, to).is_ok() {
        return Ok(());
    }

    std::fs::copy(from, to)
        .with_context(|| format!("failed to copy '{}' to '{}'", from.display(), to.display()))?;
    std::fs::remove_file(from)
        .with_context(|| format!("failed to remove '{}'", from.display()))?;
    Ok(())
}
