//! Recursive folder listing for rescans.
//!
//! Walks the whole input tree, hidden files and ignore files included, and
//! returns every file the folder's pattern filter accepts.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use ignore::WalkBuilder;

use super::filter::PatternFilter;
use crate::Result;

/// Scan statistics.
#[derive(Debug, Default)]
pub struct ScanStats {
    pub files_found: AtomicU64,
    pub files_matched: AtomicU64,
    pub files_skipped: AtomicU64,
    pub errors: AtomicU64,
}

impl ScanStats {
    /// Create new stats.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a snapshot of current stats.
    #[must_use]
    pub fn snapshot(&self) -> ScanStatsSnapshot {
        ScanStatsSnapshot {
            files_found: self.files_found.load(Ordering::Relaxed),
            files_matched: self.files_matched.load(Ordering::Relaxed),
            files_skipped: self.files_skipped.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of scan stats.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanStatsSnapshot {
    pub files_found: u64,
    pub files_matched: u64,
    pub files_skipped: u64,
    pub errors: u64,
}

/// Result of listing a hotfolder.
#[derive(Debug, Default)]
pub struct ScanOutcome {
    /// Matching files, sorted.
    pub files: Vec<PathBuf>,
    pub stats: ScanStatsSnapshot,
}

/// List every matching file under `path`.
///
/// Unreadable entries are counted and skipped.
///
/// # Errors
///
/// Returns an error if `path` itself does not exist.
pub fn scan_folder(path: &Path, filter: &PatternFilter) -> Result<ScanOutcome> {
    if !path.is_dir() {
        return Err(crate::error::WatcherError::PathMissing {
            path: path.display().to_string(),
        }
        .into());
    }

    let stats = ScanStats::new();
    let mut files = Vec::new();

    let walker = WalkBuilder::new(path)
        .standard_filters(false) // Hotfolders are not source trees
        .follow_links(false)
        .build();

    for entry in walker {
        match entry {
            Ok(entry) => {
                if !entry.file_type().is_some_and(|t| t.is_file()) {
                    continue;
                }

                stats.files_found.fetch_add(1, Ordering::Relaxed);
                let entry_path = entry.path();

                if filter.matches(entry_path) {
                    stats.files_matched.fetch_add(1, Ordering::Relaxed);
                    files.push(entry_path.to_path_buf());
                } else {
                    stats.files_skipped.fetch_add(1, Ordering::Relaxed);
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Error walking hotfolder");
                stats.errors.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    files.sort();

    let snapshot = stats.snapshot();
    tracing::debug!(
        path = %path.display(),
        found = snapshot.files_found,
        matched = snapshot.files_matched,
        skipped = snapshot.files_skipped,
        errors = snapshot.errors,
        "Hotfolder scan complete"
    );

    Ok(ScanOutcome {
        files,
        stats: snapshot,
    })
}

/// Async version of [`scan_folder`], run on the blocking pool.
///
/// # Errors
///
/// Returns an error if the folder is missing or the scan task fails.
pub async fn scan_folder_async(path: &Path, filter: &PatternFilter) -> Result<ScanOutcome> {
    let path = path.to_path_buf();
    let filter = filter.clone();

    tokio::task::spawn_blocking(move || scan_folder(&path, &filter))
        .await
        .map_err(|e| crate::Error::internal(format!("scan task failed: {e}")))?
}
