//! Watch engine: one live watch per enabled hotfolder.

use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::Instrument;

use super::handler::{WatcherStats, WatcherStatsSnapshot};
use super::scanner::scan_folder_async;
use super::tracker::{SeedSummary, TrackerSnapshot};
use super::unit::{InFlightGuard, InFlightSet};
use super::watcher::{FolderWatch, WatchHandle, WatchSettings};
use crate::error::WatcherError;
use crate::observability::spans;
use crate::processor::UnitProcessor;
use crate::store::{FolderDescriptor, FolderId};
use crate::Result;

/// Result of one drain tick across all folders.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DrainReport {
    pub dispatched: usize,
    pub succeeded: usize,
    pub failed: usize,
}

/// Maps folder ids to live watches and feeds ready units to the processor.
pub struct WatchEngine {
    settings: WatchSettings,
    watches: Mutex<HashMap<FolderId, FolderWatch>>,
    in_flight: InFlightSet,
    stats: Arc<WatcherStats>,
    processor: Arc<dyn UnitProcessor>,
    last_cleanup: parking_lot::Mutex<Instant>,
}

impl WatchEngine {
    /// Create an engine with no watches.
    #[must_use]
    pub fn new(settings: WatchSettings, processor: Arc<dyn UnitProcessor>) -> Self {
        Self {
            settings,
            watches: Mutex::new(HashMap::new()),
            in_flight: InFlightSet::new(),
            stats: WatcherStats::new(),
            processor,
            last_cleanup: parking_lot::Mutex::new(Instant::now()),
        }
    }

    /// Engine configuration.
    #[must_use]
    pub const fn settings(&self) -> &WatchSettings {
        &self.settings
    }

    /// Start watching a folder and seed it with an initial rescan.
    ///
    /// # Errors
    ///
    /// Returns an error if the folder is already watched, its input path
    /// is missing or watched under another id, or the watch fails.
    pub async fn start_watching(&self, descriptor: &FolderDescriptor) -> Result<SeedSummary> {
        let mut watches = self.watches.lock().await;

        if watches.contains_key(&descriptor.id) {
            tracing::info!(folder = %descriptor.label(), "Hotfolder already watched");
            return Err(WatcherError::AlreadyWatched {
                id: descriptor.id.clone(),
            }
            .into());
        }

        if let Some(other) = watches
            .values()
            .find(|w| w.handle().input_path() == descriptor.input_path)
        {
            return Err(WatcherError::PathInUse {
                path: descriptor.input_path.display().to_string(),
                id: other.handle().id().to_string(),
            }
            .into());
        }

        let watch = FolderWatch::spawn(
            descriptor,
            &self.settings,
            self.in_flight.clone(),
            Arc::clone(&self.stats),
        )?;

        let handle = watch.handle().clone();
        watches.insert(descriptor.id.clone(), watch);
        drop(watches);

        // The folder may vanish between registration and listing.
        match rescan_handle(&handle).await {
            Ok(summary) => Ok(summary),
            Err(e) => {
                tracing::warn!(folder = %descriptor.label(), error = %e, "Initial rescan failed");
                self.stop_watching(&descriptor.id).await;
                Err(e)
            }
        }
    }

    /// Stop watching a folder. Returns whether it was watched.
    ///
    /// Units already dispatched for the folder keep running.
    pub async fn stop_watching(&self, id: &str) -> bool {
        let watch = self.watches.lock().await.remove(id);

        match watch {
            Some(watch) => {
                watch.shutdown(self.settings.stop_timeout).await;
                true
            }
            None => false,
        }
    }

    /// Stop every watch, then clean up the processor's workspace.
    pub async fn stop_all(&self) -> usize {
        let watches: Vec<FolderWatch> = self
            .watches
            .lock()
            .await
            .drain()
            .map(|(_, watch)| watch)
            .collect();
        let count = watches.len();

        futures::future::join_all(
            watches
                .into_iter()
                .map(|watch| watch.shutdown(self.settings.stop_timeout)),
        )
        .await;

        self.run_cleanup().await;

        if count > 0 {
            tracing::info!(count, "Stopped all hotfolder watches");
        }
        count
    }

    /// Rescan a watched folder.
    ///
    /// Returns `Ok(None)` when the folder is not watched.
    ///
    /// # Errors
    ///
    /// Returns an error if the folder cannot be listed or its tracker is gone.
    pub async fn rescan(&self, id: &str) -> Result<Option<SeedSummary>> {
        let Some(handle) = self.handle(id).await else {
            return Ok(None);
        };

        rescan_handle(&handle).await.map(Some)
    }

    /// Drain every tracker and hand the ready units to the processor.
    ///
    /// Each unit runs as its own task on the blocking pool and is not
    /// awaited here, so a slow unit never holds back another folder.
    /// Dropping the returned handles detaches the jobs. A failing or
    /// panicking unit is logged and does not affect the others.
    pub async fn dispatch_pending(&self) -> Vec<JoinHandle<bool>> {
        let targets: Vec<(FolderDescriptor, WatchHandle)> = {
            let watches = self.watches.lock().await;
            watches
                .values()
                .map(|w| (w.descriptor().clone(), w.handle().clone()))
                .collect()
        };

        let mut jobs = Vec::new();

        for (descriptor, handle) in targets {
            let units = match handle.drain().await {
                Ok(units) => units,
                Err(e) => {
                    // Stopped between snapshot and drain.
                    tracing::debug!(folder = %descriptor.label(), error = %e, "Skipping drain");
                    continue;
                }
            };

            let descriptor = Arc::new(descriptor);
            for unit in units {
                // Claimed units are guarded before the job is spawned.
                let guard = InFlightGuard::adopt(self.in_flight.clone(), unit);
                jobs.push(tokio::spawn(run_unit(
                    Arc::clone(&self.processor),
                    Arc::clone(&self.stats),
                    Arc::clone(&descriptor),
                    guard,
                )));
            }
        }

        self.maybe_cleanup().await;
        jobs
    }

    /// Dispatch every ready unit and wait for all of them to finish.
    pub async fn process_pending(&self) -> DrainReport {
        let jobs = self.dispatch_pending().await;

        let mut report = DrainReport {
            dispatched: jobs.len(),
            ..DrainReport::default()
        };

        for outcome in futures::future::join_all(jobs).await {
            if matches!(outcome, Ok(true)) {
                report.succeeded += 1;
            } else {
                report.failed += 1;
            }
        }

        report
    }

    async fn maybe_cleanup(&self) {
        let due = {
            let mut last = self.last_cleanup.lock();
            if last.elapsed() >= self.settings.cleanup_interval {
                *last = Instant::now();
                true
            } else {
                false
            }
        };

        if due {
            self.run_cleanup().await;
        }
    }

    async fn run_cleanup(&self) {
        let processor = Arc::clone(&self.processor);
        match tokio::task::spawn_blocking(move || processor.cleanup_workspace()).await {
            Ok(Ok(())) => tracing::debug!("Workspace cleanup complete"),
            Ok(Err(e)) => tracing::warn!(error = %format!("{e:#}"), "Workspace cleanup failed"),
            Err(e) => tracing::error!(error = %e, "Workspace cleanup panicked"),
        }
    }

    async fn handle(&self, id: &str) -> Option<WatchHandle> {
        self.watches.lock().await.get(id).map(|w| w.handle().clone())
    }

    /// Whether a folder is watched.
    pub async fn is_watching(&self, id: &str) -> bool {
        self.watches.lock().await.contains_key(id)
    }

    /// Ids of every watched folder, sorted.
    pub async fn watched_ids(&self) -> Vec<FolderId> {
        let mut ids: Vec<FolderId> = self.watches.lock().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Tracker state of a watched folder.
    ///
    /// # Errors
    ///
    /// Returns an error if the tracker task is gone.
    pub async fn snapshot(&self, id: &str) -> Result<Option<TrackerSnapshot>> {
        match self.handle(id).await {
            Some(handle) => handle.snapshot().await.map(Some),
            None => Ok(None),
        }
    }

    /// Engine-wide in-flight set.
    #[must_use]
    pub const fn in_flight(&self) -> &InFlightSet {
        &self.in_flight
    }

    /// Current counters.
    #[must_use]
    pub fn stats(&self) -> WatcherStatsSnapshot {
        self.stats.snapshot()
    }
}

impl std::fmt::Debug for WatchEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchEngine")
            .field("settings", &self.settings)
            .field("in_flight", &self.in_flight.len())
            .finish_non_exhaustive()
    }
}

async fn rescan_handle(handle: &WatchHandle) -> Result<SeedSummary> {
    let outcome = scan_folder_async(handle.input_path(), handle.filter()).await?;
    handle.seed(outcome.files).await
}

/// Run one unit on the blocking pool. Returns whether it succeeded.
async fn run_unit(
    processor: Arc<dyn UnitProcessor>,
    stats: Arc<WatcherStats>,
    descriptor: Arc<FolderDescriptor>,
    guard: InFlightGuard,
) -> bool {
    let span = spans::unit_span(&descriptor.id, &guard.unit().primary().display().to_string());
    let job_descriptor = Arc::clone(&descriptor);

    // The guard moves into the job so a panic still releases the unit.
    let result = tokio::task::spawn_blocking(move || {
        processor.process_unit(guard.unit(), &job_descriptor)
    })
    .instrument(span.clone())
    .await;

    let _entered = span.enter();
    match result {
        Ok(Ok(())) => {
            tracing::info!("Unit processed");
            stats.units_processed.fetch_add(1, Ordering::Relaxed);
            true
        }
        Ok(Err(e)) => {
            tracing::error!(error = %format!("{e:#}"), "Unit processing failed");
            stats.units_failed.fetch_add(1, Ordering::Relaxed);
            false
        }
        Err(e) => {
            tracing::error!(error = %e, "Unit processing panicked");
            stats.units_failed.fetch_add(1, Ordering::Relaxed);
            false
        }
    }
}
