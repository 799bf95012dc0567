//! Live watch of one hotfolder using notify-rs.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use notify::{RecommendedWatcher, RecursiveMode};
use notify_debouncer_mini::{new_debouncer, DebounceEventResult, Debouncer};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use super::events::{EventBatch, FileEvent};
use super::filter::PatternFilter;
use super::handler::{run_tracker, TrackerCommand, WatcherStats};
use super::tracker::{SeedSummary, Tracker, TrackerSettings, TrackerSnapshot};
use super::unit::{InFlightSet, ReadyUnit};
use crate::error::WatcherError;
use crate::store::{FolderDescriptor, FolderId};
use crate::Result;

/// Coalescing delay for raw notifications.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(250);

/// Join timeout for a stopping tracker task.
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// Interval between workspace cleanups.
pub const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(3600);

const COMMAND_CHANNEL_CAPACITY: usize = 100;

/// Watch engine configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchSettings {
    /// Coalescing delay for raw notifications.
    pub debounce: Duration,
    pub tracker: TrackerSettings,
    /// Bound on waiting for a tracker task to stop.
    pub stop_timeout: Duration,
    pub cleanup_interval: Duration,
}

impl Default for WatchSettings {
    fn default() -> Self {
        Self {
            debounce: DEFAULT_DEBOUNCE,
            tracker: TrackerSettings::default(),
            stop_timeout: DEFAULT_STOP_TIMEOUT,
            cleanup_interval: DEFAULT_CLEANUP_INTERVAL,
        }
    }
}

/// Cloneable handle for talking to a folder's tracker task.
#[derive(Debug, Clone)]
pub struct WatchHandle {
    id: FolderId,
    input_path: PathBuf,
    filter: PatternFilter,
    command_tx: mpsc::Sender<TrackerCommand>,
}

impl WatchHandle {
    /// Folder id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Watched input directory.
    #[must_use]
    pub fn input_path(&self) -> &Path {
        &self.input_path
    }

    /// The folder's pattern filter.
    #[must_use]
    pub const fn filter(&self) -> &PatternFilter {
        &self.filter
    }

    /// Collect and claim every ready unit.
    ///
    /// # Errors
    ///
    /// Returns an error if the tracker task has stopped.
    pub async fn drain(&self) -> Result<Vec<ReadyUnit>> {
        self.request(|reply| TrackerCommand::Drain { reply }).await
    }

    /// Seed the tracker from a rescan listing.
    ///
    /// # Errors
    ///
    /// Returns an error if the tracker task has stopped.
    pub async fn seed(&self, files: Vec<PathBuf>) -> Result<SeedSummary> {
        self.request(|reply| TrackerCommand::Seed { files, reply })
            .await
    }

    /// Current tracker state.
    ///
    /// # Errors
    ///
    /// Returns an error if the tracker task has stopped.
    pub async fn snapshot(&self) -> Result<TrackerSnapshot> {
        self.request(|reply| TrackerCommand::Snapshot { reply })
            .await
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> TrackerCommand,
    ) -> Result<T> {
        let (reply, response) = oneshot::channel();

        self.command_tx
            .send(make(reply))
            .await
            .map_err(|_| self.gone())?;

        response.await.map_err(|_| self.gone())
    }

    fn gone(&self) -> crate::Error {
        WatcherError::TrackerGone {
            id: self.id.clone(),
        }
        .into()
    }
}

/// A registered OS watch plus the task owning its tracker.
pub struct FolderWatch {
    descriptor: FolderDescriptor,
    handle: WatchHandle,
    debouncer: Option<Debouncer<RecommendedWatcher>>,
    task: Option<JoinHandle<()>>,
}

impl FolderWatch {
    /// Start the tracker task and register a recursive watch.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if the input path is missing, a pattern is
    /// invalid, or the OS watch cannot be registered.
    pub fn spawn(
        descriptor: &FolderDescriptor,
        settings: &WatchSettings,
        in_flight: InFlightSet,
        stats: Arc<WatcherStats>,
    ) -> Result<Self> {
        let input_path = descriptor.input_path.clone();
        if !input_path.is_dir() {
            return Err(WatcherError::PathMissing {
                path: input_path.display().to_string(),
            }
            .into());
        }

        let tracker = Tracker::new(descriptor, settings.tracker, in_flight)?;
        let filter = tracker.filter().clone();
        let (command_tx, command_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);

        let mut debouncer = new_debouncer(
            settings.debounce,
            forward_events(descriptor.id.clone(), filter.clone(), command_tx.clone()),
        )
        .map_err(|e| WatcherError::WatchFailed {
            path: input_path.display().to_string(),
            reason: e.to_string(),
        })?;

        debouncer
            .watcher()
            .watch(&input_path, RecursiveMode::Recursive)
            .map_err(|e| WatcherError::WatchFailed {
                path: input_path.display().to_string(),
                reason: e.to_string(),
            })?;

        let task = tokio::spawn(run_tracker(tracker, command_rx, Arc::clone(&stats)));

        tracing::info!(
            folder = %descriptor.label(),
            path = %input_path.display(),
            pairing = descriptor.pair_enabled,
            "Watching hotfolder"
        );

        Ok(Self {
            descriptor: descriptor.clone(),
            handle: WatchHandle {
                id: descriptor.id.clone(),
                input_path,
                filter,
                command_tx,
            },
            debouncer: Some(debouncer),
            task: Some(task),
        })
    }

    /// Descriptor this watch was started from.
    #[must_use]
    pub const fn descriptor(&self) -> &FolderDescriptor {
        &self.descriptor
    }

    /// Handle for the tracker task.
    #[must_use]
    pub const fn handle(&self) -> &WatchHandle {
        &self.handle
    }

    /// Stop the watch.
    ///
    /// Events already queued are applied before the task exits; the
    /// tracker's pending and waiting state is then discarded.
    pub async fn shutdown(mut self, timeout: Duration) {
        // Dropping the debouncer stops new events.
        self.debouncer.take();

        let _ = self.handle.command_tx.send(TrackerCommand::Shutdown).await;

        if let Some(task) = self.task.take() {
            let abort = task.abort_handle();
            match tokio::time::timeout(timeout, task).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::error!(folder = %self.handle.id, error = %e, "Tracker task failed");
                }
                Err(_) => {
                    tracing::warn!(folder = %self.handle.id, "Tracker task did not stop in time, abandoning");
                    abort.abort();
                }
            }
        }

        tracing::info!(folder = %self.descriptor.label(), "Stopped watching hotfolder");
    }
}

impl std::fmt::Debug for FolderWatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FolderWatch")
            .field("id", &self.handle.id)
            .field("input_path", &self.handle.input_path)
            .finish_non_exhaustive()
    }
}

/// Debouncer callback: classify paths and hand the batch to the tracker.
fn forward_events(
    id: FolderId,
    filter: PatternFilter,
    command_tx: mpsc::Sender<TrackerCommand>,
) -> impl FnMut(DebounceEventResult) + Send + 'static {
    move |result: DebounceEventResult| match result {
        Ok(events) => {
            let mut batch = EventBatch::new();
            for event in events {
                if !filter.matches(&event.path) {
                    continue;
                }
                if let Some(file_event) = FileEvent::classify(event.path) {
                    batch.add(file_event);
                }
            }

            if !batch.is_empty() && command_tx.blocking_send(TrackerCommand::Events(batch)).is_err() {
                tracing::trace!(folder = %id, "Tracker gone, dropping events");
            }
        }
        Err(e) => {
            tracing::error!(folder = %id, error = ?e, "Watch error");
        }
    }
}
