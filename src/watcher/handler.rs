//! Tracker task: owns one folder's [`Tracker`] and serves its commands.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{mpsc, oneshot};
use tracing::Instrument;

use super::events::EventBatch;
use super::tracker::{SeedSummary, Tracker, TrackerSnapshot};
use super::unit::ReadyUnit;
use crate::observability::spans;

/// Statistics for file watching, shared by every folder of an engine.
#[derive(Debug, Default)]
pub struct WatcherStats {
    pub batches_received: AtomicU64,
    pub files_detected: AtomicU64,
    pub files_ignored: AtomicU64,
    pub files_removed: AtomicU64,
    pub rescans: AtomicU64,
    pub units_emitted: AtomicU64,
    pub units_processed: AtomicU64,
    pub units_failed: AtomicU64,
    pub errors: AtomicU64,
}

impl WatcherStats {
    /// Create new stats tracker.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Get snapshot of current stats.
    #[must_use]
    pub fn snapshot(&self) -> WatcherStatsSnapshot {
        WatcherStatsSnapshot {
            batches_received: self.batches_received.load(Ordering::Relaxed),
            files_detected: self.files_detected.load(Ordering::Relaxed),
            files_ignored: self.files_ignored.load(Ordering::Relaxed),
            files_removed: self.files_removed.load(Ordering::Relaxed),
            rescans: self.rescans.load(Ordering::Relaxed),
            units_emitted: self.units_emitted.load(Ordering::Relaxed),
            units_processed: self.units_processed.load(Ordering::Relaxed),
            units_failed: self.units_failed.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of watcher stats.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WatcherStatsSnapshot {
    pub batches_received: u64,
    pub files_detected: u64,
    pub files_ignored: u64,
    pub files_removed: u64,
    pub rescans: u64,
    pub units_emitted: u64,
    pub units_processed: u64,
    pub units_failed: u64,
    pub errors: u64,
}

/// Messages served by a tracker task.
#[derive(Debug)]
pub enum TrackerCommand {
    /// Debounced file events from the OS watcher.
    Events(EventBatch),
    /// Collect and claim every ready unit.
    Drain {
        reply: oneshot::Sender<Vec<ReadyUnit>>,
    },
    /// Seed from a rescan listing.
    Seed {
        files: Vec<PathBuf>,
        reply: oneshot::Sender<SeedSummary>,
    },
    /// Report current state.
    Snapshot {
        reply: oneshot::Sender<TrackerSnapshot>,
    },
    /// Stop the task.
    Shutdown,
}

/// Serve commands until shutdown or until every sender is gone.
pub async fn run_tracker(
    mut tracker: Tracker,
    mut command_rx: mpsc::Receiver<TrackerCommand>,
    stats: Arc<WatcherStats>,
) {
    let span = spans::folder_span(tracker.folder_id());

    async move {
        tracing::debug!("Tracker started");

        while let Some(command) = command_rx.recv().await {
            match command {
                TrackerCommand::Events(batch) => {
                    stats.batches_received.fetch_add(1, Ordering::Relaxed);
                    apply_batch(&mut tracker, batch, &stats);
                }
                TrackerCommand::Drain { reply } => {
                    let units = tracker.drain(Instant::now());
                    stats
                        .units_emitted
                        .fetch_add(units.len() as u64, Ordering::Relaxed);
                    if let Err(units) = reply.send(units) {
                        tracing::warn!(count = units.len(), "Drain reply dropped, releasing units");
                        for unit in &units {
                            tracker.release(unit);
                        }
                        stats.errors.fetch_add(1, Ordering::Relaxed);
                    }
                }
                TrackerCommand::Seed { files, reply } => {
                    stats.rescans.fetch_add(1, Ordering::Relaxed);
                    let summary = tracker.seed(&files, Instant::now());
                    tracing::debug!(
                        pending = summary.pending,
                        waiting = summary.waiting,
                        paired = summary.paired,
                        skipped = summary.skipped,
                        "Rescan seeded"
                    );
                    let _ = reply.send(summary);
                }
                TrackerCommand::Snapshot { reply } => {
                    let _ = reply.send(tracker.snapshot());
                }
                TrackerCommand::Shutdown => break,
            }
        }

        tracing::debug!("Tracker stopped");
    }
    .instrument(span)
    .await;
}

fn apply_batch(tracker: &mut Tracker, batch: EventBatch, stats: &WatcherStats) {
    let now = Instant::now();

    for path in &batch.removed {
        tracker.record_removal(path, now);
        stats.files_removed.fetch_add(1, Ordering::Relaxed);
    }

    for path in &batch.changed {
        if tracker.record_change(path, now) {
            stats.files_detected.fetch_add(1, Ordering::Relaxed);
        } else {
            stats.files_ignored.fetch_add(1, Ordering::Relaxed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::FolderDescriptor;
    use crate::watcher::tracker::TrackerSettings;
    use crate::watcher::unit::InFlightSet;
    use std::fs;
    use std::time::Duration;
    use tempfile::TempDir;

    fn spawn_tracker(
        tmp: &TempDir,
        in_flight: InFlightSet,
    ) -> (mpsc::Sender<TrackerCommand>, Arc<WatcherStats>) {
        let descriptor = FolderDescriptor::new("hf", tmp.path()).with_pairing(false);
        let settings = TrackerSettings {
            stability_window: Duration::ZERO,
            partner_wait_timeout: None,
        };
        let tracker = Tracker::new(&descriptor, settings, in_flight).unwrap();
        let stats = WatcherStats::new();
        let (tx, rx) = mpsc::channel(10);
        tokio::spawn(run_tracker(tracker, rx, Arc::clone(&stats)));
        (tx, stats)
    }

    async fn drain(tx: &mpsc::Sender<TrackerCommand>) -> Vec<ReadyUnit> {
        let (reply, rx) = oneshot::channel();
        tx.send(TrackerCommand::Drain { reply }).await.unwrap();
        rx.await.unwrap()
    }

    #[tokio::test]
    async fn test_events_then_drain() {
        let tmp = TempDir::new().unwrap();
        let pdf = tmp.path().join("a.pdf");
        fs::write(&pdf, "a").unwrap();
        let (tx, stats) = spawn_tracker(&tmp, InFlightSet::new());

        let mut batch = EventBatch::new();
        batch.changed.push(pdf.clone());
        batch.changed.push(tmp.path().join("ignored.txt"));
        tx.send(TrackerCommand::Events(batch)).await.unwrap();

        assert_eq!(drain(&tx).await, vec![ReadyUnit::Single(pdf)]);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.batches_received, 1);
        assert_eq!(snapshot.files_detected, 1);
        assert_eq!(snapshot.files_ignored, 1);
        assert_eq!(snapshot.units_emitted, 1);
    }

    #[tokio::test]
    async fn test_seed_and_snapshot() {
        let tmp = TempDir::new().unwrap();
        let pdf = tmp.path().join("a.pdf");
        fs::write(&pdf, "a").unwrap();
        let (tx, _stats) = spawn_tracker(&tmp, InFlightSet::new());

        let (reply, rx) = oneshot::channel();
        tx.send(TrackerCommand::Seed {
            files: vec![pdf.clone()],
            reply,
        })
        .await
        .unwrap();
        assert_eq!(rx.await.unwrap().pending, 1);

        let (reply, rx) = oneshot::channel();
        tx.send(TrackerCommand::Snapshot { reply }).await.unwrap();
        assert!(rx.await.unwrap().is_pending(&pdf));
    }

    #[tokio::test]
    async fn test_shutdown_closes_channel() {
        let tmp = TempDir::new().unwrap();
        let (tx, _stats) = spawn_tracker(&tmp, InFlightSet::new());

        tx.send(TrackerCommand::Shutdown).await.unwrap();
        tx.closed().await;
        assert!(tx.is_closed());
    }
}
