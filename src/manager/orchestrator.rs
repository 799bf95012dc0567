//! Orchestration manager: lifecycle, background loops and the license gate.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::settings::{ManagerSettings, MIN_RESCAN_INTERVAL};
use crate::control::{ControlServer, ControlServerHandle, ReloadHandler};
use crate::error::WatcherError;
use crate::license::LicenseCheck;
use crate::processor::UnitProcessor;
use crate::store::{apply_license, FolderDescriptor, FolderId, FolderStore};
use crate::watcher::WatchEngine;
use crate::{Error, Result};

/// Manager lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Stopped,
    Starting,
    Running,
    Stopping,
}

/// Outcome of [`Manager::start`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StartReport {
    pub already_running: bool,
    pub licensed: bool,
    /// Descriptors whose state the license gate changed.
    pub license_changes: usize,
    pub watches_started: usize,
}

/// Outcome of [`Manager::reload`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReloadReport {
    pub removed: Vec<FolderId>,
    pub restarted: Vec<FolderId>,
    pub added: Vec<FolderId>,
    /// Enabled folders that could not be watched.
    pub failed: Vec<FolderId>,
    pub licensed: bool,
    pub license_changes: usize,
}

impl ReloadReport {
    /// One-line summary for the control channel reply.
    #[must_use]
    pub fn summary(&self) -> String {
        let mut message = format!(
            "configuration reloaded: {} added, {} restarted, {} removed",
            self.added.len(),
            self.restarted.len(),
            self.removed.len()
        );
        if !self.failed.is_empty() {
            message.push_str(&format!(", {} not watched", self.failed.len()));
        }
        if !self.licensed {
            message.push_str(" (no valid license, watching disabled)");
        }
        message
    }
}

/// Outcome of one rescan cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RescanReport {
    pub licensed: bool,
    pub scanned: usize,
    pub failed: usize,
    /// Watches stopped because the license became invalid.
    pub stopped: usize,
}

struct ManagerState {
    lifecycle: Lifecycle,
    descriptors: Vec<FolderDescriptor>,
    cancel: Option<CancellationToken>,
    loops: Vec<JoinHandle<()>>,
    control: Option<ControlServerHandle>,
}

/// Supervises the watch engine.
///
/// `start`, `stop` and `reload` are serialized by one lock that also
/// guards the descriptor list. The drain and rescan loops run without it.
pub struct Manager {
    store: Arc<dyn FolderStore>,
    license: Arc<dyn LicenseCheck>,
    engine: Arc<WatchEngine>,
    settings: ManagerSettings,
    rescan_interval_secs: AtomicU64,
    last_rescan: parking_lot::Mutex<Instant>,
    rescan_cycles: AtomicU64,
    rescan_failures: AtomicU32,
    state: Mutex<ManagerState>,
    weak_self: Weak<Self>,
}

impl Manager {
    /// Build a stopped manager from its collaborators.
    pub fn new(
        store: Arc<dyn FolderStore>,
        processor: Arc<dyn UnitProcessor>,
        license: Arc<dyn LicenseCheck>,
        settings: ManagerSettings,
    ) -> Arc<Self> {
        let engine = Arc::new(WatchEngine::new(settings.watch, processor));
        let rescan_secs = settings.rescan_interval.max(MIN_RESCAN_INTERVAL).as_secs();

        Arc::new_cyclic(|weak_self| Self {
            store,
            license,
            engine,
            settings,
            rescan_interval_secs: AtomicU64::new(rescan_secs),
            last_rescan: parking_lot::Mutex::new(Instant::now()),
            rescan_cycles: AtomicU64::new(0),
            rescan_failures: AtomicU32::new(0),
            state: Mutex::new(ManagerState {
                lifecycle: Lifecycle::Stopped,
                descriptors: Vec::new(),
                cancel: None,
                loops: Vec::new(),
                control: None,
            }),
            weak_self: weak_self.clone(),
        })
    }

    /// Start watching. A no-op when already running.
    ///
    /// Without a valid license no folder is watched, but the loops and
    /// the control channel still start so a later license takes effect
    /// through a reload.
    ///
    /// # Errors
    ///
    /// Returns an error if the descriptor store cannot be read.
    pub async fn start(&self) -> Result<StartReport> {
        let mut state = self.state.lock().await;

        if matches!(state.lifecycle, Lifecycle::Running | Lifecycle::Starting) {
            tracing::info!("Manager already running");
            return Ok(StartReport {
                already_running: true,
                ..StartReport::default()
            });
        }

        state.lifecycle = Lifecycle::Starting;
        tracing::info!("Manager starting");

        match self.start_locked(&mut state).await {
            Ok(report) => Ok(report),
            Err(e) => {
                state.lifecycle = Lifecycle::Stopped;
                tracing::error!(error = %e, "Manager failed to start");
                Err(e)
            }
        }
    }

    async fn start_locked(&self, state: &mut ManagerState) -> Result<StartReport> {
        let mut descriptors = self.store.list()?;
        let licensed = self.license.is_licensed();
        let license_changes = self.gate(&mut descriptors, licensed);

        let mut watches_started = 0;
        if licensed {
            for descriptor in descriptors.iter().filter(|d| d.is_enabled()) {
                if self.start_folder(descriptor).await {
                    watches_started += 1;
                }
            }
        } else {
            tracing::warn!("No valid license, hotfolders are not watched");
        }
        state.descriptors = descriptors;

        let cancel = CancellationToken::new();
        state.loops = vec![
            tokio::spawn(drain_loop(self.weak_self.clone(), cancel.clone())),
            tokio::spawn(rescan_loop(self.weak_self.clone(), cancel.clone())),
        ];
        state.control = self.settings.control.clone().map(|settings| {
            ControlServer::new(settings, self.reload_handler()).spawn(cancel.child_token())
        });
        state.cancel = Some(cancel);
        state.lifecycle = Lifecycle::Running;
        *self.last_rescan.lock() = Instant::now();

        if watches_started > 0 {
            // A file can land between the first listing and watch registration.
            tokio::time::sleep(self.settings.grace_delay).await;
            let _ = self.rescan_watched().await;
        }

        tracing::info!(licensed, watches_started, "Manager running");

        Ok(StartReport {
            already_running: false,
            licensed,
            license_changes,
            watches_started,
        })
    }

    /// Stop everything. Returns `false` when not running.
    ///
    /// Units already handed to the processor run to completion.
    pub async fn stop(&self) -> bool {
        let mut state = self.state.lock().await;

        if state.lifecycle != Lifecycle::Running {
            return false;
        }

        state.lifecycle = Lifecycle::Stopping;
        tracing::info!("Manager stopping");

        if let Some(cancel) = state.cancel.take() {
            cancel.cancel();
        }

        if let Some(control) = state.control.take() {
            control.stop(self.settings.join_timeout).await;
        }

        self.engine.stop_all().await;

        for handle in std::mem::take(&mut state.loops) {
            let abort = handle.abort_handle();
            if tokio::time::timeout(self.settings.join_timeout, handle)
                .await
                .is_err()
            {
                tracing::warn!("Background loop did not stop in time, abandoning");
                abort.abort();
            }
        }

        state.lifecycle = Lifecycle::Stopped;
        tracing::info!("Manager stopped");
        true
    }

    /// Re-read the folder list and bring the watches in line with it.
    ///
    /// Every previously known folder is stopped; enabled folders of the
    /// fresh list are then started, so edits to paths, patterns or
    /// pairing always take effect.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotRunning`] when the manager is not running, or an
    /// error if the descriptor store cannot be read.
    pub async fn reload(&self) -> Result<ReloadReport> {
        let mut state = self.state.lock().await;

        if state.lifecycle != Lifecycle::Running {
            return Err(Error::NotRunning);
        }

        let mut fresh = self.store.list()?;
        let licensed = self.license.is_licensed();
        let license_changes = self.gate(&mut fresh, licensed);

        let old_ids: HashSet<FolderId> = state.descriptors.iter().map(|d| d.id.clone()).collect();
        let new_ids: HashSet<FolderId> = fresh.iter().map(|d| d.id.clone()).collect();

        let mut report = ReloadReport {
            licensed,
            license_changes,
            ..ReloadReport::default()
        };

        let mut to_stop: Vec<FolderId> = old_ids.iter().cloned().collect();
        // Watches left over from a start that raced a store edit.
        to_stop.extend(
            self.engine
                .watched_ids()
                .await
                .into_iter()
                .filter(|id| !old_ids.contains(id)),
        );
        to_stop.sort();

        for id in &to_stop {
            self.engine.stop_watching(id).await;
            if !new_ids.contains(id) {
                report.removed.push(id.clone());
            }
        }

        if licensed {
            for descriptor in fresh.iter().filter(|d| d.is_enabled()) {
                if !self.start_folder(descriptor).await {
                    report.failed.push(descriptor.id.clone());
                } else if old_ids.contains(&descriptor.id) {
                    report.restarted.push(descriptor.id.clone());
                } else {
                    report.added.push(descriptor.id.clone());
                }
            }
        } else {
            tracing::warn!("No valid license, hotfolders are not watched");
        }

        state.descriptors = fresh;
        tracing::info!(
            added = report.added.len(),
            restarted = report.restarted.len(),
            removed = report.removed.len(),
            failed = report.failed.len(),
            "Configuration reloaded"
        );

        Ok(report)
    }

    /// One iteration of the rescan loop.
    ///
    /// Re-checks the license. Unlicensed: stops every watch and marks the
    /// in-memory descriptors disabled without persisting. Licensed:
    /// rescans every watched folder.
    pub async fn run_rescan_cycle(&self) -> RescanReport {
        *self.last_rescan.lock() = Instant::now();
        self.rescan_cycles.fetch_add(1, Ordering::Relaxed);

        if !self.license.is_licensed() {
            let mut state = self.state.lock().await;
            let stopped = self.engine.stop_all().await;
            let changed = apply_license(&mut state.descriptors, false);
            if stopped > 0 || changed > 0 {
                tracing::warn!(stopped, "License no longer valid, stopped watching");
            }
            return RescanReport {
                licensed: false,
                stopped,
                ..RescanReport::default()
            };
        }

        let (scanned, failed) = self.rescan_watched().await;
        tracing::debug!(scanned, failed, "Rescan cycle complete");

        RescanReport {
            licensed: true,
            scanned,
            failed,
            stopped: 0,
        }
    }

    /// Rescan every watched folder. Returns (scanned, failed).
    async fn rescan_watched(&self) -> (usize, usize) {
        let mut scanned = 0;
        let mut failed = 0;

        for id in self.engine.watched_ids().await {
            match self.engine.rescan(&id).await {
                Ok(Some(_)) => scanned += 1,
                // Stopped concurrently.
                Ok(None) | Err(Error::Watcher(WatcherError::TrackerGone { .. })) => {}
                Err(e) => {
                    tracing::warn!(folder = %id, error = %e, "Rescan failed");
                    failed += 1;
                }
            }
        }

        (scanned, failed)
    }

    /// Change the rescan interval. Values below the floor are rejected.
    pub fn set_rescan_interval(&self, secs: u64) -> bool {
        if secs < MIN_RESCAN_INTERVAL.as_secs() {
            tracing::warn!(
                secs,
                min = MIN_RESCAN_INTERVAL.as_secs(),
                "Rescan interval below minimum, ignored"
            );
            return false;
        }

        self.rescan_interval_secs.store(secs, Ordering::Relaxed);
        tracing::info!(secs, "Rescan interval changed");
        true
    }

    #[must_use]
    pub fn rescan_interval(&self) -> Duration {
        Duration::from_secs(self.rescan_interval_secs.load(Ordering::Relaxed))
    }

    /// Rescan cycles run so far.
    #[must_use]
    pub fn rescan_cycles(&self) -> u64 {
        self.rescan_cycles.load(Ordering::Relaxed)
    }

    /// Failed rescan cycles in a row, as seen by the rescan loop.
    #[must_use]
    pub fn consecutive_rescan_failures(&self) -> u32 {
        self.rescan_failures.load(Ordering::Relaxed)
    }

    fn rescan_due(&self) -> bool {
        self.last_rescan.lock().elapsed() >= self.rescan_interval()
    }

    pub async fn lifecycle(&self) -> Lifecycle {
        self.state.lock().await.lifecycle
    }

    pub async fn is_running(&self) -> bool {
        self.lifecycle().await == Lifecycle::Running
    }

    /// Snapshot of the descriptor list as last loaded.
    pub async fn descriptors(&self) -> Vec<FolderDescriptor> {
        self.state.lock().await.descriptors.clone()
    }

    #[must_use]
    pub const fn engine(&self) -> &Arc<WatchEngine> {
        &self.engine
    }

    #[must_use]
    pub const fn settings(&self) -> &ManagerSettings {
        &self.settings
    }

    /// Apply the license gate, persisting when anything changed.
    fn gate(&self, descriptors: &mut [FolderDescriptor], licensed: bool) -> usize {
        let changed = apply_license(descriptors, licensed);
        if changed > 0 {
            if let Err(e) = self.store.persist(descriptors) {
                tracing::error!(error = %e, "Failed to persist license state");
            }
        }
        changed
    }

    async fn start_folder(&self, descriptor: &FolderDescriptor) -> bool {
        match self.engine.start_watching(descriptor).await {
            Ok(summary) => {
                tracing::debug!(
                    folder = %descriptor.label(),
                    pending = summary.pending,
                    waiting = summary.waiting,
                    "Initial rescan"
                );
                true
            }
            Err(Error::Watcher(WatcherError::AlreadyWatched { .. })) => true,
            Err(e) => {
                tracing::warn!(folder = %descriptor.label(), error = %e, "Hotfolder not watched");
                false
            }
        }
    }

    fn reload_handler(&self) -> ReloadHandler {
        let weak = self.weak_self.clone();
        Arc::new(move || {
            let weak = weak.clone();
            async move {
                let manager = weak.upgrade().ok_or(Error::NotRunning)?;
                let report = manager.reload().await?;
                Ok(report.summary())
            }
            .boxed()
        })
    }
}

impl Drop for Manager {
    fn drop(&mut self) {
        if let Some(cancel) = self.state.get_mut().cancel.take() {
            cancel.cancel();
        }
    }
}

impl std::fmt::Debug for Manager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Manager")
            .field("engine", &self.engine)
            .field("rescan_interval", &self.rescan_interval())
            .finish_non_exhaustive()
    }
}

async fn drain_loop(manager: Weak<Manager>, cancel: CancellationToken) {
    let Some(interval) = manager.upgrade().map(|m| m.settings.drain_interval) else {
        return;
    };
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let Some(manager) = manager.upgrade() else {
            break;
        };

        // Jobs are detached; each logs its own outcome.
        tokio::select! {
            () = cancel.cancelled() => break,
            jobs = manager.engine.dispatch_pending() => {
                if !jobs.is_empty() {
                    tracing::debug!(dispatched = jobs.len(), "Units dispatched");
                }
            }
        }
    }

    tracing::debug!("Drain loop stopped");
}

async fn rescan_loop(manager: Weak<Manager>, cancel: CancellationToken) {
    let mut consecutive_errors = 0u32;

    loop {
        let Some(delay) = manager.upgrade().map(|m| {
            if consecutive_errors == 0 {
                m.settings.rescan_check_interval
            } else {
                m.settings.backoff(consecutive_errors)
            }
        }) else {
            break;
        };

        tokio::select! {
            () = cancel.cancelled() => break,
            () = tokio::time::sleep(delay) => {}
        }

        let Some(manager) = manager.upgrade() else {
            break;
        };

        if consecutive_errors == 0 && !manager.rescan_due() {
            continue;
        }

        let report = tokio::select! {
            () = cancel.cancelled() => break,
            report = manager.run_rescan_cycle() => report,
        };

        if report.failed > 0 {
            consecutive_errors = consecutive_errors.saturating_add(1);
            manager
                .rescan_failures
                .store(consecutive_errors, Ordering::Relaxed);
            tracing::warn!(
                failed = report.failed,
                backoff_secs = manager.settings.backoff(consecutive_errors).as_secs(),
                "Rescan cycle had failures, backing off"
            );
        } else {
            consecutive_errors = 0;
            manager.rescan_failures.store(0, Ordering::Relaxed);
        }
    }

    tracing::debug!("Rescan loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::license::StaticLicense;
    use crate::store::{DisabledReason, FolderState, MemoryFolderStore};
    use crate::watcher::ReadyUnit;
    use std::fs;
    use tempfile::TempDir;

    struct NoopProcessor;

    impl UnitProcessor for NoopProcessor {
        fn process_unit(&self, _unit: &ReadyUnit, _folder: &FolderDescriptor) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn settings() -> ManagerSettings {
        ManagerSettings {
            grace_delay: Duration::from_millis(10),
            join_timeout: Duration::from_secs(1),
            ..ManagerSettings::default()
        }
    }

    fn manager(store: Arc<MemoryFolderStore>, license: Arc<StaticLicense>) -> Arc<Manager> {
        Manager::new(store, Arc::new(NoopProcessor), license, settings())
    }

    #[tokio::test]
    async fn test_start_is_idempotent_and_stop_reports() {
        let tmp = TempDir::new().unwrap();
        let store = Arc::new(MemoryFolderStore::new(vec![FolderDescriptor::new(
            "a",
            tmp.path(),
        )]));
        let manager = manager(store, Arc::new(StaticLicense::new(true)));

        let first = manager.start().await.unwrap();
        assert!(!first.already_running);
        assert_eq!(first.watches_started, 1);
        assert!(manager.is_running().await);

        assert!(manager.start().await.unwrap().already_running);

        assert!(manager.stop().await);
        assert!(!manager.stop().await);
        assert_eq!(manager.lifecycle().await, Lifecycle::Stopped);
        assert!(manager.engine().watched_ids().await.is_empty());
    }

    #[tokio::test]
    async fn test_unlicensed_start_disables_and_persists() {
        let tmp = TempDir::new().unwrap();
        let store = Arc::new(MemoryFolderStore::new(vec![
            FolderDescriptor::new("a", tmp.path()),
            FolderDescriptor::new("b", tmp.path().join("b")).with_state(FolderState::Disabled {
                reason: DisabledReason::UserConfigured,
            }),
        ]));
        let manager = manager(Arc::clone(&store), Arc::new(StaticLicense::new(false)));

        let report = manager.start().await.unwrap();
        assert!(!report.licensed);
        assert_eq!(report.license_changes, 1);
        assert_eq!(report.watches_started, 0);
        assert!(manager.is_running().await);
        assert_eq!(store.persist_count(), 1);

        let persisted = store.list().unwrap();
        assert_eq!(
            persisted[0].state(),
            FolderState::Disabled {
                reason: DisabledReason::LicenseInvalid
            }
        );
        assert_eq!(
            persisted[1].state(),
            FolderState::Disabled {
                reason: DisabledReason::UserConfigured
            }
        );

        manager.stop().await;
    }

    #[tokio::test]
    async fn test_license_loss_stops_watches_without_persisting() {
        let tmp = TempDir::new().unwrap();
        let store = Arc::new(MemoryFolderStore::new(vec![FolderDescriptor::new(
            "a",
            tmp.path(),
        )]));
        let license = Arc::new(StaticLicense::new(true));
        let manager = manager(Arc::clone(&store), Arc::clone(&license));
        manager.start().await.unwrap();

        license.set(false);
        let report = manager.run_rescan_cycle().await;
        assert!(!report.licensed);
        assert_eq!(report.stopped, 1);
        assert!(manager.engine().watched_ids().await.is_empty());
        assert!(!manager.descriptors().await[0].is_enabled());
        assert_eq!(store.persist_count(), 0);

        // A valid license resumes watching on reload.
        license.set(true);
        let reload = manager.reload().await.unwrap();
        assert_eq!(reload.restarted, vec!["a".to_string()]);
        assert!(manager.engine().is_watching("a").await);

        manager.stop().await;
    }

    #[tokio::test]
    async fn test_reload_diffs_descriptors() {
        let tmp = TempDir::new().unwrap();
        let dir_a = tmp.path().join("a");
        let dir_b = tmp.path().join("b");
        let dir_c = tmp.path().join("c");
        for dir in [&dir_a, &dir_b, &dir_c] {
            fs::create_dir_all(dir).unwrap();
        }

        let store = Arc::new(MemoryFolderStore::new(vec![
            FolderDescriptor::new("a", &dir_a),
            FolderDescriptor::new("b", &dir_b),
        ]));
        let manager = manager(Arc::clone(&store), Arc::new(StaticLicense::new(true)));
        manager.start().await.unwrap();

        store.replace(vec![
            FolderDescriptor::new("b", &dir_b).with_pairing(false),
            FolderDescriptor::new("c", &dir_c),
        ]);

        let report = manager.reload().await.unwrap();
        assert_eq!(report.removed, vec!["a".to_string()]);
        assert_eq!(report.restarted, vec!["b".to_string()]);
        assert_eq!(report.added, vec!["c".to_string()]);
        assert!(report.summary().contains("1 added"));
        assert_eq!(
            manager.engine().watched_ids().await,
            vec!["b".to_string(), "c".to_string()]
        );

        manager.stop().await;
    }

    #[tokio::test]
    async fn test_reload_requires_running() {
        let store = Arc::new(MemoryFolderStore::new(Vec::new()));
        let manager = manager(store, Arc::new(StaticLicense::new(true)));

        assert!(matches!(manager.reload().await, Err(Error::NotRunning)));
    }

    #[tokio::test]
    async fn test_missing_folder_is_not_fatal() {
        let tmp = TempDir::new().unwrap();
        let store = Arc::new(MemoryFolderStore::new(vec![
            FolderDescriptor::new("gone", "/nonexistent/hotfolder"),
            FolderDescriptor::new("ok", tmp.path()),
        ]));
        let manager = manager(store, Arc::new(StaticLicense::new(true)));

        let report = manager.start().await.unwrap();
        assert_eq!(report.watches_started, 1);

        let reload = manager.reload().await.unwrap();
        assert_eq!(reload.failed, vec!["gone".to_string()]);

        manager.stop().await;
    }

    #[tokio::test]
    async fn test_rescan_interval_floor() {
        let store = Arc::new(MemoryFolderStore::new(Vec::new()));
        let manager = manager(store, Arc::new(StaticLicense::new(true)));

        assert!(!manager.set_rescan_interval(59));
        assert_eq!(manager.rescan_interval(), Duration::from_secs(300));
        assert!(manager.set_rescan_interval(60));
        assert_eq!(manager.rescan_interval(), Duration::from_secs(60));
    }

    fn slow_drain_manager(store: Arc<MemoryFolderStore>, license: Arc<StaticLicense>) -> Arc<Manager> {
        let settings = ManagerSettings {
            drain_interval: Duration::from_secs(60),
            ..settings()
        };
        Manager::new(store, Arc::new(NoopProcessor), license, settings)
    }

    #[tokio::test(start_paused = true)]
    async fn test_rescan_loop_stops_watches_when_license_lapses() {
        let tmp = TempDir::new().unwrap();
        let store = Arc::new(MemoryFolderStore::new(vec![FolderDescriptor::new(
            "a",
            tmp.path(),
        )]));
        let license = Arc::new(StaticLicense::new(true));
        let manager = slow_drain_manager(store, Arc::clone(&license));
        let started = Instant::now();

        manager.start().await.unwrap();
        license.set(false);

        tokio::time::sleep_until(started + Duration::from_secs(250)).await;
        assert_eq!(manager.rescan_cycles(), 0);
        assert_eq!(manager.engine().watched_ids().await, vec!["a".to_string()]);

        // Interval is 300s, checked every 10s.
        tokio::time::sleep_until(started + Duration::from_secs(330)).await;
        assert_eq!(manager.rescan_cycles(), 1);
        assert!(manager.engine().watched_ids().await.is_empty());
        assert!(manager.is_running().await);

        manager.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_rescan_loop_retries_failures_after_backoff() {
        let tmp = TempDir::new().unwrap();
        let input = tmp.path().join("in");
        fs::create_dir(&input).unwrap();
        let store = Arc::new(MemoryFolderStore::new(vec![FolderDescriptor::new(
            "a",
            input.clone(),
        )]));
        let manager = slow_drain_manager(store, Arc::new(StaticLicense::new(true)));

        manager.start().await.unwrap();
        fs::remove_dir_all(&input).unwrap();

        for _ in 0..400 {
            if manager.rescan_cycles() > 0 {
                break;
            }
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
        assert_eq!(manager.rescan_cycles(), 1);
        assert_eq!(manager.consecutive_rescan_failures(), 1);
        let first_failure = Instant::now();

        // Retried after the 60s backoff, well before the 300s interval.
        tokio::time::sleep_until(first_failure + Duration::from_secs(58)).await;
        assert_eq!(manager.rescan_cycles(), 1);
        tokio::time::sleep_until(first_failure + Duration::from_secs(62)).await;
        assert_eq!(manager.rescan_cycles(), 2);
        assert_eq!(manager.consecutive_rescan_failures(), 2);

        // Second backoff step is 120s; the restored folder resets the count.
        fs::create_dir(&input).unwrap();
        tokio::time::sleep_until(first_failure + Duration::from_secs(178)).await;
        assert_eq!(manager.rescan_cycles(), 2);
        tokio::time::sleep_until(first_failure + Duration::from_secs(184)).await;
        assert_eq!(manager.rescan_cycles(), 3);
        assert_eq!(manager.consecutive_rescan_failures(), 0);

        manager.stop().await;
    }
}
