//! Write-stability debounce and primary/companion pairing for one folder.
//!
//! Per path: `unseen -> pending -> {ready | paired-ready | waiting} -> in-flight`.
//! A tracker is owned by exactly one task; every operation takes the
//! current instant explicitly.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};

use super::events::EventBatch;
use super::filter::PatternFilter;
use super::unit::{InFlightSet, ReadyUnit};
use crate::store::{FolderDescriptor, FolderId, PairRole, PairingRule};
use crate::Result;

/// Quiet period before a file counts as fully written.
pub const DEFAULT_STABILITY_WINDOW: Duration = Duration::from_secs(2);

/// Debounce and pairing knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackerSettings {
    pub stability_window: Duration,
    /// `None` waits for a partner forever.
    pub partner_wait_timeout: Option<Duration>,
}

impl Default for TrackerSettings {
    fn default() -> Self {
        Self {
            stability_window: DEFAULT_STABILITY_WINDOW,
            partner_wait_timeout: None,
        }
    }
}

/// A stable file whose companion has not appeared yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaitingPartner {
    pub path: PathBuf,
    /// Wall-clock insertion time, for diagnostics.
    pub since: DateTime<Utc>,
    waiting_since: Instant,
}

impl WaitingPartner {
    fn new(path: PathBuf, now: Instant) -> Self {
        Self {
            path,
            since: Utc::now(),
            waiting_since: now,
        }
    }
}

/// Counts from seeding a rescan listing.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SeedSummary {
    pub pending: usize,
    pub waiting: usize,
    pub paired: usize,
    pub skipped: usize,
}

/// Point-in-time view of a tracker.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TrackerSnapshot {
    pub pending: Vec<PathBuf>,
    pub waiting: Vec<WaitingPartner>,
    pub queued: Vec<ReadyUnit>,
}

impl TrackerSnapshot {
    /// Whether `path` is waiting for its partner.
    #[must_use]
    pub fn is_waiting(&self, path: &Path) -> bool {
        self.waiting.iter().any(|w| w.path == path)
    }

    /// Whether `path` is pending stabilization.
    #[must_use]
    pub fn is_pending(&self, path: &Path) -> bool {
        self.pending.iter().any(|p| p == path)
    }
}

/// Stability and pairing state of one hotfolder.
#[derive(Debug)]
pub struct Tracker {
    folder_id: FolderId,
    filter: PatternFilter,
    settings: TrackerSettings,
    pending: HashMap<PathBuf, Instant>,
    waiting: HashMap<PathBuf, WaitingPartner>,
    queued: Vec<ReadyUnit>,
    in_flight: InFlightSet,
}

impl Tracker {
    /// Create a tracker for a folder.
    ///
    /// # Errors
    ///
    /// Returns an error if the folder's patterns are invalid.
    pub fn new(
        descriptor: &FolderDescriptor,
        settings: TrackerSettings,
        in_flight: InFlightSet,
    ) -> Result<Self> {
        let filter = PatternFilter::new(&descriptor.patterns, descriptor.active_pairing())?;
        Ok(Self {
            folder_id: descriptor.id.clone(),
            filter,
            settings,
            pending: HashMap::new(),
            waiting: HashMap::new(),
            queued: Vec::new(),
            in_flight,
        })
    }

    /// Id of the folder this tracker belongs to.
    #[must_use]
    pub fn folder_id(&self) -> &str {
        &self.folder_id
    }

    /// The folder's pattern filter.
    #[must_use]
    pub const fn filter(&self) -> &PatternFilter {
        &self.filter
    }

    /// Whether `path` is pending, waiting or queued.
    #[must_use]
    pub fn is_tracked(&self, path: &Path) -> bool {
        self.pending.contains_key(path)
            || self.waiting.contains_key(path)
            || self.queued.iter().any(|u| u.contains(path))
    }

    /// Apply a batch of file events.
    pub fn apply(&mut self, batch: EventBatch, now: Instant) {
        for path in &batch.removed {
            self.record_removal(path, now);
        }
        for path in &batch.changed {
            self.record_change(path, now);
        }
    }

    /// Record a created/modified event. Returns whether the path is tracked.
    pub fn record_change(&mut self, path: &Path, now: Instant) -> bool {
        if !self.filter.matches(path) {
            return false;
        }

        if self.in_flight.contains(path) || self.queued.iter().any(|u| u.contains(path)) {
            tracing::trace!(folder = %self.folder_id, path = %path.display(), "Ignoring event for claimed file");
            return false;
        }

        if self.waiting.contains_key(path) {
            return true;
        }

        if let Some(rule) = self.filter.pairing().cloned() {
            if let Some(partner) = self.waiting_partner_of(&rule, path) {
                self.promote_pair(&rule, path.to_path_buf(), partner);
                return true;
            }
        }

        if self.pending.insert(path.to_path_buf(), now).is_none() {
            tracing::info!(folder = %self.folder_id, path = %path.display(), "New file detected");
        }
        true
    }

    /// Forget a path that disappeared.
    ///
    /// The other half of a queued pair goes back to waiting for its partner.
    pub fn record_removal(&mut self, path: &Path, now: Instant) {
        let was_pending = self.pending.remove(path).is_some();
        let was_waiting = self.waiting.remove(path).is_some();

        let (broken, kept): (Vec<ReadyUnit>, Vec<ReadyUnit>) = std::mem::take(&mut self.queued)
            .into_iter()
            .partition(|u| u.contains(path));
        self.queued = kept;

        for unit in &broken {
            for survivor in unit.paths().into_iter().filter(|p| *p != path) {
                tracing::info!(folder = %self.folder_id, path = %survivor.display(), "Partner removed, waiting again");
                self.waiting.insert(
                    survivor.to_path_buf(),
                    WaitingPartner::new(survivor.to_path_buf(), now),
                );
            }
        }

        if was_pending || was_waiting || !broken.is_empty() {
            tracing::debug!(folder = %self.folder_id, path = %path.display(), "File removed before processing");
        }
    }

    /// Collect every unit that is ready now and claim it as in flight.
    pub fn drain(&mut self, now: Instant) -> Vec<ReadyUnit> {
        let mut ready = std::mem::take(&mut self.queued);
        self.prune_waiting(now, &mut ready);

        let window = self.settings.stability_window;
        let mut stable: Vec<PathBuf> = self
            .pending
            .iter()
            .filter(|(_, changed)| now.saturating_duration_since(**changed) >= window)
            .map(|(path, _)| path.clone())
            .collect();
        stable.sort();

        let pairing = self.filter.pairing().cloned();

        for path in stable {
            // A pair resolved earlier in this pass may have consumed it.
            if self.pending.remove(&path).is_none() {
                continue;
            }
            if !path.exists() {
                tracing::debug!(folder = %self.folder_id, path = %path.display(), "File vanished while pending");
                continue;
            }
            if self.in_flight.contains(&path) {
                continue;
            }

            match &pairing {
                None => ready.push(ReadyUnit::Single(path)),
                Some(rule) => {
                    if let Some(unit) = self.resolve_pair(rule, path, now) {
                        ready.push(unit);
                    }
                }
            }
        }

        ready.retain(|unit| {
            if !unit.paths().iter().all(|p| p.exists()) {
                tracing::debug!(folder = %self.folder_id, path = %unit.primary().display(), "Dropping unit with missing file");
                return false;
            }
            if !self.in_flight.try_claim(unit) {
                tracing::debug!(folder = %self.folder_id, path = %unit.primary().display(), "Unit already in flight");
                return false;
            }
            true
        });

        ready
    }

    /// Seed state from a full folder listing.
    ///
    /// Untracked files become pending with their window already elapsed,
    /// so the next drain picks them up. Primaries are handled before
    /// companions so a listed pair resolves through its primary.
    pub fn seed(&mut self, files: &[PathBuf], now: Instant) -> SeedSummary {
        let aged = now
            .checked_sub(self.settings.stability_window)
            .unwrap_or(now);
        let pairing = self.filter.pairing().cloned();
        let listed: HashSet<&Path> = files.iter().map(PathBuf::as_path).collect();

        let is_companion = |path: &Path| {
            pairing
                .as_ref()
                .is_some_and(|rule| rule.role(path) == Some(PairRole::Companion))
        };
        let ordered = files
            .iter()
            .filter(|p| !is_companion(p))
            .chain(files.iter().filter(|p| is_companion(p)));

        let mut summary = SeedSummary::default();

        for path in ordered {
            if !self.filter.matches(path) || self.in_flight.contains(path) || self.is_tracked(path)
            {
                summary.skipped += 1;
                continue;
            }

            let Some(rule) = &pairing else {
                self.pending.insert(path.clone(), aged);
                summary.pending += 1;
                continue;
            };

            let Some(role) = rule.role(path) else {
                self.pending.insert(path.clone(), aged);
                summary.pending += 1;
                continue;
            };

            if let Some(partner) = self.waiting_partner_of(rule, path) {
                self.promote_pair(rule, path.clone(), partner);
                summary.paired += 1;
                continue;
            }

            let candidates = rule.partner_candidates(path);
            let partner_present = candidates
                .iter()
                .any(|c| listed.contains(c.as_path()) || self.pending.contains_key(c) || c.exists());

            match (role, partner_present) {
                (PairRole::Primary, true) => {
                    self.pending.insert(path.clone(), aged);
                    summary.pending += 1;
                }
                (PairRole::Companion, true) => {
                    // Resolved when its primary stabilizes.
                    summary.skipped += 1;
                }
                (_, false) => {
                    tracing::info!(folder = %self.folder_id, path = %path.display(), "Existing file waits for its partner");
                    self.waiting
                        .insert(path.clone(), WaitingPartner::new(path.clone(), now));
                    summary.waiting += 1;
                }
            }
        }

        summary
    }

    /// Give back a unit returned by [`Tracker::drain`] that will not be processed.
    pub fn release(&self, unit: &ReadyUnit) {
        self.in_flight.release(unit);
    }

    /// Point-in-time view of this tracker.
    #[must_use]
    pub fn snapshot(&self) -> TrackerSnapshot {
        let mut pending: Vec<PathBuf> = self.pending.keys().cloned().collect();
        pending.sort();
        let mut waiting: Vec<WaitingPartner> = self.waiting.values().cloned().collect();
        waiting.sort_by(|a, b| a.path.cmp(&b.path));

        TrackerSnapshot {
            pending,
            waiting,
            queued: self.queued.clone(),
        }
    }

    fn waiting_partner_of(&self, rule: &PairingRule, path: &Path) -> Option<PathBuf> {
        rule.partner_candidates(path)
            .into_iter()
            .find(|c| self.waiting.contains_key(c))
    }

    /// Queue a pair whose second half just arrived.
    fn promote_pair(&mut self, rule: &PairingRule, arrived: PathBuf, partner: PathBuf) {
        self.waiting.remove(&partner);
        self.pending.remove(&partner);
        self.pending.remove(&arrived);

        let unit = make_pair(rule, arrived, partner);
        tracing::info!(
            folder = %self.folder_id,
            primary = %unit.primary().display(),
            "Partner found, pair queued"
        );
        self.queued.push(unit);
    }

    /// Pair a freshly stable path, or park it until its partner arrives.
    fn resolve_pair(&mut self, rule: &PairingRule, path: PathBuf, now: Instant) -> Option<ReadyUnit> {
        if rule.role(&path).is_none() {
            return Some(ReadyUnit::Single(path));
        }

        if let Some(partner) = self.waiting_partner_of(rule, &path) {
            self.waiting.remove(&partner);
            return Some(make_pair(rule, path, partner));
        }

        let on_disk = rule
            .partner_candidates(&path)
            .into_iter()
            .find(|c| c.exists() && !self.in_flight.contains(c));
        if let Some(partner) = on_disk {
            self.pending.remove(&partner);
            return Some(make_pair(rule, path, partner));
        }

        tracing::info!(folder = %self.folder_id, path = %path.display(), "Waiting for partner file");
        self.waiting
            .insert(path.clone(), WaitingPartner::new(path, now));
        None
    }

    /// Drop waiting entries whose file is gone; expire overdue ones.
    fn prune_waiting(&mut self, now: Instant, ready: &mut Vec<ReadyUnit>) {
        let timeout = self.settings.partner_wait_timeout;
        let mut gone = Vec::new();
        let mut expired = Vec::new();

        for (path, entry) in &self.waiting {
            if !path.exists() {
                gone.push(path.clone());
            } else if timeout.is_some_and(|t| now.saturating_duration_since(entry.waiting_since) >= t)
            {
                expired.push(path.clone());
            }
        }

        for path in gone {
            self.waiting.remove(&path);
            tracing::debug!(folder = %self.folder_id, path = %path.display(), "Waiting file removed externally");
        }

        expired.sort();
        for path in expired {
            if let Some(entry) = self.waiting.remove(&path) {
                tracing::warn!(
                    folder = %self.folder_id,
                    path = %path.display(),
                    since = %entry.since,
                    "Partner never arrived, releasing file alone"
                );
                ready.push(ReadyUnit::Single(path));
            }
        }
    }
}

fn make_pair(rule: &PairingRule, a: PathBuf, b: PathBuf) -> ReadyUnit {
    if rule.role(&a) == Some(PairRole::Primary) {
        ReadyUnit::Pair {
            primary: a,
            companion: b,
        }
    } else {
        ReadyUnit::Pair {
            primary: b,
            companion: a,
        }
    }
}
