//! Hotfolder watching, write-stability debounce and pairing.
//!
//! This module provides:
//! - Recursive directory watching using notify-rs
//! - A per-folder tracker task turning events into ready units
//! - Full-folder rescans as a backstop for missed events
//! - The engine mapping folders to watches and units to the processor

mod engine;
mod events;
mod filter;
mod handler;
mod scanner;
mod tracker;
mod unit;
#[allow(clippy::module_inception)]
mod watcher;

pub use engine::{DrainReport, WatchEngine};
pub use events::{EventBatch, FileEvent};
pub use filter::PatternFilter;
pub use handler::{WatcherStats, WatcherStatsSnapshot};
pub use scanner::{scan_folder, scan_folder_async, ScanOutcome, ScanStatsSnapshot};
pub use tracker::{
    SeedSummary, Tracker, TrackerSettings, TrackerSnapshot, WaitingPartner,
    DEFAULT_STABILITY_WINDOW,
};
pub use unit::{InFlightGuard, InFlightSet, ReadyUnit};
pub use watcher::{
    FolderWatch, WatchHandle, WatchSettings, DEFAULT_CLEANUP_INTERVAL, DEFAULT_DEBOUNCE,
    DEFAULT_STOP_TIMEOUT,
};
