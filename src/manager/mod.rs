//! Top-level supervision: start, stop and reload the watch engine, run
//! the periodic drain and rescan loops, and enforce the license gate.

mod orchestrator;
mod settings;

pub use orchestrator::{Lifecycle, Manager, ReloadReport, RescanReport, StartReport};
pub use settings::{ManagerSettings, DEFAULT_RESCAN_INTERVAL, MIN_RESCAN_INTERVAL};
