//! Hotfolder engine library
//!
//! Watches configured input folders, waits for files to finish being
//! written, pairs primary documents with their companion metadata files
//! and hands ready units to a processing collaborator. A local control
//! channel lets a front-end trigger configuration reloads.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod control;
pub mod error;
pub mod license;
pub mod manager;
pub mod observability;
pub mod processor;
pub mod store;
pub mod watcher;

pub use config::Config;
pub use error::{Error, Result};
