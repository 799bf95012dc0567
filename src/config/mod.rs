//! Configuration management for the hotfolder service.
//!
//! Supports configuration from:
//! - Command-line arguments (highest priority)
//! - Environment variables (`HOTFOLDER_*`)
//! - Built-in defaults (lowest priority)

mod settings;

pub use settings::{default_socket_path, Config};
