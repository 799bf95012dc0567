//! Structured logging setup.
//!
//! Plain text or JSON output through `tracing-subscriber`, with the level
//! taken from `RUST_LOG` when set and from configuration otherwise.

use tracing_subscriber::{
    filter::EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt, Registry,
};

/// Tracing configuration options.
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Enable JSON output format
    pub json: bool,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Initialize tracing.
///
/// A second call in the same process is a no-op, so tests and embedders
/// that install their own subscriber are left alone.
pub fn init_tracing(level: &str, json: bool) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let installed = if json {
        let json_layer = fmt::layer()
            .json()
            .with_target(true)
            .with_thread_names(true)
            .with_file(true)
            .with_line_number(true);

        Registry::default()
            .with(env_filter)
            .with(json_layer)
            .try_init()
    } else {
        let fmt_layer = fmt::layer()
            .with_target(true)
            .with_thread_names(true);

        Registry::default()
            .with(env_filter)
            .with(fmt_layer)
            .try_init()
    };

    if installed.is_ok() {
        tracing::debug!("Tracing initialized: level={}, json={}", level, json);
    }
}

/// Get tracing configuration from environment variables.
///
/// Respects `HOTFOLDER_LOG_LEVEL` (default "info") and
/// `HOTFOLDER_LOG_JSON` (default false).
#[must_use]
pub fn config_from_env() -> TracingConfig {
    let level = std::env::var("HOTFOLDER_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
    let json = std::env::var("HOTFOLDER_LOG_JSON")
        .map(|v| parse_flag(&v))
        .unwrap_or(false);

    TracingConfig { level, json }
}

fn parse_flag(value: &str) -> bool {
    matches!(value.to_lowercase().as_str(), "true" | "1" | "yes")
}

/// Spans shared across the engine.
pub mod spans {
    use tracing::{info_span, Span};

    /// Span for work done on behalf of one hotfolder.
    #[must_use]
    pub fn folder_span(folder_id: &str) -> Span {
        info_span!("hotfolder", folder = %folder_id)
    }

    /// Span for one control channel exchange.
    #[must_use]
    pub fn control_span(command: &str) -> Span {
        info_span!("control", command = %command)
    }

    /// Span for one processed unit.
    #[must_use]
    pub fn unit_span(folder_id: &str, primary: &str) -> Span {
        info_span!("unit", folder = %folder_id, primary = %primary)
    }
}
