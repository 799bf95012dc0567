//! Hotfolder service
//!
//! Entry point for the hotfolder engine and its control channel client.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use hotfolder::control::{ControlClient, ControlResponse};
use hotfolder::license::{FileLicense, LicenseCheck, StaticLicense};
use hotfolder::manager::Manager;
use hotfolder::observability::init_tracing;
use hotfolder::processor::MoveProcessor;
use hotfolder::store::JsonFolderStore;
use hotfolder::{Config, Result};

/// Hotfolder service - watch, pair and dispatch incoming documents
#[derive(Parser, Debug)]
#[command(name = "hotfolder")]
#[command(author, version, about, long_about = None)]
#[command(args_conflicts_with_subcommands = true)]
struct Cli {
    /// Control channel socket
    #[arg(long, global = true, env = "HOTFOLDER_SOCKET")]
    socket: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "HOTFOLDER_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Enable JSON logging output
    #[arg(long, global = true, env = "HOTFOLDER_LOG_JSON")]
    log_json: bool,

    #[command(subcommand)]
    command: Option<Command>,

    #[command(flatten)]
    run: RunArgs,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the engine until Ctrl+C or SIGTERM (default)
    Run(RunArgs),
    /// Check that a running engine answers
    Ping,
    /// Ask a running engine to reload its hotfolder list
    Reload,
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Hotfolder list (JSON)
    #[arg(short, long, env = "HOTFOLDER_FOLDERS", default_value = "./hotfolders.json")]
    folders: PathBuf,

    /// License file; without one the engine runs licensed
    #[arg(long, env = "HOTFOLDER_LICENSE")]
    license: Option<PathBuf>,

    /// Seconds between full rescans (minimum 60)
    #[arg(long, env = "HOTFOLDER_RESCAN_INTERVAL", default_value = "300")]
    rescan_interval: u64,

    /// Quiet period before a file counts as stable, in milliseconds
    #[arg(long, env = "HOTFOLDER_STABILITY_WINDOW_MS", default_value = "2000")]
    stability_window_ms: u64,

    /// Seconds to wait for a missing partner before emitting alone
    #[arg(long, env = "HOTFOLDER_PARTNER_TIMEOUT")]
    partner_timeout: Option<u64>,

    /// Coalescing delay for file notifications, in milliseconds
    #[arg(long, env = "HOTFOLDER_DEBOUNCE_MS", default_value = "250")]
    debounce_ms: u64,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    init_tracing(&cli.log_level, cli.log_json);

    let socket = cli.socket.unwrap_or_else(hotfolder::config::default_socket_path);

    match cli.command.unwrap_or(Command::Run(cli.run)) {
        Command::Run(args) => run(args, socket, cli.log_level, cli.log_json).await,
        Command::Ping => client_outcome(ControlClient::new(socket).ping().await),
        Command::Reload => client_outcome(ControlClient::new(socket).reload().await),
    }
}

async fn run(args: RunArgs, socket: PathBuf, log_level: String, log_json: bool) -> ExitCode {
    match serve(args, socket, log_level, log_json).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Hotfolder service failed");
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn serve(args: RunArgs, socket: PathBuf, log_level: String, log_json: bool) -> Result<()> {
    tracing::info!("Hotfolder v{} starting...", env!("CARGO_PKG_VERSION"));

    let config = Config {
        folders_file: args.folders,
        license_file: args.license,
        socket_path: socket,
        log_level,
        log_json,
        rescan_interval_secs: args.rescan_interval,
        stability_window_ms: args.stability_window_ms,
        partner_wait_timeout_secs: args.partner_timeout,
        debounce_ms: args.debounce_ms,
    };

    tracing::debug!(?config, "Configuration loaded");
    config.validate()?;

    let license: Arc<dyn LicenseCheck> = match &config.license_file {
        Some(path) => Arc::new(FileLicense::new(path)),
        None => Arc::new(StaticLicense::default()),
    };

    let manager = Manager::new(
        Arc::new(JsonFolderStore::new(&config.folders_file)),
        Arc::new(MoveProcessor::new()),
        license,
        config.manager_settings(),
    );

    let report = manager.start().await?;
    tracing::info!(
        folders = %config.folders_file.display(),
        socket = %config.socket_path.display(),
        licensed = report.licensed,
        watches = report.watches_started,
        "Hotfolder service running"
    );

    shutdown_signal().await;

    manager.stop().await;
    tracing::info!("Hotfolder service shutdown complete");
    Ok(())
}

fn client_outcome(outcome: Result<ControlResponse>) -> ExitCode {
    match outcome {
        Ok(response) if response.is_success() => {
            println!("{}", response.message);
            ExitCode::SUCCESS
        }
        Ok(response) => {
            eprintln!("error: {}", response.message);
            ExitCode::FAILURE
        }
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("Received Ctrl+C, shutting down"),
        () = terminate => tracing::info!("Received SIGTERM, shutting down"),
    }
}
