//! Command line surface for ragline.
//!
//! Every command prints one JSON object with a `signal` field to stdout.
//! Logs go to stderr.

pub mod app;
pub mod commands;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use ragline_config::Settings;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use crate::app::App;
use crate::commands::{error_report, execute, info_report, prepare, Command};

#[derive(Parser, Debug)]
#[command(name = "ragline")]
#[command(about = "Per-project document ingestion and retrieval-augmented answers")]
#[command(version)]
pub struct Cli {
    /// Configuration file (replaces ./ragline.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let settings = Settings::load(cli.config.as_deref()).context("Failed to load configuration")?;
    debug!("Loaded settings for {} {}", settings.app.name, settings.app.version);

    if cli.command == Command::Info {
        print_json(&info_report(&settings));
        return Ok(());
    }

    let prepared = prepare(&cli.command).await?;
    let app = App::build(settings)?;

    let cancel = CancellationToken::new();
    let watcher = spawn_interrupt_watcher(cancel.clone());

    let needs_store = cli.command.needs_vector_store();
    if needs_store {
        if let Err(e) = app.connect().await {
            watcher.abort();
            return Err(e);
        }
    }

    let result = execute(&app, cli.command.clone(), prepared, &cancel).await;

    if needs_store {
        app.disconnect().await;
    }
    watcher.abort();

    match result {
        Ok(report) => {
            print_json(&report);
            Ok(())
        }
        Err(e) => {
            error!(kind = ?e.kind(), "{}", e);
            print_json(&error_report(&cli.command, &e));
            Err(e.into())
        }
    }
}

/// Install the global subscriber: `RUST_LOG` when set, `info` otherwise,
/// `debug` with `--verbose`.
fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Cancel in-flight work on Ctrl-C.
fn spawn_interrupt_watcher(cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted, cancelling");
            cancel.cancel();
        }
    })
}

fn print_json(value: &serde_json::Value) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{}", text),
        Err(_) => println!("{}", value),
    }
}
