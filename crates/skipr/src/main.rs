//! skipr - incremental build and test runner

mod cli;

use std::path::PathBuf;

use clap::Parser;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use cli::Cli;

const LOG_FILE: &str = "skipr.log";

fn main() -> anyhow::Result<()> {
    let _guard = init_tracing();
    Cli::parse().execute()
}

/// Console logging on stderr filtered by `RUST_LOG` (default `warn`), plus a
/// daily JSON file at debug level under `~/.skipr/logs` when that directory
/// is usable. Job progress is printed separately by the reporters.
fn init_tracing() -> Option<WorkerGuard> {
    let console = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")));

    let Some(dir) = log_directory() else {
        tracing_subscriber::registry().with(console).init();
        return None;
    };

    let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::daily(&dir, LOG_FILE));
    let file = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(writer)
        .with_target(true)
        .with_filter(EnvFilter::new("debug"));

    tracing_subscriber::registry().with(console).with(file).init();
    Some(guard)
}

fn log_directory() -> Option<PathBuf> {
    let dir = dirs::home_dir()?.join(".skipr").join("logs");
    std::fs::create_dir_all(&dir).ok()?;
    Some(dir)
}
