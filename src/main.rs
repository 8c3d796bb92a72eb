// src/main.rs

//! The main entry point for the kubalert agent.

use anyhow::Result;
use clap::Parser;
use kubalert::config::{Config, Flags};
use kubalert::server;
use tracing::{error, info};
use tracing_subscriber::filter::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // `--version` and `--help` are handled here and exit before any side
    // effects.
    let flags = Flags::parse();

    // Load the agent configuration from file, flags and environment. The
    // agent cannot run without a valid configuration.
    let config = match Config::load(&flags) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {e:#}");
            std::process::exit(1);
        }
    };

    init_logging(&config);

    info!(version = env!("CARGO_PKG_VERSION"), "Starting kubalert");
    info!(config = ?config.sanitized(), "Starting with config");

    if let Err(e) = server::run(config).await {
        error!("Agent runtime error: {e:#}");
        std::process::exit(1);
    }

    Ok(())
}

/// Sets up the global tracing subscriber. `RUST_LOG` wins over the
/// configured level; `settings.log.json` switches to line-JSON output.
fn init_logging(config: &Config) {
    let level = match config.settings.log.level.as_str() {
        // "fatal" has no tracing counterpart; error is the closest.
        "fatal" => "error",
        other => other,
    };
    let filter = EnvFilter::new(std::env::var("RUST_LOG").unwrap_or_else(|_| level.to_string()));

    if config.settings.log.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .compact()
            .with_ansi(true)
            .init();
    }
}
