// src/server/mod.rs

use crate::config::Config;
use anyhow::Result;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

pub mod commander;
pub mod http;
pub mod initialization;
mod spawner;

pub use initialization::AgentState;

/// How long background tasks get to drain after shutdown is signalled.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// The main agent startup function, orchestrating all setup phases.
pub async fn run(config: Config) -> Result<()> {
    // 1. Build clients, verify connectivity, assemble shared state.
    let ctx = initialization::setup(config).await?;

    // Single-pass mode evaluates everything once and exits; no server, no
    // election.
    if ctx.state.config.run_once {
        ctx.state.coordinator.run_once().await?;
        return Ok(());
    }

    // 2. Spawn all background tasks.
    let tasks = spawner::spawn_all(&ctx);

    // 3. Wait for a termination signal, then drain.
    wait_for_signal().await;
    warn!("Received termination, signaling shutdown");
    let _ = ctx.shutdown_tx.send(());
    drain(tasks, &ctx.shutdown_tx).await;

    info!("Shutdown complete");
    Ok(())
}

async fn wait_for_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(sigterm) => sigterm,
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                let _ = tokio::signal::ctrl_c().await;
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

/// Waits for all tasks to finish, bounded by the shutdown grace period.
async fn drain(tasks: Vec<tokio::task::JoinHandle<()>>, _shutdown_tx: &broadcast::Sender<()>) {
    let drain_all = async {
        for task in tasks {
            let _ = task.await;
        }
    };
    if tokio::time::timeout(SHUTDOWN_GRACE, drain_all).await.is_err() {
        warn!("Some background tasks did not stop within the grace period");
    }
}
