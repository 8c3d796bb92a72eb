// src/server/spawner.rs

//! Spawns all of the agent's long-running background tasks.

use super::http;
use super::initialization::ServerContext;
use crate::core::leader::Elector;
use crate::core::memory::safe_spawn;
use tokio::task::JoinHandle;
use tracing::info;

/// Spawns the HTTP server, memory guard, leader election loop and the
/// supervisor that gates the watch coordinator on leadership. The HTTP
/// surface and the command API are deliberately not leader-gated; only the
/// watch/evaluate pipeline is single-leader.
pub fn spawn_all(ctx: &ServerContext) -> Vec<JoinHandle<()>> {
    let state = &ctx.state;
    let shutdown_tx = &ctx.shutdown_tx;
    let mut tasks = Vec::new();

    // --- HTTP server ---
    let http_state = state.clone();
    let http_shutdown = shutdown_tx.subscribe();
    tasks.push(safe_spawn("http-server", async move {
        http::run_http_server(http_state, http_shutdown).await;
    }));

    // --- Memory guard ---
    let guard = state.guard.clone();
    let guard_shutdown = shutdown_tx.subscribe();
    tasks.push(safe_spawn("memory-guard", async move {
        guard.run(guard_shutdown).await;
    }));

    // --- Leader election ---
    let (elector, mut leader_rx) = Elector::new(
        state.client.clone(),
        &state.config.settings.namespace,
        &state.config.settings.election_id,
        state.identity.clone(),
    );
    let elector_shutdown = shutdown_tx.subscribe();
    tasks.push(safe_spawn("leader-election", async move {
        elector.run(elector_shutdown).await;
    }));

    // --- Leader supervisor: starts/stops the watch coordinator ---
    let coordinator = state.coordinator.clone();
    tasks.push(safe_spawn("leader-supervisor", async move {
        loop {
            let is_leader = leader_rx.borrow_and_update().is_leader;
            if is_leader {
                coordinator.clone().start().await;
            } else {
                coordinator.stop().await;
            }
            if leader_rx.changed().await.is_err() {
                break;
            }
        }
        // The elector is gone (shutdown); make sure the pipeline is too.
        coordinator.stop().await;
    }));

    info!("All background tasks have been spawned.");
    tasks
}
