// src/server/initialization.rs

//! Builds the Kubernetes client, verifies connectivity and assembles the
//! shared agent state all tasks operate on.

use crate::config::Config;
use crate::core::alert::Dispatcher;
use crate::core::cache::EventCache;
use crate::core::memory::MemoryGuard;
use crate::core::watcher::WatchCoordinator;
use anyhow::{Context, Result};
use k8s_openapi::api::core::v1::Pod;
use kube::api::ListParams;
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Api, Client};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::info;

/// Shared, immutable agent state. Everything mutable lives behind the
/// handles inside (cache counters, coordinator run state, pressure level).
pub struct AgentState {
    pub config: Arc<Config>,
    pub client: Client,
    pub cache: Arc<EventCache>,
    pub dispatcher: Arc<Dispatcher>,
    pub guard: Arc<MemoryGuard>,
    pub coordinator: Arc<WatchCoordinator>,
    pub identity: String,
}

/// Everything `server::run` needs after setup.
pub struct ServerContext {
    pub state: Arc<AgentState>,
    pub shutdown_tx: broadcast::Sender<()>,
}

/// Performs all one-time setup: client construction, a connectivity probe
/// against the API server, and wiring of cache, dispatcher, memory guard
/// and coordinator.
pub async fn setup(config: Config) -> Result<ServerContext> {
    let config = Arc::new(config);
    let client = build_client(&config).await?;

    // Fail fast when the API server is unreachable; in the steady state
    // single errors are survivable, at startup they are not.
    let pods: Api<Pod> = Api::all(client.clone());
    pods.list(&ListParams::default().limit(1))
        .await
        .context("Failed to list pods from apiserver")?;
    info!("Kubernetes API connectivity verified");

    let identity = hostname::get()
        .context("Unable to get hostname")?
        .to_string_lossy()
        .to_string();

    let cache = Arc::new(EventCache::from_env());
    let dispatcher = Arc::new(Dispatcher::new(
        config.api_keys(),
        config.settings.events_base_url.clone(),
        cache.clone(),
    )?);
    let guard = Arc::new(MemoryGuard::new(cache.clone()));
    let coordinator = WatchCoordinator::new(
        client.clone(),
        config.clone(),
        dispatcher.clone(),
        guard.clone(),
    );

    let (shutdown_tx, _) = broadcast::channel(16);

    Ok(ServerContext {
        state: Arc::new(AgentState {
            config,
            client,
            cache,
            dispatcher,
            guard,
            coordinator,
            identity,
        }),
        shutdown_tx,
    })
}

/// Builds the typed API client from the configured kubeconfig path, the
/// in-cluster environment or the local default context.
async fn build_client(config: &Config) -> Result<Client> {
    let settings = &config.settings;
    let mut kube_config = if !settings.kubeconfig.is_empty() {
        let kubeconfig = Kubeconfig::read_from(&settings.kubeconfig)
            .with_context(|| format!("Failed to read kubeconfig at '{}'", settings.kubeconfig))?;
        kube::Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
            .await
            .context("Failed to build kubeconfig")?
    } else {
        kube::Config::infer()
            .await
            .context("Failed to infer Kubernetes configuration")?
    };

    if !settings.master.is_empty() {
        kube_config.cluster_url = settings
            .master
            .parse()
            .with_context(|| format!("Invalid master URL '{}'", settings.master))?;
    }
    if settings.insecure {
        kube_config.accept_invalid_certs = true;
    }

    Client::try_from(kube_config).context("Failed to create kube client")
}
