// src/core/watcher/cluster.rs

//! Cluster-level health probes: API reachability, node listing and the
//! control plane's own health endpoint. Each sub-check alerts and resolves
//! under its own key.

use crate::config::Config;
use crate::core::alert::{AlertIntent, Dispatcher};
use crate::core::errors::AgentError;
use crate::core::metrics;
use k8s_openapi::api::core::v1::Node;
use kube::api::ListParams;
use kube::{Api, Client};
use std::sync::Arc;
use tracing::{debug, warn};

pub struct ClusterProber {
    client: Client,
    config: Arc<Config>,
    dispatcher: Arc<Dispatcher>,
}

impl ClusterProber {
    pub fn new(client: Client, config: Arc<Config>, dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            client,
            config,
            dispatcher,
        }
    }

    /// Runs one probe pass. A failing sub-check alerts and short-circuits
    /// the later ones, mirroring how little can be said about a cluster
    /// whose API server is already unreachable.
    pub async fn probe(&self) {
        if !self.config.alarms.cluster.enabled {
            return;
        }
        metrics::EVALUATIONS_TOTAL.with_label_values(&["cluster"]).inc();

        let cluster_key = self.config.cluster_key();
        let priority = self.config.alarms.cluster.priority;

        // Connection check: can the API server answer at all?
        let init_key = format!("{cluster_key}-init");
        match self.client.apiserver_version().await {
            Ok(_) => {
                self.emit(AlertIntent::resolve(
                    &init_key,
                    format!("Cluster connection is established: {cluster_key}"),
                ))
                .await;
            }
            Err(e) => {
                let mut intent = AlertIntent::alert(
                    &init_key,
                    format!("Cluster connection is not established: {cluster_key}"),
                    priority,
                );
                intent.details = format!("{}\n\nError:\n{e}", self.config_details());
                self.emit(intent).await;
                return;
            }
        }

        // Client check: a plain list against a core resource.
        let client_key = format!("{cluster_key}-client");
        let nodes: Api<Node> = Api::all(self.client.clone());
        match nodes.list(&ListParams::default()).await {
            Ok(_) => {
                self.emit(AlertIntent::resolve(
                    &client_key,
                    format!("Cluster client is ok: {cluster_key}"),
                ))
                .await;
            }
            Err(e) => {
                let mut intent = AlertIntent::alert(
                    &client_key,
                    format!("Failed to get nodes from apiserver: {cluster_key}"),
                    priority,
                );
                intent.details = format!("{}\n\nError:\n{e}", self.config_details());
                self.emit(intent).await;
                return;
            }
        }

        // Health check: the control plane's own verdict.
        let health_key = format!("{cluster_key}-health");
        match self.healthz().await {
            Ok(body) if body == "ok" => {
                self.emit(AlertIntent::resolve(
                    &health_key,
                    format!("Cluster is healthy: {cluster_key}"),
                ))
                .await;
            }
            Ok(body) => {
                let mut intent = AlertIntent::alert(
                    &health_key,
                    format!("Cluster is not healthy: {cluster_key}"),
                    priority,
                );
                intent.details = format!("{}\n\n/healthz response:\n{body}", self.config_details());
                self.emit(intent).await;
            }
            Err(e) => {
                debug!(error = %e, "healthz probe failed");
            }
        }
    }

    async fn healthz(&self) -> Result<String, AgentError> {
        let request = http::Request::get("/healthz").body(Vec::new())?;
        Ok(self.client.request_text(request).await?)
    }

    async fn emit(&self, intent: AlertIntent) {
        if let Err(e) = self.dispatcher.emit(&intent).await {
            warn!(alert_key = %intent.key, error = %e, "Failed to emit cluster event");
        }
    }

    fn config_details(&self) -> String {
        let settings = &self.config.settings;
        format!(
            "Master: {}\nKubeConfig: {}\nElectionID: {}\nNamespace: {}\nInsecure: {}",
            settings.master,
            settings.kubeconfig,
            settings.election_id,
            settings.namespace,
            settings.insecure,
        )
    }
}
