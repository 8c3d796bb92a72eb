// src/core/watcher/mod.rs

//! The watch coordinator: informers over pods and nodes, periodic resource
//! pollers and the cluster-health prober. Runs only while this replica
//! holds the leader lease; `start` and `stop` are both idempotent.

use crate::config::Config;
use crate::core::alert::{Dispatcher, EventType};
use crate::core::errors::AgentError;
use crate::core::memory::{MemoryGuard, safe_spawn};
use crate::core::metrics;
use crate::core::rules::{self, PodUsage, logs as log_rules};
use crate::core::workload::resolve_workload;
use futures::StreamExt;
use k8s_openapi::api::core::v1::{Node, Pod};
use kube::api::{ListParams, LogParams};
use kube::runtime::reflector::Store;
use kube::runtime::watcher::Event;
use kube::runtime::{WatchStreamExt, reflector, watcher};
use kube::{Api, Client};
use std::sync::Arc;
use tokio::sync::{Mutex, broadcast};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub mod cluster;
pub mod metrics_api;

use cluster::ClusterProber;
use metrics_api::{NodeMetrics, PodMetrics, node_usage_index, pod_usage_index};

/// How often the informers re-run the status rules over their full store,
/// so conditions that outlive their rate windows keep re-alerting.
const RESYNC_PERIOD: std::time::Duration = std::time::Duration::from_secs(15 * 60);

struct RunningWatch {
    shutdown_tx: broadcast::Sender<()>,
    tasks: Vec<JoinHandle<()>>,
}

/// Owns the informer stores and pollers. One instance per process; the
/// leader supervisor starts it on election and stops it on lease loss.
pub struct WatchCoordinator {
    client: Client,
    config: Arc<Config>,
    dispatcher: Arc<Dispatcher>,
    guard: Arc<MemoryGuard>,
    running: Mutex<Option<RunningWatch>>,
}

impl WatchCoordinator {
    pub fn new(
        client: Client,
        config: Arc<Config>,
        dispatcher: Arc<Dispatcher>,
        guard: Arc<MemoryGuard>,
    ) -> Arc<Self> {
        Arc::new(Self {
            client,
            config,
            dispatcher,
            guard,
            running: Mutex::new(None),
        })
    }

    /// Starts informers, pollers and the cluster prober. A no-op when the
    /// coordinator is already running.
    pub async fn start(self: Arc<Self>) {
        let mut running = self.running.lock().await;
        if running.is_some() {
            debug!("Watch coordinator already running");
            return;
        }
        info!("Starting watch coordinator");

        let (shutdown_tx, _) = broadcast::channel(8);
        let mut tasks = Vec::new();

        if self.config.alarms.pods.enabled {
            let (pod_reader, pod_writer) = reflector::store::<Pod>();
            let informer = self.clone();
            let informer_reader = pod_reader.clone();
            let informer_shutdown = shutdown_tx.subscribe();
            tasks.push(safe_spawn("pod-informer", async move {
                informer
                    .run_pod_informer(pod_writer, informer_reader, informer_shutdown)
                    .await;
            }));

            if self.config.alarms.pods.resources.enabled {
                let poller = self.clone();
                let poller_shutdown = shutdown_tx.subscribe();
                tasks.push(safe_spawn("pod-poller", async move {
                    poller.run_pod_poller(pod_reader, poller_shutdown).await;
                }));
            }
        }

        if self.config.alarms.nodes.enabled {
            let (node_reader, node_writer) = reflector::store::<Node>();
            let informer = self.clone();
            let informer_reader = node_reader.clone();
            let informer_shutdown = shutdown_tx.subscribe();
            tasks.push(safe_spawn("node-informer", async move {
                informer
                    .run_node_informer(node_writer, informer_reader, informer_shutdown)
                    .await;
            }));

            if self.config.alarms.nodes.resources.enabled {
                let poller = self.clone();
                let poller_shutdown = shutdown_tx.subscribe();
                tasks.push(safe_spawn("node-poller", async move {
                    poller.run_node_poller(node_reader, poller_shutdown).await;
                }));
            }
        }

        if self.config.alarms.cluster.enabled {
            let prober = ClusterProber::new(
                self.client.clone(),
                self.config.clone(),
                self.dispatcher.clone(),
            );
            let interval = self.config.settings.check_interval;
            let mut prober_shutdown = shutdown_tx.subscribe();
            tasks.push(safe_spawn("cluster-prober", async move {
                let mut ticker = tokio::time::interval(interval);
                loop {
                    tokio::select! {
                        _ = ticker.tick() => prober.probe().await,
                        _ = prober_shutdown.recv() => {
                            info!("Cluster prober shutting down.");
                            return;
                        }
                    }
                }
            }));
        }

        *running = Some(RunningWatch { shutdown_tx, tasks });
    }

    /// Signals every worker to stop and waits for in-flight evaluations to
    /// drain. A no-op when the coordinator is not running.
    pub async fn stop(&self) {
        let mut running = self.running.lock().await;
        let Some(watch) = running.take() else {
            debug!("Watch coordinator not running");
            return;
        };
        info!("Stopping watch coordinator");
        let _ = watch.shutdown_tx.send(());
        for task in watch.tasks {
            let _ = task.await;
        }
        info!("Watch coordinator stopped");
    }

    /// Single-pass mode: list pods and nodes directly, run every rule once.
    pub async fn run_once(&self) -> Result<(), AgentError> {
        info!("Running single evaluation pass");

        ClusterProber::new(
            self.client.clone(),
            self.config.clone(),
            self.dispatcher.clone(),
        )
        .probe()
        .await;

        if self.config.alarms.pods.enabled {
            let pods = Api::<Pod>::all(self.client.clone())
                .list(&ListParams::default())
                .await?;
            let usage_index = self.fetch_pod_usage().await;
            for pod in &pods.items {
                self.evaluate_pod_status(pod).await;
                if let Some(index) = &usage_index {
                    let key = pod_store_key(pod);
                    self.evaluate_pod_resources(pod, index.get(&key)).await;
                }
            }
        }

        if self.config.alarms.nodes.enabled {
            let nodes = Api::<Node>::all(self.client.clone())
                .list(&ListParams::default())
                .await?;
            let usage_index = self.fetch_node_usage().await;
            for node in &nodes.items {
                self.evaluate_node_status(node).await;
                if let Some(index) = &usage_index {
                    let name = node.metadata.name.as_deref().unwrap_or_default();
                    self.evaluate_node_resources(node, index.get(name)).await;
                }
            }
        }

        Ok(())
    }

    // --- Informers ---

    async fn run_pod_informer(
        self: Arc<Self>,
        writer: reflector::store::Writer<Pod>,
        reader: Store<Pod>,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) {
        info!("Starting pod informer");
        let api: Api<Pod> = Api::all(self.client.clone());
        let stream = reflector(writer, watcher(api, watcher::Config::default()).default_backoff());
        let mut stream = Box::pin(stream);
        let mut resync = tokio::time::interval_at(
            tokio::time::Instant::now() + RESYNC_PERIOD,
            RESYNC_PERIOD,
        );

        loop {
            tokio::select! {
                event = stream.next() => match event {
                    Some(Ok(Event::Apply(pod))) => {
                        debug!(pod = pod.metadata.name.as_deref().unwrap_or_default(), "Update Pod");
                        self.evaluate_pod_status(&pod).await;
                    }
                    Some(Ok(Event::Delete(pod))) => {
                        debug!(pod = pod.metadata.name.as_deref().unwrap_or_default(), "Delete Pod");
                    }
                    // (Re-)list replays populate the store without alerting.
                    Some(Ok(Event::Init | Event::InitApply(_) | Event::InitDone)) => {}
                    Some(Err(e)) => {
                        warn!(error = %e, "Pod watch stream error");
                    }
                    None => break,
                },
                _ = resync.tick() => {
                    debug!("Pod informer resync");
                    for pod in reader.state() {
                        self.evaluate_pod_status(pod.as_ref()).await;
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Stopping pod informer");
                    return;
                }
            }
        }
    }

    async fn run_node_informer(
        self: Arc<Self>,
        writer: reflector::store::Writer<Node>,
        reader: Store<Node>,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) {
        info!("Starting node informer");
        let api: Api<Node> = Api::all(self.client.clone());
        let stream = reflector(writer, watcher(api, watcher::Config::default()).default_backoff());
        let mut stream = Box::pin(stream);
        let mut resync = tokio::time::interval_at(
            tokio::time::Instant::now() + RESYNC_PERIOD,
            RESYNC_PERIOD,
        );

        loop {
            tokio::select! {
                event = stream.next() => match event {
                    Some(Ok(Event::Apply(node))) => {
                        debug!(node = node.metadata.name.as_deref().unwrap_or_default(), "Update Node");
                        self.evaluate_node_status(&node).await;
                    }
                    Some(Ok(Event::Delete(_) | Event::Init | Event::InitApply(_) | Event::InitDone)) => {}
                    Some(Err(e)) => {
                        warn!(error = %e, "Node watch stream error");
                    }
                    None => break,
                },
                _ = resync.tick() => {
                    debug!("Node informer resync");
                    for node in reader.state() {
                        self.evaluate_node_status(node.as_ref()).await;
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Stopping node informer");
                    return;
                }
            }
        }
    }

    // --- Pollers ---

    async fn run_pod_poller(
        self: Arc<Self>,
        reader: Store<Pod>,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) {
        info!("Starting pod resource poller");
        let mut ticker = tokio::time::interval(self.config.settings.check_interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if self.guard.should_skip_polling() {
                        metrics::POLLS_SKIPPED_TOTAL.inc();
                        warn!(
                            pressure = self.guard.pressure_level().as_str(),
                            "Skipping pod resource poll under memory pressure"
                        );
                        continue;
                    }
                    let Some(usage_index) = self.fetch_pod_usage().await else {
                        continue;
                    };
                    debug!("Running pods resource check");
                    // The informer store is the authoritative snapshot; no
                    // re-list against the API here.
                    for pod in reader.state() {
                        let key = pod_store_key(pod.as_ref());
                        self.evaluate_pod_resources(pod.as_ref(), usage_index.get(&key)).await;
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Stopping pod resource poller");
                    return;
                }
            }
        }
    }

    async fn run_node_poller(
        self: Arc<Self>,
        reader: Store<Node>,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) {
        info!("Starting node resource poller");
        let mut ticker = tokio::time::interval(self.config.settings.check_interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if self.guard.should_skip_polling() {
                        metrics::POLLS_SKIPPED_TOTAL.inc();
                        warn!(
                            pressure = self.guard.pressure_level().as_str(),
                            "Skipping node resource poll under memory pressure"
                        );
                        continue;
                    }
                    let Some(usage_index) = self.fetch_node_usage().await else {
                        continue;
                    };
                    debug!("Running nodes resource check");
                    for node in reader.state() {
                        let name = node.metadata.name.as_deref().unwrap_or_default();
                        self.evaluate_node_resources(node.as_ref(), usage_index.get(name)).await;
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Stopping node resource poller");
                    return;
                }
            }
        }
    }

    // --- Evaluation plumbing ---

    async fn evaluate_pod_status(&self, pod: &Pod) {
        metrics::EVALUATIONS_TOTAL.with_label_values(&["pod"]).inc();

        // A first pass without workload labels decides whether anything
        // fired; the owner chain is only resolved when it did.
        if rules::pod::analyze_pod_status(pod, None, &self.config).is_empty() {
            return;
        }
        let workload = resolve_workload(&self.client, pod).await;
        let findings = rules::pod::analyze_pod_status(pod, workload.as_ref(), &self.config);

        for finding in findings {
            let mut intent = finding.intent;
            if let Some(container) = &finding.container {
                intent.logs = self.fetch_container_logs(pod, container).await;
            }
            if let Err(e) = self.dispatcher.emit(&intent).await {
                warn!(alert_key = %intent.key, error = %e, "Failed to emit pod event");
            }
        }
    }

    async fn evaluate_pod_resources(&self, pod: &Pod, usage: Option<&PodUsage>) {
        let intents = rules::pod::analyze_pod_resources(pod, usage, None, &self.config);
        if intents.is_empty() {
            return;
        }
        let needs_workload = intents.iter().any(|i| i.event_type == EventType::Alert);
        let intents = if needs_workload {
            let workload = resolve_workload(&self.client, pod).await;
            rules::pod::analyze_pod_resources(pod, usage, workload.as_ref(), &self.config)
        } else {
            intents
        };
        for intent in intents {
            if let Err(e) = self.dispatcher.emit(&intent).await {
                warn!(alert_key = %intent.key, error = %e, "Failed to emit pod resource event");
            }
        }
    }

    async fn evaluate_node_status(&self, node: &Node) {
        metrics::EVALUATIONS_TOTAL.with_label_values(&["node"]).inc();
        for intent in rules::node::analyze_node_status(node, &self.config) {
            if let Err(e) = self.dispatcher.emit(&intent).await {
                warn!(alert_key = %intent.key, error = %e, "Failed to emit node event");
            }
        }
    }

    async fn evaluate_node_resources(&self, node: &Node, usage: Option<&rules::NodeUsage>) {
        for intent in rules::node::analyze_node_resources(node, usage, &self.config) {
            if let Err(e) = self.dispatcher.emit(&intent).await {
                warn!(alert_key = %intent.key, error = %e, "Failed to emit node resource event");
            }
        }
    }

    /// Fetches the current pod usage samples. `None` means the metrics API
    /// is unavailable; resource rules are skipped for this tick and the
    /// status rules keep running.
    async fn fetch_pod_usage(
        &self,
    ) -> Option<std::collections::BTreeMap<String, PodUsage>> {
        let api: Api<PodMetrics> = Api::all(self.client.clone());
        match api.list(&ListParams::default()).await {
            Ok(list) => Some(pod_usage_index(list.items)),
            Err(e) => {
                warn!(error = %e, "Pod metrics unavailable, skipping resource rules");
                None
            }
        }
    }

    async fn fetch_node_usage(
        &self,
    ) -> Option<std::collections::BTreeMap<String, rules::NodeUsage>> {
        let api: Api<NodeMetrics> = Api::all(self.client.clone());
        match api.list(&ListParams::default()).await {
            Ok(list) => Some(node_usage_index(list.items)),
            Err(e) => {
                warn!(error = %e, "Node metrics unavailable, skipping resource rules");
                None
            }
        }
    }

    /// Pulls the tail of the offending container's log and converts it into
    /// the bounded structured attachment.
    async fn fetch_container_logs(&self, pod: &Pod, container: &str) -> Vec<crate::core::alert::LogLine> {
        let (Some(namespace), Some(name)) = (&pod.metadata.namespace, &pod.metadata.name) else {
            return Vec::new();
        };
        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let params = LogParams {
            container: Some(container.to_string()),
            tail_lines: Some(log_rules::TAIL_LINES),
            ..LogParams::default()
        };
        match api.logs(name, &params).await {
            Ok(raw) => log_rules::truncate_to_budget(log_rules::parse_log_lines(
                &raw,
                chrono::Utc::now(),
            )),
            Err(e) => {
                debug!(pod = %name, container, error = %e, "Failed to fetch container logs");
                Vec::new()
            }
        }
    }
}

/// The store/index key for a pod: `<namespace>/<name>`.
fn pod_store_key(pod: &Pod) -> String {
    format!(
        "{}/{}",
        pod.metadata.namespace.as_deref().unwrap_or_default(),
        pod.metadata.name.as_deref().unwrap_or_default(),
    )
}
