// src/core/rules/mod.rs

//! Pure evaluation of pod/node state into alert intents.
//!
//! Every function here is a stateless mapping from a resource snapshot (as
//! delivered by the informer) plus the running configuration to zero or more
//! intents. Anything that needs the API server (log tails, owner-reference
//! resolution, usage metrics) is fetched by the watch coordinator and passed
//! in, so the rules stay deterministic and unit-testable.

use std::collections::BTreeMap;

pub mod links;
pub mod logs;
pub mod node;
pub mod pod;
pub mod quantity;

/// Observed usage for one container, in base units (cores / bytes).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ContainerUsage {
    pub cpu: f64,
    pub memory: f64,
}

/// Per-container usage for one pod, keyed by container name.
pub type PodUsage = BTreeMap<String, ContainerUsage>;

/// Observed usage for one node, in base units (cores / bytes).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct NodeUsage {
    pub cpu: f64,
    pub memory: f64,
}

/// The workload owning a pod, resolved by climbing owner references.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkloadInfo {
    pub kind: WorkloadKind,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkloadKind {
    Deployment,
    StatefulSet,
    DaemonSet,
}

impl WorkloadKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkloadKind::Deployment => "Deployment",
            WorkloadKind::StatefulSet => "StatefulSet",
            WorkloadKind::DaemonSet => "DaemonSet",
        }
    }
}

/// The dedup key for a pod: `<namespace>/<podName>`.
pub fn pod_key(namespace: &str, name: &str) -> String {
    format!("{namespace}/{name}")
}

/// The dedup key for a node: `<nodeName>`.
pub fn node_key(name: &str) -> String {
    name.to_string()
}
