// src/core/watcher/metrics_api.rs

//! Typed access to the `metrics.k8s.io/v1beta1` API.
//!
//! The metrics API is not part of `k8s-openapi`, so the two resource types
//! are declared here with manual `kube::Resource` implementations, which is
//! all `Api::list` needs.

use crate::core::rules::{ContainerUsage, NodeUsage, PodUsage, quantity::parse_quantity};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::{ClusterResourceScope, NamespaceResourceScope};
use kube::Resource;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::BTreeMap;

/// Usage sample for one pod, as served by the metrics server.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PodMetrics {
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub window: Option<String>,
    #[serde(default)]
    pub containers: Vec<ContainerMetrics>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct ContainerMetrics {
    pub name: String,
    #[serde(default)]
    pub usage: BTreeMap<String, Quantity>,
}

/// Usage sample for one node.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeMetrics {
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub window: Option<String>,
    #[serde(default)]
    pub usage: BTreeMap<String, Quantity>,
}

impl Resource for PodMetrics {
    type DynamicType = ();
    type Scope = NamespaceResourceScope;

    fn kind(_: &()) -> Cow<'_, str> {
        "PodMetrics".into()
    }
    fn group(_: &()) -> Cow<'_, str> {
        "metrics.k8s.io".into()
    }
    fn version(_: &()) -> Cow<'_, str> {
        "v1beta1".into()
    }
    fn plural(_: &()) -> Cow<'_, str> {
        "pods".into()
    }
    fn meta(&self) -> &ObjectMeta {
        &self.metadata
    }
    fn meta_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }
}

impl Resource for NodeMetrics {
    type DynamicType = ();
    type Scope = ClusterResourceScope;

    fn kind(_: &()) -> Cow<'_, str> {
        "NodeMetrics".into()
    }
    fn group(_: &()) -> Cow<'_, str> {
        "metrics.k8s.io".into()
    }
    fn version(_: &()) -> Cow<'_, str> {
        "v1beta1".into()
    }
    fn plural(_: &()) -> Cow<'_, str> {
        "nodes".into()
    }
    fn meta(&self) -> &ObjectMeta {
        &self.metadata
    }
    fn meta_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }
}

/// Indexes pod samples by `<namespace>/<name>` with usage in base units.
pub fn pod_usage_index(samples: Vec<PodMetrics>) -> BTreeMap<String, PodUsage> {
    let mut index = BTreeMap::new();
    for sample in samples {
        let (Some(namespace), Some(name)) =
            (&sample.metadata.namespace, &sample.metadata.name)
        else {
            continue;
        };
        let mut usage = PodUsage::new();
        for container in sample.containers {
            usage.insert(
                container.name,
                ContainerUsage {
                    cpu: container
                        .usage
                        .get("cpu")
                        .and_then(parse_quantity)
                        .unwrap_or(0.0),
                    memory: container
                        .usage
                        .get("memory")
                        .and_then(parse_quantity)
                        .unwrap_or(0.0),
                },
            );
        }
        index.insert(format!("{namespace}/{name}"), usage);
    }
    index
}

/// Indexes node samples by node name with usage in base units.
pub fn node_usage_index(samples: Vec<NodeMetrics>) -> BTreeMap<String, NodeUsage> {
    let mut index = BTreeMap::new();
    for sample in samples {
        let Some(name) = &sample.metadata.name else {
            continue;
        };
        index.insert(
            name.clone(),
            NodeUsage {
                cpu: sample
                    .usage
                    .get("cpu")
                    .and_then(parse_quantity)
                    .unwrap_or(0.0),
                memory: sample
                    .usage
                    .get("memory")
                    .and_then(parse_quantity)
                    .unwrap_or(0.0),
            },
        );
    }
    index
}
