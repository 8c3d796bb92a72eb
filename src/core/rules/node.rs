// src/core/rules/node.rs

//! Node evaluation rules: terminated phase and capacity-based resource usage.

use super::links::{LinkValues, render_links};
use super::quantity::parse_quantity;
use super::{NodeUsage, node_key};
use crate::config::Config;
use crate::core::alert::AlertIntent;
use k8s_openapi::api::core::v1::Node;
use serde_json::json;
use std::collections::BTreeMap;

/// Evaluates the node phase rule.
pub fn analyze_node_status(node: &Node, config: &Config) -> Vec<AlertIntent> {
    let alarms = &config.alarms.nodes;
    if !alarms.enabled || !alarms.terminate.enabled {
        return Vec::new();
    }

    let phase = node
        .status
        .as_ref()
        .and_then(|s| s.phase.as_deref())
        .unwrap_or_default();
    if phase != "Terminated" {
        return Vec::new();
    }

    let name = node.metadata.name.as_deref().unwrap_or_default();
    let key = node_key(name);
    let mut intent = AlertIntent::alert(
        &key,
        format!("Node {name} terminated"),
        alarms.terminate.priority,
    );
    intent.details = node_details(node);
    intent.labels = build_node_labels(node);
    intent.links = render_links(&config.links.nodes, &node_link_values(node));
    vec![intent]
}

/// Evaluates node CPU/memory usage against capacity. A `recovered` resolve
/// is produced when both rules pass; with no usage data the pass is skipped.
pub fn analyze_node_resources(
    node: &Node,
    usage: Option<&NodeUsage>,
    config: &Config,
) -> Vec<AlertIntent> {
    let alarms = &config.alarms.nodes;
    if !alarms.enabled || !alarms.resources.enabled {
        return Vec::new();
    }
    let Some(usage) = usage else {
        return Vec::new();
    };

    let name = node.metadata.name.as_deref().unwrap_or_default();
    let key = node_key(name);
    let capacity = node.status.as_ref().and_then(|s| s.capacity.as_ref());
    let labels = build_node_labels(node);
    let links = render_links(&config.links.nodes, &node_link_values(node));

    let mut intents = Vec::new();

    let cpu_capacity = capacity
        .and_then(|c| c.get("cpu"))
        .and_then(parse_quantity)
        .unwrap_or(0.0);
    if alarms.resources.cpu.enabled && usage.cpu > 0.0 && cpu_capacity > 0.0 {
        let percentage = usage.cpu / cpu_capacity * 100.0;
        if percentage >= alarms.resources.cpu.threshold as f64 {
            let mut intent = AlertIntent::alert(
                &key,
                format!("Node {name} CPU usage reached {percentage:.0}% of capacity"),
                alarms.resources.cpu.priority,
            );
            intent.details = format!(
                "{}\nUsage: {:.3} cores\nCapacity: {:.3} cores",
                node_details(node),
                usage.cpu,
                cpu_capacity,
            );
            intent.labels = labels.clone();
            intent.links = links.clone();
            intent.custom_details = resource_details(usage.cpu, cpu_capacity, percentage);
            intents.push(intent);
        }
    }

    let memory_capacity = capacity
        .and_then(|c| c.get("memory"))
        .and_then(parse_quantity)
        .unwrap_or(0.0);
    if alarms.resources.memory.enabled && usage.memory > 0.0 && memory_capacity > 0.0 {
        let percentage = usage.memory / memory_capacity * 100.0;
        if percentage >= alarms.resources.memory.threshold as f64 {
            let mut intent = AlertIntent::alert(
                &key,
                format!("Node {name} memory usage reached {percentage:.0}% of capacity"),
                alarms.resources.memory.priority,
            );
            intent.details = format!(
                "{}\nUsage: {:.0} bytes\nCapacity: {:.0} bytes",
                node_details(node),
                usage.memory,
                memory_capacity,
            );
            intent.labels = labels.clone();
            intent.links = links.clone();
            intent.custom_details = resource_details(usage.memory, memory_capacity, percentage);
            intents.push(intent);
        }
    }

    if intents.is_empty() {
        let mut resolve = AlertIntent::resolve(&key, format!("Node {name} is healthy"));
        resolve.labels = labels;
        intents.push(resolve);
    }

    intents
}

/// The multi-line node description used as event details.
fn node_details(node: &Node) -> String {
    let name = node.metadata.name.as_deref().unwrap_or_default();
    let info = node.status.as_ref().and_then(|s| s.node_info.as_ref());
    match info {
        Some(info) => format!(
            "Name: {name}\nArchitecture: {}\nOS image: {}\nOperating system: {}\nKernel version: {}\nContainer runtime version: {}\nKubelet version: {}",
            info.architecture,
            info.os_image,
            info.operating_system,
            info.kernel_version,
            info.container_runtime_version,
            info.kubelet_version,
        ),
        None => format!("Name: {name}"),
    }
}

fn node_link_values(node: &Node) -> LinkValues<'_> {
    LinkValues {
        pod_name: "",
        pod_namespace: "",
        node_name: node.metadata.name.as_deref().unwrap_or_default(),
    }
}

fn build_node_labels(node: &Node) -> BTreeMap<String, String> {
    let mut labels = BTreeMap::new();
    if let Some(name) = &node.metadata.name {
        labels.insert("node".to_string(), name.clone());
    }
    if let Some(version) = &node.metadata.resource_version {
        labels.insert("resource_version".to_string(), version.clone());
    }
    labels
}

fn resource_details(
    usage: f64,
    capacity: f64,
    percentage: f64,
) -> serde_json::Map<String, serde_json::Value> {
    let mut details = serde_json::Map::new();
    details.insert("usage".to_string(), json!(usage));
    details.insert("capacity".to_string(), json!(capacity));
    details.insert("percentage".to_string(), json!(percentage));
    details
}
