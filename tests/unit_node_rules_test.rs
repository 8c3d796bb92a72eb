use k8s_openapi::api::core::v1::{Node, NodeStatus, NodeSystemInfo};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use kubalert::config::Config;
use kubalert::core::alert::EventType;
use kubalert::core::rules::NodeUsage;
use kubalert::core::rules::node::{analyze_node_resources, analyze_node_status};
use std::collections::BTreeMap;

fn config() -> Config {
    let mut config = Config::default();
    config.settings.api_key = "test".to_string();
    config
}

fn node(name: &str, cpu_capacity: &str, memory_capacity: &str) -> Node {
    let mut capacity = BTreeMap::new();
    capacity.insert("cpu".to_string(), Quantity(cpu_capacity.to_string()));
    capacity.insert("memory".to_string(), Quantity(memory_capacity.to_string()));
    Node {
        metadata: k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta {
            name: Some(name.to_string()),
            ..Default::default()
        },
        status: Some(NodeStatus {
            capacity: Some(capacity),
            node_info: Some(NodeSystemInfo {
                architecture: "amd64".to_string(),
                os_image: "Ubuntu 22.04".to_string(),
                operating_system: "linux".to_string(),
                kernel_version: "6.1.0".to_string(),
                container_runtime_version: "containerd://1.7".to_string(),
                kubelet_version: "v1.29.1".to_string(),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_terminated_phase_alerts_with_node_details() {
    let mut node = node("worker-2", "4", "16Gi");
    node.status.as_mut().unwrap().phase = Some("Terminated".to_string());

    let intents = analyze_node_status(&node, &config());
    assert_eq!(intents.len(), 1);
    assert_eq!(intents[0].key, "worker-2");
    assert_eq!(intents[0].event_type, EventType::Alert);
    assert!(intents[0].details.contains("Kubelet version: v1.29.1"));
}

#[tokio::test]
async fn test_running_phase_produces_nothing() {
    let mut node = node("worker-2", "4", "16Gi");
    node.status.as_mut().unwrap().phase = Some("Running".to_string());
    assert!(analyze_node_status(&node, &config()).is_empty());
}

#[tokio::test]
async fn test_cpu_capacity_threshold_is_inclusive() {
    let node = node("worker-2", "4", "16Gi");

    // 3.6 of 4 cores is exactly 90%.
    let at = NodeUsage { cpu: 3.6, memory: 0.0 };
    let intents = analyze_node_resources(&node, Some(&at), &config());
    assert_eq!(intents.len(), 1);
    assert_eq!(intents[0].event_type, EventType::Alert);
    assert!(intents[0].summary.contains("CPU"));
    assert_eq!(intents[0].key, "worker-2");
}

#[tokio::test]
async fn test_memory_over_capacity_alerts() {
    let node = node("worker-2", "4", "16Gi");
    let over = NodeUsage {
        cpu: 0.1,
        memory: 15.0 * 1024.0 * 1024.0 * 1024.0,
    };
    let intents = analyze_node_resources(&node, Some(&over), &config());
    assert_eq!(intents.len(), 1);
    assert!(intents[0].summary.contains("memory"));
}

#[tokio::test]
async fn test_healthy_node_resolves() {
    let node = node("worker-2", "4", "16Gi");
    let low = NodeUsage { cpu: 0.5, memory: 1024.0 };
    let intents = analyze_node_resources(&node, Some(&low), &config());
    assert_eq!(intents.len(), 1);
    assert_eq!(intents[0].event_type, EventType::Resolve);
    assert!(intents[0].summary.contains("healthy"));
}

#[tokio::test]
async fn test_absent_usage_skips_the_pass() {
    let node = node("worker-2", "4", "16Gi");
    assert!(analyze_node_resources(&node, None, &config()).is_empty());
}

#[tokio::test]
async fn test_disabled_node_alarms_produce_nothing() {
    let mut config = config();
    config.alarms.nodes.enabled = false;
    let mut node = node("worker-2", "4", "16Gi");
    node.status.as_mut().unwrap().phase = Some("Terminated".to_string());
    assert!(analyze_node_status(&node, &config).is_empty());
    let usage = NodeUsage { cpu: 4.0, memory: 0.0 };
    assert!(analyze_node_resources(&node, Some(&usage), &config).is_empty());
}
