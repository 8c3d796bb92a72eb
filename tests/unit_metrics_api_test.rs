use kubalert::core::watcher::metrics_api::{
    NodeMetrics, PodMetrics, node_usage_index, pod_usage_index,
};

#[tokio::test]
async fn test_pod_metrics_deserialize_from_api_shape() {
    let raw = serde_json::json!({
        "metadata": {"name": "web-1", "namespace": "prod"},
        "timestamp": "2024-06-01T12:00:00Z",
        "window": "15s",
        "containers": [
            {"name": "app", "usage": {"cpu": "250m", "memory": "64Mi"}},
            {"name": "sidecar", "usage": {"cpu": "10m", "memory": "8Mi"}}
        ]
    });
    let metrics: PodMetrics = serde_json::from_value(raw).unwrap();
    let index = pod_usage_index(vec![metrics]);

    let usage = &index["prod/web-1"]["app"];
    assert!((usage.cpu - 0.25).abs() < f64::EPSILON);
    assert_eq!(usage.memory, 64.0 * 1024.0 * 1024.0);
    assert!(index["prod/web-1"].contains_key("sidecar"));
}

#[tokio::test]
async fn test_node_metrics_deserialize_from_api_shape() {
    let raw = serde_json::json!({
        "metadata": {"name": "worker-1"},
        "timestamp": "2024-06-01T12:00:00Z",
        "window": "15s",
        "usage": {"cpu": "1500m", "memory": "2Gi"}
    });
    let metrics: NodeMetrics = serde_json::from_value(raw).unwrap();
    let index = node_usage_index(vec![metrics]);

    let usage = &index["worker-1"];
    assert!((usage.cpu - 1.5).abs() < f64::EPSILON);
    assert_eq!(usage.memory, 2.0 * 1024.0 * 1024.0 * 1024.0);
}

#[tokio::test]
async fn test_samples_without_names_are_skipped() {
    let index = pod_usage_index(vec![PodMetrics::default()]);
    assert!(index.is_empty());
    let index = node_usage_index(vec![NodeMetrics::default()]);
    assert!(index.is_empty());
}

#[tokio::test]
async fn test_unparsable_usage_reads_zero() {
    let raw = serde_json::json!({
        "metadata": {"name": "worker-1"},
        "usage": {"cpu": "garbage", "memory": ""}
    });
    let metrics: NodeMetrics = serde_json::from_value(raw).unwrap();
    let index = node_usage_index(vec![metrics]);
    assert_eq!(index["worker-1"].cpu, 0.0);
    assert_eq!(index["worker-1"].memory, 0.0);
}
