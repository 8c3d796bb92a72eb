use k8s_openapi::api::core::v1::{Container, ResourceRequirements};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use kubalert::server::commander::workloads::{
    ResourcePatch, container_resource_ops, replicas_op, selector_string,
};
use kubalert::server::commander::{clamp_tail_lines, parse_since_params, parse_wait_timeout};
use std::collections::BTreeMap;
use std::time::Duration;

fn container(limits: bool, requests: bool) -> Container {
    let mut resources = ResourceRequirements::default();
    if limits {
        let mut map = BTreeMap::new();
        map.insert("cpu".to_string(), Quantity("1".to_string()));
        resources.limits = Some(map);
    }
    if requests {
        let mut map = BTreeMap::new();
        map.insert("cpu".to_string(), Quantity("500m".to_string()));
        resources.requests = Some(map);
    }
    Container {
        name: "app".to_string(),
        resources: (limits || requests).then_some(resources),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_tail_lines_inside_range_pass_through() {
    assert_eq!(clamp_tail_lines(Some("10")).unwrap(), 10);
    assert_eq!(clamp_tail_lines(Some("500")).unwrap(), 500);
    assert_eq!(clamp_tail_lines(Some("42")).unwrap(), 42);
}

#[tokio::test]
async fn test_tail_lines_outside_range_default_to_100() {
    assert_eq!(clamp_tail_lines(Some("5")).unwrap(), 100);
    assert_eq!(clamp_tail_lines(Some("1000")).unwrap(), 100);
    assert_eq!(clamp_tail_lines(None).unwrap(), 100);
}

#[tokio::test]
async fn test_malformed_tail_lines_are_rejected() {
    assert!(clamp_tail_lines(Some("abc")).is_err());
}

#[tokio::test]
async fn test_since_params_pass_through_individually() {
    let (seconds, time) = parse_since_params(Some("300"), None).unwrap();
    assert_eq!(seconds, Some(300));
    assert_eq!(time, None);

    let (seconds, time) = parse_since_params(None, Some("2024-06-01T12:00:00Z")).unwrap();
    assert_eq!(seconds, None);
    assert_eq!(time.unwrap().to_rfc3339(), "2024-06-01T12:00:00+00:00");

    // Absent or empty values mean "not supplied".
    assert_eq!(parse_since_params(None, None).unwrap(), (None, None));
    assert_eq!(parse_since_params(Some(""), Some("")).unwrap(), (None, None));
}

#[tokio::test]
async fn test_since_params_reject_both_supplied() {
    assert!(parse_since_params(Some("300"), Some("2024-06-01T12:00:00Z")).is_err());
}

#[tokio::test]
async fn test_malformed_since_params_are_rejected() {
    assert!(parse_since_params(Some("soon"), None).is_err());
    assert!(parse_since_params(None, Some("yesterday")).is_err());
    assert!(parse_since_params(None, Some("2024-06-01 12:00:00")).is_err());
}

#[tokio::test]
async fn test_wait_timeout_bounds() {
    assert_eq!(parse_wait_timeout(None).unwrap(), Duration::from_secs(4));
    assert_eq!(
        parse_wait_timeout(Some("10")).unwrap(),
        Duration::from_secs(10)
    );
    assert!(parse_wait_timeout(Some("11")).is_err());
    assert!(parse_wait_timeout(Some("-1")).is_err());
}

#[tokio::test]
async fn test_bare_container_gets_single_add_op() {
    let patch = ResourcePatch {
        cpu_limit: Some("500m".to_string()),
        memory_request: Some("64Mi".to_string()),
        ..ResourcePatch::default()
    };
    let ops = container_resource_ops(0, &container(false, false), &patch);
    assert_eq!(ops.len(), 1);
    assert_eq!(ops[0]["op"], "add");
    assert_eq!(ops[0]["path"], "/spec/template/spec/containers/0/resources");
    assert_eq!(ops[0]["value"]["limits"]["cpu"], "500m");
    assert_eq!(ops[0]["value"]["requests"]["memory"], "64Mi");
}

#[tokio::test]
async fn test_existing_limits_are_replaced_per_field() {
    let patch = ResourcePatch {
        cpu_limit: Some("2".to_string()),
        ..ResourcePatch::default()
    };
    let ops = container_resource_ops(1, &container(true, true), &patch);
    assert_eq!(ops.len(), 1);
    assert_eq!(ops[0]["op"], "replace");
    assert_eq!(
        ops[0]["path"],
        "/spec/template/spec/containers/1/resources/limits/cpu"
    );
    assert_eq!(ops[0]["value"], "2");
}

#[tokio::test]
async fn test_missing_limits_block_is_added_whole() {
    let patch = ResourcePatch {
        memory_limit: Some("128Mi".to_string()),
        ..ResourcePatch::default()
    };
    let ops = container_resource_ops(0, &container(false, true), &patch);
    assert_eq!(ops.len(), 1);
    assert_eq!(ops[0]["op"], "add");
    assert_eq!(
        ops[0]["path"],
        "/spec/template/spec/containers/0/resources/limits"
    );
    assert_eq!(ops[0]["value"]["memory"], "128Mi");
}

#[tokio::test]
async fn test_empty_patch_produces_no_ops() {
    let ops = container_resource_ops(0, &container(false, false), &ResourcePatch::default());
    assert!(ops.is_empty());
}

#[tokio::test]
async fn test_replicas_op_chooses_add_or_replace() {
    assert_eq!(replicas_op(false, 3)["op"], "add");
    assert_eq!(replicas_op(true, 3)["op"], "replace");
    assert_eq!(replicas_op(true, 3)["path"], "/spec/replicas");
    assert_eq!(replicas_op(true, 3)["value"], 3);
}

#[tokio::test]
async fn test_selector_string_joins_labels() {
    let mut labels = BTreeMap::new();
    labels.insert("app".to_string(), "web".to_string());
    labels.insert("tier".to_string(), "front".to_string());
    assert_eq!(selector_string(Some(&labels)).unwrap(), "app=web,tier=front");
    assert!(selector_string(None).is_err());
}
