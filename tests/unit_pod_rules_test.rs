use k8s_openapi::api::core::v1::{
    Container, ContainerState, ContainerStateTerminated, ContainerStateWaiting, ContainerStatus,
    Pod, PodSpec, PodStatus, ResourceRequirements,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use kubalert::config::Config;
use kubalert::core::alert::{EventType, Priority};
use kubalert::core::rules::pod::{analyze_pod_resources, analyze_pod_status};
use kubalert::core::rules::{ContainerUsage, PodUsage, WorkloadInfo, WorkloadKind};
use std::collections::BTreeMap;

fn config() -> Config {
    let mut config = Config::default();
    config.settings.api_key = "test".to_string();
    config
}

fn pod(namespace: &str, name: &str) -> Pod {
    Pod {
        metadata: k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            resource_version: Some("41".to_string()),
            ..Default::default()
        },
        spec: Some(PodSpec {
            node_name: Some("worker-1".to_string()),
            ..Default::default()
        }),
        status: Some(PodStatus {
            phase: Some("Running".to_string()),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn container_status(name: &str, state: Option<ContainerState>, restarts: i32) -> ContainerStatus {
    ContainerStatus {
        name: name.to_string(),
        state,
        restart_count: restarts,
        ..Default::default()
    }
}

fn waiting(reason: &str) -> Option<ContainerState> {
    Some(ContainerState {
        waiting: Some(ContainerStateWaiting {
            reason: Some(reason.to_string()),
            message: Some("back-off 5m0s restarting failed container".to_string()),
        }),
        ..Default::default()
    })
}

fn terminated(reason: &str) -> Option<ContainerState> {
    Some(ContainerState {
        terminated: Some(ContainerStateTerminated {
            reason: Some(reason.to_string()),
            exit_code: 137,
            ..Default::default()
        }),
        ..Default::default()
    })
}

fn with_statuses(mut pod: Pod, statuses: Vec<ContainerStatus>) -> Pod {
    pod.status.as_mut().unwrap().container_statuses = Some(statuses);
    pod
}

fn limited_container(name: &str, cpu_limit: Option<&str>, memory_limit: Option<&str>) -> Container {
    let mut limits = BTreeMap::new();
    if let Some(cpu) = cpu_limit {
        limits.insert("cpu".to_string(), Quantity(cpu.to_string()));
    }
    if let Some(memory) = memory_limit {
        limits.insert("memory".to_string(), Quantity(memory.to_string()));
    }
    Container {
        name: name.to_string(),
        resources: Some(ResourceRequirements {
            limits: (!limits.is_empty()).then_some(limits),
            ..Default::default()
        }),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_crashloopbackoff_produces_low_priority_alert() {
    let pod = with_statuses(
        pod("ns", "web"),
        vec![container_status("app", waiting("CrashLoopBackOff"), 0)],
    );
    let findings = analyze_pod_status(&pod, None, &config());
    assert_eq!(findings.len(), 1);
    let intent = &findings[0].intent;
    assert_eq!(intent.key, "ns/web");
    assert_eq!(intent.event_type, EventType::Alert);
    assert_eq!(intent.priority, Priority::Low);
    assert!(intent.summary.contains("CrashLoopBackOff"));
    assert_eq!(findings[0].container.as_deref(), Some("app"));
    assert_eq!(intent.labels.get("namespace").unwrap(), "ns");
    assert_eq!(intent.labels.get("node").unwrap(), "worker-1");
}

#[tokio::test]
async fn test_unlisted_waiting_reason_is_ignored() {
    let pod = with_statuses(
        pod("ns", "web"),
        vec![container_status("app", waiting("ContainerCreating"), 0)],
    );
    assert!(analyze_pod_status(&pod, None, &config()).is_empty());
}

#[tokio::test]
async fn test_oomkilled_produces_high_priority_alert() {
    let pod = with_statuses(
        pod("prod", "worker-abc"),
        vec![container_status("app", terminated("OOMKilled"), 2)],
    );
    let findings = analyze_pod_status(&pod, None, &config());
    assert_eq!(findings.len(), 1);
    assert_eq!(findings[0].intent.priority, Priority::High);
    assert!(findings[0].intent.summary.contains("OOMKilled"));
    assert!(findings[0].intent.details.contains("Exit code: 137"));
}

#[tokio::test]
async fn test_excluded_terminate_reason_is_skipped() {
    let mut config = config();
    config.alarms.pods.terminate.excluded_reasons = vec!["OOMKilled".to_string()];
    let pod = with_statuses(
        pod("ns", "web"),
        vec![container_status("app", terminated("OOMKilled"), 0)],
    );
    assert!(analyze_pod_status(&pod, None, &config).is_empty());
}

#[tokio::test]
async fn test_restart_threshold_is_inclusive() {
    let at_threshold = with_statuses(
        pod("ns", "web"),
        vec![container_status("app", None, 10)],
    );
    let findings = analyze_pod_status(&at_threshold, None, &config());
    assert_eq!(findings.len(), 1);
    assert_eq!(findings[0].intent.key, "ns/web:restarts");

    let below = with_statuses(pod("ns", "web"), vec![container_status("app", None, 9)]);
    assert!(analyze_pod_status(&below, None, &config()).is_empty());
}

#[tokio::test]
async fn test_first_matching_rule_wins_per_container() {
    // Terminated and a high restart count: only the terminate rule fires.
    let pod = with_statuses(
        pod("ns", "web"),
        vec![container_status("app", terminated("Error"), 50)],
    );
    let findings = analyze_pod_status(&pod, None, &config());
    assert_eq!(findings.len(), 1);
    assert!(findings[0].intent.summary.contains("terminated"));
}

#[tokio::test]
async fn test_each_container_is_evaluated() {
    let pod = with_statuses(
        pod("ns", "web"),
        vec![
            container_status("app", waiting("CrashLoopBackOff"), 0),
            container_status("sidecar", waiting("ImagePullBackOff"), 0),
        ],
    );
    let findings = analyze_pod_status(&pod, None, &config());
    assert_eq!(findings.len(), 2);
    assert_eq!(findings[1].container.as_deref(), Some("sidecar"));
}

#[tokio::test]
async fn test_disabled_pod_alarms_produce_nothing() {
    let mut config = config();
    config.alarms.pods.enabled = false;
    let pod = with_statuses(
        pod("ns", "web"),
        vec![container_status("app", waiting("CrashLoopBackOff"), 0)],
    );
    assert!(analyze_pod_status(&pod, None, &config).is_empty());
}

#[tokio::test]
async fn test_workload_labels_are_attached_when_resolved() {
    let pod = with_statuses(
        pod("ns", "web"),
        vec![container_status("app", waiting("CrashLoopBackOff"), 0)],
    );
    let workload = WorkloadInfo {
        kind: WorkloadKind::Deployment,
        name: "web".to_string(),
    };
    let findings = analyze_pod_status(&pod, Some(&workload), &config());
    let labels = &findings[0].intent.labels;
    assert_eq!(labels.get("workload_kind").unwrap(), "Deployment");
    assert_eq!(labels.get("workload_name").unwrap(), "web");
}

fn usage(container: &str, cpu: f64, memory: f64) -> PodUsage {
    let mut map = PodUsage::new();
    map.insert(container.to_string(), ContainerUsage { cpu, memory });
    map
}

#[tokio::test]
async fn test_cpu_threshold_is_inclusive() {
    let mut pod = pod("ns", "web");
    pod.spec.as_mut().unwrap().containers = vec![limited_container("app", Some("1"), None)];

    // Exactly 90% of a 1-core limit: the comparison is >=.
    let at = usage("app", 0.9, 0.0);
    let intents = analyze_pod_resources(&pod, Some(&at), None, &config());
    assert_eq!(intents.len(), 1);
    assert_eq!(intents[0].event_type, EventType::Alert);
    assert!(intents[0].summary.contains("CPU"));

    // Just below: no alert, and the pod reports recovered instead.
    let below = usage("app", 0.899, 0.0);
    let intents = analyze_pod_resources(&pod, Some(&below), None, &config());
    assert_eq!(intents.len(), 1);
    assert_eq!(intents[0].event_type, EventType::Resolve);
}

#[tokio::test]
async fn test_memory_threshold_against_limit() {
    let mut pod = pod("ns", "web");
    pod.spec.as_mut().unwrap().containers =
        vec![limited_container("app", None, Some("100Mi"))];

    let over = usage("app", 0.0, 95.0 * 1024.0 * 1024.0);
    let intents = analyze_pod_resources(&pod, Some(&over), None, &config());
    assert_eq!(intents.len(), 1);
    assert!(intents[0].summary.contains("memory"));
}

#[tokio::test]
async fn test_missing_limit_skips_rule_and_recovers() {
    let mut pod = pod("ns", "web");
    pod.spec.as_mut().unwrap().containers = vec![limited_container("app", None, None)];

    let heavy = usage("app", 4.0, 8.0 * 1024.0 * 1024.0 * 1024.0);
    let intents = analyze_pod_resources(&pod, Some(&heavy), None, &config());
    assert_eq!(intents.len(), 1);
    assert_eq!(intents[0].event_type, EventType::Resolve);
    assert_eq!(intents[0].key, "ns/web");
}

#[tokio::test]
async fn test_absent_usage_skips_the_whole_pass() {
    let mut pod = pod("ns", "web");
    pod.spec.as_mut().unwrap().containers = vec![limited_container("app", Some("1"), None)];
    assert!(analyze_pod_resources(&pod, None, None, &config()).is_empty());
}

#[tokio::test]
async fn test_non_running_pod_does_not_claim_recovery() {
    let mut pod = pod("ns", "web");
    pod.spec.as_mut().unwrap().containers = vec![limited_container("app", Some("1"), None)];
    pod.status.as_mut().unwrap().phase = Some("Pending".to_string());

    let low = usage("app", 0.1, 0.0);
    assert!(analyze_pod_resources(&pod, Some(&low), None, &config()).is_empty());
}
