// src/core/rules/pod.rs

//! Pod evaluation rules: container status, restart counts and resource usage.

use super::links::{LinkValues, render_links};
use super::quantity::parse_quantity;
use super::{PodUsage, WorkloadInfo, pod_key};
use crate::config::Config;
use crate::core::alert::AlertIntent;
use k8s_openapi::api::core::v1::{ContainerStatus, Pod};
use serde_json::json;
use std::collections::BTreeMap;

/// Container termination reasons that produce an alert.
pub const TERMINATED_REASONS: &[&str] = &[
    "Terminated",
    "OOMKilled",
    "Error",
    "ContainerCannotRun",
    "DeadlineExceeded",
    "Evicted",
];

/// Container waiting reasons that produce an alert.
pub const WAITING_REASONS: &[&str] = &[
    "CrashLoopBackOff",
    "ErrImagePull",
    "ImagePullBackOff",
    "CreateContainerConfigError",
    "InvalidImageName",
    "CreateContainerError",
];

/// One alert intent plus the container it concerns, so the coordinator can
/// fetch that container's log tail before dispatching.
#[derive(Debug, Clone)]
pub struct PodFinding {
    pub intent: AlertIntent,
    pub container: Option<String>,
}

/// Evaluates the container-status rules for one pod. Per container, the
/// first matching terminate/waiting/restart rule wins; evaluation then
/// continues with the remaining containers.
pub fn analyze_pod_status(
    pod: &Pod,
    workload: Option<&WorkloadInfo>,
    config: &Config,
) -> Vec<PodFinding> {
    let alarms = &config.alarms.pods;
    if !alarms.enabled {
        return Vec::new();
    }

    let namespace = pod.metadata.namespace.as_deref().unwrap_or_default();
    let name = pod.metadata.name.as_deref().unwrap_or_default();
    let key = pod_key(namespace, name);
    let labels = build_pod_labels(pod, workload);
    let links = render_links(&config.links.pods, &pod_link_values(pod));

    let mut findings = Vec::new();
    for status in container_statuses(pod) {
        let container = status.name.clone();

        if let Some(terminated) = status.state.as_ref().and_then(|s| s.terminated.as_ref()) {
            let reason = terminated.reason.as_deref().unwrap_or_default();
            if alarms.terminate.enabled
                && TERMINATED_REASONS.contains(&reason)
                && !alarms.terminate.excluded_reasons.iter().any(|r| r == reason)
            {
                let mut intent = AlertIntent::alert(
                    &key,
                    format!("Pod {key} terminated: {reason}"),
                    alarms.terminate.priority,
                );
                intent.details = format!(
                    "Name: {name}\nNamespace: {namespace}\nContainer: {container}\nReason: {reason}\nExit code: {}\nStarted at: {}\nFinished at: {}",
                    terminated.exit_code,
                    terminated
                        .started_at
                        .as_ref()
                        .map(|t| t.0.to_rfc3339())
                        .unwrap_or_default(),
                    terminated
                        .finished_at
                        .as_ref()
                        .map(|t| t.0.to_rfc3339())
                        .unwrap_or_default(),
                );
                intent.labels = labels.clone();
                intent.links = links.clone();
                findings.push(PodFinding {
                    intent,
                    container: Some(container),
                });
                continue;
            }
        }

        if let Some(waiting) = status.state.as_ref().and_then(|s| s.waiting.as_ref()) {
            let reason = waiting.reason.as_deref().unwrap_or_default();
            if alarms.waiting.enabled && WAITING_REASONS.contains(&reason) {
                let mut intent = AlertIntent::alert(
                    &key,
                    format!("Pod {key} waiting: {reason}"),
                    alarms.waiting.priority,
                );
                intent.details = format!(
                    "Name: {name}\nNamespace: {namespace}\nContainer: {container}\nReason: {reason}\nMessage: {}",
                    waiting.message.as_deref().unwrap_or_default(),
                );
                intent.labels = labels.clone();
                intent.links = links.clone();
                findings.push(PodFinding {
                    intent,
                    container: Some(container),
                });
                continue;
            }
        }

        if alarms.restarts.enabled && status.restart_count >= alarms.restarts.threshold {
            let mut intent = AlertIntent::alert(
                format!("{key}:restarts"),
                format!(
                    "Pod {key} restart threshold reached: {}",
                    status.restart_count
                ),
                alarms.restarts.priority,
            );
            intent.details = format!(
                "Name: {name}\nNamespace: {namespace}\nContainer: {container}\nRestarts: {}\nThreshold: {}",
                status.restart_count, alarms.restarts.threshold,
            );
            intent.labels = labels.clone();
            intent.links = links.clone();
            findings.push(PodFinding {
                intent,
                container: Some(container),
            });
        }
    }

    findings
}

/// Evaluates the per-container resource rules against observed usage. When
/// no CPU/memory rule fires for any container, a single `recovered` resolve
/// is produced for the pod. With no usage data the pass is skipped entirely:
/// no alerts, and no recovery claims either.
pub fn analyze_pod_resources(
    pod: &Pod,
    usage: Option<&PodUsage>,
    workload: Option<&WorkloadInfo>,
    config: &Config,
) -> Vec<AlertIntent> {
    let alarms = &config.alarms.pods;
    if !alarms.enabled || !alarms.resources.enabled {
        return Vec::new();
    }
    let Some(usage) = usage else {
        return Vec::new();
    };

    let namespace = pod.metadata.namespace.as_deref().unwrap_or_default();
    let name = pod.metadata.name.as_deref().unwrap_or_default();
    let key = pod_key(namespace, name);
    let labels = build_pod_labels(pod, workload);
    let links = render_links(&config.links.pods, &pod_link_values(pod));

    let mut intents = Vec::new();

    let containers = pod
        .spec
        .as_ref()
        .map(|spec| spec.containers.as_slice())
        .unwrap_or_default();
    for container in containers {
        let Some(observed) = usage.get(&container.name) else {
            continue;
        };
        let limits = container
            .resources
            .as_ref()
            .and_then(|r| r.limits.as_ref());

        let cpu_limit = limits
            .and_then(|l| l.get("cpu"))
            .and_then(parse_quantity)
            .unwrap_or(0.0);
        if alarms.resources.cpu.enabled && observed.cpu > 0.0 && cpu_limit > 0.0 {
            let percentage = observed.cpu / cpu_limit * 100.0;
            if percentage >= alarms.resources.cpu.threshold as f64 {
                let mut intent = AlertIntent::alert(
                    &key,
                    format!("Pod {key} CPU usage reached {percentage:.0}% of its limit"),
                    alarms.resources.cpu.priority,
                );
                intent.details = format!(
                    "Name: {name}\nNamespace: {namespace}\nContainer: {}\nUsage: {:.3} cores\nLimit: {:.3} cores",
                    container.name, observed.cpu, cpu_limit,
                );
                intent.labels = labels.clone();
                intent.links = links.clone();
                intent.custom_details = resource_details(observed.cpu, cpu_limit, percentage);
                intents.push(intent);
            }
        }

        let memory_limit = limits
            .and_then(|l| l.get("memory"))
            .and_then(parse_quantity)
            .unwrap_or(0.0);
        if alarms.resources.memory.enabled && observed.memory > 0.0 && memory_limit > 0.0 {
            let percentage = observed.memory / memory_limit * 100.0;
            if percentage >= alarms.resources.memory.threshold as f64 {
                let mut intent = AlertIntent::alert(
                    &key,
                    format!("Pod {key} memory usage reached {percentage:.0}% of its limit"),
                    alarms.resources.memory.priority,
                );
                intent.details = format!(
                    "Name: {name}\nNamespace: {namespace}\nContainer: {}\nUsage: {:.0} bytes\nLimit: {:.0} bytes",
                    container.name, observed.memory, memory_limit,
                );
                intent.labels = labels.clone();
                intent.links = links.clone();
                intent.custom_details = resource_details(observed.memory, memory_limit, percentage);
                intents.push(intent);
            }
        }
    }

    let phase = pod
        .status
        .as_ref()
        .and_then(|s| s.phase.as_deref())
        .unwrap_or_default();
    if intents.is_empty() && phase == "Running" {
        let mut resolve = AlertIntent::resolve(&key, format!("Pod {key} resources recovered"));
        resolve.labels = labels;
        intents.push(resolve);
    }

    intents
}

fn container_statuses(pod: &Pod) -> &[ContainerStatus] {
    pod.status
        .as_ref()
        .and_then(|s| s.container_statuses.as_deref())
        .unwrap_or_default()
}

fn pod_link_values(pod: &Pod) -> LinkValues<'_> {
    LinkValues {
        pod_name: pod.metadata.name.as_deref().unwrap_or_default(),
        pod_namespace: pod.metadata.namespace.as_deref().unwrap_or_default(),
        node_name: pod
            .spec
            .as_ref()
            .and_then(|s| s.node_name.as_deref())
            .unwrap_or_default(),
    }
}

/// Labels attached to every pod event: identity, placement, selected pod
/// labels and the owning workload when it could be resolved.
fn build_pod_labels(pod: &Pod, workload: Option<&WorkloadInfo>) -> BTreeMap<String, String> {
    let mut labels = BTreeMap::new();
    if let Some(namespace) = &pod.metadata.namespace {
        labels.insert("namespace".to_string(), namespace.clone());
    }
    if let Some(name) = &pod.metadata.name {
        labels.insert("pod".to_string(), name.clone());
    }
    if let Some(version) = &pod.metadata.resource_version {
        labels.insert("resource_version".to_string(), version.clone());
    }
    if let Some(node) = pod.spec.as_ref().and_then(|s| s.node_name.as_ref()) {
        labels.insert("node".to_string(), node.clone());
    }
    if let Some(pod_labels) = &pod.metadata.labels {
        for label in ["app", "stage", "version"] {
            if let Some(value) = pod_labels.get(label) {
                labels.insert(label.to_string(), value.clone());
            }
        }
    }
    if let Some(workload) = workload {
        labels.insert(
            "workload_kind".to_string(),
            workload.kind.as_str().to_string(),
        );
        labels.insert("workload_name".to_string(), workload.name.clone());
    }
    labels
}

fn resource_details(
    usage: f64,
    limit: f64,
    percentage: f64,
) -> serde_json::Map<String, serde_json::Value> {
    let mut details = serde_json::Map::new();
    details.insert("usage".to_string(), json!(usage));
    details.insert("limit".to_string(), json!(limit));
    details.insert("percentage".to_string(), json!(percentage));
    details
}
