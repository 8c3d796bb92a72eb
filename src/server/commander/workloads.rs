// src/server/commander/workloads.rs

//! Workload mutation handlers: resource/replica patching, scaling and
//! rollback to the previous revision.

use super::{ApiError, parse_wait_timeout};
use crate::core::rules::{WorkloadInfo, WorkloadKind};
use crate::core::workload::{find_pod_by_name, resolve_workload};
use crate::server::initialization::AgentState;
use axum::Json;
use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use k8s_openapi::api::apps::v1::{ControllerRevision, DaemonSet, Deployment, ReplicaSet, StatefulSet};
use k8s_openapi::api::core::v1::{Container, Pod, PodTemplateSpec};
use kube::api::{ListParams, Patch, PatchParams};
use kube::{Api, Client};
use serde::Deserialize;
use serde_json::{Value, json};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

const POD_NOT_FOUND: &str = "Pod not found";
const POLL_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct WorkloadQuery {
    pub namespace: Option<String>,
    pub wait_timeout: Option<String>,
}

/// Requested resource and replica changes. All fields optional; at least
/// one must be present.
#[derive(Deserialize, Default, Debug, Clone)]
#[serde(rename_all = "camelCase", default)]
pub struct ResourcePatch {
    pub cpu_limit: Option<String>,
    pub memory_limit: Option<String>,
    pub cpu_request: Option<String>,
    pub memory_request: Option<String>,
    pub replicas: Option<i32>,
}

impl ResourcePatch {
    fn wants_resources(&self) -> bool {
        self.cpu_limit.is_some()
            || self.memory_limit.is_some()
            || self.cpu_request.is_some()
            || self.memory_request.is_some()
    }

    fn is_empty(&self) -> bool {
        !self.wants_resources() && self.replicas.is_none()
    }
}

/// PATCH /api/workloads/{podName}
pub async fn patch_workload(
    State(state): State<Arc<AgentState>>,
    Path(pod_name): Path<String>,
    Query(query): Query<WorkloadQuery>,
    Json(body): Json<ResourcePatch>,
) -> Result<impl IntoResponse, ApiError> {
    let wait_timeout = parse_wait_timeout(query.wait_timeout.as_deref())?;
    if body.is_empty() {
        return Err(ApiError::bad_request(
            "At least one resource value is required",
        ));
    }

    let (namespace, workload) =
        locate_workload(&state.client, query.namespace.as_deref(), &pod_name).await?;

    let new_pod_name = match workload.kind {
        WorkloadKind::Deployment => {
            patch_deployment(&state.client, &namespace, &workload.name, &body, wait_timeout).await?
        }
        WorkloadKind::StatefulSet => {
            patch_statefulset(&state.client, &namespace, &workload.name, &body, wait_timeout)
                .await?
        }
        WorkloadKind::DaemonSet => {
            return Err(ApiError::internal("unsupported workload type: DaemonSet"));
        }
    };

    Ok(Json(json!({ "newPodName": new_pod_name })))
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ScaleQuery {
    pub namespace: Option<String>,
    pub current_replicas: Option<String>,
}

#[derive(Deserialize)]
pub struct ScaleBody {
    pub replicas: i32,
}

/// PATCH /api/scale/{deploymentName}
pub async fn scale_deployment(
    State(state): State<Arc<AgentState>>,
    Path(deployment_name): Path<String>,
    Query(query): Query<ScaleQuery>,
    Json(body): Json<ScaleBody>,
) -> Result<impl IntoResponse, ApiError> {
    if body.replicas < 0 {
        return Err(ApiError::bad_request("Invalid replicas"));
    }
    let expected_current = match query.current_replicas.as_deref() {
        None | Some("") => None,
        Some(s) => Some(
            s.parse::<i32>()
                .ok()
                .filter(|n| *n >= 0)
                .ok_or_else(|| ApiError::bad_request("Invalid currentReplicas"))?,
        ),
    };
    let namespace = query.namespace.as_deref().unwrap_or("default");

    let api: Api<Deployment> = Api::namespaced(state.client.clone(), namespace);
    let scale = api.get_scale(&deployment_name).await.map_err(|e| {
        warn!(deployment = %deployment_name, namespace, error = %e, "Failed to get deployment scale");
        ApiError::from(crate::core::errors::AgentError::from(e))
    })?;

    if let Some(expected) = expected_current {
        let observed = scale.status.as_ref().map(|s| s.replicas).unwrap_or(0);
        if expected != observed {
            return Err(ApiError::internal("precondition failed"));
        }
    }

    api.patch_scale(
        &deployment_name,
        &PatchParams::default(),
        &Patch::Merge(json!({ "spec": { "replicas": body.replicas } })),
    )
    .await
    .map_err(|e| {
        warn!(deployment = %deployment_name, namespace, error = %e, "Failed to scale deployment");
        ApiError::internal(format!("Failed to scale resource: {e}"))
    })?;

    Ok(Json(json!({})))
}

/// POST /api/workloads/{podName}/rollback
pub async fn rollback_workload(
    State(state): State<Arc<AgentState>>,
    Path(pod_name): Path<String>,
    Query(query): Query<WorkloadQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let wait_timeout = parse_wait_timeout(query.wait_timeout.as_deref())?;
    let (namespace, workload) =
        locate_workload(&state.client, query.namespace.as_deref(), &pod_name).await?;

    let new_pod_name = match workload.kind {
        WorkloadKind::Deployment => {
            rollback_deployment(&state.client, &namespace, &workload.name, wait_timeout).await?
        }
        WorkloadKind::StatefulSet => {
            rollback_statefulset(&state.client, &namespace, &workload.name, wait_timeout).await?
        }
        WorkloadKind::DaemonSet => {
            rollback_daemonset(&state.client, &namespace, &workload.name, wait_timeout).await?
        }
    };

    Ok(Json(json!({ "newPodName": new_pod_name })))
}

/// Finds the pod and resolves its owning workload, with 404 for a missing
/// pod and 500 for an unresolvable owner chain.
async fn locate_workload(
    client: &Client,
    namespace: Option<&str>,
    pod_name: &str,
) -> Result<(String, WorkloadInfo), ApiError> {
    let pod = find_pod_by_name(client, namespace, pod_name)
        .await?
        .ok_or_else(|| ApiError::not_found(POD_NOT_FOUND))?;
    let namespace = pod
        .metadata
        .namespace
        .clone()
        .ok_or_else(|| ApiError::internal("Pod has no namespace"))?;
    let workload = resolve_workload(client, &pod).await.ok_or_else(|| {
        ApiError::internal(format!(
            "could not determine workload type for pod {pod_name}"
        ))
    })?;
    Ok((namespace, workload))
}

// --- Resource patching ---

async fn patch_deployment(
    client: &Client,
    namespace: &str,
    name: &str,
    body: &ResourcePatch,
    wait_timeout: Duration,
) -> Result<Option<String>, ApiError> {
    let api: Api<Deployment> = Api::namespaced(client.clone(), namespace);
    let deployment = api
        .get(name)
        .await
        .map_err(|e| ApiError::from(crate::core::errors::AgentError::from(e)))?;

    let spec = deployment
        .spec
        .as_ref()
        .ok_or_else(|| ApiError::internal("Deployment has no spec"))?;
    let containers = spec
        .template
        .spec
        .as_ref()
        .map(|s| s.containers.as_slice())
        .unwrap_or_default();

    let mut ops = build_resource_ops(containers, body);
    if let Some(replicas) = body.replicas {
        ops.push(replicas_op(spec.replicas.is_some(), replicas));
    }
    if ops.is_empty() {
        return Err(ApiError::bad_request("no resource changes specified"));
    }

    let selector = selector_string(spec.selector.match_labels.as_ref())?;
    let known = list_pod_names(client, namespace, &selector).await;

    apply_json_patch(&api, name, ops).await?;

    if body.wants_resources() {
        Ok(wait_for_new_pod(client, namespace, &selector, &known, wait_timeout).await)
    } else {
        // Replicas-only: report the running pod of the current template.
        Ok(current_running_pod(client, namespace, &deployment, &selector).await)
    }
}

async fn patch_statefulset(
    client: &Client,
    namespace: &str,
    name: &str,
    body: &ResourcePatch,
    wait_timeout: Duration,
) -> Result<Option<String>, ApiError> {
    let api: Api<StatefulSet> = Api::namespaced(client.clone(), namespace);
    let statefulset = api
        .get(name)
        .await
        .map_err(|e| ApiError::from(crate::core::errors::AgentError::from(e)))?;

    let spec = statefulset
        .spec
        .as_ref()
        .ok_or_else(|| ApiError::internal("StatefulSet has no spec"))?;
    let containers = spec
        .template
        .spec
        .as_ref()
        .map(|s| s.containers.as_slice())
        .unwrap_or_default();

    let mut ops = build_resource_ops(containers, body);
    if let Some(replicas) = body.replicas {
        ops.push(replicas_op(spec.replicas.is_some(), replicas));
    }
    if ops.is_empty() {
        return Err(ApiError::bad_request("no resource changes specified"));
    }

    let selector = selector_string(spec.selector.match_labels.as_ref())?;
    let known = list_pod_names(client, namespace, &selector).await;

    apply_json_patch(&api, name, ops).await?;

    if body.wants_resources() {
        Ok(wait_for_new_pod(client, namespace, &selector, &known, wait_timeout).await)
    } else {
        Ok(find_running_pod(client, namespace, &selector).await)
    }
}

/// Builds the JSON-patch operations for every container, choosing `add` or
/// `replace` depending on what the container already declares.
fn build_resource_ops(containers: &[Container], patch: &ResourcePatch) -> Vec<Value> {
    let mut ops = Vec::new();
    for (index, container) in containers.iter().enumerate() {
        ops.extend(container_resource_ops(index, container, patch));
    }
    ops
}

pub fn container_resource_ops(
    index: usize,
    container: &Container,
    patch: &ResourcePatch,
) -> Vec<Value> {
    let mut ops = Vec::new();
    let resources = container.resources.as_ref();
    let has_limits = resources.is_some_and(|r| r.limits.is_some());
    let has_requests = resources.is_some_and(|r| r.requests.is_some());
    let wants_limits = patch.cpu_limit.is_some() || patch.memory_limit.is_some();
    let wants_requests = patch.cpu_request.is_some() || patch.memory_request.is_some();

    let limits_value = || {
        let mut limits = serde_json::Map::new();
        if let Some(cpu) = &patch.cpu_limit {
            limits.insert("cpu".to_string(), json!(cpu));
        }
        if let Some(memory) = &patch.memory_limit {
            limits.insert("memory".to_string(), json!(memory));
        }
        Value::Object(limits)
    };
    let requests_value = || {
        let mut requests = serde_json::Map::new();
        if let Some(cpu) = &patch.cpu_request {
            requests.insert("cpu".to_string(), json!(cpu));
        }
        if let Some(memory) = &patch.memory_request {
            requests.insert("memory".to_string(), json!(memory));
        }
        Value::Object(requests)
    };

    // A container with no resources block at all gets one `add` holding
    // everything that was requested.
    if !has_limits && !has_requests {
        if !wants_limits && !wants_requests {
            return ops;
        }
        let mut resources_value = serde_json::Map::new();
        if wants_limits {
            resources_value.insert("limits".to_string(), limits_value());
        }
        if wants_requests {
            resources_value.insert("requests".to_string(), requests_value());
        }
        ops.push(json!({
            "op": "add",
            "path": format!("/spec/template/spec/containers/{index}/resources"),
            "value": Value::Object(resources_value),
        }));
        return ops;
    }

    if !has_limits && wants_limits {
        ops.push(json!({
            "op": "add",
            "path": format!("/spec/template/spec/containers/{index}/resources/limits"),
            "value": limits_value(),
        }));
    } else {
        if let Some(cpu) = &patch.cpu_limit {
            ops.push(json!({
                "op": "replace",
                "path": format!("/spec/template/spec/containers/{index}/resources/limits/cpu"),
                "value": cpu,
            }));
        }
        if let Some(memory) = &patch.memory_limit {
            ops.push(json!({
                "op": "replace",
                "path": format!("/spec/template/spec/containers/{index}/resources/limits/memory"),
                "value": memory,
            }));
        }
    }

    if !has_requests && wants_requests {
        ops.push(json!({
            "op": "add",
            "path": format!("/spec/template/spec/containers/{index}/resources/requests"),
            "value": requests_value(),
        }));
    } else {
        if let Some(cpu) = &patch.cpu_request {
            ops.push(json!({
                "op": "replace",
                "path": format!("/spec/template/spec/containers/{index}/resources/requests/cpu"),
                "value": cpu,
            }));
        }
        if let Some(memory) = &patch.memory_request {
            ops.push(json!({
                "op": "replace",
                "path": format!("/spec/template/spec/containers/{index}/resources/requests/memory"),
                "value": memory,
            }));
        }
    }

    ops
}

/// Replicas go through `add` when the field is absent and `replace` when
/// it is already set.
pub fn replicas_op(present: bool, replicas: i32) -> Value {
    json!({
        "op": if present { "replace" } else { "add" },
        "path": "/spec/replicas",
        "value": replicas,
    })
}

async fn apply_json_patch<K>(api: &Api<K>, name: &str, ops: Vec<Value>) -> Result<(), ApiError>
where
    K: Clone + serde::de::DeserializeOwned + std::fmt::Debug,
{
    let patch: json_patch::Patch = serde_json::from_value(Value::Array(ops))
        .map_err(|e| ApiError::internal(format!("failed to build patch: {e}")))?;
    api.patch(name, &PatchParams::default(), &Patch::Json::<()>(patch))
        .await
        .map_err(|e| ApiError::internal(format!("failed to patch workload: {e}")))?;
    Ok(())
}

// --- Rollback ---

async fn rollback_deployment(
    client: &Client,
    namespace: &str,
    name: &str,
    wait_timeout: Duration,
) -> Result<Option<String>, ApiError> {
    let api: Api<Deployment> = Api::namespaced(client.clone(), namespace);
    let deployment = api
        .get(name)
        .await
        .map_err(|e| ApiError::from(crate::core::errors::AgentError::from(e)))?;
    let spec = deployment
        .spec
        .as_ref()
        .ok_or_else(|| ApiError::internal("Deployment has no spec"))?;
    let selector = selector_string(spec.selector.match_labels.as_ref())?;

    let rs_api: Api<ReplicaSet> = Api::namespaced(client.clone(), namespace);
    let replica_sets = rs_api
        .list(&ListParams::default().labels(&selector))
        .await
        .map_err(|e| ApiError::internal(format!("failed to list replica sets: {e}")))?;

    let owned: Vec<&ReplicaSet> = replica_sets
        .items
        .iter()
        .filter(|rs| controlled_by(&rs.metadata, deployment.metadata.uid.as_deref()))
        .collect();

    // The current replica set is the one whose template matches the
    // deployment's (ignoring the injected pod-template-hash label).
    let current = owned
        .iter()
        .find(|rs| replica_set_matches_template(rs, &spec.template));
    let previous = owned
        .iter()
        .filter(|rs| {
            current
                .map(|c| c.metadata.uid != rs.metadata.uid)
                .unwrap_or(true)
        })
        .max_by_key(|rs| rs.metadata.creation_timestamp.as_ref().map(|t| t.0));

    let previous = previous
        .ok_or_else(|| ApiError::internal("no previous replica set found for rollback"))?;
    let template = previous
        .spec
        .as_ref()
        .and_then(|s| s.template.as_ref())
        .ok_or_else(|| ApiError::internal("previous replica set has no template"))?;

    let known = list_pod_names(client, namespace, &selector).await;
    api.patch(
        name,
        &PatchParams::default(),
        &Patch::Merge(json!({ "spec": { "template": template } })),
    )
    .await
    .map_err(|e| ApiError::internal(format!("failed to apply rollback patch: {e}")))?;

    Ok(wait_for_new_pod(client, namespace, &selector, &known, wait_timeout).await)
}

async fn rollback_statefulset(
    client: &Client,
    namespace: &str,
    name: &str,
    wait_timeout: Duration,
) -> Result<Option<String>, ApiError> {
    let api: Api<StatefulSet> = Api::namespaced(client.clone(), namespace);
    let statefulset = api
        .get(name)
        .await
        .map_err(|e| ApiError::from(crate::core::errors::AgentError::from(e)))?;
    let spec = statefulset
        .spec
        .as_ref()
        .ok_or_else(|| ApiError::internal("StatefulSet has no spec"))?;
    let selector = selector_string(spec.selector.match_labels.as_ref())?;

    let data = previous_revision_data(client, namespace, &selector, statefulset.metadata.uid.as_deref())
        .await?;
    let known = list_pod_names(client, namespace, &selector).await;

    api.patch(name, &PatchParams::default(), &Patch::Strategic(data))
        .await
        .map_err(|e| ApiError::internal(format!("failed to apply rollback patch: {e}")))?;

    Ok(wait_for_new_pod(client, namespace, &selector, &known, wait_timeout).await)
}

async fn rollback_daemonset(
    client: &Client,
    namespace: &str,
    name: &str,
    wait_timeout: Duration,
) -> Result<Option<String>, ApiError> {
    let api: Api<DaemonSet> = Api::namespaced(client.clone(), namespace);
    let daemonset = api
        .get(name)
        .await
        .map_err(|e| ApiError::from(crate::core::errors::AgentError::from(e)))?;
    let spec = daemonset
        .spec
        .as_ref()
        .ok_or_else(|| ApiError::internal("DaemonSet has no spec"))?;
    let selector = selector_string(spec.selector.match_labels.as_ref())?;

    let data = previous_revision_data(client, namespace, &selector, daemonset.metadata.uid.as_deref())
        .await?;
    let known = list_pod_names(client, namespace, &selector).await;

    api.patch(name, &PatchParams::default(), &Patch::Strategic(data))
        .await
        .map_err(|e| ApiError::internal(format!("failed to apply rollback patch: {e}")))?;

    Ok(wait_for_new_pod(client, namespace, &selector, &known, wait_timeout).await)
}

/// Picks the second-newest controller revision owned by the workload and
/// returns its stored patch data.
async fn previous_revision_data(
    client: &Client,
    namespace: &str,
    selector: &str,
    owner_uid: Option<&str>,
) -> Result<Value, ApiError> {
    let api: Api<ControllerRevision> = Api::namespaced(client.clone(), namespace);
    let revisions = api
        .list(&ListParams::default().labels(selector))
        .await
        .map_err(|e| ApiError::internal(format!("failed to list controller revisions: {e}")))?;

    let mut owned: Vec<&ControllerRevision> = revisions
        .items
        .iter()
        .filter(|revision| controlled_by(&revision.metadata, owner_uid))
        .collect();
    owned.sort_by_key(|revision| std::cmp::Reverse(revision.revision));

    let previous = owned
        .get(1)
        .ok_or_else(|| ApiError::internal("no previous revision found for rollback"))?;
    previous
        .data
        .as_ref()
        .map(|raw| raw.0.clone())
        .ok_or_else(|| ApiError::internal("previous revision carries no data"))
}

// --- Shared helpers ---

fn controlled_by(
    metadata: &k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta,
    owner_uid: Option<&str>,
) -> bool {
    let Some(owner_uid) = owner_uid else {
        return false;
    };
    metadata
        .owner_references
        .as_deref()
        .unwrap_or_default()
        .iter()
        .any(|owner| owner.controller == Some(true) && owner.uid == owner_uid)
}

/// Compares a replica set's template with the workload's, ignoring the
/// `pod-template-hash` label injected by the deployment controller.
fn replica_set_matches_template(rs: &ReplicaSet, template: &PodTemplateSpec) -> bool {
    let Some(rs_template) = rs.spec.as_ref().and_then(|s| s.template.as_ref()) else {
        return false;
    };
    let strip = |t: &PodTemplateSpec| -> Value {
        let mut t = t.clone();
        if let Some(metadata) = t.metadata.as_mut() {
            if let Some(labels) = metadata.labels.as_mut() {
                labels.remove("pod-template-hash");
            }
        }
        serde_json::to_value(&t).unwrap_or(Value::Null)
    };
    strip(rs_template) == strip(template)
}

pub fn selector_string(
    match_labels: Option<&BTreeMap<String, String>>,
) -> Result<String, ApiError> {
    let labels = match_labels
        .filter(|labels| !labels.is_empty())
        .ok_or_else(|| ApiError::internal("workload has no label selector"))?;
    Ok(labels
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join(","))
}

async fn list_pod_names(client: &Client, namespace: &str, selector: &str) -> HashSet<String> {
    let api: Api<Pod> = Api::namespaced(client.clone(), namespace);
    match api.list(&ListParams::default().labels(selector)).await {
        Ok(pods) => pods
            .items
            .into_iter()
            .filter_map(|pod| pod.metadata.name)
            .collect(),
        Err(e) => {
            debug!(error = %e, "Failed to list pods before patch");
            HashSet::new()
        }
    }
}

/// Polls until a pod not in `known` shows up under the selector, or the
/// wait deadline passes (`None`).
async fn wait_for_new_pod(
    client: &Client,
    namespace: &str,
    selector: &str,
    known: &HashSet<String>,
    wait_timeout: Duration,
) -> Option<String> {
    let api: Api<Pod> = Api::namespaced(client.clone(), namespace);
    let params = ListParams::default().labels(selector);
    let deadline = tokio::time::Instant::now() + wait_timeout;

    loop {
        if let Ok(pods) = api.list(&params).await {
            for pod in pods.items {
                if let Some(name) = pod.metadata.name {
                    if !known.contains(&name) {
                        return Some(name);
                    }
                }
            }
        }
        if tokio::time::Instant::now() >= deadline {
            return None;
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

async fn find_running_pod(client: &Client, namespace: &str, selector: &str) -> Option<String> {
    let api: Api<Pod> = Api::namespaced(client.clone(), namespace);
    let pods = api.list(&ListParams::default().labels(selector)).await.ok()?;
    pods.items
        .into_iter()
        .find(|pod| {
            pod.status
                .as_ref()
                .and_then(|status| status.phase.as_deref())
                == Some("Running")
        })
        .and_then(|pod| pod.metadata.name)
}

/// Replicas-only changes return the running pod under the deployment's
/// current replica-set hash.
async fn current_running_pod(
    client: &Client,
    namespace: &str,
    deployment: &Deployment,
    selector: &str,
) -> Option<String> {
    let spec = deployment.spec.as_ref()?;
    let rs_api: Api<ReplicaSet> = Api::namespaced(client.clone(), namespace);
    let replica_sets = rs_api
        .list(&ListParams::default().labels(selector))
        .await
        .ok()?;
    let current = replica_sets
        .items
        .iter()
        .filter(|rs| controlled_by(&rs.metadata, deployment.metadata.uid.as_deref()))
        .find(|rs| replica_set_matches_template(rs, &spec.template))?;
    let hash = current
        .metadata
        .labels
        .as_ref()
        .and_then(|labels| labels.get("pod-template-hash"))?;

    let hashed_selector = format!("{selector},pod-template-hash={hash}");
    find_running_pod(client, namespace, &hashed_selector).await
}
