// src/server/commander/pods.rs

//! Pod inspection handlers: list, get, logs and delete.

use super::{ApiError, clamp_tail_lines, parse_since_params};
use crate::core::workload::find_pod_by_name;
use crate::server::initialization::AgentState;
use axum::Json;
use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use k8s_openapi::api::core::v1::{ContainerState, Pod};
use kube::api::{DeleteParams, ListParams, LogParams, PropagationPolicy};
use kube::Api;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::warn;

const POD_NOT_FOUND: &str = "Pod not found";

#[derive(Deserialize, Default)]
pub struct NamespaceQuery {
    pub namespace: Option<String>,
}

/// Condensed container state returned by the list endpoint.
#[derive(Serialize)]
struct ContainerStatusSummary {
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    state: Option<ContainerState>,
    ready: bool,
}

#[derive(Serialize)]
struct PodStatusSummary {
    #[serde(skip_serializing_if = "String::is_empty")]
    name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    namespace: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    phase: Option<String>,
    containers: Vec<ContainerStatusSummary>,
}

/// GET /api/pods
pub async fn list_pods(
    State(state): State<Arc<AgentState>>,
    Query(query): Query<NamespaceQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let api: Api<Pod> = match query.namespace.as_deref() {
        Some(namespace) if !namespace.is_empty() => {
            Api::namespaced(state.client.clone(), namespace)
        }
        _ => Api::all(state.client.clone()),
    };
    let pods = api.list(&ListParams::default()).await.map_err(|e| {
        warn!(error = %e, "Failed to list pods");
        ApiError::internal("Failed to list pods")
    })?;

    let summaries: Vec<PodStatusSummary> = pods
        .items
        .into_iter()
        .map(|pod| {
            let containers = pod
                .status
                .as_ref()
                .and_then(|status| status.container_statuses.as_ref())
                .map(|statuses| {
                    statuses
                        .iter()
                        .map(|status| ContainerStatusSummary {
                            name: status.name.clone(),
                            state: status.state.clone(),
                            ready: status.ready,
                        })
                        .collect()
                })
                .unwrap_or_default();
            PodStatusSummary {
                name: pod.metadata.name.unwrap_or_default(),
                namespace: pod.metadata.namespace.unwrap_or_default(),
                phase: pod.status.and_then(|status| status.phase),
                containers,
            }
        })
        .collect();

    Ok(Json(summaries))
}

/// GET /api/pods/{podName}
pub async fn get_pod(
    State(state): State<Arc<AgentState>>,
    Path(pod_name): Path<String>,
    Query(query): Query<NamespaceQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let pod = find_pod_by_name(&state.client, query.namespace.as_deref(), &pod_name)
        .await?
        .ok_or_else(|| ApiError::not_found(POD_NOT_FOUND))?;
    Ok(Json(pod))
}

#[derive(Deserialize, Default)]
pub struct LogsQuery {
    pub namespace: Option<String>,
    pub container: Option<String>,
    pub previous: Option<String>,
    #[serde(rename = "tail-lines")]
    pub tail_lines: Option<String>,
    #[serde(rename = "since-seconds")]
    pub since_seconds: Option<String>,
    #[serde(rename = "since-time")]
    pub since_time: Option<String>,
}

/// GET /api/pods/{podName}/logs
pub async fn get_pod_logs(
    State(state): State<Arc<AgentState>>,
    Path(pod_name): Path<String>,
    Query(query): Query<LogsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let tail_lines = clamp_tail_lines(query.tail_lines.as_deref())?;
    let (since_seconds, since_time) =
        parse_since_params(query.since_seconds.as_deref(), query.since_time.as_deref())?;

    let pod = find_pod_by_name(&state.client, query.namespace.as_deref(), &pod_name)
        .await?
        .ok_or_else(|| ApiError::not_found(POD_NOT_FOUND))?;
    let namespace = pod
        .metadata
        .namespace
        .as_deref()
        .ok_or_else(|| ApiError::internal("Pod has no namespace"))?;

    let api: Api<Pod> = Api::namespaced(state.client.clone(), namespace);
    let params = LogParams {
        container: query.container.clone().filter(|c| !c.is_empty()),
        previous: query.previous.as_deref() == Some("true"),
        tail_lines: Some(tail_lines),
        since_seconds,
        since_time,
        ..LogParams::default()
    };
    let logs = api.logs(&pod_name, &params).await.map_err(|e| {
        warn!(pod = %pod_name, namespace, error = %e, "Failed to stream logs");
        ApiError::internal("Failed to stream logs")
    })?;

    Ok(logs)
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct DeleteQuery {
    pub namespace: Option<String>,
    pub grace_period_seconds: Option<u32>,
    pub propagation_policy: Option<String>,
}

/// DELETE /api/pods/{podName}
pub async fn delete_pod(
    State(state): State<Arc<AgentState>>,
    Path(pod_name): Path<String>,
    Query(query): Query<DeleteQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let propagation_policy = match query.propagation_policy.as_deref() {
        None | Some("") => None,
        Some("Orphan") => Some(PropagationPolicy::Orphan),
        Some("Background") => Some(PropagationPolicy::Background),
        Some("Foreground") => Some(PropagationPolicy::Foreground),
        Some(other) => {
            return Err(ApiError::bad_request(format!(
                "Invalid propagationPolicy '{other}'"
            )));
        }
    };

    let pod = find_pod_by_name(&state.client, query.namespace.as_deref(), &pod_name)
        .await?
        .ok_or_else(|| ApiError::not_found(POD_NOT_FOUND))?;
    let namespace = pod
        .metadata
        .namespace
        .as_deref()
        .ok_or_else(|| ApiError::internal("Pod has no namespace"))?;

    let api: Api<Pod> = Api::namespaced(state.client.clone(), namespace);
    let params = DeleteParams {
        grace_period_seconds: query.grace_period_seconds,
        propagation_policy,
        ..DeleteParams::default()
    };
    api.delete(&pod_name, &params).await.map_err(|e| {
        warn!(pod = %pod_name, namespace, error = %e, "Failed to delete pod");
        ApiError::internal(format!("Failed to delete pod: {e}"))
    })?;

    Ok(Json(json!({})))
}
