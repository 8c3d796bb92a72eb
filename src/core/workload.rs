// src/core/workload.rs

//! Resolves the workload owning a pod by climbing owner references.
//!
//! The walk is at most two hops: Pod -> ReplicaSet -> Deployment, or
//! Pod -> StatefulSet/DaemonSet/Deployment directly.

use crate::core::errors::AgentError;
use crate::core::rules::{WorkloadInfo, WorkloadKind};
use k8s_openapi::api::apps::v1::ReplicaSet;
use k8s_openapi::api::core::v1::Pod;
use kube::api::ListParams;
use kube::{Api, Client};
use tracing::debug;

/// Resolves the owning workload for a pod. Returns `None` when the owner
/// chain does not terminate in a known workload kind; callers omit the
/// workload labels in that case.
pub async fn resolve_workload(client: &Client, pod: &Pod) -> Option<WorkloadInfo> {
    let namespace = pod.metadata.namespace.as_deref()?;
    let owners = pod.metadata.owner_references.as_deref().unwrap_or_default();

    for owner in owners {
        match owner.kind.as_str() {
            "ReplicaSet" => {
                let api: Api<ReplicaSet> = Api::namespaced(client.clone(), namespace);
                let replica_set = match api.get(&owner.name).await {
                    Ok(rs) => rs,
                    Err(e) => {
                        debug!(
                            replica_set = %owner.name,
                            namespace,
                            error = %e,
                            "Failed to get replica set while resolving workload"
                        );
                        continue;
                    }
                };
                let rs_owners = replica_set
                    .metadata
                    .owner_references
                    .as_deref()
                    .unwrap_or_default();
                for rs_owner in rs_owners {
                    if rs_owner.kind == "Deployment" {
                        return Some(WorkloadInfo {
                            kind: WorkloadKind::Deployment,
                            name: rs_owner.name.clone(),
                        });
                    }
                }
            }
            "StatefulSet" => {
                return Some(WorkloadInfo {
                    kind: WorkloadKind::StatefulSet,
                    name: owner.name.clone(),
                });
            }
            "DaemonSet" => {
                return Some(WorkloadInfo {
                    kind: WorkloadKind::DaemonSet,
                    name: owner.name.clone(),
                });
            }
            "Deployment" => {
                return Some(WorkloadInfo {
                    kind: WorkloadKind::Deployment,
                    name: owner.name.clone(),
                });
            }
            _ => {}
        }
    }

    None
}

/// Finds a pod by name. With a namespace the lookup is a direct get; without
/// one, all namespaces are listed and matched by name.
pub async fn find_pod_by_name(
    client: &Client,
    namespace: Option<&str>,
    pod_name: &str,
) -> Result<Option<Pod>, AgentError> {
    match namespace {
        Some(namespace) if !namespace.is_empty() => {
            let api: Api<Pod> = Api::namespaced(client.clone(), namespace);
            match api.get_opt(pod_name).await {
                Ok(pod) => Ok(pod),
                Err(e) => Err(e.into()),
            }
        }
        _ => {
            let api: Api<Pod> = Api::all(client.clone());
            let pods = api.list(&ListParams::default()).await?;
            Ok(pods
                .items
                .into_iter()
                .find(|pod| pod.metadata.name.as_deref() == Some(pod_name)))
        }
    }
}
