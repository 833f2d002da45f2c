//! Resource client abstraction over the namespaced cluster API
//!
//! Follows the same trait-based pattern used for every external dependency:
//! - `ResourceClient` trait for abstraction
//! - `KubeResourceClient` for a real cluster (kube-rs, see `cluster.rs`)
//! - `FakeCluster` for testing (in-memory, simulates pods)
//!
//! Implementations provide the primitive round trips. Derived operations
//! (replica counts, readiness scans, existence checks, label listing) are
//! provided methods so every implementation computes them the same way.
//! Nothing here retries: every call is exactly one request.

pub mod cluster;
pub mod dry_run;

#[cfg(test)]
pub mod fake;

pub use cluster::KubeResourceClient;
pub use dry_run::DryRunClient;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Pod, ReplicationController, Service};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// Resource kinds the engine manages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Service,
    Workload,
    Pod,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ResourceKind::Service => "Service",
            ResourceKind::Workload => "ReplicationController",
            ResourceKind::Pod => "Pod",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("{kind} '{name}' not found")]
    NotFound { kind: ResourceKind, name: String },

    #[error("request failed ({}): {detail}", describe_status(.status))]
    RequestFailed { status: Option<u16>, detail: String },

    #[error("malformed document: {0}")]
    MalformedDocument(String),
}

impl ClientError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ClientError::NotFound { .. })
    }

    pub(crate) fn not_found(kind: ResourceKind, name: &str) -> Self {
        ClientError::NotFound {
            kind,
            name: name.to_string(),
        }
    }
}

fn describe_status(status: &Option<u16>) -> String {
    match status {
        Some(code) => code.to_string(),
        None => "transport".to_string(),
    }
}

/// What happens to a Workload's pods when the Workload is deleted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PodPolicy {
    /// Pods are garbage collected with their Workload
    Cascade,
    /// Pods are left running for another Workload with a matching selector to adopt
    Orphan,
}

/// Decode a JSON document into a typed resource
pub fn from_document<K: DeserializeOwned>(doc: &Value) -> Result<K, ClientError> {
    serde_json::from_value(doc.clone()).map_err(|e| ClientError::MalformedDocument(e.to_string()))
}

/// `metadata.name` of a document, for logging
pub(crate) fn document_name(doc: &Value) -> String {
    doc.pointer("/metadata/name")
        .and_then(Value::as_str)
        .unwrap_or("<unnamed>")
        .to_string()
}

/// Does this pod carry `Ready=True`?
pub fn is_pod_ready(pod: &Pod) -> bool {
    pod.status
        .as_ref()
        .and_then(|s| s.conditions.as_ref())
        .map(|conditions| {
            conditions
                .iter()
                .any(|c| c.type_ == "Ready" && c.status == "True")
        })
        .unwrap_or(false)
}

/// Does this pod belong to the named Workload?
///
/// A pod controlled by another object (e.g. a staging Workload whose selector
/// overlaps) does not count; a pod with no controller reference is attributed
/// to whichever Workload's selector matches it.
pub fn is_controlled_by(pod: &Pod, workload: &str) -> bool {
    let controller = pod
        .metadata
        .owner_references
        .as_ref()
        .and_then(|refs| refs.iter().find(|r| r.controller == Some(true)));

    match controller {
        Some(owner) => owner.kind == "ReplicationController" && owner.name == workload,
        None => true,
    }
}

/// Render a selector map as `k=v,k=v`
pub fn selector_string(selector: &std::collections::BTreeMap<String, String>) -> String {
    selector
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(",")
}

/// Client over the cluster's namespaced resource API
///
/// Every method is one round trip; callers await them one at a time.
#[async_trait]
pub trait ResourceClient: Send + Sync {
    /// POST a ReplicationController document
    async fn create_workload(&self, namespace: &str, spec: &Value) -> Result<(), ClientError>;

    /// POST a Service document
    async fn create_service(&self, namespace: &str, spec: &Value) -> Result<(), ClientError>;

    async fn get_workload(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<ReplicationController, ClientError>;

    /// PUT a full ReplicationController document onto an existing name
    async fn replace_workload(
        &self,
        namespace: &str,
        name: &str,
        spec: &Value,
    ) -> Result<(), ClientError>;

    async fn delete_workload(
        &self,
        namespace: &str,
        name: &str,
        pods: PodPolicy,
    ) -> Result<(), ClientError>;

    async fn delete_service(&self, namespace: &str, name: &str) -> Result<(), ClientError>;

    /// Merge-patch `{spec: {replicas: n}}`
    async fn set_spec_replicas(
        &self,
        namespace: &str,
        name: &str,
        replicas: u32,
    ) -> Result<(), ClientError>;

    /// Pods matching the Workload's own selector
    async fn list_pods_for_workload(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Vec<Pod>, ClientError>;

    async fn get_service(&self, namespace: &str, name: &str) -> Result<Service, ClientError>;

    /// PUT a full Service document; immutable fields must already be merged in
    async fn replace_service(
        &self,
        namespace: &str,
        name: &str,
        spec: &Value,
    ) -> Result<(), ClientError>;

    /// Merge-patch a Service with a metadata-only document
    async fn patch_service_metadata(
        &self,
        namespace: &str,
        name: &str,
        doc: &Value,
    ) -> Result<(), ClientError>;

    /// List Services; `None` namespace lists across all namespaces
    async fn list_services(
        &self,
        namespace: Option<&str>,
        selector: &str,
    ) -> Result<Vec<Service>, ClientError>;

    /// List ReplicationControllers; `None` namespace lists across all namespaces
    async fn list_workloads(
        &self,
        namespace: Option<&str>,
        selector: &str,
    ) -> Result<Vec<ReplicationController>, ClientError>;

    /// Declared replica count (`spec.replicas`, absent means 0)
    async fn get_spec_replicas(&self, namespace: &str, name: &str) -> Result<u32, ClientError> {
        let rc = self.get_workload(namespace, name).await?;
        let replicas = rc.spec.as_ref().and_then(|s| s.replicas).unwrap_or(0);
        Ok(replicas.max(0) as u32)
    }

    /// Server-reported `status.replicas`: active pods, ready or not
    ///
    /// Pods with a deletion timestamp are not counted. A Workload the
    /// replication manager has not observed yet has no status and reads as 0.
    async fn get_status_replicas(&self, namespace: &str, name: &str) -> Result<u32, ClientError> {
        let rc = self.get_workload(namespace, name).await?;
        let replicas = rc.status.as_ref().map(|s| s.replicas).unwrap_or(0);
        Ok(replicas.max(0) as u32)
    }

    /// Ready replicas, counted by scanning the Workload's pods for `Ready=True`
    async fn get_ready_replicas(&self, namespace: &str, name: &str) -> Result<u32, ClientError> {
        let pods = self.list_pods_for_workload(namespace, name).await?;
        let ready = pods
            .iter()
            .filter(|p| is_controlled_by(p, name) && is_pod_ready(p))
            .count();
        Ok(ready as u32)
    }

    async fn service_exists(&self, namespace: &str, name: &str) -> Result<bool, ClientError> {
        match self.get_service(namespace, name).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn workload_exists(&self, namespace: &str, name: &str) -> Result<bool, ClientError> {
        match self.get_workload(namespace, name).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// True when mutations are only logged; polling loops must not wait on them
    fn is_dry_run(&self) -> bool {
        false
    }

    /// Metadata of every resource of `kind` matching `selector` in a namespace
    async fn list_by_label_selector(
        &self,
        kind: ResourceKind,
        namespace: &str,
        selector: &str,
    ) -> Result<Vec<ObjectMeta>, ClientError> {
        match kind {
            ResourceKind::Service => Ok(self
                .list_services(Some(namespace), selector)
                .await?
                .into_iter()
                .map(|s| s.metadata)
                .collect()),
            ResourceKind::Workload => Ok(self
                .list_workloads(Some(namespace), selector)
                .await?
                .into_iter()
                .map(|w| w.metadata)
                .collect()),
            ResourceKind::Pod => Err(ClientError::RequestFailed {
                status: None,
                detail: "pods are listed through their workload selector".to_string(),
            }),
        }
    }
}
