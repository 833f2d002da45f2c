//! Service create-or-update
//!
//! Services are never rolled: an existing Service is either patched with new
//! metadata (labels, annotations) or fully replaced. A full replace must carry
//! the platform-assigned `clusterIP`, `resourceVersion` and per-port `nodePort`
//! forward from the deployed object, otherwise the API server rejects it or
//! silently allocates new node ports under existing load balancers.

use super::{Context, LifecycleError};
use k8s_openapi::api::core::v1::Service;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// How an existing Service is updated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceUpdateMode {
    /// Patch `{apiVersion, kind, metadata}` only; spec and ports are untouched
    MetadataOnly,
    /// Replace the whole object with immutable fields merged forward
    FullReplace,
}

/// What `upsert` did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceAction {
    Created,
    Patched,
    Replaced,
}

pub struct ServiceReconciler<'a> {
    ctx: &'a Context,
}

impl<'a> ServiceReconciler<'a> {
    pub fn new(ctx: &'a Context) -> Self {
        Self { ctx }
    }

    pub async fn upsert(
        &self,
        namespace: &str,
        name: &str,
        desired: &Value,
        mode: ServiceUpdateMode,
    ) -> Result<ServiceAction, LifecycleError> {
        let client = &self.ctx.client;

        if !client.service_exists(namespace, name).await? {
            info!(namespace, service = name, "Creating Service");
            client.create_service(namespace, desired).await?;
            return Ok(ServiceAction::Created);
        }

        match mode {
            ServiceUpdateMode::MetadataOnly => {
                info!(namespace, service = name, "Patching Service metadata");
                client
                    .patch_service_metadata(namespace, name, &metadata_only_document(desired))
                    .await?;
                Ok(ServiceAction::Patched)
            }
            ServiceUpdateMode::FullReplace => {
                let deployed = client.get_service(namespace, name).await?;
                let mut merged = desired.clone();
                merge_immutable_fields(&mut merged, &deployed)?;
                info!(namespace, service = name, "Replacing Service");
                client.replace_service(namespace, name, &merged).await?;
                Ok(ServiceAction::Replaced)
            }
        }
    }
}

/// `{apiVersion, kind, metadata}` of a document, nothing else
pub fn metadata_only_document(desired: &Value) -> Value {
    let mut doc = Map::new();
    for key in ["apiVersion", "kind", "metadata"] {
        if let Some(value) = desired.get(key) {
            doc.insert(key.to_string(), value.clone());
        }
    }
    Value::Object(doc)
}

/// Copy `clusterIP`, `resourceVersion` and matching `nodePort`s from the deployed Service
///
/// A desired port inherits the deployed `nodePort` of the deployed port with
/// the same `port` number. Ports that are new in the desired spec are left
/// for the server to allocate.
pub fn merge_immutable_fields(desired: &mut Value, deployed: &Service) -> Result<(), LifecycleError> {
    let malformed = |what: &str| LifecycleError::MalformedDocument(format!("service: {}", what));

    let doc = desired
        .as_object_mut()
        .ok_or_else(|| malformed("document is not an object"))?;

    if let Some(resource_version) = deployed.metadata.resource_version.as_ref() {
        doc.entry("metadata")
            .or_insert_with(|| Value::Object(Map::new()))
            .as_object_mut()
            .ok_or_else(|| malformed("metadata is not an object"))?
            .insert(
                "resourceVersion".to_string(),
                Value::String(resource_version.clone()),
            );
    }

    let Some(deployed_spec) = deployed.spec.as_ref() else {
        return Ok(());
    };
    let spec = doc
        .entry("spec")
        .or_insert_with(|| Value::Object(Map::new()))
        .as_object_mut()
        .ok_or_else(|| malformed("spec is not an object"))?;

    if let Some(cluster_ip) = deployed_spec.cluster_ip.as_ref() {
        spec.insert("clusterIP".to_string(), Value::String(cluster_ip.clone()));
    }

    let node_ports: BTreeMap<i32, i32> = deployed_spec
        .ports
        .iter()
        .flatten()
        .filter_map(|p| p.node_port.map(|node_port| (p.port, node_port)))
        .collect();
    if node_ports.is_empty() {
        return Ok(());
    }

    if let Some(ports) = spec.get_mut("ports") {
        let ports = ports
            .as_array_mut()
            .ok_or_else(|| malformed("spec.ports is not an array"))?;
        for port in ports.iter_mut() {
            let number = port.get("port").and_then(Value::as_i64);
            let Some(node_port) = number.and_then(|n| node_ports.get(&(n as i32))) else {
                continue;
            };
            let port = port
                .as_object_mut()
                .ok_or_else(|| malformed("spec.ports entry is not an object"))?;
            debug!(port = ?number, node_port, "Carrying nodePort forward");
            port.insert("nodePort".to_string(), Value::from(*node_port));
        }
    }

    Ok(())
}
