//! Stamping kubeware labels onto rendered documents
//!
//! Every Service and Workload of a kubeware carries `kubeware=<name>` and
//! `kubeware-version=<version>`. Workload pod templates get the same pair so
//! that pods of different generations are told apart by selector.

use super::LifecycleError;
use crate::kubeware::{Kubeware, KubewareRef, LABEL_KUBEWARE, LABEL_KUBEWARE_VERSION};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde_json::{Map, Value};

/// Walk (creating as needed) a chain of object keys
fn object_at<'a>(
    doc: &'a mut Value,
    path: &[&str],
    what: &str,
) -> Result<&'a mut Map<String, Value>, LifecycleError> {
    let mut current = doc;
    for key in path {
        let obj = current.as_object_mut().ok_or_else(|| {
            LifecycleError::MalformedDocument(format!("{}: expected an object above '{}'", what, key))
        })?;
        current = obj
            .entry(key.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
    }
    current.as_object_mut().ok_or_else(|| {
        LifecycleError::MalformedDocument(format!("{}: '{}' is not an object", what, path.join(".")))
    })
}

fn insert_labels(labels: &mut Map<String, Value>, kubeware: &KubewareRef) {
    labels.insert(LABEL_KUBEWARE.to_string(), Value::String(kubeware.name.clone()));
    labels.insert(
        LABEL_KUBEWARE_VERSION.to_string(),
        Value::String(kubeware.version.clone()),
    );
}

/// Fill `metadata.name` from the logical name when the template left it out
fn ensure_name(doc: &mut Value, logical_name: &str, what: &str) -> Result<String, LifecycleError> {
    let metadata = object_at(doc, &["metadata"], what)?;
    match metadata.get("name").cloned() {
        Some(Value::String(name)) if !name.is_empty() => Ok(name),
        Some(Value::String(_)) | None => {
            metadata.insert("name".to_string(), Value::String(logical_name.to_string()));
            Ok(logical_name.to_string())
        }
        Some(other) => Err(LifecycleError::MalformedDocument(format!(
            "{}: metadata.name must be a string, got {}",
            what, other
        ))),
    }
}

/// Label a Service document
pub fn stamp_service(
    logical_name: &str,
    doc: &Value,
    kubeware: &KubewareRef,
) -> Result<Value, LifecycleError> {
    let what = format!("service '{}'", logical_name);
    let mut doc = doc.clone();
    ensure_name(&mut doc, logical_name, &what)?;
    insert_labels(object_at(&mut doc, &["metadata", "labels"], &what)?, kubeware);
    Ok(doc)
}

/// Label a Workload document, its pod template and (if explicit) its selector
pub fn stamp_workload(
    logical_name: &str,
    doc: &Value,
    kubeware: &KubewareRef,
) -> Result<Value, LifecycleError> {
    let what = format!("workload '{}'", logical_name);
    let mut doc = doc.clone();
    ensure_name(&mut doc, logical_name, &what)?;
    insert_labels(object_at(&mut doc, &["metadata", "labels"], &what)?, kubeware);
    insert_labels(
        object_at(&mut doc, &["spec", "template", "metadata", "labels"], &what)?,
        kubeware,
    );

    // Without an explicit selector the API server defaults it to the template labels
    let has_selector = doc
        .pointer("/spec/selector")
        .and_then(Value::as_object)
        .is_some_and(|s| !s.is_empty());
    if has_selector {
        insert_labels(object_at(&mut doc, &["spec", "selector"], &what)?, kubeware);
    }

    Ok(doc)
}

/// Stamp every document of a bundle
pub fn stamp_kubeware(kubeware: &Kubeware) -> Result<Kubeware, LifecycleError> {
    let reference = kubeware.reference();
    let services = kubeware
        .services
        .iter()
        .map(|(name, doc)| Ok((name.clone(), stamp_service(name, doc, &reference)?)))
        .collect::<Result<_, LifecycleError>>()?;
    let workloads = kubeware
        .workloads
        .iter()
        .map(|(name, doc)| Ok((name.clone(), stamp_workload(name, doc, &reference)?)))
        .collect::<Result<_, LifecycleError>>()?;

    Ok(Kubeware {
        name: kubeware.name.clone(),
        version: kubeware.version.clone(),
        services,
        workloads,
    })
}

/// `metadata.name` of a stamped document
pub fn document_name(doc: &Value) -> Result<&str, LifecycleError> {
    doc.pointer("/metadata/name")
        .and_then(Value::as_str)
        .ok_or_else(|| LifecycleError::MalformedDocument("document has no metadata.name".to_string()))
}

/// Read the kubeware labels back off a deployed resource
///
/// `Ok(None)` when the resource carries no `kubeware` label at all; an error
/// when it carries the name but not the version.
pub fn kubeware_of(meta: &ObjectMeta) -> Result<Option<KubewareRef>, LifecycleError> {
    let Some(labels) = meta.labels.as_ref() else {
        return Ok(None);
    };
    let Some(name) = labels.get(LABEL_KUBEWARE) else {
        return Ok(None);
    };
    match labels.get(LABEL_KUBEWARE_VERSION) {
        Some(version) => Ok(Some(KubewareRef::new(name, version))),
        None => Err(LifecycleError::InconsistentState(format!(
            "'{}' is labelled {}={} but has no {} label",
            meta.name.as_deref().unwrap_or("<unnamed>"),
            LABEL_KUBEWARE,
            name,
            LABEL_KUBEWARE_VERSION
        ))),
    }
}
