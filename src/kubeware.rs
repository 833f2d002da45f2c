//! Kubeware bundle model
//!
//! The template fetchers and renderers hand the engine a fully rendered bundle:
//! a name, a version and two maps of JSON documents keyed by logical resource
//! name. `BTreeMap` keeps processing order deterministic.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Label carrying the kubeware name on every managed Service and Workload
pub const LABEL_KUBEWARE: &str = "kubeware";

/// Label carrying the kubeware version on every managed Service and Workload
pub const LABEL_KUBEWARE_VERSION: &str = "kubeware-version";

/// Name/version pair identifying one deployed generation of a kubeware
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct KubewareRef {
    pub name: String,
    pub version: String,
}

impl KubewareRef {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }
}

impl std::fmt::Display for KubewareRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.name, self.version)
    }
}

/// `kubeware=<name>`
pub fn name_selector(name: &str) -> String {
    format!("{}={}", LABEL_KUBEWARE, name)
}

/// A rendered kubeware bundle ready to be applied
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Kubeware {
    pub name: String,

    pub version: String,

    /// Service documents keyed by logical name
    #[serde(default)]
    pub services: BTreeMap<String, Value>,

    /// ReplicationController documents keyed by logical name
    #[serde(default)]
    pub workloads: BTreeMap<String, Value>,
}

impl Kubeware {
    pub fn reference(&self) -> KubewareRef {
        KubewareRef::new(&self.name, &self.version)
    }
}

/// Validate a rendered bundle before anything touches the cluster
///
/// # Validation Rules
/// - name and version are valid label values (the labels are stamped onto resources)
/// - version parses as a semantic version (see [`parse_version`])
/// - every workload document has a non-negative integer `spec.replicas`
/// - every document is a JSON object
pub fn validate_kubeware(kubeware: &Kubeware) -> Result<(), String> {
    if kubeware.name.is_empty() {
        return Err("kubeware name cannot be empty".to_string());
    }
    if !is_valid_label_value(&kubeware.name) {
        return Err(format!(
            "kubeware name '{}' is not a valid label value",
            kubeware.name
        ));
    }

    if kubeware.version.is_empty() {
        return Err("kubeware version cannot be empty".to_string());
    }
    if !is_valid_label_value(&kubeware.version) {
        return Err(format!(
            "kubeware version '{}' is not a valid label value",
            kubeware.version
        ));
    }
    if parse_version(&kubeware.version).is_none() {
        return Err(format!(
            "kubeware version '{}' is not a semantic version",
            kubeware.version
        ));
    }

    for (name, doc) in &kubeware.services {
        if !doc.is_object() {
            return Err(format!("service '{}' is not a JSON object", name));
        }
    }

    for (name, doc) in &kubeware.workloads {
        if !doc.is_object() {
            return Err(format!("workload '{}' is not a JSON object", name));
        }
        match doc.pointer("/spec/replicas").and_then(Value::as_u64) {
            Some(_) => {}
            None => {
                return Err(format!(
                    "workload '{}' must declare a non-negative integer spec.replicas",
                    name
                ));
            }
        }
    }

    Ok(())
}

/// Check a string against the Kubernetes label value grammar
///
/// At most 63 characters, alphanumerics plus `-`, `_` and `.`, beginning and
/// ending with an alphanumeric.
pub fn is_valid_label_value(value: &str) -> bool {
    if value.is_empty() || value.len() > 63 {
        return false;
    }
    let bytes = value.as_bytes();
    let alnum = |b: &u8| b.is_ascii_alphanumeric();
    if !alnum(&bytes[0]) || !alnum(&bytes[bytes.len() - 1]) {
        return false;
    }
    bytes
        .iter()
        .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.'))
}

/// Parse a kubeware version leniently
///
/// Bundles commonly carry short versions such as `"1"` or `"1.2"`, and
/// sometimes a leading `v`. Missing minor/patch components are treated as zero,
/// so `"1"` orders equal to `"1.0.0"`. Pre-release and build suffixes follow
/// semver rules.
///
/// # Examples
/// ```
/// use kdeploy::kubeware::parse_version;
///
/// assert_eq!(parse_version("1").unwrap().to_string(), "1.0.0");
/// assert_eq!(parse_version("v1.2").unwrap().to_string(), "1.2.0");
/// assert!(parse_version("latest").is_none());
/// ```
pub fn parse_version(version: &str) -> Option<semver::Version> {
    let trimmed = version.trim();
    let trimmed = trimmed.strip_prefix('v').unwrap_or(trimmed);

    let split_at = trimmed.find(['-', '+']).unwrap_or(trimmed.len());
    let (core, suffix) = trimmed.split_at(split_at);

    let parts: Vec<&str> = core.split('.').collect();
    if parts.is_empty() || parts.len() > 3 {
        return None;
    }
    if parts
        .iter()
        .any(|p| p.is_empty() || !p.bytes().all(|b| b.is_ascii_digit()))
    {
        return None;
    }

    let mut padded = parts.join(".");
    for _ in parts.len()..3 {
        padded.push_str(".0");
    }
    padded.push_str(suffix);

    semver::Version::parse(&padded).ok()
}
