use crate::client::ClientError;
use std::time::Duration;
use thiserror::Error;

/// Version gate rejections
#[derive(Debug, Error, PartialEq, Eq)]
pub enum VersionConflict {
    #[error("kubeware '{name}' is already deployed in namespace '{namespace}' (version {deployed})")]
    AlreadyDeployed {
        namespace: String,
        name: String,
        deployed: String,
    },

    #[error("kubeware '{name}' is not currently deployed in namespace '{namespace}'")]
    NotDeployed { namespace: String, name: String },

    #[error("kubeware '{name}' in namespace '{namespace}': requested version {requested} is older than deployed version {deployed}")]
    Downgrade {
        namespace: String,
        name: String,
        deployed: String,
        requested: String,
    },
}

/// Errors raised by the lifecycle engine
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error(transparent)]
    Client(#[from] ClientError),

    #[error("Malformed document: {0}")]
    MalformedDocument(String),

    #[error(transparent)]
    VersionConflict(#[from] VersionConflict),

    #[error("Inconsistent cluster state: {0}")]
    InconsistentState(String),

    #[error("{operation} did not complete within {elapsed:?}")]
    DeadlineExceeded { operation: String, elapsed: Duration },

    #[error("{operation} cancelled")]
    Cancelled { operation: String },

    #[error(
        "Rolling upgrade of '{workload}' stalled: old {old_ready}/{old_spec} ready, \
         new {new_ready}/{new_spec} ready, target {target}, max excess {max_excess}"
    )]
    Stalled {
        workload: String,
        old_ready: u32,
        old_spec: u32,
        new_ready: u32,
        new_spec: u32,
        target: u32,
        max_excess: u32,
    },

    #[error("Unknown upgrade strategy '{0}' (expected recreateAll, rollPreserveServices or rollReplaceServices)")]
    UnknownStrategy(String),

    #[error("Invalid kubeware: {0}")]
    InvalidKubeware(String),
}

impl LifecycleError {
    /// The underlying 404, if this is one
    pub fn is_not_found(&self) -> bool {
        matches!(self, LifecycleError::Client(e) if e.is_not_found())
    }
}
