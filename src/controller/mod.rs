//! Deployment lifecycle engine
//!
//! - `deletion`: scale-to-zero drain before deleting a Workload
//! - `services`: create-or-update of Services, carrying immutable fields forward
//! - `rolling`: staged hand-off from one Workload generation to the next
//! - `strategies`: the closed set of upgrade strategies
//! - `version`: which version of a kubeware is deployed, and may we move to another
//! - `operations`: deploy / upgrade / delete / list entry points

pub mod deletion;
pub mod error;
pub mod labels;
pub mod operations;
pub mod poll;
pub mod rolling;
pub mod services;
pub mod strategies;
pub mod version;

pub use error::{LifecycleError, VersionConflict};
pub use operations::{
    delete, deploy, list, upgrade, KubewareSummary, ServiceSummary, Upgraded, WorkloadSummary,
};
pub use strategies::{select_strategy, StrategyName, UpgradeStrategy};

use crate::client::ResourceClient;
use crate::config::LifecycleSettings;
use std::sync::Arc;

/// Everything an operation needs: the cluster seam and the tunables
pub struct Context {
    pub client: Arc<dyn ResourceClient>,
    pub settings: LifecycleSettings,
}

impl Context {
    pub fn new(client: Arc<dyn ResourceClient>, settings: LifecycleSettings) -> Self {
        Self { client, settings }
    }
}
