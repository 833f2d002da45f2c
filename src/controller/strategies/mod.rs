//! Upgrade strategies
//!
//! - `RecreateStrategyHandler`: delete everything, create everything (downtime)
//! - `RollingStrategyHandler`: rolling hand-off per Workload, then Services
//!   either patched (metadata only) or fully replaced
//!
//! The strategy set is closed: names parse into [`StrategyName`] and
//! [`select_strategy`] maps each to its handler.

pub mod recreate;
pub mod rolling;

use super::rolling::RollSummary;
use super::services::{ServiceAction, ServiceUpdateMode};
use super::{Context, LifecycleError};
use crate::kubeware::Kubeware;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Known upgrade strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum StrategyName {
    RecreateAll,
    #[default]
    RollPreserveServices,
    RollReplaceServices,
}

impl StrategyName {
    pub const ALL: [StrategyName; 3] = [
        StrategyName::RecreateAll,
        StrategyName::RollPreserveServices,
        StrategyName::RollReplaceServices,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyName::RecreateAll => "recreateAll",
            StrategyName::RollPreserveServices => "rollPreserveServices",
            StrategyName::RollReplaceServices => "rollReplaceServices",
        }
    }
}

impl fmt::Display for StrategyName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StrategyName {
    type Err = LifecycleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        StrategyName::ALL
            .into_iter()
            .find(|name| name.as_str() == s)
            .ok_or_else(|| LifecycleError::UnknownStrategy(s.to_string()))
    }
}

/// What an upgrade did, per resource
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpgradeReport {
    /// Workloads handed over by the rolling controller
    pub rolled: BTreeMap<String, RollSummary>,
    /// Workloads created without a hand-off
    pub created: Vec<String>,
    /// Services and what was done to each
    pub services: BTreeMap<String, ServiceAction>,
    /// Resources of the previous version no longer declared, now deleted
    pub pruned: Vec<String>,
}

/// Strategy trait for upgrading a deployed kubeware
///
/// Implementations receive a bundle whose documents are already stamped with
/// the new version's labels, and a namespace the version gate has cleared.
#[async_trait]
pub trait UpgradeStrategy: Send + Sync {
    /// Strategy name for logging
    fn name(&self) -> &'static str;

    /// Move the namespace from the deployed version to `kubeware`
    ///
    /// # Errors
    /// The first failing cluster call aborts the upgrade. Work already done
    /// is not rolled back.
    async fn upgrade(
        &self,
        kubeware: &Kubeware,
        namespace: &str,
        ctx: &Context,
    ) -> Result<UpgradeReport, LifecycleError>;
}

/// Handler for a strategy name
pub fn select_strategy(name: StrategyName) -> Box<dyn UpgradeStrategy> {
    use self::recreate::RecreateStrategyHandler;
    use self::rolling::RollingStrategyHandler;

    match name {
        StrategyName::RecreateAll => Box::new(RecreateStrategyHandler),
        StrategyName::RollPreserveServices => Box::new(RollingStrategyHandler {
            services: ServiceUpdateMode::MetadataOnly,
        }),
        StrategyName::RollReplaceServices => Box::new(RollingStrategyHandler {
            services: ServiceUpdateMode::FullReplace,
        }),
    }
}
