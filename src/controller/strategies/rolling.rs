//! Rolling strategies
//!
//! Every declared Workload that is already running is handed over by the
//! rolling controller; one that is new in this version is simply created.
//! Services are then upserted in the handler's mode, and resources of the
//! kubeware that the new version no longer declares are drained and deleted.

use super::{UpgradeReport, UpgradeStrategy};
use crate::controller::deletion::DeletionStrategy;
use crate::controller::labels::document_name;
use crate::controller::rolling::RollingUpgradeController;
use crate::controller::services::{ServiceReconciler, ServiceUpdateMode};
use crate::controller::{Context, LifecycleError};
use crate::kubeware::{name_selector, Kubeware};
use async_trait::async_trait;
use std::collections::BTreeSet;
use tracing::info;

/// Rolling hand-off with Services either patched or replaced
pub struct RollingStrategyHandler {
    pub services: ServiceUpdateMode,
}

#[async_trait]
impl UpgradeStrategy for RollingStrategyHandler {
    fn name(&self) -> &'static str {
        match self.services {
            ServiceUpdateMode::MetadataOnly => "rollPreserveServices",
            ServiceUpdateMode::FullReplace => "rollReplaceServices",
        }
    }

    async fn upgrade(
        &self,
        kubeware: &Kubeware,
        namespace: &str,
        ctx: &Context,
    ) -> Result<UpgradeReport, LifecycleError> {
        let mut report = UpgradeReport::default();
        let mut declared_workloads = BTreeSet::new();
        let mut declared_services = BTreeSet::new();
        let roller = RollingUpgradeController::new(ctx);

        for doc in kubeware.workloads.values() {
            let name = document_name(doc)?;
            declared_workloads.insert(name.to_string());

            if ctx.client.workload_exists(namespace, name).await? {
                let summary = roller.roll(namespace, name, doc).await?;
                report.rolled.insert(name.to_string(), summary);
            } else {
                info!(namespace, workload = name, "Workload is new in this version, creating");
                ctx.client.create_workload(namespace, doc).await?;
                report.created.push(name.to_string());
            }
        }

        let reconciler = ServiceReconciler::new(ctx);
        for doc in kubeware.services.values() {
            let name = document_name(doc)?;
            declared_services.insert(name.to_string());
            let action = reconciler.upsert(namespace, name, doc, self.services).await?;
            report.services.insert(name.to_string(), action);
        }

        report.pruned = DeletionStrategy::new(ctx)
            .delete_labelled(
                namespace,
                &name_selector(&kubeware.name),
                &declared_services,
                &declared_workloads,
            )
            .await?;
        if !report.pruned.is_empty() {
            info!(namespace, pruned = ?report.pruned, "Deleted resources the new version no longer declares");
        }

        Ok(report)
    }
}
