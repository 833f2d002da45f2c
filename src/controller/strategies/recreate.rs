//! Recreate strategy
//!
//! Drains and deletes everything currently labelled with the kubeware name,
//! then creates the new version from scratch. No hand-off: the application is
//! down between the last delete and the first new pod becoming Ready.

use super::{UpgradeReport, UpgradeStrategy};
use crate::controller::deletion::DeletionStrategy;
use crate::controller::labels::document_name;
use crate::controller::services::ServiceAction;
use crate::controller::{Context, LifecycleError};
use crate::kubeware::{name_selector, Kubeware};
use async_trait::async_trait;
use std::collections::BTreeSet;
use tracing::info;

pub struct RecreateStrategyHandler;

#[async_trait]
impl UpgradeStrategy for RecreateStrategyHandler {
    fn name(&self) -> &'static str {
        "recreateAll"
    }

    async fn upgrade(
        &self,
        kubeware: &Kubeware,
        namespace: &str,
        ctx: &Context,
    ) -> Result<UpgradeReport, LifecycleError> {
        info!(
            namespace,
            kubeware = %kubeware.reference(),
            strategy = self.name(),
            "Deleting current version before recreate"
        );
        let mut report = UpgradeReport {
            pruned: DeletionStrategy::new(ctx)
                .delete_labelled(
                    namespace,
                    &name_selector(&kubeware.name),
                    &BTreeSet::new(),
                    &BTreeSet::new(),
                )
                .await?,
            ..Default::default()
        };

        for doc in kubeware.services.values() {
            let name = document_name(doc)?;
            info!(namespace, service = name, "Creating Service");
            ctx.client.create_service(namespace, doc).await?;
            report.services.insert(name.to_string(), ServiceAction::Created);
        }

        for doc in kubeware.workloads.values() {
            let name = document_name(doc)?;
            info!(namespace, workload = name, "Creating Workload");
            ctx.client.create_workload(namespace, doc).await?;
            report.created.push(name.to_string());
        }

        Ok(report)
    }
}
