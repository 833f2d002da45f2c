//! Wait-for-zero-replicas deletion
//!
//! A Workload is never deleted while it still has pods: it is scaled to zero,
//! the server-reported replica count is polled until it drains, and only then
//! is the Workload itself deleted. Services are deleted directly.
//!
//! Batches are processed one resource at a time, Services first, in the order
//! given. The first failure aborts the rest of the batch; nothing already
//! deleted is restored.

use super::poll::Poller;
use super::{Context, LifecycleError};
use crate::client::{PodPolicy, ResourceKind};
use std::collections::BTreeSet;
use tracing::{debug, info};

pub struct DeletionStrategy<'a> {
    ctx: &'a Context,
}

impl<'a> DeletionStrategy<'a> {
    pub fn new(ctx: &'a Context) -> Self {
        Self { ctx }
    }

    pub async fn delete_service(&self, namespace: &str, name: &str) -> Result<(), LifecycleError> {
        info!(namespace, service = name, "Deleting Service");
        self.ctx.client.delete_service(namespace, name).await?;
        Ok(())
    }

    /// Scale to zero, wait for the pods to go away, then delete
    pub async fn delete_workload(&self, namespace: &str, name: &str) -> Result<(), LifecycleError> {
        info!(namespace, workload = name, "Scaling Workload to zero before deletion");
        self.ctx.client.set_spec_replicas(namespace, name, 0).await?;

        if self.ctx.client.is_dry_run() {
            info!(namespace, workload = name, "Dry run: not waiting for the drain");
        } else {
            self.wait_for_drain(namespace, name).await?;
        }

        self.ctx
            .client
            .delete_workload(namespace, name, PodPolicy::Cascade)
            .await?;
        Ok(())
    }

    async fn wait_for_drain(&self, namespace: &str, name: &str) -> Result<(), LifecycleError> {
        let mut poller = Poller::new(format!("drain of '{}'", name), &self.ctx.settings.poll);
        loop {
            // Active pods, ready or not; pods already terminating are not counted
            let remaining = self.ctx.client.get_status_replicas(namespace, name).await?;
            if remaining == 0 {
                break;
            }
            debug!(namespace, workload = name, remaining, "Waiting for Workload to drain");
            poller.sleep().await?;
        }

        info!(
            namespace,
            workload = name,
            polls = poller.sleeps(),
            "Workload drained, deleting"
        );
        Ok(())
    }

    /// Delete every listed Service, then every listed Workload
    pub async fn delete_all(
        &self,
        namespace: &str,
        services: &[String],
        workloads: &[String],
    ) -> Result<(), LifecycleError> {
        for name in services {
            self.delete_service(namespace, name).await?;
        }
        for name in workloads {
            self.delete_workload(namespace, name).await?;
        }
        Ok(())
    }

    /// Delete every Service and Workload matching `selector`, except the kept names
    ///
    /// Returns the names deleted, Services first.
    pub async fn delete_labelled(
        &self,
        namespace: &str,
        selector: &str,
        keep_services: &BTreeSet<String>,
        keep_workloads: &BTreeSet<String>,
    ) -> Result<Vec<String>, LifecycleError> {
        let services = self
            .labelled_names(ResourceKind::Service, namespace, selector, keep_services)
            .await?;
        let workloads = self
            .labelled_names(ResourceKind::Workload, namespace, selector, keep_workloads)
            .await?;

        self.delete_all(namespace, &services, &workloads).await?;
        Ok(services.into_iter().chain(workloads).collect())
    }

    async fn labelled_names(
        &self,
        kind: ResourceKind,
        namespace: &str,
        selector: &str,
        keep: &BTreeSet<String>,
    ) -> Result<Vec<String>, LifecycleError> {
        let mut names: Vec<String> = self
            .ctx
            .client
            .list_by_label_selector(kind, namespace, selector)
            .await?
            .into_iter()
            .filter_map(|meta| meta.name)
            .filter(|name| !keep.contains(name))
            .collect();
        names.sort();
        Ok(names)
    }
}
