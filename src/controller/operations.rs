//! Kubeware operations: deploy, upgrade, delete, list
//!
//! Each operation validates its input, asks the version gate whether it may
//! proceed, and only then touches the cluster.

use super::deletion::DeletionStrategy;
use super::labels::{document_name, kubeware_of, stamp_kubeware};
use super::strategies::{select_strategy, StrategyName, UpgradeReport};
use super::version::VersionGate;
use super::{Context, LifecycleError, VersionConflict};
use crate::kubeware::{
    name_selector, validate_kubeware, Kubeware, KubewareRef, LABEL_KUBEWARE, LABEL_KUBEWARE_VERSION,
};
use std::collections::{BTreeMap, BTreeSet};
use tracing::info;

/// Result of a successful upgrade
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upgraded {
    pub previous_version: String,
    pub strategy: StrategyName,
    pub report: UpgradeReport,
}

/// Deploy a kubeware under a name nothing is deployed under yet
///
/// Services are created before Workloads, each in name order.
pub async fn deploy(ctx: &Context, kubeware: &Kubeware, namespace: &str) -> Result<(), LifecycleError> {
    validate_kubeware(kubeware).map_err(LifecycleError::InvalidKubeware)?;
    let reference = kubeware.reference();

    VersionGate::new(ctx.client.as_ref())
        .check_deploy(namespace, &reference)
        .await?;

    let stamped = stamp_kubeware(kubeware)?;
    info!(
        namespace,
        kubeware = %reference,
        services = stamped.services.len(),
        workloads = stamped.workloads.len(),
        "Deploying kubeware"
    );

    for doc in stamped.services.values() {
        info!(namespace, service = document_name(doc)?, "Creating Service");
        ctx.client.create_service(namespace, doc).await?;
    }
    for doc in stamped.workloads.values() {
        info!(namespace, workload = document_name(doc)?, "Creating Workload");
        ctx.client.create_workload(namespace, doc).await?;
    }

    info!(namespace, kubeware = %reference, "Kubeware deployed");
    Ok(())
}

/// Upgrade a deployed kubeware to the bundle's version
///
/// The requested version may equal the deployed one (a re-roll) but may not
/// be older.
pub async fn upgrade(
    ctx: &Context,
    kubeware: &Kubeware,
    namespace: &str,
    strategy: StrategyName,
) -> Result<Upgraded, LifecycleError> {
    validate_kubeware(kubeware).map_err(LifecycleError::InvalidKubeware)?;
    let reference = kubeware.reference();

    let previous_version = VersionGate::new(ctx.client.as_ref())
        .check_upgrade(namespace, &reference)
        .await?;

    let stamped = stamp_kubeware(kubeware)?;
    let handler = select_strategy(strategy);
    info!(
        namespace,
        kubeware = %reference,
        from = %previous_version,
        strategy = handler.name(),
        "Upgrading kubeware"
    );

    let report = handler.upgrade(&stamped, namespace, ctx).await?;

    info!(
        namespace,
        kubeware = %reference,
        rolled = report.rolled.len(),
        created = report.created.len(),
        services = report.services.len(),
        pruned = report.pruned.len(),
        "Kubeware upgraded"
    );
    Ok(Upgraded {
        previous_version,
        strategy,
        report,
    })
}

/// Delete every Service and Workload of a deployed kubeware
///
/// Returns the version that was deployed.
pub async fn delete(ctx: &Context, namespace: &str, name: &str) -> Result<String, LifecycleError> {
    let deployed = VersionGate::new(ctx.client.as_ref())
        .find_deployed_version(namespace, name)
        .await?
        .ok_or_else(|| VersionConflict::NotDeployed {
            namespace: namespace.to_string(),
            name: name.to_string(),
        })?;

    info!(namespace, kubeware = name, version = %deployed, "Deleting kubeware");
    let deleted = DeletionStrategy::new(ctx)
        .delete_labelled(namespace, &name_selector(name), &BTreeSet::new(), &BTreeSet::new())
        .await?;

    info!(namespace, kubeware = name, resources = deleted.len(), "Kubeware deleted");
    Ok(deployed)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceSummary {
    pub name: String,
    pub cluster_ip: Option<String>,
    /// First load balancer ingress hostname (or IP)
    pub external: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkloadSummary {
    pub name: String,
    pub spec_replicas: u32,
    pub status_replicas: u32,
}

/// One deployed kubeware, as found in the cluster
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KubewareSummary {
    pub namespace: String,
    pub name: String,
    pub version: String,
    pub services: Vec<ServiceSummary>,
    pub workloads: Vec<WorkloadSummary>,
}

/// Inventory of deployed kubewares, in one namespace or all of them
///
/// Resources missing either label are ignored. A kubeware whose resources
/// disagree on version is listed once per version.
pub async fn list(ctx: &Context, namespace: Option<&str>) -> Result<Vec<KubewareSummary>, LifecycleError> {
    let selector = format!("{},{}", LABEL_KUBEWARE, LABEL_KUBEWARE_VERSION);
    let mut grouped: BTreeMap<(String, String, String), KubewareSummary> = BTreeMap::new();

    for svc in ctx.client.list_services(namespace, &selector).await? {
        let Ok(Some(reference)) = kubeware_of(&svc.metadata) else {
            continue;
        };
        let spec = svc.spec.unwrap_or_default();
        let external = svc
            .status
            .and_then(|s| s.load_balancer)
            .and_then(|lb| lb.ingress)
            .and_then(|ingress| ingress.into_iter().next())
            .and_then(|i| i.hostname.or(i.ip));
        summary_for(&mut grouped, svc.metadata.namespace, reference)
            .services
            .push(ServiceSummary {
                name: svc.metadata.name.unwrap_or_default(),
                cluster_ip: spec.cluster_ip,
                external,
            });
    }

    for rc in ctx.client.list_workloads(namespace, &selector).await? {
        let Ok(Some(reference)) = kubeware_of(&rc.metadata) else {
            continue;
        };
        let spec_replicas = rc.spec.as_ref().and_then(|s| s.replicas).unwrap_or(0).max(0) as u32;
        let status_replicas = rc.status.as_ref().map(|s| s.replicas).unwrap_or(0).max(0) as u32;
        summary_for(&mut grouped, rc.metadata.namespace, reference)
            .workloads
            .push(WorkloadSummary {
                name: rc.metadata.name.unwrap_or_default(),
                spec_replicas,
                status_replicas,
            });
    }

    Ok(grouped.into_values().collect())
}

fn summary_for(
    grouped: &mut BTreeMap<(String, String, String), KubewareSummary>,
    namespace: Option<String>,
    reference: KubewareRef,
) -> &mut KubewareSummary {
    let namespace = namespace.unwrap_or_default();
    grouped
        .entry((namespace.clone(), reference.name.clone(), reference.version.clone()))
        .or_insert_with(|| KubewareSummary {
            namespace,
            name: reference.name,
            version: reference.version,
            services: Vec::new(),
            workloads: Vec::new(),
        })
}

#[cfg(test)]
#[path = "operations_test.rs"]
mod tests;
