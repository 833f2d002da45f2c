//! Which version of a kubeware is deployed, and may it move to another
//!
//! The deployed version is whatever `kubeware-version` label the kubeware's
//! Services and Workloads agree on. Disagreement means an earlier operation
//! stopped half way and is reported, never repaired.

use super::labels::kubeware_of;
use super::{LifecycleError, VersionConflict};
use crate::client::{ResourceClient, ResourceKind};
use crate::kubeware::{name_selector, parse_version, KubewareRef};
use std::collections::BTreeSet;
use tracing::debug;

pub struct VersionGate<'a> {
    client: &'a dyn ResourceClient,
}

impl<'a> VersionGate<'a> {
    pub fn new(client: &'a dyn ResourceClient) -> Self {
        Self { client }
    }

    /// The single version deployed under `kubeware=<name>`, if any
    ///
    /// # Errors
    /// `InconsistentState` when more than one version is found, or when a
    /// resource carries the name label without a version label.
    pub async fn find_deployed_version(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<String>, LifecycleError> {
        let selector = name_selector(name);
        let mut found = self
            .client
            .list_by_label_selector(ResourceKind::Service, namespace, &selector)
            .await?;
        found.extend(
            self.client
                .list_by_label_selector(ResourceKind::Workload, namespace, &selector)
                .await?,
        );

        let mut versions = BTreeSet::new();
        for meta in &found {
            if let Some(reference) = kubeware_of(meta)? {
                versions.insert(reference.version);
            }
        }
        debug!(namespace, kubeware = name, resources = found.len(), ?versions, "Deployed versions");

        match versions.len() {
            0 => Ok(None),
            1 => Ok(versions.into_iter().next()),
            _ => Err(LifecycleError::InconsistentState(format!(
                "kubeware '{}' in namespace '{}' has resources at several versions: {}",
                name,
                namespace,
                versions.into_iter().collect::<Vec<_>>().join(", ")
            ))),
        }
    }

    /// A deploy needs a name nothing is deployed under
    pub async fn check_deploy(
        &self,
        namespace: &str,
        requested: &KubewareRef,
    ) -> Result<(), LifecycleError> {
        match self.find_deployed_version(namespace, &requested.name).await? {
            None => Ok(()),
            Some(deployed) => Err(VersionConflict::AlreadyDeployed {
                namespace: namespace.to_string(),
                name: requested.name.clone(),
                deployed,
            }
            .into()),
        }
    }

    /// An upgrade needs something deployed, at a version not newer than requested
    ///
    /// Returns the deployed version.
    pub async fn check_upgrade(
        &self,
        namespace: &str,
        requested: &KubewareRef,
    ) -> Result<String, LifecycleError> {
        let deployed = self
            .find_deployed_version(namespace, &requested.name)
            .await?
            .ok_or_else(|| VersionConflict::NotDeployed {
                namespace: namespace.to_string(),
                name: requested.name.clone(),
            })?;

        check_not_older(namespace, &requested.name, &deployed, &requested.version)?;
        Ok(deployed)
    }
}

/// Reject `requested` if it orders before `deployed`
pub fn check_not_older(
    namespace: &str,
    name: &str,
    deployed: &str,
    requested: &str,
) -> Result<(), LifecycleError> {
    let deployed_version = parse_version(deployed).ok_or_else(|| {
        LifecycleError::InconsistentState(format!(
            "deployed version '{}' of kubeware '{}' is not a semantic version",
            deployed, name
        ))
    })?;
    let requested_version = parse_version(requested).ok_or_else(|| {
        LifecycleError::InvalidKubeware(format!("version '{}' is not a semantic version", requested))
    })?;

    if requested_version < deployed_version {
        return Err(VersionConflict::Downgrade {
            namespace: namespace.to_string(),
            name: name.to_string(),
            deployed: deployed.to_string(),
            requested: requested.to_string(),
        }
        .into());
    }
    Ok(())
}
