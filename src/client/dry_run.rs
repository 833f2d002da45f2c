//! Dry-run `ResourceClient`
//!
//! Reads go to the wrapped client so version checks and pre-flight see the
//! real cluster. Every mutating call is logged with the document it would
//! have sent and then skipped.

use super::{document_name, ClientError, PodPolicy, ResourceClient};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Pod, ReplicationController, Service};
use serde_json::Value;
use std::sync::Arc;
use tracing::info;

pub struct DryRunClient {
    inner: Arc<dyn ResourceClient>,
}

impl DryRunClient {
    pub fn new(inner: Arc<dyn ResourceClient>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl ResourceClient for DryRunClient {
    async fn create_workload(&self, namespace: &str, spec: &Value) -> Result<(), ClientError> {
        info!(namespace, workload = %document_name(spec), document = %spec, "Dry run: skipping create");
        Ok(())
    }

    async fn create_service(&self, namespace: &str, spec: &Value) -> Result<(), ClientError> {
        info!(namespace, service = %document_name(spec), document = %spec, "Dry run: skipping create");
        Ok(())
    }

    async fn get_workload(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<ReplicationController, ClientError> {
        self.inner.get_workload(namespace, name).await
    }

    async fn replace_workload(
        &self,
        namespace: &str,
        name: &str,
        spec: &Value,
    ) -> Result<(), ClientError> {
        info!(namespace, workload = name, document = %spec, "Dry run: skipping replace");
        Ok(())
    }

    async fn delete_workload(
        &self,
        namespace: &str,
        name: &str,
        pods: PodPolicy,
    ) -> Result<(), ClientError> {
        info!(namespace, workload = name, ?pods, "Dry run: skipping delete");
        Ok(())
    }

    async fn delete_service(&self, namespace: &str, name: &str) -> Result<(), ClientError> {
        info!(namespace, service = name, "Dry run: skipping delete");
        Ok(())
    }

    async fn set_spec_replicas(
        &self,
        namespace: &str,
        name: &str,
        replicas: u32,
    ) -> Result<(), ClientError> {
        info!(namespace, workload = name, replicas, "Dry run: skipping scale");
        Ok(())
    }

    async fn list_pods_for_workload(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Vec<Pod>, ClientError> {
        self.inner.list_pods_for_workload(namespace, name).await
    }

    async fn get_service(&self, namespace: &str, name: &str) -> Result<Service, ClientError> {
        self.inner.get_service(namespace, name).await
    }

    async fn replace_service(
        &self,
        namespace: &str,
        name: &str,
        spec: &Value,
    ) -> Result<(), ClientError> {
        info!(namespace, service = name, document = %spec, "Dry run: skipping replace");
        Ok(())
    }

    async fn patch_service_metadata(
        &self,
        namespace: &str,
        name: &str,
        doc: &Value,
    ) -> Result<(), ClientError> {
        info!(namespace, service = name, document = %doc, "Dry run: skipping patch");
        Ok(())
    }

    async fn list_services(
        &self,
        namespace: Option<&str>,
        selector: &str,
    ) -> Result<Vec<Service>, ClientError> {
        self.inner.list_services(namespace, selector).await
    }

    async fn list_workloads(
        &self,
        namespace: Option<&str>,
        selector: &str,
    ) -> Result<Vec<ReplicationController>, ClientError> {
        self.inner.list_workloads(namespace, selector).await
    }

    fn is_dry_run(&self) -> bool {
        true
    }
}
