//! kube-rs backed `ResourceClient`

use super::{document_name, from_document, selector_string, ClientError, PodPolicy, ResourceClient, ResourceKind};
use crate::config::ClusterConfig;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Pod, ReplicationController, Service};
use kube::api::{Api, DeleteParams, ListParams, Patch, PatchParams, PostParams, PropagationPolicy};
use kube::Client;
use serde_json::Value;
use tracing::{debug, info};

/// Resource client talking to a real API server
#[derive(Clone)]
pub struct KubeResourceClient {
    client: Client,
}

impl KubeResourceClient {
    /// Build a client from an explicit cluster configuration
    ///
    /// Without an endpoint the kubeconfig / in-cluster environment is inferred
    /// the same way `kubectl` does.
    pub async fn connect(config: &ClusterConfig) -> Result<Self, ClientError> {
        let mut kube_config = match &config.endpoint {
            Some(endpoint) => {
                let cluster_url = endpoint.parse().ok().ok_or_else(|| ClientError::RequestFailed {
                    status: None,
                    detail: format!("invalid cluster endpoint '{}'", endpoint),
                })?;
                kube::Config::new(cluster_url)
            }
            None => kube::Config::infer()
                .await
                .map_err(|e| ClientError::RequestFailed {
                    status: None,
                    detail: format!("could not load cluster configuration: {}", e),
                })?,
        };

        if config.accept_invalid_certs {
            kube_config.accept_invalid_certs = true;
        }

        info!(
            cluster = %kube_config.cluster_url,
            insecure = config.accept_invalid_certs,
            "Connecting to Kubernetes cluster"
        );

        let client = Client::try_from(kube_config).map_err(|e| ClientError::RequestFailed {
            status: None,
            detail: format!("could not build cluster client: {}", e),
        })?;

        Ok(Self { client })
    }

    fn workloads(&self, namespace: &str) -> Api<ReplicationController> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn services(&self, namespace: &str) -> Api<Service> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn pods(&self, namespace: &str) -> Api<Pod> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

/// Map a kube error onto the client taxonomy (404 is the only recoverable case)
fn map_kube_error(kind: ResourceKind, name: &str, error: kube::Error) -> ClientError {
    match error {
        kube::Error::Api(err) if err.code == 404 => ClientError::not_found(kind, name),
        kube::Error::Api(err) => ClientError::RequestFailed {
            status: Some(err.code),
            detail: format!("{} '{}': {}", kind, name, err.message),
        },
        other => ClientError::RequestFailed {
            status: None,
            detail: format!("{} '{}': {}", kind, name, other),
        },
    }
}

fn list_params(selector: &str) -> ListParams {
    if selector.is_empty() {
        ListParams::default()
    } else {
        ListParams::default().labels(selector)
    }
}

#[async_trait]
impl ResourceClient for KubeResourceClient {
    async fn create_workload(&self, namespace: &str, spec: &Value) -> Result<(), ClientError> {
        let name = document_name(spec);
        let rc: ReplicationController = from_document(spec)?;
        debug!(namespace, workload = %name, "POST replicationcontroller");
        self.workloads(namespace)
            .create(&PostParams::default(), &rc)
            .await
            .map_err(|e| map_kube_error(ResourceKind::Workload, &name, e))?;
        Ok(())
    }

    async fn create_service(&self, namespace: &str, spec: &Value) -> Result<(), ClientError> {
        let name = document_name(spec);
        let svc: Service = from_document(spec)?;
        debug!(namespace, service = %name, "POST service");
        self.services(namespace)
            .create(&PostParams::default(), &svc)
            .await
            .map_err(|e| map_kube_error(ResourceKind::Service, &name, e))?;
        Ok(())
    }

    async fn get_workload(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<ReplicationController, ClientError> {
        self.workloads(namespace)
            .get(name)
            .await
            .map_err(|e| map_kube_error(ResourceKind::Workload, name, e))
    }

    async fn replace_workload(
        &self,
        namespace: &str,
        name: &str,
        spec: &Value,
    ) -> Result<(), ClientError> {
        let rc: ReplicationController = from_document(spec)?;
        debug!(namespace, workload = name, "PUT replicationcontroller");
        self.workloads(namespace)
            .replace(name, &PostParams::default(), &rc)
            .await
            .map_err(|e| map_kube_error(ResourceKind::Workload, name, e))?;
        Ok(())
    }

    async fn delete_workload(
        &self,
        namespace: &str,
        name: &str,
        pods: PodPolicy,
    ) -> Result<(), ClientError> {
        let propagation = match pods {
            PodPolicy::Cascade => PropagationPolicy::Background,
            PodPolicy::Orphan => PropagationPolicy::Orphan,
        };
        let params = DeleteParams {
            propagation_policy: Some(propagation),
            ..Default::default()
        };
        debug!(namespace, workload = name, pods = ?pods, "DELETE replicationcontroller");
        self.workloads(namespace)
            .delete(name, &params)
            .await
            .map_err(|e| map_kube_error(ResourceKind::Workload, name, e))?;
        Ok(())
    }

    async fn delete_service(&self, namespace: &str, name: &str) -> Result<(), ClientError> {
        debug!(namespace, service = name, "DELETE service");
        self.services(namespace)
            .delete(name, &DeleteParams::default())
            .await
            .map_err(|e| map_kube_error(ResourceKind::Service, name, e))?;
        Ok(())
    }

    async fn set_spec_replicas(
        &self,
        namespace: &str,
        name: &str,
        replicas: u32,
    ) -> Result<(), ClientError> {
        let scale_patch = serde_json::json!({
            "spec": {
                "replicas": replicas
            }
        });
        debug!(namespace, workload = name, replicas, "PATCH replicationcontroller");
        self.workloads(namespace)
            .patch(name, &PatchParams::default(), &Patch::Merge(&scale_patch))
            .await
            .map_err(|e| map_kube_error(ResourceKind::Workload, name, e))?;
        Ok(())
    }

    async fn list_pods_for_workload(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Vec<Pod>, ClientError> {
        let rc = self.get_workload(namespace, name).await?;
        let spec = rc.spec.unwrap_or_default();

        // An RC without an explicit selector selects on its template labels
        let selector = spec
            .selector
            .filter(|s| !s.is_empty())
            .or_else(|| spec.template.and_then(|t| t.metadata).and_then(|m| m.labels))
            .unwrap_or_default();

        if selector.is_empty() {
            return Err(ClientError::MalformedDocument(format!(
                "ReplicationController '{}' has no pod selector",
                name
            )));
        }

        let selector = selector_string(&selector);
        debug!(namespace, workload = name, selector = %selector, "GET pods");
        let pods = self
            .pods(namespace)
            .list(&list_params(&selector))
            .await
            .map_err(|e| map_kube_error(ResourceKind::Pod, name, e))?;
        Ok(pods.items)
    }

    async fn get_service(&self, namespace: &str, name: &str) -> Result<Service, ClientError> {
        self.services(namespace)
            .get(name)
            .await
            .map_err(|e| map_kube_error(ResourceKind::Service, name, e))
    }

    async fn replace_service(
        &self,
        namespace: &str,
        name: &str,
        spec: &Value,
    ) -> Result<(), ClientError> {
        let svc: Service = from_document(spec)?;
        debug!(namespace, service = name, "PUT service");
        self.services(namespace)
            .replace(name, &PostParams::default(), &svc)
            .await
            .map_err(|e| map_kube_error(ResourceKind::Service, name, e))?;
        Ok(())
    }

    async fn patch_service_metadata(
        &self,
        namespace: &str,
        name: &str,
        doc: &Value,
    ) -> Result<(), ClientError> {
        debug!(namespace, service = name, "PATCH service metadata");
        self.services(namespace)
            .patch(name, &PatchParams::default(), &Patch::Merge(doc))
            .await
            .map_err(|e| map_kube_error(ResourceKind::Service, name, e))?;
        Ok(())
    }

    async fn list_services(
        &self,
        namespace: Option<&str>,
        selector: &str,
    ) -> Result<Vec<Service>, ClientError> {
        let api: Api<Service> = match namespace {
            Some(ns) => self.services(ns),
            None => Api::all(self.client.clone()),
        };
        let list = api
            .list(&list_params(selector))
            .await
            .map_err(|e| map_kube_error(ResourceKind::Service, selector, e))?;
        Ok(list.items)
    }

    async fn list_workloads(
        &self,
        namespace: Option<&str>,
        selector: &str,
    ) -> Result<Vec<ReplicationController>, ClientError> {
        let api: Api<ReplicationController> = match namespace {
            Some(ns) => self.workloads(ns),
            None => Api::all(self.client.clone()),
        };
        let list = api
            .list(&list_params(selector))
            .await
            .map_err(|e| map_kube_error(ResourceKind::Workload, selector, e))?;
        Ok(list.items)
    }
}
