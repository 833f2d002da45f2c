//! In-memory cluster for tests
//!
//! Simulates just enough of the API server and the replication controller
//! manager for the lifecycle engine: pods with owner references and Ready
//! conditions, server-assigned Service fields, and rejection of replaces that
//! drop them. Pods only move when a Workload is read, so tests control time by
//! controlling reads.

use super::{from_document, ClientError, PodPolicy, ResourceClient, ResourceKind};
use crate::kubeware::Kubeware;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{
    LoadBalancerIngress, LoadBalancerStatus, Pod, PodCondition, PodStatus,
    ReplicationController, ReplicationControllerStatus, Service, ServiceStatus,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Mutex;

/// How simulated pods follow `spec.replicas`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Convergence {
    /// Every read of a Workload sees its pods fully converged and Ready
    Immediate,
    /// Every read moves one step: ready a pending pod, else add or remove one
    Stepwise,
    /// Pods never change after seeding
    Frozen,
}

/// A mutating call, as recorded by the fake
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    CreateWorkload(String),
    CreateService(String),
    ReplaceWorkload(String),
    DeleteWorkload(String, PodPolicy),
    DeleteService(String),
    SetSpecReplicas(String, u32),
    ReplaceService(String),
    PatchServiceMetadata(String),
}

impl Call {
    pub fn is_create(&self) -> bool {
        matches!(self, Call::CreateWorkload(_) | Call::CreateService(_))
    }
}

type FailurePredicate = Box<dyn Fn(&Call) -> bool + Send + Sync>;

#[derive(Debug, Clone)]
struct FakePod {
    name: String,
    namespace: String,
    labels: BTreeMap<String, String>,
    owner: Option<String>,
    ready: bool,
}

#[derive(Default)]
struct State {
    workloads: BTreeMap<(String, String), ReplicationController>,
    services: BTreeMap<(String, String), Service>,
    pods: Vec<FakePod>,
    calls: Vec<Call>,
    peak_ready: BTreeMap<String, u32>,
    deletes_with_live_pods: Vec<String>,
    created_workloads: BTreeMap<String, Value>,
    next_ip: u32,
    next_node_port: i32,
    next_resource_version: u64,
    next_pod: u64,
}

impl State {
    fn resource_version(&mut self) -> String {
        self.next_resource_version += 1;
        self.next_resource_version.to_string()
    }

    fn cluster_ip(&mut self) -> String {
        self.next_ip += 1;
        format!("10.0.{}.{}", self.next_ip / 250, self.next_ip % 250 + 1)
    }

    fn node_port(&mut self) -> i32 {
        let port = 30000 + self.next_node_port;
        self.next_node_port += 1;
        port
    }

    fn record_peak(&mut self, namespace: &str) {
        let ready = self
            .pods
            .iter()
            .filter(|p| p.namespace == namespace && p.ready)
            .count() as u32;
        let peak = self.peak_ready.entry(namespace.to_string()).or_insert(0);
        *peak = (*peak).max(ready);
    }

    fn spawn_pod(&mut self, namespace: &str, owner: &str, labels: BTreeMap<String, String>, ready: bool) {
        self.next_pod += 1;
        self.pods.push(FakePod {
            name: format!("{}-{}", owner, self.next_pod),
            namespace: namespace.to_string(),
            labels,
            owner: Some(owner.to_string()),
            ready,
        });
    }

    fn owned_count(&self, namespace: &str, name: &str) -> usize {
        self.pods
            .iter()
            .filter(|p| p.namespace == namespace && p.owner.as_deref() == Some(name))
            .count()
    }

    /// Let the simulated controller manager act on one Workload
    fn converge(&mut self, mode: Convergence, namespace: &str, name: &str) {
        if mode == Convergence::Frozen {
            return;
        }
        let key = (namespace.to_string(), name.to_string());
        let Some(rc) = self.workloads.get(&key) else {
            return;
        };
        let desired = desired_replicas(rc);
        let selector = workload_selector(rc);
        let template_labels = template_labels(rc);

        // Orphans matching the selector are adopted before anything is created
        if !selector.is_empty() {
            for pod in self.pods.iter_mut() {
                if pod.namespace == namespace && pod.owner.is_none() && labels_match(&selector, &pod.labels) {
                    pod.owner = Some(name.to_string());
                }
            }
        }

        match mode {
            Convergence::Immediate => {
                for pod in self.pods.iter_mut() {
                    if pod.namespace == namespace && pod.owner.as_deref() == Some(name) {
                        pod.ready = true;
                    }
                }
                while self.owned_count(namespace, name) > desired {
                    self.remove_one(namespace, name);
                }
                while self.owned_count(namespace, name) < desired {
                    self.spawn_pod(namespace, name, template_labels.clone(), true);
                }
            }
            Convergence::Stepwise => {
                let count = self.owned_count(namespace, name);
                let pending = self.pods.iter().position(|p| {
                    p.namespace == namespace && p.owner.as_deref() == Some(name) && !p.ready
                });
                if count > desired {
                    self.remove_one(namespace, name);
                } else if let Some(idx) = pending {
                    self.pods[idx].ready = true;
                } else if count < desired {
                    self.spawn_pod(namespace, name, template_labels, false);
                }
            }
            Convergence::Frozen => {}
        }

        self.record_peak(namespace);
    }

    fn remove_one(&mut self, namespace: &str, name: &str) {
        if let Some(idx) = self
            .pods
            .iter()
            .rposition(|p| p.namespace == namespace && p.owner.as_deref() == Some(name))
        {
            self.pods.remove(idx);
        }
    }

    fn observed(&self, namespace: &str, name: &str) -> Option<ReplicationController> {
        let mut rc = self
            .workloads
            .get(&(namespace.to_string(), name.to_string()))?
            .clone();
        let owned: Vec<&FakePod> = self
            .pods
            .iter()
            .filter(|p| p.namespace == namespace && p.owner.as_deref() == Some(name))
            .collect();
        rc.status = Some(ReplicationControllerStatus {
            replicas: owned.len() as i32,
            ready_replicas: Some(owned.iter().filter(|p| p.ready).count() as i32),
            ..Default::default()
        });
        Some(rc)
    }
}

fn desired_replicas(rc: &ReplicationController) -> usize {
    rc.spec
        .as_ref()
        .and_then(|s| s.replicas)
        .unwrap_or(0)
        .max(0) as usize
}

fn template_labels(rc: &ReplicationController) -> BTreeMap<String, String> {
    rc.spec
        .as_ref()
        .and_then(|s| s.template.as_ref())
        .and_then(|t| t.metadata.as_ref())
        .and_then(|m| m.labels.clone())
        .unwrap_or_default()
}

fn workload_selector(rc: &ReplicationController) -> BTreeMap<String, String> {
    rc.spec
        .as_ref()
        .and_then(|s| s.selector.clone())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| template_labels(rc))
}

fn labels_match(selector: &BTreeMap<String, String>, labels: &BTreeMap<String, String>) -> bool {
    selector.iter().all(|(k, v)| labels.get(k) == Some(v))
}

fn parse_selector(selector: &str) -> BTreeMap<String, String> {
    selector
        .split(',')
        .filter_map(|term| term.split_once('='))
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .collect()
}

fn metadata_matches(meta: &ObjectMeta, namespace: Option<&str>, selector: &BTreeMap<String, String>) -> bool {
    if let Some(ns) = namespace {
        if meta.namespace.as_deref() != Some(ns) {
            return false;
        }
    }
    let labels = meta.labels.clone().unwrap_or_default();
    labels_match(selector, &labels)
}

fn conflict(detail: String) -> ClientError {
    ClientError::RequestFailed {
        status: Some(409),
        detail,
    }
}

fn invalid(detail: String) -> ClientError {
    ClientError::RequestFailed {
        status: Some(422),
        detail,
    }
}

fn to_pod(pod: &FakePod) -> Pod {
    Pod {
        metadata: ObjectMeta {
            name: Some(pod.name.clone()),
            namespace: Some(pod.namespace.clone()),
            labels: Some(pod.labels.clone()),
            owner_references: pod.owner.as_ref().map(|owner| {
                vec![OwnerReference {
                    api_version: "v1".to_string(),
                    kind: "ReplicationController".to_string(),
                    name: owner.clone(),
                    uid: format!("uid-{}", owner),
                    controller: Some(true),
                    ..Default::default()
                }]
            }),
            ..Default::default()
        },
        status: Some(PodStatus {
            conditions: Some(vec![PodCondition {
                type_: "Ready".to_string(),
                status: if pod.ready { "True" } else { "False" }.to_string(),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// RFC 7386 JSON merge patch
fn merge_patch(target: &mut Value, patch: &Value) {
    match (target, patch) {
        (Value::Object(target), Value::Object(patch)) => {
            for (key, value) in patch {
                if value.is_null() {
                    target.remove(key);
                } else {
                    merge_patch(target.entry(key.clone()).or_insert(Value::Null), value);
                }
            }
        }
        (target, patch) => *target = patch.clone(),
    }
}

/// In-memory `ResourceClient`
pub struct FakeCluster {
    mode: Convergence,
    state: Mutex<State>,
    fail_when: Mutex<Option<FailurePredicate>>,
}

impl Default for FakeCluster {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeCluster {
    pub fn new() -> Self {
        Self::with_convergence(Convergence::Immediate)
    }

    pub fn with_convergence(mode: Convergence) -> Self {
        Self {
            mode,
            state: Mutex::new(State::default()),
            fail_when: Mutex::new(None),
        }
    }

    /// Fail every mutating call matching `predicate` with a 500
    pub fn fail_when(&self, predicate: impl Fn(&Call) -> bool + Send + Sync + 'static) {
        *self.fail_when.lock().unwrap() = Some(Box::new(predicate));
    }

    /// Insert a Workload as if it had been running for a while
    pub fn seed_workload(&self, namespace: &str, doc: Value, ready: u32) {
        let mut rc: ReplicationController = from_document(&doc).expect("seed workload should parse");
        let name = rc.metadata.name.clone().expect("seed workload needs a name");
        rc.metadata.namespace = Some(namespace.to_string());
        let mut state = self.state.lock().unwrap();
        rc.metadata.resource_version = Some(state.resource_version());
        let labels = template_labels(&rc);
        for _ in 0..ready {
            state.spawn_pod(namespace, &name, labels.clone(), true);
        }
        state.workloads.insert((namespace.to_string(), name), rc);
        state.record_peak(namespace);
    }

    /// Insert a Service with server-assigned fields filled in
    pub fn seed_service(&self, namespace: &str, doc: Value) {
        let svc: Service = from_document(&doc).expect("seed service should parse");
        let mut state = self.state.lock().unwrap();
        let svc = Self::admit_service(&mut state, namespace, svc);
        let name = svc.metadata.name.clone().unwrap_or_default();
        state.services.insert((namespace.to_string(), name), svc);
    }

    /// Every mutating call, in order
    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Current Workload, without letting pods converge
    pub fn workload(&self, namespace: &str, name: &str) -> Option<ReplicationController> {
        self.state.lock().unwrap().observed(namespace, name)
    }

    pub fn workload_names(&self, namespace: &str) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .workloads
            .keys()
            .filter(|(ns, _)| ns == namespace)
            .map(|(_, name)| name.clone())
            .collect()
    }

    pub fn service(&self, namespace: &str, name: &str) -> Option<Service> {
        self.state
            .lock()
            .unwrap()
            .services
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    pub fn service_names(&self, namespace: &str) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .services
            .keys()
            .filter(|(ns, _)| ns == namespace)
            .map(|(_, name)| name.clone())
            .collect()
    }

    /// Ready pods controlled by `name`
    pub fn ready_pods(&self, namespace: &str, name: &str) -> u32 {
        self.state
            .lock()
            .unwrap()
            .pods
            .iter()
            .filter(|p| p.namespace == namespace && p.owner.as_deref() == Some(name) && p.ready)
            .count() as u32
    }

    /// Highest number of Ready pods ever observed in the namespace
    pub fn peak_ready(&self, namespace: &str) -> u32 {
        self.state
            .lock()
            .unwrap()
            .peak_ready
            .get(namespace)
            .copied()
            .unwrap_or(0)
    }

    /// The document most recently POSTed for a Workload name
    pub fn created_workload(&self, name: &str) -> Option<Value> {
        self.state.lock().unwrap().created_workloads.get(name).cloned()
    }

    /// Workloads deleted with cascade while they still had pods
    pub fn deletes_with_live_pods(&self) -> Vec<String> {
        self.state.lock().unwrap().deletes_with_live_pods.clone()
    }

    fn record(&self, call: Call) -> Result<(), ClientError> {
        if let Some(predicate) = self.fail_when.lock().unwrap().as_ref() {
            if predicate(&call) {
                return Err(ClientError::RequestFailed {
                    status: Some(500),
                    detail: format!("injected failure for {:?}", call),
                });
            }
        }
        self.state.lock().unwrap().calls.push(call);
        Ok(())
    }

    fn admit_service(state: &mut State, namespace: &str, mut svc: Service) -> Service {
        svc.metadata.namespace = Some(namespace.to_string());
        svc.metadata.resource_version = Some(state.resource_version());
        let name = svc.metadata.name.clone().unwrap_or_default();

        let mut spec = svc.spec.take().unwrap_or_default();
        let service_type = spec.type_.clone().unwrap_or_else(|| "ClusterIP".to_string());
        if spec.cluster_ip.as_deref().map_or(true, str::is_empty) {
            spec.cluster_ip = Some(state.cluster_ip());
        }
        if service_type == "NodePort" || service_type == "LoadBalancer" {
            for port in spec.ports.iter_mut().flatten() {
                if port.node_port.is_none() {
                    port.node_port = Some(state.node_port());
                }
            }
        }
        svc.spec = Some(spec);

        if service_type == "LoadBalancer" {
            svc.status = Some(ServiceStatus {
                load_balancer: Some(LoadBalancerStatus {
                    ingress: Some(vec![LoadBalancerIngress {
                        hostname: Some(format!("{}.{}.lb.example.com", name, namespace)),
                        ..Default::default()
                    }]),
                }),
                ..Default::default()
            });
        }
        svc
    }
}

#[async_trait]
impl ResourceClient for FakeCluster {
    async fn create_workload(&self, namespace: &str, spec: &Value) -> Result<(), ClientError> {
        let mut rc: ReplicationController = from_document(spec)?;
        let name = rc.metadata.name.clone().unwrap_or_default();
        self.record(Call::CreateWorkload(name.clone()))?;

        let mut state = self.state.lock().unwrap();
        let key = (namespace.to_string(), name.clone());
        if state.workloads.contains_key(&key) {
            return Err(conflict(format!("replicationcontrollers \"{}\" already exists", name)));
        }
        rc.metadata.namespace = Some(namespace.to_string());
        rc.metadata.resource_version = Some(state.resource_version());
        rc.status = None;
        state.workloads.insert(key, rc);
        state.created_workloads.insert(name, spec.clone());
        Ok(())
    }

    async fn create_service(&self, namespace: &str, spec: &Value) -> Result<(), ClientError> {
        let svc: Service = from_document(spec)?;
        let name = svc.metadata.name.clone().unwrap_or_default();
        self.record(Call::CreateService(name.clone()))?;

        let mut state = self.state.lock().unwrap();
        let key = (namespace.to_string(), name.clone());
        if state.services.contains_key(&key) {
            return Err(conflict(format!("services \"{}\" already exists", name)));
        }
        let svc = Self::admit_service(&mut state, namespace, svc);
        state.services.insert(key, svc);
        Ok(())
    }

    async fn get_workload(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<ReplicationController, ClientError> {
        let mut state = self.state.lock().unwrap();
        state.converge(self.mode, namespace, name);
        state
            .observed(namespace, name)
            .ok_or_else(|| ClientError::not_found(ResourceKind::Workload, name))
    }

    async fn replace_workload(
        &self,
        namespace: &str,
        name: &str,
        spec: &Value,
    ) -> Result<(), ClientError> {
        let mut rc: ReplicationController = from_document(spec)?;
        self.record(Call::ReplaceWorkload(name.to_string()))?;

        let mut state = self.state.lock().unwrap();
        let key = (namespace.to_string(), name.to_string());
        if !state.workloads.contains_key(&key) {
            return Err(ClientError::not_found(ResourceKind::Workload, name));
        }
        if rc.metadata.name.as_deref() != Some(name) {
            return Err(invalid(format!(
                "metadata.name {:?} does not match {}",
                rc.metadata.name, name
            )));
        }
        rc.metadata.namespace = Some(namespace.to_string());
        rc.metadata.resource_version = Some(state.resource_version());
        rc.status = None;
        state.workloads.insert(key, rc);
        Ok(())
    }

    async fn delete_workload(
        &self,
        namespace: &str,
        name: &str,
        pods: PodPolicy,
    ) -> Result<(), ClientError> {
        self.record(Call::DeleteWorkload(name.to_string(), pods))?;

        let mut state = self.state.lock().unwrap();
        let key = (namespace.to_string(), name.to_string());
        if state.workloads.remove(&key).is_none() {
            return Err(ClientError::not_found(ResourceKind::Workload, name));
        }
        match pods {
            PodPolicy::Cascade => {
                if state.owned_count(namespace, name) > 0 {
                    state.deletes_with_live_pods.push(name.to_string());
                }
                state
                    .pods
                    .retain(|p| !(p.namespace == namespace && p.owner.as_deref() == Some(name)));
            }
            PodPolicy::Orphan => {
                for pod in state.pods.iter_mut() {
                    if pod.namespace == namespace && pod.owner.as_deref() == Some(name) {
                        pod.owner = None;
                    }
                }
            }
        }
        Ok(())
    }

    async fn delete_service(&self, namespace: &str, name: &str) -> Result<(), ClientError> {
        self.record(Call::DeleteService(name.to_string()))?;

        let mut state = self.state.lock().unwrap();
        match state.services.remove(&(namespace.to_string(), name.to_string())) {
            Some(_) => Ok(()),
            None => Err(ClientError::not_found(ResourceKind::Service, name)),
        }
    }

    async fn set_spec_replicas(
        &self,
        namespace: &str,
        name: &str,
        replicas: u32,
    ) -> Result<(), ClientError> {
        self.record(Call::SetSpecReplicas(name.to_string(), replicas))?;

        let mut state = self.state.lock().unwrap();
        let resource_version = state.resource_version();
        let rc = state
            .workloads
            .get_mut(&(namespace.to_string(), name.to_string()))
            .ok_or_else(|| ClientError::not_found(ResourceKind::Workload, name))?;
        rc.spec.get_or_insert_with(Default::default).replicas = Some(replicas as i32);
        rc.metadata.resource_version = Some(resource_version);
        Ok(())
    }

    async fn list_pods_for_workload(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Vec<Pod>, ClientError> {
        let mut state = self.state.lock().unwrap();
        state.converge(self.mode, namespace, name);
        let rc = state
            .workloads
            .get(&(namespace.to_string(), name.to_string()))
            .ok_or_else(|| ClientError::not_found(ResourceKind::Workload, name))?;
        let selector = workload_selector(rc);
        Ok(state
            .pods
            .iter()
            .filter(|p| p.namespace == namespace && labels_match(&selector, &p.labels))
            .map(to_pod)
            .collect())
    }

    async fn get_service(&self, namespace: &str, name: &str) -> Result<Service, ClientError> {
        self.service(namespace, name)
            .ok_or_else(|| ClientError::not_found(ResourceKind::Service, name))
    }

    async fn replace_service(
        &self,
        namespace: &str,
        name: &str,
        spec: &Value,
    ) -> Result<(), ClientError> {
        let mut desired: Service = from_document(spec)?;
        self.record(Call::ReplaceService(name.to_string()))?;

        let mut state = self.state.lock().unwrap();
        let key = (namespace.to_string(), name.to_string());
        let deployed = state
            .services
            .get(&key)
            .cloned()
            .ok_or_else(|| ClientError::not_found(ResourceKind::Service, name))?;

        if desired.metadata.resource_version != deployed.metadata.resource_version {
            return Err(conflict(format!(
                "Operation cannot be fulfilled on services \"{}\": resourceVersion {:?} does not match {:?}",
                name, desired.metadata.resource_version, deployed.metadata.resource_version
            )));
        }

        let deployed_ip = deployed.spec.as_ref().and_then(|s| s.cluster_ip.clone());
        let desired_ip = desired.spec.as_ref().and_then(|s| s.cluster_ip.clone());
        if desired_ip != deployed_ip {
            return Err(invalid(format!(
                "Service \"{}\" is invalid: spec.clusterIP: field is immutable",
                name
            )));
        }

        // A port that lost its nodePort is silently given a fresh one
        let mut spec = desired.spec.take().unwrap_or_default();
        let needs_node_ports = matches!(spec.type_.as_deref(), Some("NodePort") | Some("LoadBalancer"));
        if needs_node_ports {
            for port in spec.ports.iter_mut().flatten() {
                if port.node_port.is_none() {
                    port.node_port = Some(state.node_port());
                }
            }
        }
        desired.spec = Some(spec);
        desired.status = deployed.status.clone();
        desired.metadata.namespace = Some(namespace.to_string());
        desired.metadata.resource_version = Some(state.resource_version());
        state.services.insert(key, desired);
        Ok(())
    }

    async fn patch_service_metadata(
        &self,
        namespace: &str,
        name: &str,
        doc: &Value,
    ) -> Result<(), ClientError> {
        self.record(Call::PatchServiceMetadata(name.to_string()))?;

        let mut state = self.state.lock().unwrap();
        let key = (namespace.to_string(), name.to_string());
        let deployed = state
            .services
            .get(&key)
            .cloned()
            .ok_or_else(|| ClientError::not_found(ResourceKind::Service, name))?;

        let mut current = serde_json::to_value(&deployed)
            .map_err(|e| ClientError::MalformedDocument(e.to_string()))?;
        merge_patch(&mut current, doc);
        let mut patched: Service = from_document(&current)?;
        patched.metadata.resource_version = Some(state.resource_version());
        state.services.insert(key, patched);
        Ok(())
    }

    async fn list_services(
        &self,
        namespace: Option<&str>,
        selector: &str,
    ) -> Result<Vec<Service>, ClientError> {
        let selector = parse_selector(selector);
        Ok(self
            .state
            .lock()
            .unwrap()
            .services
            .values()
            .filter(|s| metadata_matches(&s.metadata, namespace, &selector))
            .cloned()
            .collect())
    }

    async fn list_workloads(
        &self,
        namespace: Option<&str>,
        selector: &str,
    ) -> Result<Vec<ReplicationController>, ClientError> {
        let selector = parse_selector(selector);
        let state = self.state.lock().unwrap();
        Ok(state
            .workloads
            .iter()
            .filter(|(_, rc)| metadata_matches(&rc.metadata, namespace, &selector))
            .filter_map(|((ns, name), _)| state.observed(ns, name))
            .collect())
    }
}

/// Guestbook bundle: one `frontend` Service on port 80 and one `frontend`
/// Workload with the given replica count
pub fn guestbook(version: &str, replicas: u32) -> Kubeware {
    let yaml = format!(
        r#"
name: guestbook
version: "{version}"
services:
  frontend:
    apiVersion: v1
    kind: Service
    metadata:
      name: frontend
      labels:
        app: guestbook
        tier: frontend
    spec:
      type: LoadBalancer
      ports:
      - port: 80
        targetPort: 80
      selector:
        app: guestbook
        tier: frontend
workloads:
  frontend:
    apiVersion: v1
    kind: ReplicationController
    metadata:
      name: frontend
      labels:
        app: guestbook
        tier: frontend
    spec:
      replicas: {replicas}
      template:
        metadata:
          labels:
            app: guestbook
            tier: frontend
        spec:
          containers:
          - name: php-redis
            image: gcr.io/google_samples/gb-frontend:v{version}
            ports:
            - containerPort: 80
"#
    );
    serde_yaml::from_str(&yaml).expect("guestbook fixture should parse")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rc(name: &str, replicas: u32) -> Value {
        json!({
            "apiVersion": "v1",
            "kind": "ReplicationController",
            "metadata": {"name": name},
            "spec": {
                "replicas": replicas,
                "template": {"metadata": {"labels": {"app": name}}}
            }
        })
    }

    #[tokio::test]
    async fn test_stepwise_readies_before_adding() {
        let cluster = FakeCluster::with_convergence(Convergence::Stepwise);
        cluster.create_workload("ns", &rc("web", 2)).await.unwrap();

        // add (not ready), ready it, add, ready it
        assert_eq!(cluster.get_ready_replicas("ns", "web").await.unwrap(), 0);
        assert_eq!(cluster.get_ready_replicas("ns", "web").await.unwrap(), 1);
        assert_eq!(cluster.get_status_replicas("ns", "web").await.unwrap(), 2);
        assert_eq!(cluster.get_ready_replicas("ns", "web").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_orphaned_pods_are_adopted() {
        let cluster = FakeCluster::new();
        cluster.seed_workload("ns", rc("web-next", 2), 2);
        cluster
            .delete_workload("ns", "web-next", PodPolicy::Orphan)
            .await
            .unwrap();

        let mut adopter = rc("web", 2);
        adopter["spec"]["selector"] = json!({"app": "web-next"});
        cluster.create_workload("ns", &adopter).await.unwrap();

        assert_eq!(cluster.get_ready_replicas("ns", "web").await.unwrap(), 2);
        assert!(cluster.deletes_with_live_pods().is_empty());
    }

    #[tokio::test]
    async fn test_replace_service_enforces_immutable_fields() {
        let cluster = FakeCluster::new();
        cluster.seed_service(
            "ns",
            json!({"metadata": {"name": "web"}, "spec": {"ports": [{"port": 80}]}}),
        );

        let bare = json!({"metadata": {"name": "web"}, "spec": {"ports": [{"port": 80}]}});
        let err = cluster.replace_service("ns", "web", &bare).await.unwrap_err();
        assert!(matches!(err, ClientError::RequestFailed { status: Some(409), .. }));

        let deployed = cluster.service("ns", "web").unwrap();
        let mut with_version = bare.clone();
        with_version["metadata"]["resourceVersion"] = json!(deployed.metadata.resource_version);
        let err = cluster
            .replace_service("ns", "web", &with_version)
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::RequestFailed { status: Some(422), .. }));
    }

    #[tokio::test]
    async fn test_failure_injection_skips_recording() {
        let cluster = FakeCluster::new();
        cluster.fail_when(|call| matches!(call, Call::CreateService(_)));
        let result = cluster
            .create_service("ns", &json!({"metadata": {"name": "web"}}))
            .await;
        assert!(matches!(result, Err(ClientError::RequestFailed { status: Some(500), .. })));
        assert!(cluster.calls().is_empty());
    }

    #[test]
    fn test_merge_patch_replaces_labels_only() {
        let mut target = json!({"metadata": {"labels": {"a": "1"}}, "spec": {"clusterIP": "10.0.0.1"}});
        merge_patch(&mut target, &json!({"metadata": {"labels": {"b": "2"}}}));
        assert_eq!(target["metadata"]["labels"], json!({"a": "1", "b": "2"}));
        assert_eq!(target["spec"]["clusterIP"], "10.0.0.1");
    }
}
