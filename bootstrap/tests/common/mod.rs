//! In-memory cluster shared by the integration tests

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::{DaemonSet, DaemonSetStatus};
use k8s_openapi::api::core::v1::{
    Event, Namespace, Node, NodeCondition, NodeSpec, NodeStatus, Pod, PodCondition, PodStatus,
    Service, ServiceSpec,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

use e2e_bootstrap::cluster::ClusterApi;
use e2e_bootstrap::error::{BootstrapError, BootstrapResult};

fn meta(name: &str) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        ..Default::default()
    }
}

pub fn ready_node(name: &str) -> Node {
    Node {
        metadata: meta(name),
        spec: Some(NodeSpec::default()),
        status: Some(NodeStatus {
            conditions: Some(vec![NodeCondition {
                type_: "Ready".to_string(),
                status: "True".to_string(),
                ..Default::default()
            }]),
            ..Default::default()
        }),
    }
}

pub fn running_pod(name: &str, ready: bool) -> Pod {
    Pod {
        metadata: meta(name),
        status: Some(PodStatus {
            phase: Some("Running".to_string()),
            conditions: Some(vec![PodCondition {
                type_: "Ready".to_string(),
                status: if ready { "True" } else { "False" }.to_string(),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

#[derive(Default)]
struct State {
    namespaces: BTreeMap<String, Namespace>,
    nodes: BTreeMap<String, Node>,
    pods: BTreeMap<(String, String), Pod>,
    daemonsets: Vec<DaemonSet>,
    cluster_ip: String,
    deleted_nodes: Vec<String>,
}

/// Cluster whose objects live in memory; deletes take effect immediately
pub struct FakeCluster {
    state: Mutex<State>,
}

impl FakeCluster {
    /// Protected namespaces, `nodes` ready nodes and `system_pods` ready
    /// pods in `kube-system`
    pub fn healthy(nodes: usize, system_pods: usize) -> Self {
        let mut state = State {
            cluster_ip: "10.96.0.1".to_string(),
            ..Default::default()
        };
        for ns in ["default", "kube-system", "kube-public", "kube-node-lease"] {
            state.namespaces.insert(ns.to_string(), Namespace {
                metadata: meta(ns),
                ..Default::default()
            });
        }
        for i in 0..nodes {
            let name = format!("node-{}", i);
            state.nodes.insert(name.clone(), ready_node(&name));
        }
        for i in 0..system_pods {
            let name = format!("system-{}", i);
            state
                .pods
                .insert(("kube-system".to_string(), name.clone()), running_pod(&name, true));
        }
        state.daemonsets.push(DaemonSet {
            metadata: meta("kube-proxy"),
            status: Some(DaemonSetStatus {
                desired_number_scheduled: nodes as i32,
                number_ready: nodes as i32,
                ..Default::default()
            }),
            ..Default::default()
        });

        Self {
            state: Mutex::new(state),
        }
    }

    pub fn add_namespace(&self, name: &str) {
        self.state.lock().unwrap().namespaces.insert(
            name.to_string(),
            Namespace {
                metadata: meta(name),
                ..Default::default()
            },
        );
    }

    pub fn add_pod(&self, namespace: &str, pod: Pod) {
        let name = pod.metadata.name.clone().unwrap_or_default();
        self.state
            .lock()
            .unwrap()
            .pods
            .insert((namespace.to_string(), name), pod);
    }

    pub fn set_cluster_ip(&self, ip: &str) {
        self.state.lock().unwrap().cluster_ip = ip.to_string();
    }

    pub fn namespace_names(&self) -> Vec<String> {
        self.state.lock().unwrap().namespaces.keys().cloned().collect()
    }

    pub fn deleted_nodes(&self) -> Vec<String> {
        self.state.lock().unwrap().deleted_nodes.clone()
    }

    pub fn pods_in(&self, namespace: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .pods
            .keys()
            .filter(|(ns, _)| ns == namespace)
            .count()
    }
}

fn not_found(what: &str) -> BootstrapError {
    BootstrapError::config(format!("{} not found", what))
}

#[async_trait]
impl ClusterApi for FakeCluster {
    async fn list_namespaces(&self) -> BootstrapResult<Vec<Namespace>> {
        Ok(self.state.lock().unwrap().namespaces.values().cloned().collect())
    }

    async fn delete_namespace(&self, name: &str) -> BootstrapResult<()> {
        let mut state = self.state.lock().unwrap();
        state.namespaces.remove(name);
        state.pods.retain(|(ns, _), _| ns != name);
        Ok(())
    }

    async fn list_nodes(&self) -> BootstrapResult<Vec<Node>> {
        Ok(self.state.lock().unwrap().nodes.values().cloned().collect())
    }

    async fn delete_node(&self, name: &str) -> BootstrapResult<()> {
        let mut state = self.state.lock().unwrap();
        state
            .nodes
            .remove(name)
            .ok_or_else(|| not_found(name))?;
        state.deleted_nodes.push(name.to_string());
        Ok(())
    }

    async fn list_pods(&self, namespace: &str) -> BootstrapResult<Vec<Pod>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .pods
            .iter()
            .filter(|((ns, _), _)| ns == namespace)
            .map(|(_, pod)| pod.clone())
            .collect())
    }

    async fn list_daemonsets(&self, _namespace: &str) -> BootstrapResult<Vec<DaemonSet>> {
        Ok(self.state.lock().unwrap().daemonsets.clone())
    }

    async fn list_events(&self, _namespace: &str) -> BootstrapResult<Vec<Event>> {
        Ok(vec![])
    }

    async fn get_service(&self, namespace: &str, name: &str) -> BootstrapResult<Service> {
        if namespace != "default" || name != "kubernetes" {
            return Err(not_found(name));
        }
        Ok(Service {
            metadata: meta(name),
            spec: Some(ServiceSpec {
                cluster_ip: Some(self.state.lock().unwrap().cluster_ip.clone()),
                ..Default::default()
            }),
            ..Default::default()
        })
    }

    async fn create_pod(&self, namespace: &str, pod: &Pod) -> BootstrapResult<Pod> {
        // Pods come up ready as soon as they are created
        let name = pod.metadata.name.clone().unwrap_or_default();
        let mut created = pod.clone();
        created.status = running_pod(&name, true).status;
        self.add_pod(namespace, created.clone());
        Ok(created)
    }

    async fn get_pod(&self, namespace: &str, name: &str) -> BootstrapResult<Pod> {
        self.state
            .lock()
            .unwrap()
            .pods
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
            .ok_or_else(|| not_found(name))
    }

    async fn delete_pod(&self, namespace: &str, name: &str) -> BootstrapResult<()> {
        self.state
            .lock()
            .unwrap()
            .pods
            .remove(&(namespace.to_string(), name.to_string()));
        Ok(())
    }

    async fn pod_logs(
        &self,
        _namespace: &str,
        name: &str,
        container: &str,
    ) -> BootstrapResult<String> {
        Ok(format!("logs of {}/{}", name, container))
    }

    async fn server_version(&self) -> BootstrapResult<String> {
        Ok("v1.28.3".to_string())
    }
}
