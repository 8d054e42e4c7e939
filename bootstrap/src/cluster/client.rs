//! Kubernetes client wrapper for the suite bootstrap

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::DaemonSet;
use k8s_openapi::api::core::v1::{Event, Namespace, Node, Pod, Service};
use kube::{
    api::{Api, DeleteParams, ListParams, LogParams, PostParams},
    config::{KubeConfigOptions, Kubeconfig},
    Client, Config,
};
#[cfg(test)]
use mockall::automock;
use tracing::{info, instrument};

use crate::error::{BootstrapError, BootstrapResult};

/// The slice of the cluster API the bootstrap consumes
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ClusterApi: Send + Sync {
    async fn list_namespaces(&self) -> BootstrapResult<Vec<Namespace>>;

    async fn delete_namespace(&self, name: &str) -> BootstrapResult<()>;

    async fn list_nodes(&self) -> BootstrapResult<Vec<Node>>;

    async fn delete_node(&self, name: &str) -> BootstrapResult<()>;

    async fn list_pods(&self, namespace: &str) -> BootstrapResult<Vec<Pod>>;

    async fn list_daemonsets(&self, namespace: &str) -> BootstrapResult<Vec<DaemonSet>>;

    async fn list_events(&self, namespace: &str) -> BootstrapResult<Vec<Event>>;

    async fn get_service(&self, namespace: &str, name: &str) -> BootstrapResult<Service>;

    async fn create_pod(&self, namespace: &str, pod: &Pod) -> BootstrapResult<Pod>;

    async fn get_pod(&self, namespace: &str, name: &str) -> BootstrapResult<Pod>;

    async fn delete_pod(&self, namespace: &str, name: &str) -> BootstrapResult<()>;

    async fn pod_logs(
        &self,
        namespace: &str,
        name: &str,
        container: &str,
    ) -> BootstrapResult<String>;

    /// Git version reported by the API server
    async fn server_version(&self) -> BootstrapResult<String>;
}

/// Wrapper around kube::Client implementing [`ClusterApi`]
#[derive(Clone)]
pub struct KubeCluster {
    client: Client,
}

impl KubeCluster {
    /// Connect using the given kubeconfig path, or infer the config
    /// (in-cluster service account or `$KUBECONFIG`) when none is given.
    #[instrument(skip_all)]
    pub async fn new(kubeconfig: Option<&str>) -> BootstrapResult<Self> {
        let config = match kubeconfig {
            Some(path) => {
                let kc = Kubeconfig::read_from(path)
                    .map_err(|e| BootstrapError::config(format!("kubeconfig {}: {}", path, e)))?;
                Config::from_custom_kubeconfig(kc, &KubeConfigOptions::default())
                    .await
                    .map_err(|e| BootstrapError::config(e.to_string()))?
            }
            None => Config::infer()
                .await
                .map_err(|e| BootstrapError::config(e.to_string()))?,
        };
        let client = Client::try_from(config)?;

        info!("Connected to Kubernetes cluster");

        Ok(Self { client })
    }

    fn pods(&self, namespace: &str) -> Api<Pod> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

#[async_trait]
impl ClusterApi for KubeCluster {
    async fn list_namespaces(&self) -> BootstrapResult<Vec<Namespace>> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        Ok(api.list(&ListParams::default()).await?.items)
    }

    #[instrument(skip(self))]
    async fn delete_namespace(&self, name: &str) -> BootstrapResult<()> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        api.delete(name, &DeleteParams::background()).await?;
        info!(name, "Deleted namespace");
        Ok(())
    }

    async fn list_nodes(&self) -> BootstrapResult<Vec<Node>> {
        let api: Api<Node> = Api::all(self.client.clone());
        Ok(api.list(&ListParams::default()).await?.items)
    }

    #[instrument(skip(self))]
    async fn delete_node(&self, name: &str) -> BootstrapResult<()> {
        let api: Api<Node> = Api::all(self.client.clone());
        api.delete(name, &DeleteParams::default()).await?;
        info!(name, "Deleted node");
        Ok(())
    }

    async fn list_pods(&self, namespace: &str) -> BootstrapResult<Vec<Pod>> {
        Ok(self.pods(namespace).list(&ListParams::default()).await?.items)
    }

    async fn list_daemonsets(&self, namespace: &str) -> BootstrapResult<Vec<DaemonSet>> {
        let api: Api<DaemonSet> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.list(&ListParams::default()).await?.items)
    }

    async fn list_events(&self, namespace: &str) -> BootstrapResult<Vec<Event>> {
        let api: Api<Event> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.list(&ListParams::default()).await?.items)
    }

    async fn get_service(&self, namespace: &str, name: &str) -> BootstrapResult<Service> {
        let api: Api<Service> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get(name).await?)
    }

    #[instrument(skip(self, pod), fields(pod_name = %pod.metadata.name.as_deref().unwrap_or("unknown")))]
    async fn create_pod(&self, namespace: &str, pod: &Pod) -> BootstrapResult<Pod> {
        let created = self.pods(namespace).create(&PostParams::default(), pod).await?;
        info!("Created pod");
        Ok(created)
    }

    async fn get_pod(&self, namespace: &str, name: &str) -> BootstrapResult<Pod> {
        Ok(self.pods(namespace).get(name).await?)
    }

    #[instrument(skip(self))]
    async fn delete_pod(&self, namespace: &str, name: &str) -> BootstrapResult<()> {
        self.pods(namespace).delete(name, &DeleteParams::default()).await?;
        info!(name, "Deleted pod");
        Ok(())
    }

    async fn pod_logs(
        &self,
        namespace: &str,
        name: &str,
        container: &str,
    ) -> BootstrapResult<String> {
        let params = LogParams {
            container: Some(container.to_string()),
            ..Default::default()
        };
        Ok(self.pods(namespace).logs(name, &params).await?)
    }

    async fn server_version(&self) -> BootstrapResult<String> {
        let version = self.client.apiserver_version().await?;
        Ok(version.git_version)
    }
}
