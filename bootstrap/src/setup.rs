//! The suite's before-all hook: leader setup plus per-executor init

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::chaos::{ChaosInjector, FailurePolicy, NodeDeletionPolicy};
use crate::cluster::SharedCluster;
use crate::config::Config;
use crate::coordinator::{ExecutionCoordinator, ExecutorIdentity};
use crate::diagnostics::Diagnostics;
use crate::error::BootstrapResult;
use crate::gates::{
    ClusterIpFamily, ClusterIpFamilyResolver, DaemonSetReadinessGate, NamespaceReconciler,
    NodeReadinessGate, PodReadinessGate, PROTECTED_NAMESPACES,
};

/// Computed once by the leader and broadcast to every executor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuitePayload {
    pub run_id: Uuid,
    pub num_nodes: usize,
    pub server_version: Option<String>,
    pub prepared_at: DateTime<Utc>,
}

/// What each executor ends up with after the before-all hook
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuiteContext {
    pub executor: u32,
    pub ip_family: ClusterIpFamily,
    pub payload: SuitePayload,
}

pub struct SuiteBootstrap {
    cluster: SharedCluster,
    config: Config,
    policy: Arc<dyn FailurePolicy>,
    chaos: Mutex<Option<ChaosInjector>>,
}

impl SuiteBootstrap {
    pub fn new(cluster: SharedCluster, config: Config) -> Self {
        let policy = Arc::new(NodeDeletionPolicy::new(cluster.clone()));
        Self {
            cluster,
            config,
            policy,
            chaos: Mutex::new(None),
        }
    }

    /// Swap the node failure policy used by chaos injection
    pub fn with_failure_policy(mut self, policy: Arc<dyn FailurePolicy>) -> Self {
        self.policy = policy;
        self
    }

    /// Run the whole before-all hook through `coordinator`
    pub async fn run(&self, coordinator: &ExecutionCoordinator) -> BootstrapResult<SuiteContext> {
        let executor = coordinator.identity();
        coordinator
            .synchronized_before_suite(
                || self.setup_once(),
                |payload| self.setup_per_executor(executor, payload),
            )
            .await
    }

    /// Leader-only cluster preparation. Gates run strictly in order and the
    /// first fatal one ends the setup.
    #[instrument(skip(self))]
    pub async fn setup_once(&self) -> BootstrapResult<SuitePayload> {
        let config = &self.config;
        let run_id = Uuid::new_v4();
        let interval = config.poll_interval();

        if config.clean_start {
            let deleted = NamespaceReconciler::new(
                self.cluster.clone(),
                interval,
                config.namespace_cleanup_timeout(),
            )
            .clean_start(&PROTECTED_NAMESPACES)
            .await?;
            info!(count = deleted.len(), "Deleted leftover namespaces");
        }

        let nodes = NodeReadinessGate::new(self.cluster.clone(), interval);
        nodes
            .wait_schedulable(config.node_schedulable_timeout())
            .await?;

        let num_nodes = match config.num_nodes {
            Some(n) => n,
            None => {
                let detected = nodes.ready_schedulable_count().await?;
                info!(num_nodes = detected, "Detected ready schedulable nodes");
                detected
            }
        };

        let diagnostics = Arc::new(Diagnostics::new(
            self.cluster.clone(),
            run_id,
            interval,
            config.canary_timeout(),
        ));
        PodReadinessGate::new(self.cluster.clone(), interval, diagnostics)
            .wait_running_ready(
                &config.system_namespace,
                config.min_startup_pods,
                config.allowed_not_ready_pods,
                config.pod_startup_timeout(),
            )
            .await?;

        // Advisory only
        DaemonSetReadinessGate::new(self.cluster.clone(), interval)
            .wait_ready(
                &config.system_namespace,
                config.allowed_not_ready_nodes,
                config.daemonset_startup_timeout(),
            )
            .await;

        let server_version = match self.cluster.server_version().await {
            Ok(v) => {
                info!("e2e test version: {}", env!("CARGO_PKG_VERSION"));
                info!("kube-apiserver version: {}", v);
                Some(v)
            }
            Err(e) => {
                warn!(error = %e, "Unable to fetch server version");
                None
            }
        };

        self.start_chaos().await;

        Ok(SuitePayload {
            run_id,
            num_nodes,
            server_version,
            prepared_at: Utc::now(),
        })
    }

    /// Runs on every executor once the payload is known
    #[instrument(skip(self, payload))]
    pub async fn setup_per_executor(
        &self,
        executor: ExecutorIdentity,
        payload: SuitePayload,
    ) -> BootstrapResult<SuiteContext> {
        let ip_family = ClusterIpFamilyResolver::new(self.cluster.clone())
            .resolve()
            .await?;

        Ok(SuiteContext {
            executor: executor.index,
            ip_family,
            payload,
        })
    }

    async fn start_chaos(&self) {
        let schedule = self.config.chaos_schedule();
        if !schedule.enabled {
            return;
        }

        let mut slot = self.chaos.lock().await;
        if slot.is_some() {
            return;
        }
        *slot = Some(ChaosInjector::start(
            self.cluster.clone(),
            self.policy.clone(),
            schedule,
            CancellationToken::new(),
        ));
    }

    pub async fn chaos_running(&self) -> bool {
        self.chaos
            .lock()
            .await
            .as_ref()
            .map(ChaosInjector::is_running)
            .unwrap_or(false)
    }

    /// Stop chaos injection, if this executor started it
    pub async fn teardown(&self) {
        let injector = self.chaos.lock().await.take();
        if let Some(injector) = injector {
            injector.stop(self.config.chaos_stop_grace()).await;
        }
    }
}
