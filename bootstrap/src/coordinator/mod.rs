//! Run-once setup shared by parallel executors
//!
//! Executor 1 is the leader: it runs the expensive setup and publishes the
//! serialized result. Every other executor waits for that result, and then
//! all of them, leader included, run their own initialization with it.

mod rendezvous;
pub mod server;
mod state;

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use strum::Display;
use tracing::{error, info, instrument, warn};

pub use rendezvous::{HttpRendezvous, InProcessRendezvous, Rendezvous, STATE_PATH};
#[cfg(test)]
pub use rendezvous::MockRendezvous;
pub use state::BeforeSuiteState;

use crate::error::{BootstrapError, BootstrapResult};
use crate::wait::poll_immediate;

/// How long the leader keeps retrying its publish
const PUBLISH_WINDOW: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum Role {
    Leader,
    Follower,
}

/// Position of this process among the parallel executors (1-based)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutorIdentity {
    pub index: u32,
    pub total: u32,
}

impl ExecutorIdentity {
    pub fn new(index: u32, total: u32) -> BootstrapResult<Self> {
        if total == 0 || index == 0 || index > total {
            return Err(BootstrapError::config(format!(
                "executor index {} out of range 1..={}",
                index, total
            )));
        }
        Ok(Self { index, total })
    }

    /// The only executor of a serial run
    pub fn single() -> Self {
        Self { index: 1, total: 1 }
    }

    pub fn role(&self) -> Role {
        if self.index == 1 {
            Role::Leader
        } else {
            Role::Follower
        }
    }

    pub fn is_leader(&self) -> bool {
        self.role() == Role::Leader
    }
}

pub struct ExecutionCoordinator {
    identity: ExecutorIdentity,
    rendezvous: Arc<dyn Rendezvous>,
    poll_interval: Duration,
    timeout: Duration,
}

impl ExecutionCoordinator {
    pub fn new(
        identity: ExecutorIdentity,
        rendezvous: Arc<dyn Rendezvous>,
        poll_interval: Duration,
        timeout: Duration,
    ) -> Self {
        Self {
            identity,
            rendezvous,
            poll_interval,
            timeout,
        }
    }

    pub fn identity(&self) -> ExecutorIdentity {
        self.identity
    }

    /// Run `setup` on the leader only and hand its payload to everyone.
    ///
    /// Followers never call `setup`. A leader failure is published so the
    /// followers abort instead of waiting out their timeout.
    #[instrument(skip_all, fields(executor = self.identity.index, role = %self.identity.role()))]
    pub async fn run_once<P, F, Fut>(&self, setup: F) -> BootstrapResult<P>
    where
        P: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = BootstrapResult<P>>,
    {
        let payload = if self.identity.is_leader() {
            self.lead(setup).await?
        } else {
            self.follow().await?
        };
        Ok(serde_json::from_str(&payload)?)
    }

    async fn lead<P, F, Fut>(&self, setup: F) -> BootstrapResult<String>
    where
        P: Serialize,
        F: FnOnce() -> Fut,
        Fut: Future<Output = BootstrapResult<P>>,
    {
        info!("Running one-time suite setup");
        let outcome = match setup().await {
            Ok(payload) => serde_json::to_string(&payload).map_err(BootstrapError::from),
            Err(e) => Err(e),
        };

        match outcome {
            Ok(payload) => {
                self.publish(BeforeSuiteState::Passed {
                    payload: payload.clone(),
                })
                .await?;
                info!("Suite setup published");
                Ok(payload)
            }
            Err(e) => {
                error!(error = %e, "Suite setup failed");
                let failed = BeforeSuiteState::Failed {
                    reason: e.to_string(),
                };
                if let Err(pe) = self.publish(failed).await {
                    warn!(error = %pe, "Failed to publish setup failure");
                }
                Err(e)
            }
        }
    }

    /// Publish `state`, retrying transport failures for a bounded time
    async fn publish(&self, state: BeforeSuiteState) -> BootstrapResult<()> {
        let state = &state;
        poll_immediate(
            "publish before-suite state",
            self.poll_interval,
            self.timeout.min(PUBLISH_WINDOW),
            move || self.try_publish(state),
        )
        .await
    }

    async fn try_publish(&self, state: &BeforeSuiteState) -> BootstrapResult<bool> {
        match self.rendezvous.publish(state.clone()).await {
            Ok(()) => Ok(true),
            // An earlier attempt may have landed before its response was lost
            Err(BootstrapError::Rendezvous(msg)) => {
                if self.rendezvous.fetch().await? == *state {
                    Ok(true)
                } else {
                    Err(BootstrapError::Rendezvous(msg))
                }
            }
            Err(e) => Err(e),
        }
    }

    async fn follow(&self) -> BootstrapResult<String> {
        info!("Waiting for the leader to finish suite setup");
        let received = Mutex::new(None);
        let slot = &received;

        poll_immediate(
            "leader suite setup",
            self.poll_interval,
            self.timeout,
            move || self.check_leader(slot),
        )
        .await?;

        received
            .into_inner()
            .ok()
            .flatten()
            .ok_or_else(|| BootstrapError::rendezvous("leader payload missing"))
    }

    async fn check_leader(&self, slot: &Mutex<Option<String>>) -> BootstrapResult<bool> {
        match self.rendezvous.fetch().await? {
            BeforeSuiteState::Pending => Ok(false),
            BeforeSuiteState::Failed { reason } => Err(BootstrapError::LeaderFailed(reason)),
            BeforeSuiteState::Passed { payload } => {
                if let Ok(mut guard) = slot.lock() {
                    *guard = Some(payload);
                }
                Ok(true)
            }
        }
    }

    /// Per-executor initialization; a failure only affects this executor
    #[instrument(skip_all, fields(executor = self.identity.index))]
    pub async fn run_each<P, T, F, Fut>(&self, payload: P, init: F) -> BootstrapResult<T>
    where
        F: FnOnce(P) -> Fut,
        Fut: Future<Output = BootstrapResult<T>>,
    {
        init(payload).await.map_err(|e| {
            error!(error = %e, "Executor initialization failed");
            e
        })
    }

    /// `run_once` followed by `run_each` on every executor
    pub async fn synchronized_before_suite<P, T, S, SFut, I, IFut>(
        &self,
        setup: S,
        init: I,
    ) -> BootstrapResult<T>
    where
        P: Serialize + DeserializeOwned,
        S: FnOnce() -> SFut,
        SFut: Future<Output = BootstrapResult<P>>,
        I: FnOnce(P) -> IFut,
        IFut: Future<Output = BootstrapResult<T>>,
    {
        let payload = self.run_once(setup).await?;
        self.run_each(payload, init).await
    }
}
