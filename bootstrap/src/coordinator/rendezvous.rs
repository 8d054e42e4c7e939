//! Where the leader's outcome is published and followers pick it up

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use reqwest::StatusCode;
use tokio::sync::watch;
use tracing::debug;

use super::state::BeforeSuiteState;
use crate::error::{BootstrapError, BootstrapResult};

/// Path the rendezvous server serves the state on
pub const STATE_PATH: &str = "/before-suite-state";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Single-writer, multi-reader cell shared by all executors
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Rendezvous: Send + Sync {
    /// Record the leader's terminal outcome; only the first publish wins
    async fn publish(&self, state: BeforeSuiteState) -> BootstrapResult<()>;

    async fn fetch(&self) -> BootstrapResult<BeforeSuiteState>;
}

/// Rendezvous for executors that share a process
#[derive(Clone)]
pub struct InProcessRendezvous {
    tx: Arc<watch::Sender<BeforeSuiteState>>,
}

impl InProcessRendezvous {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(BeforeSuiteState::Pending);
        Self { tx: Arc::new(tx) }
    }

    pub fn subscribe(&self) -> watch::Receiver<BeforeSuiteState> {
        self.tx.subscribe()
    }
}

impl Default for InProcessRendezvous {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Rendezvous for InProcessRendezvous {
    async fn publish(&self, state: BeforeSuiteState) -> BootstrapResult<()> {
        if state.is_pending() {
            return Err(BootstrapError::rendezvous("cannot publish a pending state"));
        }

        let mut accepted = false;
        self.tx.send_if_modified(|current| {
            if current.is_pending() {
                *current = state;
                accepted = true;
            }
            accepted
        });

        if accepted {
            Ok(())
        } else {
            Err(BootstrapError::rendezvous("before-suite state already published"))
        }
    }

    async fn fetch(&self) -> BootstrapResult<BeforeSuiteState> {
        Ok(self.tx.borrow().clone())
    }
}

/// Rendezvous backed by a `rendezvous-server` reachable over HTTP
pub struct HttpRendezvous {
    client: reqwest::Client,
    url: String,
}

impl HttpRendezvous {
    pub fn new(base_url: &str) -> BootstrapResult<Self> {
        let client = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            url: format!("{}{}", base_url.trim_end_matches('/'), STATE_PATH),
        })
    }
}

#[async_trait]
impl Rendezvous for HttpRendezvous {
    async fn publish(&self, state: BeforeSuiteState) -> BootstrapResult<()> {
        let response = self.client.post(&self.url).json(&state).send().await?;
        if response.status() == StatusCode::CONFLICT {
            return Err(BootstrapError::rendezvous("before-suite state already published"));
        }
        response.error_for_status()?;
        debug!(url = %self.url, "Published before-suite state");
        Ok(())
    }

    async fn fetch(&self) -> BootstrapResult<BeforeSuiteState> {
        let state = self
            .client
            .get(&self.url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(state)
    }
}
