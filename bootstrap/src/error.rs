//! Error types for the suite bootstrap

use std::time::Duration;

use thiserror::Error;

/// Result alias used throughout the crate
pub type BootstrapResult<T> = Result<T, BootstrapError>;

/// Main error type for bootstrap operations
#[derive(Debug, Error)]
pub enum BootstrapError {
    /// Kubernetes API error
    #[error("kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// Transient condition worth polling again
    #[error("transient error: {0}")]
    Transient(String),

    /// A polling gate ran out of time
    #[error("timed out after {timeout:?} waiting for {what}")]
    Timeout { what: String, timeout: Duration },

    /// Namespaces survived the clean-start deletion
    #[error("namespaces still present after cleanup: {}", .0.join(", "))]
    NamespacesRemain(Vec<String>),

    /// System pods never reached running+ready
    #[error("pods not running and ready: {0}")]
    PodsNotReady(String),

    /// Cluster IP family could not be determined
    #[error("cannot determine IP family: {0}")]
    IpFamily(String),

    /// Rendezvous protocol error (double publish, bad state)
    #[error("rendezvous error: {0}")]
    Rendezvous(String),

    /// Transport error talking to the rendezvous server
    #[error("rendezvous transport error: {0}")]
    Http(#[from] reqwest::Error),

    /// The leader published a failed setup
    #[error("leader setup failed: {0}")]
    LeaderFailed(String),

    /// Serialization/deserialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Embedded manifest could not be parsed
    #[error("manifest error: {0}")]
    Manifest(#[from] serde_yaml::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),
}

impl BootstrapError {
    /// Create a transient error with the given message
    pub fn transient(msg: impl Into<String>) -> Self {
        Self::Transient(msg.into())
    }

    /// Create a timeout error for the described wait
    pub fn timeout(what: impl Into<String>, timeout: Duration) -> Self {
        Self::Timeout {
            what: what.into(),
            timeout,
        }
    }

    /// Create a rendezvous error with the given message
    pub fn rendezvous(msg: impl Into<String>) -> Self {
        Self::Rendezvous(msg.into())
    }

    /// Create an IP family error with the given message
    pub fn ip_family(msg: impl Into<String>) -> Self {
        Self::IpFamily(msg.into())
    }

    /// Create a configuration error with the given message
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Whether a polling gate should keep polling after this error.
    ///
    /// Mirrors the API server's notion of a retryable failure: throttling,
    /// internal and gateway errors, plus anything that failed in transport.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transient(_) => true,
            Self::Kube(kube::Error::Api(resp)) => {
                matches!(resp.code, 429 | 500 | 502 | 503 | 504)
            }
            Self::Kube(
                kube::Error::HyperError(_) | kube::Error::Service(_) | kube::Error::ReadEvents(_),
            ) => true,
            Self::Http(e) => e.is_connect() || e.is_timeout(),
            _ => false,
        }
    }

    /// Whether this is a 404 from the API server
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Kube(kube::Error::Api(resp)) if resp.code == 404)
    }
}
