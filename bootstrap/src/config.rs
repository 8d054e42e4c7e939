use std::time::Duration;

use serde::Deserialize;

use crate::chaos::{ChaosSchedule, MAX_CHAOS_WAIT};
use crate::coordinator::ExecutorIdentity;
use crate::error::{BootstrapError, BootstrapResult};

/// Suite bootstrap configuration, read from `E2E_*` environment variables
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Delete every non-protected namespace before the suite starts
    #[serde(default)]
    pub clean_start: bool,

    #[serde(default = "default_system_namespace")]
    pub system_namespace: String,

    /// Minimum number of running+ready system pods
    #[serde(default = "default_min_startup_pods")]
    pub min_startup_pods: u32,

    #[serde(default)]
    pub allowed_not_ready_pods: u32,

    /// Also used as the per-daemonset tolerance
    #[serde(default)]
    pub allowed_not_ready_nodes: u32,

    /// Expected schedulable nodes; auto-detected when unset
    #[serde(default)]
    pub num_nodes: Option<usize>,

    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    #[serde(default = "default_pod_startup_timeout_secs")]
    pub pod_startup_timeout_secs: u64,

    #[serde(default = "default_node_schedulable_timeout_secs")]
    pub node_schedulable_timeout_secs: u64,

    #[serde(default = "default_namespace_cleanup_timeout_secs")]
    pub namespace_cleanup_timeout_secs: u64,

    #[serde(default = "default_daemonset_startup_timeout_secs")]
    pub daemonset_startup_timeout_secs: u64,

    #[serde(default = "default_canary_timeout_secs")]
    pub canary_timeout_secs: u64,

    #[serde(default)]
    pub chaos_enabled: bool,

    #[serde(default = "default_chaos_interval_secs")]
    pub chaos_interval_secs: u64,

    #[serde(default = "default_chaos_jitter_factor")]
    pub chaos_jitter_factor: f64,

    #[serde(default = "default_chaos_failure_ratio")]
    pub chaos_failure_ratio: f64,

    #[serde(default = "default_chaos_stop_grace_secs")]
    pub chaos_stop_grace_secs: u64,

    /// 1-based index of this executor; executor 1 leads
    #[serde(default = "default_parallel_node")]
    pub parallel_node: u32,

    #[serde(default = "default_parallel_total")]
    pub parallel_total: u32,

    /// Base URL of the rendezvous server; required when `parallel_total > 1`
    #[serde(default)]
    pub rendezvous_url: Option<String>,

    #[serde(default = "default_rendezvous_port")]
    pub rendezvous_port: u16,

    #[serde(default = "default_rendezvous_poll_interval_ms")]
    pub rendezvous_poll_interval_ms: u64,

    #[serde(default = "default_rendezvous_timeout_secs")]
    pub rendezvous_timeout_secs: u64,

    #[serde(default)]
    pub kubeconfig: Option<String>,
}

fn default_system_namespace() -> String {
    "kube-system".to_string()
}

fn default_min_startup_pods() -> u32 {
    8
}

fn default_poll_interval_secs() -> u64 {
    2
}

fn default_pod_startup_timeout_secs() -> u64 {
    10 * 60
}

fn default_node_schedulable_timeout_secs() -> u64 {
    30 * 60
}

fn default_namespace_cleanup_timeout_secs() -> u64 {
    15 * 60
}

fn default_daemonset_startup_timeout_secs() -> u64 {
    5 * 60
}

fn default_canary_timeout_secs() -> u64 {
    5 * 60
}

fn default_chaos_interval_secs() -> u64 {
    60
}

fn default_chaos_jitter_factor() -> f64 {
    60.0
}

fn default_chaos_failure_ratio() -> f64 {
    0.01
}

fn default_chaos_stop_grace_secs() -> u64 {
    30
}

fn default_parallel_node() -> u32 {
    1
}

fn default_parallel_total() -> u32 {
    1
}

fn default_rendezvous_port() -> u16 {
    8099
}

fn default_rendezvous_poll_interval_ms() -> u64 {
    500
}

fn default_rendezvous_timeout_secs() -> u64 {
    60 * 60
}

impl Config {
    pub fn load() -> BootstrapResult<Self> {
        // Load .env file if it exists
        dotenvy::dotenv().ok();

        let settings: Config = config::Config::builder()
            .add_source(config::Environment::with_prefix("E2E").try_parsing(true))
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| BootstrapError::config(e.to_string()))?;

        settings.validate()?;
        Ok(settings)
    }

    /// Reject settings that would make the gates meaningless
    pub fn validate(&self) -> BootstrapResult<()> {
        if self.parallel_total == 0 || self.parallel_node == 0 {
            return Err(BootstrapError::config(
                "parallel_node and parallel_total are 1-based",
            ));
        }
        if self.parallel_node > self.parallel_total {
            return Err(BootstrapError::config(format!(
                "parallel_node {} exceeds parallel_total {}",
                self.parallel_node, self.parallel_total
            )));
        }
        if self.parallel_total > 1 && self.rendezvous_url.is_none() {
            return Err(BootstrapError::config(
                "rendezvous_url is required when running more than one executor",
            ));
        }
        if self.poll_interval_secs == 0 {
            return Err(BootstrapError::config("poll_interval_secs must be positive"));
        }
        if !(0.0..=1.0).contains(&self.chaos_failure_ratio) {
            return Err(BootstrapError::config(
                "chaos_failure_ratio must be within [0, 1]",
            ));
        }
        if !self.chaos_jitter_factor.is_finite() || self.chaos_jitter_factor < 0.0 {
            return Err(BootstrapError::config(
                "chaos_jitter_factor must be a finite, non-negative number",
            ));
        }
        if self.chaos_interval_secs == 0 {
            return Err(BootstrapError::config("chaos_interval_secs must be positive"));
        }
        if self.chaos_schedule().max_wait_secs() > MAX_CHAOS_WAIT.as_secs_f64() {
            return Err(BootstrapError::config(format!(
                "chaos_interval_secs * (1 + chaos_jitter_factor) must not exceed {}s",
                MAX_CHAOS_WAIT.as_secs()
            )));
        }
        if self.rendezvous_poll_interval_ms == 0 {
            return Err(BootstrapError::config(
                "rendezvous_poll_interval_ms must be positive",
            ));
        }
        Ok(())
    }

    pub fn executor_identity(&self) -> BootstrapResult<ExecutorIdentity> {
        ExecutorIdentity::new(self.parallel_node, self.parallel_total)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn pod_startup_timeout(&self) -> Duration {
        Duration::from_secs(self.pod_startup_timeout_secs)
    }

    pub fn node_schedulable_timeout(&self) -> Duration {
        Duration::from_secs(self.node_schedulable_timeout_secs)
    }

    pub fn namespace_cleanup_timeout(&self) -> Duration {
        Duration::from_secs(self.namespace_cleanup_timeout_secs)
    }

    pub fn daemonset_startup_timeout(&self) -> Duration {
        Duration::from_secs(self.daemonset_startup_timeout_secs)
    }

    pub fn canary_timeout(&self) -> Duration {
        Duration::from_secs(self.canary_timeout_secs)
    }

    pub fn chaos_stop_grace(&self) -> Duration {
        Duration::from_secs(self.chaos_stop_grace_secs)
    }

    pub fn rendezvous_poll_interval(&self) -> Duration {
        Duration::from_millis(self.rendezvous_poll_interval_ms)
    }

    pub fn rendezvous_timeout(&self) -> Duration {
        Duration::from_secs(self.rendezvous_timeout_secs)
    }

    pub fn chaos_schedule(&self) -> ChaosSchedule {
        ChaosSchedule {
            enabled: self.chaos_enabled,
            interval: Duration::from_secs(self.chaos_interval_secs),
            jitter_factor: self.chaos_jitter_factor,
            failure_ratio: self.chaos_failure_ratio,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            clean_start: false,
            system_namespace: default_system_namespace(),
            min_startup_pods: default_min_startup_pods(),
            allowed_not_ready_pods: 0,
            allowed_not_ready_nodes: 0,
            num_nodes: None,
            poll_interval_secs: default_poll_interval_secs(),
            pod_startup_timeout_secs: default_pod_startup_timeout_secs(),
            node_schedulable_timeout_secs: default_node_schedulable_timeout_secs(),
            namespace_cleanup_timeout_secs: default_namespace_cleanup_timeout_secs(),
            daemonset_startup_timeout_secs: default_daemonset_startup_timeout_secs(),
            canary_timeout_secs: default_canary_timeout_secs(),
            chaos_enabled: false,
            chaos_interval_secs: default_chaos_interval_secs(),
            chaos_jitter_factor: default_chaos_jitter_factor(),
            chaos_failure_ratio: default_chaos_failure_ratio(),
            chaos_stop_grace_secs: default_chaos_stop_grace_secs(),
            parallel_node: default_parallel_node(),
            parallel_total: default_parallel_total(),
            rendezvous_url: None,
            rendezvous_port: default_rendezvous_port(),
            rendezvous_poll_interval_ms: default_rendezvous_poll_interval_ms(),
            rendezvous_timeout_secs: default_rendezvous_timeout_secs(),
            kubeconfig: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(!config.clean_start);
        assert_eq!(config.system_namespace, "kube-system");
        assert_eq!(config.min_startup_pods, 8);
        assert_eq!(config.poll_interval(), Duration::from_secs(2));
        assert_eq!(config.pod_startup_timeout(), Duration::from_secs(600));
        assert_eq!(config.node_schedulable_timeout(), Duration::from_secs(1800));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parallel_run_needs_rendezvous_url() {
        let config = Config {
            parallel_node: 2,
            parallel_total: 4,
            ..Config::default()
        };
        assert!(config.validate().is_err());

        let config = Config {
            rendezvous_url: Some("http://127.0.0.1:8099".into()),
            ..config
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_executor_index_out_of_range() {
        let config = Config {
            parallel_node: 5,
            parallel_total: 4,
            rendezvous_url: Some("http://127.0.0.1:8099".into()),
            ..Config::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("exceeds parallel_total"));
    }

    #[test]
    fn test_chaos_schedule_from_config() {
        let config = Config {
            chaos_enabled: true,
            chaos_interval_secs: 30,
            chaos_failure_ratio: 0.5,
            ..Config::default()
        };
        let schedule = config.chaos_schedule();
        assert!(schedule.enabled);
        assert_eq!(schedule.interval, Duration::from_secs(30));
        assert_eq!(schedule.failure_ratio, 0.5);
    }

    #[test]
    fn test_jitter_factor_must_be_finite() {
        for jitter in [f64::NAN, f64::INFINITY, -1.0] {
            let config = Config {
                chaos_jitter_factor: jitter,
                ..Config::default()
            };
            let err = config.validate().unwrap_err();
            assert!(err.to_string().contains("chaos_jitter_factor"), "{}", err);
        }
    }

    #[test]
    fn test_huge_chaos_wait_rejected() {
        let config = Config {
            chaos_jitter_factor: 1e20,
            ..Config::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("must not exceed"));

        // Defaults: 60s * (1 + 60) stays well inside the bound
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_zero_chaos_interval_rejected() {
        let config = Config {
            chaos_interval_secs: 0,
            chaos_jitter_factor: 0.0,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_rendezvous_poll_interval_rejected() {
        let config = Config {
            rendezvous_poll_interval_ms: 0,
            ..Config::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("rendezvous_poll_interval_ms"));
    }

    #[test]
    fn test_failure_ratio_bounds() {
        let config = Config {
            chaos_failure_ratio: 1.5,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }
}
