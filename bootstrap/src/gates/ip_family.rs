//! Detect the cluster's default IP family
//!
//! Services are single family, so the cluster IP of the `kubernetes` service
//! in `default` identifies the family the cluster hands out by default.

use std::net::IpAddr;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use tracing::{info, instrument};

use crate::cluster::SharedCluster;
use crate::error::{BootstrapError, BootstrapResult};

const KUBERNETES_SERVICE: &str = "kubernetes";
const KUBERNETES_SERVICE_NAMESPACE: &str = "default";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ClusterIpFamily {
    Ipv4,
    Ipv6,
}

impl ClusterIpFamily {
    /// IPv6 when the address parses as IPv6 and is not an IPv4-mapped one
    pub fn classify(addr: &str) -> Self {
        match addr.trim().parse::<IpAddr>() {
            Ok(IpAddr::V6(v6)) if v6.to_ipv4_mapped().is_none() => Self::Ipv6,
            _ => Self::Ipv4,
        }
    }
}

pub struct ClusterIpFamilyResolver {
    cluster: SharedCluster,
}

impl ClusterIpFamilyResolver {
    pub fn new(cluster: SharedCluster) -> Self {
        Self { cluster }
    }

    /// Single lookup, no retry: a missing `kubernetes` service means the
    /// environment is misconfigured.
    #[instrument(skip(self))]
    pub async fn resolve(&self) -> BootstrapResult<ClusterIpFamily> {
        let svc = self
            .cluster
            .get_service(KUBERNETES_SERVICE_NAMESPACE, KUBERNETES_SERVICE)
            .await
            .map_err(|e| {
                BootstrapError::ip_family(format!("failed to get kubernetes service: {}", e))
            })?;

        let cluster_ip = svc
            .spec
            .and_then(|s| s.cluster_ip)
            .filter(|ip| !ip.is_empty())
            .ok_or_else(|| BootstrapError::ip_family("kubernetes service has no cluster IP"))?;

        let family = ClusterIpFamily::classify(&cluster_ip);
        info!(cluster_ip = %cluster_ip, "Cluster IP family: {}", family);
        Ok(family)
    }
}
