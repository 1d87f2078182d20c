//! Typed views over the cluster-scoped configuration objects the operator
//! reads. Only the fields the operator acts on are modelled.

use ingop_store::ObjectStore;
use serde::Deserialize;

use crate::error::{ReconcileError, ReconcileResult};
use crate::kinds;

pub const SINGLE_REPLICA_TOPOLOGY: &str = "SingleReplica";
pub const EXTERNAL_TOPOLOGY: &str = "External";
pub const NONE_PLATFORM: &str = "None";
pub const AWS_PLATFORM: &str = "AWS";
pub const AWS_NLB: &str = "NLB";

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InfrastructureStatus {
    #[serde(default)]
    pub control_plane_topology: String,
    #[serde(default)]
    pub infrastructure_topology: String,
    #[serde(default)]
    pub platform_status: Option<PlatformStatus>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct PlatformStatus {
    #[serde(rename = "type", default)]
    pub type_: String,
}

impl InfrastructureStatus {
    pub fn platform_type(&self) -> &str {
        self.platform_status
            .as_ref()
            .map(|p| p.type_.as_str())
            .unwrap_or_default()
    }

    /// Hosted control planes run ingress elsewhere.
    pub fn is_external_control_plane(&self) -> bool {
        self.control_plane_topology == EXTERNAL_TOPOLOGY
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngressConfigSpec {
    #[serde(default)]
    pub operator_log_level: Option<String>,
    #[serde(default)]
    pub load_balancer: Option<LoadBalancerSpec>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct LoadBalancerSpec {
    #[serde(default)]
    pub platform: Option<LoadBalancerPlatform>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct LoadBalancerPlatform {
    #[serde(rename = "type", default)]
    pub type_: String,
    #[serde(default)]
    pub aws: Option<AwsLoadBalancer>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct AwsLoadBalancer {
    #[serde(rename = "type", default)]
    pub type_: String,
}

impl IngressConfigSpec {
    pub fn wants_aws_nlb(&self) -> bool {
        self.load_balancer
            .as_ref()
            .and_then(|lb| lb.platform.as_ref())
            .filter(|p| p.type_ == AWS_PLATFORM)
            .and_then(|p| p.aws.as_ref())
            .is_some_and(|aws| aws.type_ == AWS_NLB)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngressConfigStatus {
    /// Empty when never set.
    #[serde(default)]
    pub default_placement: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngressConfig {
    pub spec: IngressConfigSpec,
    pub status: IngressConfigStatus,
}

impl IngressConfig {
    pub fn from_resource(obj: &ingop_store::ManagedResource) -> ReconcileResult<Self> {
        Ok(Self {
            spec: obj
                .decode_spec()
                .map_err(|e| ReconcileError::decode("ingress config spec", e))?,
            status: obj
                .decode_status()
                .map_err(|e| ReconcileError::decode("ingress config status", e))?,
        })
    }
}

pub async fn fetch_ingress_config(store: &dyn ObjectStore) -> ReconcileResult<IngressConfig> {
    let obj = store.get(&kinds::ingress_config()).await?;
    IngressConfig::from_resource(&obj)
}

pub async fn fetch_infrastructure(
    store: &dyn ObjectStore,
) -> ReconcileResult<InfrastructureStatus> {
    store
        .get(&kinds::infrastructure())
        .await?
        .decode_status()
        .map_err(|e| ReconcileError::decode("infrastructure status", e))
}
