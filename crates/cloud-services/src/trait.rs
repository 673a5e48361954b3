//! Subsystem service traits
//!
//! Each subsystem reconciles (create/update) or deletes its slice of the
//! cluster infrastructure and writes what it observed back onto the
//! `AWSCluster` it is given. Services are built per cluster by a
//! [`ServiceFactory`] injected into the controller, which keeps the
//! controller testable against mocks.

use crate::error::ServiceError;
use crds::AWSCluster;
use std::fmt;
use std::sync::Arc;

/// The four infrastructure subsystems.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Subsystem {
    Network,
    SecurityGroups,
    Bastion,
    LoadBalancer,
}

impl Subsystem {
    /// Stable label used in logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            Subsystem::Network => "network",
            Subsystem::SecurityGroups => "security-groups",
            Subsystem::Bastion => "bastion",
            Subsystem::LoadBalancer => "load-balancer",
        }
    }
}

impl fmt::Display for Subsystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of the cluster a set of services operates on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceContext {
    pub region: String,
    pub namespace: String,
    pub cluster_name: String,
}

impl ServiceContext {
    pub fn new(
        region: impl Into<String>,
        namespace: impl Into<String>,
        cluster_name: impl Into<String>,
    ) -> Self {
        Self {
            region: region.into(),
            namespace: namespace.into(),
            cluster_name: cluster_name.into(),
        }
    }
}

/// VPC, subnets, gateways and routing.
#[async_trait::async_trait]
pub trait NetworkService: Send + Sync {
    async fn reconcile_network(&self, cluster: &mut AWSCluster) -> Result<(), ServiceError>;
    async fn delete_network(&self, cluster: &mut AWSCluster) -> Result<(), ServiceError>;
}

/// Managed security groups and their rules.
#[async_trait::async_trait]
pub trait SecurityGroupService: Send + Sync {
    async fn reconcile_security_groups(&self, cluster: &mut AWSCluster) -> Result<(), ServiceError>;
    async fn delete_security_groups(&self, cluster: &mut AWSCluster) -> Result<(), ServiceError>;
}

/// Bastion host instance.
///
/// `reconcile_bastion` is called on every pass; when the bastion is disabled
/// in the spec the service removes any existing instance.
#[async_trait::async_trait]
pub trait BastionService: Send + Sync {
    async fn reconcile_bastion(&self, cluster: &mut AWSCluster) -> Result<(), ServiceError>;
    async fn delete_bastion(&self, cluster: &mut AWSCluster) -> Result<(), ServiceError>;
}

/// API server load balancer. On success the DNS name and availability
/// zones are recorded in `status.network.apiServerLoadBalancer`.
#[async_trait::async_trait]
pub trait LoadBalancerService: Send + Sync {
    async fn reconcile_load_balancers(&self, cluster: &mut AWSCluster) -> Result<(), ServiceError>;
    async fn delete_load_balancers(&self, cluster: &mut AWSCluster) -> Result<(), ServiceError>;
}

/// Builds the subsystem services for one cluster.
pub trait ServiceFactory: Send + Sync {
    fn network(&self, ctx: &ServiceContext) -> Arc<dyn NetworkService>;
    fn security_groups(&self, ctx: &ServiceContext) -> Arc<dyn SecurityGroupService>;
    fn bastion(&self, ctx: &ServiceContext) -> Arc<dyn BastionService>;
    fn load_balancer(&self, ctx: &ServiceContext) -> Arc<dyn LoadBalancerService>;
}
