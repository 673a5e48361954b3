//! AWSCluster CRD
//!
//! Declares the cloud infrastructure backing a logical cluster: the VPC and
//! subnets, security group overrides, the optional bastion host and the API
//! server load balancer. Status carries what the subsystems observed.

use crate::conditions::Condition;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Finalizer that guards the cloud resources of an `AWSCluster`.
pub const AWS_CLUSTER_FINALIZER: &str = "awscluster.infrastructure.cluster.x-k8s.io";

/// Default port of the Kubernetes API server behind the load balancer.
pub const DEFAULT_API_SERVER_PORT: i32 = 6443;

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[kube(
    group = "infrastructure.cluster.x-k8s.io",
    version = "v1beta1",
    kind = "AWSCluster",
    namespaced,
    status = "AWSClusterStatus",
    shortname = "awsc"
)]
#[serde(rename_all = "camelCase")]
pub struct AWSClusterSpec {
    /// Cloud region the infrastructure lives in (e.g. "us-east-1")
    pub region: String,

    /// Network topology: VPC, subnets and security group overrides
    #[serde(default)]
    pub network: NetworkSpec,

    /// Bastion host configuration
    #[serde(default)]
    pub bastion: Bastion,

    /// Endpoint used to reach the control plane. Filled from the load
    /// balancer DNS name when left empty.
    #[serde(default)]
    pub control_plane_endpoint: ApiEndpoint,

    /// Port the API server listens on behind the load balancer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_server_port: Option<i32>,

    /// SSH key pair name for the bastion and machines
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssh_key_name: Option<String>,
}

/// VPC and subnet layout of the cluster.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NetworkSpec {
    /// VPC descriptor
    #[serde(default)]
    pub vpc: VpcSpec,

    /// Ordered subnets of the cluster
    #[serde(default)]
    pub subnets: Vec<SubnetSpec>,

    /// Security group ids to use instead of managed ones, keyed by role
    /// (see [`SecurityGroupRole`])
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub security_group_overrides: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VpcSpec {
    /// VPC id; empty when the VPC is managed and not created yet
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// CIDR block of the VPC
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cidr_block: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SubnetSpec {
    /// Subnet id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Availability zone of the subnet
    #[serde(default)]
    pub availability_zone: String,

    /// CIDR block of the subnet
    #[serde(default)]
    pub cidr_block: String,

    /// Whether the subnet routes to an internet gateway
    #[serde(default)]
    pub is_public: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Bastion {
    /// Whether a bastion host should exist for the cluster
    #[serde(default)]
    pub enabled: bool,

    /// Instance type of the bastion
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_type: Option<String>,

    /// CIDR blocks allowed to reach the bastion over SSH
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowed_cidr_blocks: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ApiEndpoint {
    /// Hostname or IP of the endpoint
    #[serde(default)]
    pub host: String,

    /// Port of the endpoint
    #[serde(default)]
    pub port: i32,
}

impl ApiEndpoint {
    /// An endpoint is unset until it has both a host and a port.
    pub fn is_zero(&self) -> bool {
        self.host.is_empty() || self.port == 0
    }
}

/// Roles a managed security group can play.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SecurityGroupRole {
    Bastion,
    Node,
    ControlPlane,
    ApiServerLoadBalancer,
    LoadBalancer,
}

impl SecurityGroupRole {
    /// Key used in `spec.network.securityGroupOverrides` and
    /// `status.network.securityGroups`.
    pub fn as_str(&self) -> &'static str {
        match self {
            SecurityGroupRole::Bastion => "bastion",
            SecurityGroupRole::Node => "node",
            SecurityGroupRole::ControlPlane => "controlplane",
            SecurityGroupRole::ApiServerLoadBalancer => "apiserver-lb",
            SecurityGroupRole::LoadBalancer => "lb",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AWSClusterStatus {
    /// Set once the infrastructure is provisioned and the API server
    /// endpoint resolves
    #[serde(default)]
    pub ready: bool,

    /// Observed network state
    #[serde(default)]
    pub network: NetworkStatus,

    /// Failure domains (availability zones) usable by the control plane
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub failure_domains: BTreeMap<String, FailureDomainSpec>,

    /// Bastion instance, when one exists
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bastion: Option<Instance>,

    /// Per-subsystem conditions
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NetworkStatus {
    /// Security groups keyed by role
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub security_groups: BTreeMap<String, SecurityGroup>,

    /// API server load balancer
    #[serde(default)]
    pub api_server_load_balancer: LoadBalancer,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SecurityGroup {
    pub id: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LoadBalancer {
    /// Name of the load balancer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// DNS name assigned by the cloud provider
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dns_name: Option<String>,

    /// Availability zones the load balancer spans
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub availability_zones: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FailureDomainSpec {
    /// Whether control plane machines may be placed in this domain
    #[serde(default)]
    pub control_plane: bool,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Instance {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_ip: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_ip: Option<String>,
}

impl AWSCluster {
    /// DNS name of the API server load balancer, if one has been assigned.
    /// An empty string counts as unassigned.
    pub fn load_balancer_dns_name(&self) -> Option<&str> {
        self.status
            .as_ref()
            .and_then(|s| s.network.api_server_load_balancer.dns_name.as_deref())
            .filter(|name| !name.is_empty())
    }

    /// Subnets that are not routed to an internet gateway.
    pub fn private_subnets(&self) -> impl Iterator<Item = &SubnetSpec> {
        self.spec.network.subnets.iter().filter(|s| !s.is_public)
    }

    /// Conditions recorded on the status (empty when no status yet).
    pub fn conditions(&self) -> &[Condition] {
        self.status.as_ref().map_or(&[], |s| s.conditions.as_slice())
    }

    /// Whether the controller finalizer is present.
    pub fn has_finalizer(&self) -> bool {
        self.metadata
            .finalizers
            .as_ref()
            .is_some_and(|f| f.iter().any(|x| x == AWS_CLUSTER_FINALIZER))
    }

    /// Port to publish on the control plane endpoint.
    pub fn api_server_port(&self) -> i32 {
        self.spec.api_server_port.unwrap_or(DEFAULT_API_SERVER_PORT)
    }
}
