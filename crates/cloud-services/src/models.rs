//! Infrastructure gateway request and response payloads

use crds::{Instance, SecurityGroup, SubnetSpec, VpcSpec};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Body of `PUT .../network`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkRequest {
    pub vpc: VpcSpec,
    pub subnets: Vec<SubnetSpec>,
}

/// Network state after reconciliation. Subnet ids are filled in for
/// subnets the gateway created.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkResponse {
    pub vpc: VpcSpec,
    #[serde(default)]
    pub subnets: Vec<SubnetSpec>,
}

/// Body of `PUT .../security-groups`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityGroupsRequest {
    pub vpc_id: Option<String>,
    pub overrides: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityGroupsResponse {
    /// Security groups keyed by role
    #[serde(default)]
    pub security_groups: BTreeMap<String, SecurityGroup>,
}

/// Body of `PUT .../bastion`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BastionRequest {
    pub instance_type: Option<String>,
    pub ssh_key_name: Option<String>,
    pub allowed_cidr_blocks: Vec<String>,
    /// Public subnet the bastion is placed in
    pub subnet_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BastionResponse {
    pub instance: Option<Instance>,
}

/// Body of `PUT .../load-balancer`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadBalancerRequest {
    pub subnet_ids: Vec<String>,
    pub security_group_ids: Vec<String>,
    pub port: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadBalancerResponse {
    pub name: Option<String>,
    /// Empty until the provider has assigned one
    #[serde(default)]
    pub dns_name: Option<String>,
    #[serde(default)]
    pub availability_zones: Vec<String>,
}
