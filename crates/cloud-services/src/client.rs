//! Infrastructure gateway client
//!
//! Implements the subsystem services against the infrastructure gateway's
//! REST API. Every subsystem is addressed as
//! `/v1/regions/{region}/namespaces/{namespace}/clusters/{name}/{subsystem}`:
//! `PUT` converges it to the request body, `DELETE` removes it.

use crate::common::HttpClient;
use crate::error::ServiceError;
use crate::models::*;
use crate::service_trait::*;
use crds::{AWSCluster, AWSClusterStatus, LoadBalancer, SecurityGroupRole};
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Subsystem services for one cluster, backed by the gateway.
#[derive(Debug, Clone)]
pub struct GatewayClient {
    http: Arc<HttpClient>,
    ctx: ServiceContext,
}

impl GatewayClient {
    pub fn new(http: Arc<HttpClient>, ctx: ServiceContext) -> Self {
        Self { http, ctx }
    }

    /// Path of a subsystem resource of this cluster.
    pub fn subsystem_path(&self, subsystem: Subsystem) -> String {
        format!(
            "/v1/regions/{}/namespaces/{}/clusters/{}/{}",
            self.ctx.region, self.ctx.namespace, self.ctx.cluster_name, subsystem
        )
    }

    fn network_request(cluster: &AWSCluster) -> NetworkRequest {
        NetworkRequest {
            vpc: cluster.spec.network.vpc.clone(),
            subnets: cluster.spec.network.subnets.clone(),
        }
    }

    fn security_groups_request(cluster: &AWSCluster) -> SecurityGroupsRequest {
        SecurityGroupsRequest {
            vpc_id: cluster.spec.network.vpc.id.clone(),
            overrides: cluster.spec.network.security_group_overrides.clone(),
        }
    }

    fn bastion_request(cluster: &AWSCluster) -> BastionRequest {
        let bastion = &cluster.spec.bastion;
        BastionRequest {
            instance_type: bastion.instance_type.clone(),
            ssh_key_name: cluster.spec.ssh_key_name.clone(),
            allowed_cidr_blocks: bastion.allowed_cidr_blocks.clone(),
            subnet_id: cluster
                .spec
                .network
                .subnets
                .iter()
                .find(|s| s.is_public)
                .and_then(|s| s.id.clone()),
        }
    }

    fn load_balancer_request(cluster: &AWSCluster) -> LoadBalancerRequest {
        let security_group_ids = cluster
            .status
            .as_ref()
            .and_then(|s| {
                s.network
                    .security_groups
                    .get(SecurityGroupRole::ApiServerLoadBalancer.as_str())
            })
            .map(|sg| vec![sg.id.clone()])
            .unwrap_or_default();

        LoadBalancerRequest {
            subnet_ids: cluster
                .spec
                .network
                .subnets
                .iter()
                .filter_map(|s| s.id.clone())
                .collect(),
            security_group_ids,
            port: cluster.api_server_port(),
        }
    }

    fn status_mut(cluster: &mut AWSCluster) -> &mut AWSClusterStatus {
        cluster.status.get_or_insert_with(AWSClusterStatus::default)
    }

    async fn put<T: for<'de> serde::Deserialize<'de>>(
        &self,
        subsystem: Subsystem,
        body: impl serde::Serialize,
    ) -> Result<T, ServiceError> {
        let body = serde_json::to_value(body)?;
        self.http.put(&self.subsystem_path(subsystem), &body).await
    }

    async fn delete(&self, subsystem: Subsystem) -> Result<(), ServiceError> {
        self.http.delete(&self.subsystem_path(subsystem)).await
    }
}

#[async_trait::async_trait]
impl NetworkService for GatewayClient {
    async fn reconcile_network(&self, cluster: &mut AWSCluster) -> Result<(), ServiceError> {
        debug!("Reconciling network for {}/{}", self.ctx.namespace, self.ctx.cluster_name);
        let response: NetworkResponse = self
            .put(Subsystem::Network, Self::network_request(cluster))
            .await?;

        cluster.spec.network.vpc = response.vpc;
        if !response.subnets.is_empty() {
            cluster.spec.network.subnets = response.subnets;
        }
        Ok(())
    }

    async fn delete_network(&self, _cluster: &mut AWSCluster) -> Result<(), ServiceError> {
        debug!("Deleting network for {}/{}", self.ctx.namespace, self.ctx.cluster_name);
        self.delete(Subsystem::Network).await
    }
}

#[async_trait::async_trait]
impl SecurityGroupService for GatewayClient {
    async fn reconcile_security_groups(&self, cluster: &mut AWSCluster) -> Result<(), ServiceError> {
        let response: SecurityGroupsResponse = self
            .put(Subsystem::SecurityGroups, Self::security_groups_request(cluster))
            .await?;
        Self::status_mut(cluster).network.security_groups = response.security_groups;
        Ok(())
    }

    async fn delete_security_groups(&self, cluster: &mut AWSCluster) -> Result<(), ServiceError> {
        self.delete(Subsystem::SecurityGroups).await?;
        Self::status_mut(cluster).network.security_groups.clear();
        Ok(())
    }
}

#[async_trait::async_trait]
impl BastionService for GatewayClient {
    async fn reconcile_bastion(&self, cluster: &mut AWSCluster) -> Result<(), ServiceError> {
        if !cluster.spec.bastion.enabled {
            debug!(
                "Bastion disabled for {}/{}, removing any existing instance",
                self.ctx.namespace, self.ctx.cluster_name
            );
            return self.delete_bastion(cluster).await;
        }

        let response: BastionResponse = self
            .put(Subsystem::Bastion, Self::bastion_request(cluster))
            .await?;
        Self::status_mut(cluster).bastion = response.instance;
        Ok(())
    }

    async fn delete_bastion(&self, cluster: &mut AWSCluster) -> Result<(), ServiceError> {
        self.delete(Subsystem::Bastion).await?;
        if let Some(status) = cluster.status.as_mut() {
            status.bastion = None;
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl LoadBalancerService for GatewayClient {
    async fn reconcile_load_balancers(&self, cluster: &mut AWSCluster) -> Result<(), ServiceError> {
        let response: LoadBalancerResponse = self
            .put(Subsystem::LoadBalancer, Self::load_balancer_request(cluster))
            .await?;
        Self::status_mut(cluster).network.api_server_load_balancer = LoadBalancer {
            name: response.name,
            dns_name: response.dns_name,
            availability_zones: response.availability_zones,
        };
        Ok(())
    }

    async fn delete_load_balancers(&self, cluster: &mut AWSCluster) -> Result<(), ServiceError> {
        self.delete(Subsystem::LoadBalancer).await?;
        if let Some(status) = cluster.status.as_mut() {
            status.network.api_server_load_balancer = LoadBalancer::default();
        }
        Ok(())
    }
}

/// Builds [`GatewayClient`]s sharing one HTTP connection pool.
#[derive(Debug, Clone)]
pub struct GatewayServiceFactory {
    http: Arc<HttpClient>,
}

impl GatewayServiceFactory {
    /// Create a new factory
    ///
    /// # Arguments
    /// * `base_url` - gateway base URL (e.g., "http://infra-gateway:8080")
    /// * `token` - bearer token for authentication
    pub fn new(base_url: String, token: String) -> Result<Self, ServiceError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(ServiceError::Http)?;

        Ok(Self {
            http: Arc::new(HttpClient::new(client, base_url, token)),
        })
    }

    /// Get the base URL
    pub fn base_url(&self) -> &str {
        self.http.base_url()
    }

    /// Checks that the gateway is reachable and accepts the token.
    pub async fn validate(&self) -> Result<(), ServiceError> {
        debug!("Validating gateway token and connectivity");
        let _status: serde_json::Value = self.http.get("/v1/status").await?;
        info!("Infrastructure gateway reachable at {}", self.base_url());
        Ok(())
    }

    fn client(&self, ctx: &ServiceContext) -> Arc<GatewayClient> {
        Arc::new(GatewayClient::new(Arc::clone(&self.http), ctx.clone()))
    }
}

impl ServiceFactory for GatewayServiceFactory {
    fn network(&self, ctx: &ServiceContext) -> Arc<dyn NetworkService> {
        self.client(ctx)
    }

    fn security_groups(&self, ctx: &ServiceContext) -> Arc<dyn SecurityGroupService> {
        self.client(ctx)
    }

    fn bastion(&self, ctx: &ServiceContext) -> Arc<dyn BastionService> {
        self.client(ctx)
    }

    fn load_balancer(&self, ctx: &ServiceContext) -> Arc<dyn LoadBalancerService> {
        self.client(ctx)
    }
}
