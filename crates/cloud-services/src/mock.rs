//! Mock cloud services for unit testing
//!
//! `MockCloudServices` implements every subsystem trait plus
//! `ServiceFactory`, records each call in order, and can be scripted to fail
//! or hang on specific calls. Clones share state, so a test keeps one handle
//! while the controller owns another.

use crate::dns::DnsResolver;
use crate::error::ServiceError;
use crate::service_trait::*;
use crds::{AWSCluster, AWSClusterStatus};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

/// One recorded subsystem call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceCall {
    ReconcileNetwork,
    DeleteNetwork,
    ReconcileSecurityGroups,
    DeleteSecurityGroups,
    ReconcileBastion,
    DeleteBastion,
    ReconcileLoadBalancers,
    DeleteLoadBalancers,
}

impl ServiceCall {
    pub fn subsystem(&self) -> Subsystem {
        match self {
            ServiceCall::ReconcileNetwork | ServiceCall::DeleteNetwork => Subsystem::Network,
            ServiceCall::ReconcileSecurityGroups | ServiceCall::DeleteSecurityGroups => {
                Subsystem::SecurityGroups
            }
            ServiceCall::ReconcileBastion | ServiceCall::DeleteBastion => Subsystem::Bastion,
            ServiceCall::ReconcileLoadBalancers | ServiceCall::DeleteLoadBalancers => {
                Subsystem::LoadBalancer
            }
        }
    }
}

/// Mock subsystem services for testing
#[derive(Debug, Clone, Default)]
pub struct MockCloudServices {
    calls: Arc<Mutex<Vec<ServiceCall>>>,
    failures: Arc<Mutex<HashMap<ServiceCall, String>>>,
    hangs: Arc<Mutex<HashSet<ServiceCall>>>,
    contexts: Arc<Mutex<Vec<ServiceContext>>>,
    load_balancer_dns_name: Arc<Mutex<Option<String>>>,
}

impl MockCloudServices {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `call` fail with `ServiceError::Api(message)`.
    pub fn fail_on(&self, call: ServiceCall, message: impl Into<String>) {
        self.failures.lock().unwrap().insert(call, message.into());
    }

    /// Make `call` never complete (for cancellation tests).
    pub fn hang_on(&self, call: ServiceCall) {
        self.hangs.lock().unwrap().insert(call);
    }

    /// DNS name a successful load balancer reconcile writes to status.
    pub fn set_load_balancer_dns_name(&self, dns_name: impl Into<String>) {
        *self.load_balancer_dns_name.lock().unwrap() = Some(dns_name.into());
    }

    /// Calls made so far, in order.
    pub fn calls(&self) -> Vec<ServiceCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self, call: ServiceCall) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| **c == call).count()
    }

    /// Contexts the factory was asked to build services for.
    pub fn contexts(&self) -> Vec<ServiceContext> {
        self.contexts.lock().unwrap().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    /// Drop every scripted failure.
    pub fn clear_failures(&self) {
        self.failures.lock().unwrap().clear();
    }

    async fn record(&self, call: ServiceCall) -> Result<(), ServiceError> {
        self.calls.lock().unwrap().push(call);

        let hang = self.hangs.lock().unwrap().contains(&call);
        if hang {
            std::future::pending::<()>().await;
        }

        match self.failures.lock().unwrap().get(&call) {
            Some(message) => Err(ServiceError::Api(message.clone())),
            None => Ok(()),
        }
    }

    fn this(&self, ctx: &ServiceContext) -> Arc<Self> {
        self.contexts.lock().unwrap().push(ctx.clone());
        Arc::new(self.clone())
    }
}

#[async_trait::async_trait]
impl NetworkService for MockCloudServices {
    async fn reconcile_network(&self, _cluster: &mut AWSCluster) -> Result<(), ServiceError> {
        self.record(ServiceCall::ReconcileNetwork).await
    }

    async fn delete_network(&self, _cluster: &mut AWSCluster) -> Result<(), ServiceError> {
        self.record(ServiceCall::DeleteNetwork).await
    }
}

#[async_trait::async_trait]
impl SecurityGroupService for MockCloudServices {
    async fn reconcile_security_groups(&self, _cluster: &mut AWSCluster) -> Result<(), ServiceError> {
        self.record(ServiceCall::ReconcileSecurityGroups).await
    }

    async fn delete_security_groups(&self, _cluster: &mut AWSCluster) -> Result<(), ServiceError> {
        self.record(ServiceCall::DeleteSecurityGroups).await
    }
}

#[async_trait::async_trait]
impl BastionService for MockCloudServices {
    async fn reconcile_bastion(&self, _cluster: &mut AWSCluster) -> Result<(), ServiceError> {
        self.record(ServiceCall::ReconcileBastion).await
    }

    async fn delete_bastion(&self, _cluster: &mut AWSCluster) -> Result<(), ServiceError> {
        self.record(ServiceCall::DeleteBastion).await
    }
}

#[async_trait::async_trait]
impl LoadBalancerService for MockCloudServices {
    async fn reconcile_load_balancers(&self, cluster: &mut AWSCluster) -> Result<(), ServiceError> {
        self.record(ServiceCall::ReconcileLoadBalancers).await?;

        let dns_name = self.load_balancer_dns_name.lock().unwrap().clone();
        if let Some(dns_name) = dns_name {
            cluster
                .status
                .get_or_insert_with(AWSClusterStatus::default)
                .network
                .api_server_load_balancer
                .dns_name = Some(dns_name);
        }
        Ok(())
    }

    async fn delete_load_balancers(&self, _cluster: &mut AWSCluster) -> Result<(), ServiceError> {
        self.record(ServiceCall::DeleteLoadBalancers).await
    }
}

impl ServiceFactory for MockCloudServices {
    fn network(&self, ctx: &ServiceContext) -> Arc<dyn NetworkService> {
        self.this(ctx)
    }

    fn security_groups(&self, ctx: &ServiceContext) -> Arc<dyn SecurityGroupService> {
        self.this(ctx)
    }

    fn bastion(&self, ctx: &ServiceContext) -> Arc<dyn BastionService> {
        self.this(ctx)
    }

    fn load_balancer(&self, ctx: &ServiceContext) -> Arc<dyn LoadBalancerService> {
        self.this(ctx)
    }
}

/// Resolver that only resolves the names it was given.
#[derive(Debug, Clone, Default)]
pub struct MockDnsResolver {
    resolvable: Arc<Mutex<HashSet<String>>>,
    lookups: Arc<Mutex<Vec<String>>>,
}

impl MockDnsResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolver that resolves exactly `hosts`.
    pub fn resolving(hosts: &[&str]) -> Self {
        let resolver = Self::new();
        for host in hosts {
            resolver.add_host(host);
        }
        resolver
    }

    pub fn add_host(&self, host: &str) {
        self.resolvable.lock().unwrap().insert(host.to_string());
    }

    /// Hostnames looked up so far, in order.
    pub fn lookups(&self) -> Vec<String> {
        self.lookups.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl DnsResolver for MockDnsResolver {
    async fn resolves(&self, host: &str) -> bool {
        self.lookups.lock().unwrap().push(host.to_string());
        self.resolvable.lock().unwrap().contains(host)
    }
}
