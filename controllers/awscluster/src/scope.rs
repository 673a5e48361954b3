//! Per-invocation cluster scope.
//!
//! A `ClusterScope` binds the store, the owning `Cluster` and the
//! `AWSCluster` being reconciled. Pipelines mutate the `AWSCluster` through
//! it; nothing reaches the API server until [`ClusterScope::patch_object`]
//! or [`ClusterScope::close`] runs, and then only the parts that changed
//! since the object was loaded.

use crate::error::ControllerError;
use crate::store::ClusterStore;
use cloud_services::ServiceContext;
use crds::conditions::{self, Condition, ConditionSeverity};
use crds::{
    AWSCluster, AWSClusterStatus, AWS_CLUSTER_FINALIZER, ApiEndpoint, Cluster, FailureDomainSpec,
};
use std::sync::Arc;
use tracing::debug;

pub struct ClusterScope {
    store: Arc<dyn ClusterStore>,
    pub cluster: Cluster,
    pub aws_cluster: AWSCluster,
    /// Last persisted state of `aws_cluster`
    snapshot: AWSCluster,
}

impl ClusterScope {
    /// Builds a scope, rejecting objects that cannot be reconciled.
    pub fn new(
        store: Arc<dyn ClusterStore>,
        cluster: Cluster,
        aws_cluster: AWSCluster,
    ) -> Result<Self, ControllerError> {
        if aws_cluster.metadata.name.as_deref().is_none_or(str::is_empty) {
            return Err(ControllerError::InvalidScope(
                "AWSCluster has no name".to_string(),
            ));
        }
        if aws_cluster.metadata.namespace.as_deref().is_none_or(str::is_empty) {
            return Err(ControllerError::InvalidScope(format!(
                "AWSCluster {} has no namespace",
                aws_cluster.metadata.name.as_deref().unwrap_or_default()
            )));
        }
        if aws_cluster.spec.region.is_empty() {
            return Err(ControllerError::InvalidScope(format!(
                "AWSCluster {} has no region",
                aws_cluster.metadata.name.as_deref().unwrap_or_default()
            )));
        }

        Ok(Self {
            store,
            cluster,
            snapshot: aws_cluster.clone(),
            aws_cluster,
        })
    }

    pub fn name(&self) -> &str {
        self.aws_cluster.metadata.name.as_deref().unwrap_or_default()
    }

    pub fn namespace(&self) -> &str {
        self.aws_cluster.metadata.namespace.as_deref().unwrap_or_default()
    }

    pub fn region(&self) -> &str {
        &self.aws_cluster.spec.region
    }

    /// `namespace/name` for log lines.
    pub fn key(&self) -> String {
        format!("{}/{}", self.namespace(), self.name())
    }

    pub fn service_context(&self) -> ServiceContext {
        ServiceContext::new(self.region(), self.namespace(), self.name())
    }

    pub fn bastion_enabled(&self) -> bool {
        self.aws_cluster.spec.bastion.enabled
    }

    pub fn has_finalizer(&self) -> bool {
        self.aws_cluster.has_finalizer()
    }

    /// Adds the finalizer; returns `true` when it was not present before.
    pub fn add_finalizer(&mut self) -> bool {
        if self.has_finalizer() {
            return false;
        }
        self.aws_cluster
            .metadata
            .finalizers
            .get_or_insert_with(Vec::new)
            .push(AWS_CLUSTER_FINALIZER.to_string());
        true
    }

    /// Removes the finalizer; returns `true` when it was present.
    pub fn remove_finalizer(&mut self) -> bool {
        let Some(finalizers) = self.aws_cluster.metadata.finalizers.as_mut() else {
            return false;
        };
        let before = finalizers.len();
        finalizers.retain(|f| f != AWS_CLUSTER_FINALIZER);
        finalizers.len() != before
    }

    fn status_mut(&mut self) -> &mut AWSClusterStatus {
        self.aws_cluster
            .status
            .get_or_insert_with(AWSClusterStatus::default)
    }

    pub fn conditions(&self) -> &[Condition] {
        self.aws_cluster.conditions()
    }

    pub fn mark_true(&mut self, condition_type: &str) {
        conditions::mark_true(&mut self.status_mut().conditions, condition_type);
    }

    pub fn mark_false(
        &mut self,
        condition_type: &str,
        reason: &str,
        severity: ConditionSeverity,
        message: impl Into<String>,
    ) {
        conditions::mark_false(
            &mut self.status_mut().conditions,
            condition_type,
            reason,
            severity,
            message,
        );
    }

    pub fn delete_condition(&mut self, condition_type: &str) {
        if let Some(status) = self.aws_cluster.status.as_mut() {
            conditions::delete(&mut status.conditions, condition_type);
        }
    }

    pub fn load_balancer_dns_name(&self) -> Option<&str> {
        self.aws_cluster.load_balancer_dns_name()
    }

    pub fn control_plane_endpoint(&self) -> &ApiEndpoint {
        &self.aws_cluster.spec.control_plane_endpoint
    }

    pub fn set_control_plane_endpoint(&mut self, endpoint: ApiEndpoint) {
        self.aws_cluster.spec.control_plane_endpoint = endpoint;
    }

    pub fn set_failure_domain(&mut self, zone: &str, spec: FailureDomainSpec) {
        self.status_mut()
            .failure_domains
            .insert(zone.to_string(), spec);
    }

    pub fn set_ready(&mut self, ready: bool) {
        self.status_mut().ready = ready;
    }

    /// Whether there are mutations that have not been persisted.
    pub fn has_changes(&self) -> bool {
        self.snapshot.status != self.aws_cluster.status
            || self.snapshot.metadata.finalizers != self.aws_cluster.metadata.finalizers
            || self.snapshot.spec != self.aws_cluster.spec
    }

    /// Persists pending mutations now and continues from the new state.
    ///
    /// Fails without writing when the stored object changed since it was
    /// loaded; the next reconciliation starts from the fresh object.
    pub async fn patch_object(&mut self) -> Result<(), ControllerError> {
        if !self.has_changes() {
            return Ok(());
        }
        debug!("Persisting AWSCluster {}", self.key());
        let resource_version = self
            .store
            .patch_aws_cluster(&self.snapshot, &self.aws_cluster)
            .await?;
        self.aws_cluster.metadata.resource_version = resource_version;
        self.snapshot = self.aws_cluster.clone();
        Ok(())
    }

    /// Updates the `Ready` summary and persists everything still pending.
    pub async fn close(mut self) -> Result<(), ControllerError> {
        let mut summarized = vec![
            conditions::CLUSTER_SECURITY_GROUPS_READY_CONDITION,
            conditions::LOAD_BALANCER_READY_CONDITION,
        ];
        if self.bastion_enabled() {
            summarized.insert(1, conditions::BASTION_HOST_READY_CONDITION);
        }
        let ready = conditions::summarize(self.conditions(), &summarized);
        conditions::set(&mut self.status_mut().conditions, ready);

        self.patch_object().await
    }
}
