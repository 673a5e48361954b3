//! Reconciliation logic for `AWSCluster` resources.
//!
//! - `mod.rs`: the dispatcher. Resolves the resource and its owner, derives
//!   the [`ReconcileState`] once, and routes to a pipeline.
//! - `normal`: create/update pipeline (fail-fast).
//! - `delete`: teardown pipeline (every step attempted).
//! - `mapper`: maps `Cluster` events to `AWSCluster` reconcile requests.

pub mod delete;
pub mod mapper;
pub mod normal;

#[cfg(test)]
mod normal_test;

use crate::backoff::FibonacciBackoff;
use crate::error::ControllerError;
use crate::metrics::Metrics;
use crate::scope::ClusterScope;
use crate::store::ClusterStore;
use cloud_services::{DnsResolver, ServiceError, ServiceFactory, Subsystem};
use crds::{
    AWSCluster, Cluster, PAUSED_ANNOTATION, has_annotation, is_externally_managed,
    owner_cluster_name,
};
use kube_runtime::controller::Action;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Mode of an `AWSCluster`, computed once per invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileState {
    /// No owning `Cluster` yet
    Unowned,
    /// The owner or the resource itself is paused
    Paused,
    /// Deletion has been requested
    Deleting,
    /// Live and owned
    Active,
}

impl ReconcileState {
    /// Derives the state from the resource and its resolved owner.
    ///
    /// Pausing wins over deletion: a paused resource is left alone even
    /// when it is being deleted.
    pub fn observe(aws_cluster: &AWSCluster, owner: Option<&Cluster>) -> Self {
        let Some(owner) = owner else {
            return ReconcileState::Unowned;
        };
        if owner.is_paused() || has_annotation(&aws_cluster.metadata, PAUSED_ANNOTATION) {
            ReconcileState::Paused
        } else if aws_cluster.metadata.deletion_timestamp.is_some() {
            ReconcileState::Deleting
        } else {
            ReconcileState::Active
        }
    }
}

/// Successful result of a reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    NoRequeue,
    RequeueAfter(Duration),
}

impl ReconcileOutcome {
    pub fn into_action(self) -> Action {
        match self {
            ReconcileOutcome::NoRequeue => Action::await_change(),
            ReconcileOutcome::RequeueAfter(delay) => Action::requeue(delay),
        }
    }

    /// Label for the `result` of reconciliations in metrics.
    pub fn metric_label(&self) -> &'static str {
        match self {
            ReconcileOutcome::NoRequeue => "success",
            ReconcileOutcome::RequeueAfter(_) => "requeue",
        }
    }
}

/// Tunables of the pipelines.
#[derive(Debug, Clone)]
pub struct ReconcilerSettings {
    /// Requeue delay while the load balancer DNS name is missing or unresolved
    pub dns_requeue: Duration,
}

impl Default for ReconcilerSettings {
    fn default() -> Self {
        Self {
            dns_requeue: Duration::from_secs(15),
        }
    }
}

/// Backoff state for a resource
#[derive(Debug, Clone)]
struct BackoffState {
    backoff: FibonacciBackoff,
    error_count: u32,
}

impl BackoffState {
    fn new() -> Self {
        Self {
            backoff: FibonacciBackoff::new(Duration::from_secs(5), Duration::from_secs(300)),
            error_count: 0,
        }
    }
}

/// Which half of a subsystem failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Operation {
    Reconcile,
    Delete,
}

impl Operation {
    fn as_str(self) -> &'static str {
        match self {
            Operation::Reconcile => "reconcile",
            Operation::Delete => "delete",
        }
    }
}

/// Failure of a single subsystem call.
#[derive(Debug)]
pub(crate) enum StepError {
    Cancelled,
    Failed(ServiceError),
}

impl StepError {
    pub(crate) fn into_controller_error(
        self,
        subsystem: Subsystem,
        operation: Operation,
    ) -> ControllerError {
        match (self, operation) {
            (StepError::Cancelled, _) => ControllerError::Cancelled(subsystem),
            (StepError::Failed(source), Operation::Reconcile) => {
                ControllerError::Service { subsystem, source }
            }
            (StepError::Failed(source), Operation::Delete) => {
                ControllerError::ServiceDeletion { subsystem, source }
            }
        }
    }
}

impl std::fmt::Display for StepError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StepError::Cancelled => f.write_str("cancelled"),
            StepError::Failed(e) => write!(f, "{e}"),
        }
    }
}

/// Runs one subsystem call; a cancelled token aborts it.
pub(crate) async fn run_step<F>(cancel: &CancellationToken, step: F) -> Result<(), StepError>
where
    F: Future<Output = Result<(), ServiceError>>,
{
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(StepError::Cancelled),
        result = step => result.map_err(StepError::Failed),
    }
}

/// Reconciles `AWSCluster` resources.
pub struct Reconciler {
    pub(crate) store: Arc<dyn ClusterStore>,
    pub(crate) services: Arc<dyn ServiceFactory>,
    pub(crate) resolver: Arc<dyn DnsResolver>,
    pub(crate) settings: ReconcilerSettings,
    pub(crate) metrics: Metrics,
    /// Cancelled on shutdown; each invocation runs under a child token
    pub(crate) shutdown: CancellationToken,
    /// Error count tracking per resource (namespace/name -> BackoffState)
    backoff_states: Arc<Mutex<HashMap<String, BackoffState>>>,
}

impl Reconciler {
    pub fn new(
        store: Arc<dyn ClusterStore>,
        services: Arc<dyn ServiceFactory>,
        resolver: Arc<dyn DnsResolver>,
        settings: ReconcilerSettings,
        metrics: Metrics,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            store,
            services,
            resolver,
            settings,
            metrics,
            shutdown,
            backoff_states: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Reconciles the `AWSCluster` `namespace/name`.
    pub async fn reconcile(
        &self,
        namespace: &str,
        name: &str,
        cancel: &CancellationToken,
    ) -> Result<ReconcileOutcome, ControllerError> {
        let Some(aws_cluster) = self.store.get_aws_cluster(namespace, name).await? else {
            info!("AWSCluster {}/{} not found, nothing to do", namespace, name);
            return Ok(ReconcileOutcome::NoRequeue);
        };

        if is_externally_managed(&aws_cluster.metadata) {
            info!(
                "AWSCluster {}/{} is externally managed, skipping",
                namespace, name
            );
            return Ok(ReconcileOutcome::NoRequeue);
        }

        let owner = self.resolve_owner(&aws_cluster).await?;
        let state = ReconcileState::observe(&aws_cluster, owner.as_ref());
        debug!("AWSCluster {}/{} is {:?}", namespace, name, state);

        let cluster = match (state, owner) {
            (ReconcileState::Active | ReconcileState::Deleting, Some(cluster)) => cluster,
            (ReconcileState::Paused, _) => {
                info!("AWSCluster {}/{} or its Cluster is paused, skipping", namespace, name);
                return Ok(ReconcileOutcome::NoRequeue);
            }
            _ => {
                info!(
                    "AWSCluster {}/{} has no owner Cluster yet, waiting",
                    namespace, name
                );
                return Ok(ReconcileOutcome::NoRequeue);
            }
        };

        let mut scope = ClusterScope::new(Arc::clone(&self.store), cluster, aws_cluster)?;
        let key = scope.key();

        let result = if state == ReconcileState::Deleting {
            self.reconcile_delete(&mut scope, cancel).await
        } else {
            self.reconcile_normal(&mut scope, cancel).await
        };

        // Conditions are persisted on failure too
        match (result, scope.close().await) {
            (Ok(outcome), Ok(())) => Ok(outcome),
            (Ok(_), Err(e)) => Err(e),
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(persist_err)) => {
                error!("Failed to persist AWSCluster {}: {}", key, persist_err);
                Err(e)
            }
        }
    }

    /// Fetches the owning `Cluster`; `Ok(None)` when no owner is set yet.
    async fn resolve_owner(&self, aws_cluster: &AWSCluster) -> Result<Option<Cluster>, ControllerError> {
        let Some(cluster_name) = owner_cluster_name(&aws_cluster.metadata) else {
            return Ok(None);
        };
        let namespace = aws_cluster.metadata.namespace.as_deref().unwrap_or_default();

        match self.store.get_cluster(namespace, cluster_name).await? {
            Some(cluster) => Ok(Some(cluster)),
            None => Err(ControllerError::OwnerClusterNotFound(format!(
                "{namespace}/{cluster_name}"
            ))),
        }
    }

    /// Records a failed subsystem call.
    pub(crate) fn subsystem_failed(
        &self,
        key: &str,
        subsystem: Subsystem,
        operation: Operation,
        err: &StepError,
    ) {
        error!(
            "Failed to {} {} for AWSCluster {}: {}",
            operation.as_str(),
            subsystem,
            key,
            err
        );
        self.metrics
            .record_subsystem_failure(subsystem, operation.as_str());
    }

    /// Next requeue delay after a failed reconciliation of `key`.
    pub fn next_backoff(&self, key: &str) -> Duration {
        let mut states = self
            .backoff_states
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let state = states
            .entry(key.to_string())
            .or_insert_with(BackoffState::new);
        state.error_count += 1;
        let delay = state.backoff.next_backoff();
        debug!(
            "AWSCluster {} failed {} time(s), requeue in {:?}",
            key, state.error_count, delay
        );
        delay
    }

    /// Forgets the failure history of `key` after a success.
    pub fn reset_backoff(&self, key: &str) {
        self.backoff_states
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
    }
}
