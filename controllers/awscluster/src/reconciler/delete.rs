//! Teardown pipeline.
//!
//! Subsystems are deleted in reverse creation order: bastion, load balancer,
//! security groups, network. A failing step does not stop the pass; the
//! remaining steps still run and the finalizer is kept until one pass
//! deletes everything.

use super::{Operation, ReconcileOutcome, Reconciler, StepError, run_step};
use crate::error::ControllerError;
use crate::scope::ClusterScope;
use cloud_services::{ServiceContext, Subsystem};
use crds::ConditionSeverity;
use crds::conditions::{
    BASTION_HOST_READY_CONDITION, CLUSTER_SECURITY_GROUPS_READY_CONDITION, DELETED_REASON,
    DELETION_FAILED_REASON, LOAD_BALANCER_READY_CONDITION,
};
use kube::ResourceExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Condition reporting on a subsystem, if it has one.
fn condition_of(subsystem: Subsystem) -> Option<&'static str> {
    match subsystem {
        Subsystem::Network => None,
        Subsystem::SecurityGroups => Some(CLUSTER_SECURITY_GROUPS_READY_CONDITION),
        Subsystem::Bastion => Some(BASTION_HOST_READY_CONDITION),
        Subsystem::LoadBalancer => Some(LOAD_BALANCER_READY_CONDITION),
    }
}

impl Reconciler {
    pub(crate) async fn reconcile_delete(
        &self,
        scope: &mut ClusterScope,
        cancel: &CancellationToken,
    ) -> Result<ReconcileOutcome, ControllerError> {
        let key = scope.key();
        info!(
            "Reconciling deletion of AWSCluster {} of Cluster {}",
            key,
            scope.cluster.name_any()
        );

        let ctx = scope.service_context();
        let mut errors: Vec<ControllerError> = Vec::new();

        for subsystem in [
            Subsystem::Bastion,
            Subsystem::LoadBalancer,
            Subsystem::SecurityGroups,
            Subsystem::Network,
        ] {
            debug!("Deleting {} for AWSCluster {}", subsystem, key);
            let result = self.delete_subsystem(scope, &ctx, subsystem, cancel).await;

            match result {
                Ok(()) => {
                    if let Some(condition) = condition_of(subsystem) {
                        scope.mark_false(condition, DELETED_REASON, ConditionSeverity::Info, "");
                    }
                }
                Err(e) => {
                    self.subsystem_failed(&key, subsystem, Operation::Delete, &e);
                    if let Some(condition) = condition_of(subsystem) {
                        scope.mark_false(
                            condition,
                            DELETION_FAILED_REASON,
                            ConditionSeverity::Warning,
                            e.to_string(),
                        );
                    }
                    errors.push(e.into_controller_error(subsystem, Operation::Delete));
                }
            }
        }

        let failed = errors.len();
        if let Some(first) = errors.into_iter().next() {
            warn!(
                "Keeping finalizer on AWSCluster {}: {} deletion step(s) failed",
                key, failed
            );
            return Err(ControllerError::DeleteIncomplete {
                failed,
                first: Box::new(first),
            });
        }

        if scope.remove_finalizer() {
            info!("Removed finalizer from AWSCluster {}", key);
        }
        Ok(ReconcileOutcome::NoRequeue)
    }

    async fn delete_subsystem(
        &self,
        scope: &mut ClusterScope,
        ctx: &ServiceContext,
        subsystem: Subsystem,
        cancel: &CancellationToken,
    ) -> Result<(), StepError> {
        let cluster = &mut scope.aws_cluster;
        match subsystem {
            Subsystem::Bastion => {
                let service = self.services.bastion(ctx);
                run_step(cancel, service.delete_bastion(cluster)).await
            }
            Subsystem::LoadBalancer => {
                let service = self.services.load_balancer(ctx);
                run_step(cancel, service.delete_load_balancers(cluster)).await
            }
            Subsystem::SecurityGroups => {
                let service = self.services.security_groups(ctx);
                run_step(cancel, service.delete_security_groups(cluster)).await
            }
            Subsystem::Network => {
                let service = self.services.network(ctx);
                run_step(cancel, service.delete_network(cluster)).await
            }
        }
    }
}
