//! Create/update pipeline.
//!
//! Network, security groups, bastion and load balancer are reconciled in
//! dependency order. The first failure stops the pass: the failing subsystem
//! records a `False`/`Warning` condition (network excepted) and the error is
//! returned. Once the load balancer exists, its DNS name decides between
//! waiting and declaring the infrastructure ready.

use super::{Operation, ReconcileOutcome, Reconciler, run_step};
use crate::error::ControllerError;
use crate::scope::ClusterScope;
use cloud_services::Subsystem;
use crds::conditions::{
    BASTION_HOST_FAILED_REASON, BASTION_HOST_READY_CONDITION,
    CLUSTER_SECURITY_GROUPS_READY_CONDITION, LOAD_BALANCER_FAILED_REASON,
    LOAD_BALANCER_READY_CONDITION, SECURITY_GROUP_RECONCILIATION_FAILED_REASON,
    WAIT_FOR_DNS_NAME_REASON, WAIT_FOR_DNS_NAME_RESOLVE_REASON,
};
use crds::{ApiEndpoint, ConditionSeverity, FailureDomainSpec};
use kube::ResourceExt;
use std::collections::BTreeSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

impl Reconciler {
    pub(crate) async fn reconcile_normal(
        &self,
        scope: &mut ClusterScope,
        cancel: &CancellationToken,
    ) -> Result<ReconcileOutcome, ControllerError> {
        let key = scope.key();
        info!(
            "Reconciling AWSCluster {} of Cluster {}",
            key,
            scope.cluster.name_any()
        );

        // The finalizer must be stored before anything is created
        if scope.add_finalizer() {
            debug!("Added finalizer to AWSCluster {}", key);
            scope.patch_object().await?;
        }

        let ctx = scope.service_context();

        debug!("Reconciling network for AWSCluster {}", key);
        let network = self.services.network(&ctx);
        if let Err(e) = run_step(cancel, network.reconcile_network(&mut scope.aws_cluster)).await {
            self.subsystem_failed(&key, Subsystem::Network, Operation::Reconcile, &e);
            return Err(e.into_controller_error(Subsystem::Network, Operation::Reconcile));
        }

        debug!("Reconciling security groups for AWSCluster {}", key);
        let security_groups = self.services.security_groups(&ctx);
        if let Err(e) = run_step(
            cancel,
            security_groups.reconcile_security_groups(&mut scope.aws_cluster),
        )
        .await
        {
            self.subsystem_failed(&key, Subsystem::SecurityGroups, Operation::Reconcile, &e);
            scope.mark_false(
                CLUSTER_SECURITY_GROUPS_READY_CONDITION,
                SECURITY_GROUP_RECONCILIATION_FAILED_REASON,
                ConditionSeverity::Warning,
                e.to_string(),
            );
            return Err(e.into_controller_error(Subsystem::SecurityGroups, Operation::Reconcile));
        }
        scope.mark_true(CLUSTER_SECURITY_GROUPS_READY_CONDITION);

        // Issued even when disabled: the service removes a stale bastion
        debug!("Reconciling bastion for AWSCluster {}", key);
        let bastion = self.services.bastion(&ctx);
        if let Err(e) = run_step(cancel, bastion.reconcile_bastion(&mut scope.aws_cluster)).await {
            self.subsystem_failed(&key, Subsystem::Bastion, Operation::Reconcile, &e);
            scope.mark_false(
                BASTION_HOST_READY_CONDITION,
                BASTION_HOST_FAILED_REASON,
                ConditionSeverity::Warning,
                e.to_string(),
            );
            return Err(e.into_controller_error(Subsystem::Bastion, Operation::Reconcile));
        }
        if scope.bastion_enabled() {
            scope.mark_true(BASTION_HOST_READY_CONDITION);
        } else {
            scope.delete_condition(BASTION_HOST_READY_CONDITION);
        }

        debug!("Reconciling load balancer for AWSCluster {}", key);
        let load_balancer = self.services.load_balancer(&ctx);
        if let Err(e) = run_step(
            cancel,
            load_balancer.reconcile_load_balancers(&mut scope.aws_cluster),
        )
        .await
        {
            self.subsystem_failed(&key, Subsystem::LoadBalancer, Operation::Reconcile, &e);
            scope.mark_false(
                LOAD_BALANCER_READY_CONDITION,
                LOAD_BALANCER_FAILED_REASON,
                ConditionSeverity::Warning,
                e.to_string(),
            );
            return Err(e.into_controller_error(Subsystem::LoadBalancer, Operation::Reconcile));
        }

        let Some(dns_name) = scope.load_balancer_dns_name().map(str::to_string) else {
            info!("Waiting for load balancer DNS name of AWSCluster {}", key);
            scope.mark_false(
                LOAD_BALANCER_READY_CONDITION,
                WAIT_FOR_DNS_NAME_REASON,
                ConditionSeverity::Info,
                "",
            );
            return Ok(ReconcileOutcome::RequeueAfter(self.settings.dns_requeue));
        };

        let resolved = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                return Err(ControllerError::Cancelled(Subsystem::LoadBalancer));
            }
            resolved = self.resolver.resolves(&dns_name) => resolved,
        };
        if !resolved {
            info!(
                "Waiting for load balancer DNS name {} of AWSCluster {} to resolve",
                dns_name, key
            );
            scope.mark_false(
                LOAD_BALANCER_READY_CONDITION,
                WAIT_FOR_DNS_NAME_RESOLVE_REASON,
                ConditionSeverity::Info,
                format!("{dns_name} does not resolve yet"),
            );
            return Ok(ReconcileOutcome::RequeueAfter(self.settings.dns_requeue));
        }
        scope.mark_true(LOAD_BALANCER_READY_CONDITION);

        if scope.control_plane_endpoint().is_zero() {
            let port = scope.aws_cluster.api_server_port();
            info!(
                "Setting control plane endpoint of AWSCluster {} to {}:{}",
                key, dns_name, port
            );
            scope.set_control_plane_endpoint(ApiEndpoint {
                host: dns_name,
                port,
            });
        }

        let zones: BTreeSet<String> = scope
            .aws_cluster
            .private_subnets()
            .map(|subnet| subnet.availability_zone.clone())
            .collect();
        for zone in &zones {
            scope.set_failure_domain(
                zone,
                FailureDomainSpec {
                    control_plane: true,
                    ..Default::default()
                },
            );
        }

        scope.set_ready(true);
        info!("AWSCluster {} is ready", key);
        Ok(ReconcileOutcome::NoRequeue)
    }
}
