//! Unit tests for the create/update pipeline

#[cfg(test)]
mod tests {
    use super::super::ReconcileOutcome;
    use crate::error::ControllerError;
    use crate::test_utils::*;
    use cloud_services::{ServiceCall, Subsystem};
    use crds::conditions::{
        self, BASTION_HOST_FAILED_REASON, BASTION_HOST_READY_CONDITION,
        CLUSTER_SECURITY_GROUPS_READY_CONDITION, LOAD_BALANCER_FAILED_REASON,
        LOAD_BALANCER_READY_CONDITION, SECURITY_GROUP_RECONCILIATION_FAILED_REASON,
        WAIT_FOR_DNS_NAME_REASON, WAIT_FOR_DNS_NAME_RESOLVE_REASON,
    };
    use crds::{AWSCluster, ApiEndpoint, Condition, ConditionSeverity, ConditionStatus};
    use std::time::Duration;

    /// Stores `aws_cluster` with its owner `capi-test`.
    fn seed(h: &TestHarness, mut aws_cluster: AWSCluster) {
        aws_cluster.metadata.owner_references =
            Some(vec![cluster_owner_reference("capi-test")]);
        h.store.insert_aws_cluster(aws_cluster);
        h.store.insert_cluster(owner_cluster("capi-test", "default"));
    }

    fn stored_condition(h: &TestHarness, condition_type: &str) -> Option<Condition> {
        let stored = h.store.aws_cluster("default", "aws-test")?;
        conditions::get(stored.conditions(), condition_type).cloned()
    }

    fn assert_condition(
        condition: Option<Condition>,
        status: ConditionStatus,
        severity: ConditionSeverity,
        reason: &str,
    ) {
        let condition = condition.expect("condition should be set");
        assert_eq!(condition.status, status);
        assert_eq!(condition.severity, severity);
        assert_eq!(condition.reason.as_deref(), Some(reason));
    }

    #[tokio::test]
    async fn test_all_subsystems_succeed_across_five_zones() {
        let h = harness();
        h.services.set_load_balancer_dns_name("www.example.com");
        let mut aws_cluster = get_aws_cluster("aws-test", "default");
        aws_cluster.spec.network.subnets = subnets_in_zones(&[
            "us-east-1a",
            "us-east-1b",
            "us-east-1c",
            "us-east-1d",
            "us-east-1e",
        ]);
        seed(&h, aws_cluster);

        let outcome = h
            .reconciler
            .reconcile("default", "aws-test", &h.cancel)
            .await
            .unwrap();

        assert_eq!(outcome, ReconcileOutcome::NoRequeue);
        assert_eq!(h.resolver.lookups(), vec!["www.example.com".to_string()]);

        let stored = h.store.aws_cluster("default", "aws-test").unwrap();
        assert!(stored.has_finalizer());
        let lb = conditions::get(stored.conditions(), LOAD_BALANCER_READY_CONDITION).unwrap();
        assert!(lb.is_true());
        assert!(
            conditions::get(stored.conditions(), CLUSTER_SECURITY_GROUPS_READY_CONDITION)
                .unwrap()
                .is_true()
        );
        assert!(
            conditions::get(stored.conditions(), BASTION_HOST_READY_CONDITION)
                .unwrap()
                .is_true()
        );

        let status = stored.status.as_ref().unwrap();
        assert!(status.ready);
        assert_eq!(status.failure_domains.len(), 5);
        assert!(status.failure_domains.values().all(|fd| fd.control_plane));
        assert_eq!(
            stored.spec.control_plane_endpoint,
            ApiEndpoint {
                host: "www.example.com".to_string(),
                port: 6443,
            }
        );
    }

    #[tokio::test]
    async fn test_network_failure_stops_without_condition() {
        let h = harness();
        h.services.fail_on(ServiceCall::ReconcileNetwork, "vpc limit reached");
        seed(&h, get_aws_cluster("aws-test", "default"));

        let result = h.reconciler.reconcile("default", "aws-test", &h.cancel).await;

        match result {
            Err(ControllerError::Service { subsystem, source }) => {
                assert_eq!(subsystem, Subsystem::Network);
                assert_eq!(source.to_string(), "cloud API error: vpc limit reached");
            }
            other => panic!("expected a network failure, got {other:?}"),
        }
        assert_eq!(h.services.calls(), vec![ServiceCall::ReconcileNetwork]);
        assert!(stored_condition(&h, CLUSTER_SECURITY_GROUPS_READY_CONDITION).is_none());
        assert!(stored_condition(&h, LOAD_BALANCER_READY_CONDITION).is_none());

        // The finalizer went out before the first subsystem call
        assert!(h.store.aws_cluster("default", "aws-test").unwrap().has_finalizer());
    }

    #[tokio::test]
    async fn test_security_group_failure_marks_condition() {
        let h = harness();
        h.services
            .fail_on(ServiceCall::ReconcileSecurityGroups, "rule limit exceeded");
        seed(&h, get_aws_cluster("aws-test", "default"));

        let result = h.reconciler.reconcile("default", "aws-test", &h.cancel).await;

        assert!(matches!(
            result,
            Err(ControllerError::Service {
                subsystem: Subsystem::SecurityGroups,
                ..
            })
        ));
        assert_eq!(
            h.services.calls(),
            vec![
                ServiceCall::ReconcileNetwork,
                ServiceCall::ReconcileSecurityGroups,
            ]
        );
        assert_eq!(h.services.call_count(ServiceCall::ReconcileBastion), 0);
        assert_eq!(h.services.call_count(ServiceCall::ReconcileLoadBalancers), 0);

        let condition = stored_condition(&h, CLUSTER_SECURITY_GROUPS_READY_CONDITION);
        assert!(
            condition
                .as_ref()
                .and_then(|c| c.message.as_deref())
                .is_some_and(|m| m.contains("rule limit exceeded"))
        );
        assert_condition(
            condition,
            ConditionStatus::False,
            ConditionSeverity::Warning,
            SECURITY_GROUP_RECONCILIATION_FAILED_REASON,
        );
    }

    #[tokio::test]
    async fn test_bastion_failure_marks_condition() {
        let h = harness();
        h.services.fail_on(ServiceCall::ReconcileBastion, "no capacity");
        seed(&h, get_aws_cluster("aws-test", "default"));

        let result = h.reconciler.reconcile("default", "aws-test", &h.cancel).await;

        assert!(matches!(
            result,
            Err(ControllerError::Service {
                subsystem: Subsystem::Bastion,
                ..
            })
        ));
        assert_eq!(h.services.call_count(ServiceCall::ReconcileLoadBalancers), 0);
        assert_condition(
            stored_condition(&h, BASTION_HOST_READY_CONDITION),
            ConditionStatus::False,
            ConditionSeverity::Warning,
            BASTION_HOST_FAILED_REASON,
        );
        assert!(
            stored_condition(&h, CLUSTER_SECURITY_GROUPS_READY_CONDITION)
                .unwrap()
                .is_true()
        );
    }

    #[tokio::test]
    async fn test_load_balancer_failure_marks_condition() {
        let h = harness();
        h.services
            .fail_on(ServiceCall::ReconcileLoadBalancers, "listener conflict");
        seed(&h, get_aws_cluster("aws-test", "default"));

        let result = h.reconciler.reconcile("default", "aws-test", &h.cancel).await;

        assert!(matches!(
            result,
            Err(ControllerError::Service {
                subsystem: Subsystem::LoadBalancer,
                ..
            })
        ));
        assert_eq!(h.services.calls().len(), 4);
        assert_condition(
            stored_condition(&h, LOAD_BALANCER_READY_CONDITION),
            ConditionStatus::False,
            ConditionSeverity::Warning,
            LOAD_BALANCER_FAILED_REASON,
        );
        assert!(h.resolver.lookups().is_empty());
    }

    #[tokio::test]
    async fn test_missing_dns_name_requeues() {
        let h = harness();
        seed(&h, get_aws_cluster("aws-test", "default"));

        let outcome = h
            .reconciler
            .reconcile("default", "aws-test", &h.cancel)
            .await
            .unwrap();

        assert_eq!(outcome, ReconcileOutcome::RequeueAfter(TEST_DNS_REQUEUE));
        assert!(TEST_DNS_REQUEUE > Duration::ZERO);
        assert_condition(
            stored_condition(&h, LOAD_BALANCER_READY_CONDITION),
            ConditionStatus::False,
            ConditionSeverity::Info,
            WAIT_FOR_DNS_NAME_REASON,
        );
        assert!(h.resolver.lookups().is_empty());

        let stored = h.store.aws_cluster("default", "aws-test").unwrap();
        assert!(!stored.status.as_ref().unwrap().ready);
        assert!(stored.spec.control_plane_endpoint.is_zero());
    }

    #[tokio::test]
    async fn test_empty_dns_name_counts_as_missing() {
        let h = harness();
        seed(&h, with_dns_name(get_aws_cluster("aws-test", "default"), ""));

        let outcome = h
            .reconciler
            .reconcile("default", "aws-test", &h.cancel)
            .await
            .unwrap();

        assert_eq!(outcome, ReconcileOutcome::RequeueAfter(TEST_DNS_REQUEUE));
        assert_condition(
            stored_condition(&h, LOAD_BALANCER_READY_CONDITION),
            ConditionStatus::False,
            ConditionSeverity::Info,
            WAIT_FOR_DNS_NAME_REASON,
        );
    }

    #[tokio::test]
    async fn test_unresolved_dns_name_requeues() {
        let h = harness();
        h.services
            .set_load_balancer_dns_name("aws-test-apiserver.elb.amazonaws.com");
        seed(&h, get_aws_cluster("aws-test", "default"));

        let outcome = h
            .reconciler
            .reconcile("default", "aws-test", &h.cancel)
            .await
            .unwrap();

        assert_eq!(outcome, ReconcileOutcome::RequeueAfter(TEST_DNS_REQUEUE));
        assert_eq!(
            h.resolver.lookups(),
            vec!["aws-test-apiserver.elb.amazonaws.com".to_string()]
        );
        assert_condition(
            stored_condition(&h, LOAD_BALANCER_READY_CONDITION),
            ConditionStatus::False,
            ConditionSeverity::Info,
            WAIT_FOR_DNS_NAME_RESOLVE_REASON,
        );
    }

    #[tokio::test]
    async fn test_dns_resolving_later_completes() {
        let h = harness();
        h.services.set_load_balancer_dns_name("lb.example.com");
        seed(&h, get_aws_cluster("aws-test", "default"));

        let first = h
            .reconciler
            .reconcile("default", "aws-test", &h.cancel)
            .await
            .unwrap();
        assert!(matches!(first, ReconcileOutcome::RequeueAfter(_)));

        h.resolver.add_host("lb.example.com");
        let second = h
            .reconciler
            .reconcile("default", "aws-test", &h.cancel)
            .await
            .unwrap();

        assert_eq!(second, ReconcileOutcome::NoRequeue);
        assert!(stored_condition(&h, LOAD_BALANCER_READY_CONDITION).unwrap().is_true());
    }

    #[tokio::test]
    async fn test_disabled_bastion_is_still_called_and_condition_removed() {
        let h = harness();
        h.services.set_load_balancer_dns_name("www.example.com");
        let mut aws_cluster = get_aws_cluster("aws-test", "default");
        aws_cluster.spec.bastion.enabled = false;
        aws_cluster
            .status
            .get_or_insert_with(Default::default)
            .conditions
            .push(Condition::true_condition(BASTION_HOST_READY_CONDITION));
        seed(&h, aws_cluster);

        h.reconciler
            .reconcile("default", "aws-test", &h.cancel)
            .await
            .unwrap();

        assert_eq!(h.services.call_count(ServiceCall::ReconcileBastion), 1);
        assert!(stored_condition(&h, BASTION_HOST_READY_CONDITION).is_none());
    }

    #[tokio::test]
    async fn test_existing_control_plane_endpoint_is_kept() {
        let h = harness();
        h.services.set_load_balancer_dns_name("www.example.com");
        let mut aws_cluster = get_aws_cluster("aws-test", "default");
        aws_cluster.spec.control_plane_endpoint = ApiEndpoint {
            host: "api.cluster.example.com".to_string(),
            port: 443,
        };
        seed(&h, aws_cluster);

        h.reconciler
            .reconcile("default", "aws-test", &h.cancel)
            .await
            .unwrap();

        let stored = h.store.aws_cluster("default", "aws-test").unwrap();
        assert_eq!(stored.spec.control_plane_endpoint.host, "api.cluster.example.com");
        assert_eq!(stored.spec.control_plane_endpoint.port, 443);
    }

    #[tokio::test]
    async fn test_custom_api_server_port() {
        let h = harness();
        h.services.set_load_balancer_dns_name("www.example.com");
        let mut aws_cluster = get_aws_cluster("aws-test", "default");
        aws_cluster.spec.api_server_port = Some(8443);
        seed(&h, aws_cluster);

        h.reconciler
            .reconcile("default", "aws-test", &h.cancel)
            .await
            .unwrap();

        let stored = h.store.aws_cluster("default", "aws-test").unwrap();
        assert_eq!(stored.spec.control_plane_endpoint.port, 8443);
    }

    #[tokio::test]
    async fn test_second_pass_persists_nothing_new() {
        let h = harness();
        h.services.set_load_balancer_dns_name("www.example.com");
        seed(&h, get_aws_cluster("aws-test", "default"));

        h.reconciler
            .reconcile("default", "aws-test", &h.cancel)
            .await
            .unwrap();
        let patches = h.store.patch_count();
        let after_first = h.store.aws_cluster("default", "aws-test").unwrap();

        let outcome = h
            .reconciler
            .reconcile("default", "aws-test", &h.cancel)
            .await
            .unwrap();

        assert_eq!(outcome, ReconcileOutcome::NoRequeue);
        // Every step runs again
        assert_eq!(h.services.calls().len(), 8);
        assert_eq!(h.store.patch_count(), patches);
        let after_second = h.store.aws_cluster("default", "aws-test").unwrap();
        assert_eq!(after_second.status, after_first.status);
        assert_eq!(after_second.spec, after_first.spec);
    }

    #[tokio::test]
    async fn test_cancelled_step_is_a_failure() {
        let h = harness();
        h.services.hang_on(ServiceCall::ReconcileSecurityGroups);
        seed(&h, get_aws_cluster("aws-test", "default"));

        let cancel = h.cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            cancel.cancel();
        });

        let result = h.reconciler.reconcile("default", "aws-test", &h.cancel).await;

        assert!(matches!(
            result,
            Err(ControllerError::Cancelled(Subsystem::SecurityGroups))
        ));
        assert_eq!(h.services.call_count(ServiceCall::ReconcileBastion), 0);
        assert_condition(
            stored_condition(&h, CLUSTER_SECURITY_GROUPS_READY_CONDITION),
            ConditionStatus::False,
            ConditionSeverity::Warning,
            SECURITY_GROUP_RECONCILIATION_FAILED_REASON,
        );
    }
}
