//! Maps `Cluster` events to `AWSCluster` reconcile requests.
//!
//! An `AWSCluster` is only watched for its own changes; clearing the pause on
//! its owning `Cluster` has to re-trigger it explicitly.

use crate::store::AwsClusterLookup;
use crds::{AWSCluster, Cluster, ResourceKind, is_externally_managed};
use kube_runtime::reflector::ObjectRef;
use tracing::debug;

/// Reconcile requests for the `AWSCluster` referenced by `cluster`.
///
/// Returns at most one request. Deleted or paused clusters, references to
/// other kinds, missing targets and externally managed targets produce none.
pub fn requeue_aws_cluster_for_unpaused_cluster(
    lookup: &dyn AwsClusterLookup,
    cluster: &Cluster,
) -> Vec<ObjectRef<AWSCluster>> {
    let cluster_name = cluster.metadata.name.as_deref().unwrap_or_default();
    let cluster_namespace = cluster.metadata.namespace.as_deref().unwrap_or_default();

    if cluster.is_deleting() {
        debug!(
            "Cluster {}/{} is being deleted, not mapping",
            cluster_namespace, cluster_name
        );
        return Vec::new();
    }

    if cluster.is_paused() {
        debug!(
            "Cluster {}/{} is paused, not mapping",
            cluster_namespace, cluster_name
        );
        return Vec::new();
    }

    let Some(infra_ref) = cluster.spec.infrastructure_ref.as_ref() else {
        debug!(
            "Cluster {}/{} has no infrastructure reference",
            cluster_namespace, cluster_name
        );
        return Vec::new();
    };
    if infra_ref.resource_kind() != ResourceKind::AwsCluster {
        debug!(
            "Cluster {}/{} references a {} {}, not an AWSCluster",
            cluster_namespace, cluster_name, infra_ref.api_version, infra_ref.kind
        );
        return Vec::new();
    }

    let namespace = infra_ref
        .namespace
        .as_deref()
        .filter(|ns| !ns.is_empty())
        .unwrap_or(cluster_namespace);
    let Some(aws_cluster) = lookup.lookup(namespace, &infra_ref.name) else {
        debug!(
            "AWSCluster {}/{} referenced by Cluster {} not found",
            namespace, infra_ref.name, cluster_name
        );
        return Vec::new();
    };

    if is_externally_managed(&aws_cluster.metadata) {
        debug!(
            "AWSCluster {}/{} is externally managed, not mapping",
            namespace, infra_ref.name
        );
        return Vec::new();
    }

    vec![ObjectRef::new(&infra_ref.name).within(namespace)]
}
