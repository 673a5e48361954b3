//! Kubernetes resource watchers.
//!
//! `AWSCluster` objects are reconciled by a `kube_runtime::Controller`, which
//! also watches `Cluster` objects and maps their events back to the
//! referenced `AWSCluster`. The controller guarantees at most one in-flight
//! reconciliation per object.

use crate::error::ControllerError;
use crate::reconciler::Reconciler;
use crate::reconciler::mapper::requeue_aws_cluster_for_unpaused_cluster;
use crds::{AWSCluster, Cluster};
use futures::StreamExt;
use kube::{Api, Client, ResourceExt};
use kube_runtime::controller::{Action, Config as ControllerConfig};
use kube_runtime::{Controller, watcher};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

fn resource_key(aws_cluster: &AWSCluster) -> String {
    format!(
        "{}/{}",
        aws_cluster.namespace().unwrap_or_default(),
        aws_cluster.name_any()
    )
}

async fn reconcile(
    aws_cluster: Arc<AWSCluster>,
    ctx: Arc<Reconciler>,
) -> Result<Action, ControllerError> {
    let namespace = aws_cluster.namespace().unwrap_or_default();
    let name = aws_cluster.name_any();
    let key = resource_key(&aws_cluster);
    debug!("Reconciling AWSCluster {}", key);

    let _timer = ctx.metrics.measure();
    let cancel = ctx.shutdown.child_token();

    match ctx.reconcile(&namespace, &name, &cancel).await {
        Ok(outcome) => {
            ctx.metrics.record_result(outcome.metric_label());
            ctx.reset_backoff(&key);
            Ok(outcome.into_action())
        }
        Err(e) => {
            ctx.metrics.record_result("error");
            Err(e)
        }
    }
}

/// Requeue with per-resource Fibonacci backoff on errors
fn error_policy(aws_cluster: Arc<AWSCluster>, error: &ControllerError, ctx: Arc<Reconciler>) -> Action {
    let key = resource_key(&aws_cluster);
    let delay = ctx.next_backoff(&key);
    error!(
        "Reconciliation of AWSCluster {} failed ({}): {}; retrying in {:?}",
        key,
        error.metric_label(),
        error,
        delay
    );
    Action::requeue(delay)
}

/// Watches `AWSCluster` and `Cluster` objects until a shutdown signal.
///
/// `namespace` restricts both watches; `None` watches all namespaces.
pub async fn watch_aws_clusters(
    client: Client,
    namespace: Option<String>,
    reconciler: Arc<Reconciler>,
    concurrency: u16,
) -> Result<(), ControllerError> {
    let (aws_clusters, clusters): (Api<AWSCluster>, Api<Cluster>) = match namespace.as_deref() {
        Some(ns) => (
            Api::namespaced(client.clone(), ns),
            Api::namespaced(client, ns),
        ),
        None => (Api::all(client.clone()), Api::all(client)),
    };

    info!(
        "Starting AWSCluster watcher ({}, concurrency {})",
        namespace.as_deref().unwrap_or("all namespaces"),
        concurrency
    );

    let controller = Controller::new(aws_clusters, watcher::Config::default());
    let cache = controller.store();

    controller
        .watches(clusters, watcher::Config::default(), move |cluster: Cluster| {
            requeue_aws_cluster_for_unpaused_cluster(&cache, &cluster)
        })
        .with_config(ControllerConfig::default().concurrency(concurrency))
        .shutdown_on_signal()
        .run(reconcile, error_policy, reconciler)
        .for_each(|res| async move {
            match res {
                Ok((obj, _action)) => debug!("Reconciled {}", obj),
                Err(e) => warn!("AWSCluster controller error: {}", e),
            }
        })
        .await;

    info!("AWSCluster watcher stopped");
    Ok(())
}
