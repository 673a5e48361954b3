//! Resource storage access.
//!
//! The reconciler reads `AWSCluster` and `Cluster` objects and writes back
//! the `AWSCluster` through [`ClusterStore`], so tests can run it against an
//! in-memory store. The event mapper runs synchronously inside the watch
//! stream and only reads from the controller's reflector cache
//! ([`AwsClusterLookup`]).

use crate::error::ControllerError;
use crds::{AWS_CLUSTER_FINALIZER, AWSCluster, Cluster};
use json_patch::{AddOperation, PatchOperation, RemoveOperation, TestOperation};
use jsonptr::PointerBuf;
use kube::api::{Patch, PatchParams};
use kube::{Api, Client};
use kube_runtime::reflector::{ObjectRef, Store};
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::debug;

/// Field manager used for patches.
pub const FIELD_MANAGER: &str = "awscluster-controller";

#[async_trait::async_trait]
pub trait ClusterStore: Send + Sync {
    /// Fetches an `AWSCluster`; `Ok(None)` when it does not exist.
    async fn get_aws_cluster(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<AWSCluster>, ControllerError>;

    /// Fetches a `Cluster`; `Ok(None)` when it does not exist.
    async fn get_cluster(&self, namespace: &str, name: &str)
    -> Result<Option<Cluster>, ControllerError>;

    /// Persists the difference between `before` and `after`: status first,
    /// then finalizer and spec. Nothing is written when they are equal.
    ///
    /// Each write is rejected if the stored object no longer has the
    /// `resourceVersion` of `before`. Returns the resulting `resourceVersion`.
    async fn patch_aws_cluster(
        &self,
        before: &AWSCluster,
        after: &AWSCluster,
    ) -> Result<Option<String>, ControllerError>;
}

/// Synchronous read access to cached `AWSCluster` objects.
pub trait AwsClusterLookup: Send + Sync {
    fn lookup(&self, namespace: &str, name: &str) -> Option<Arc<AWSCluster>>;
}

impl AwsClusterLookup for Store<AWSCluster> {
    fn lookup(&self, namespace: &str, name: &str) -> Option<Arc<AWSCluster>> {
        self.get(&ObjectRef::new(name).within(namespace))
    }
}

/// JSON pointer built from literal tokens.
fn pointer<'a>(tokens: impl IntoIterator<Item = &'a str>) -> PointerBuf {
    PointerBuf::from_tokens(tokens)
}

/// Fails the whole patch when the stored object moved past `resource_version`.
fn resource_version_guard(resource_version: Option<&str>) -> Option<PatchOperation> {
    resource_version.map(|rv| {
        PatchOperation::Test(TestOperation {
            path: pointer(["metadata", "resourceVersion"]),
            value: Value::String(rv.to_string()),
        })
    })
}

fn to_value<T: serde::Serialize>(value: &T) -> Result<Value, ControllerError> {
    serde_json::to_value(value).map_err(|e| ControllerError::Patch(e.to_string()))
}

/// Builds the status subresource patch taking `before` to `after`.
///
/// Only the fields that differ are touched; a field cleared in `after` turns
/// into a `remove` operation. Returns `None` when the status is unchanged.
pub fn status_patch(
    before: &AWSCluster,
    after: &AWSCluster,
    resource_version: Option<&str>,
) -> Result<Option<json_patch::Patch>, ControllerError> {
    if before.status == after.status {
        return Ok(None);
    }

    let mut ops: Vec<PatchOperation> = resource_version_guard(resource_version).into_iter().collect();
    match (&before.status, &after.status) {
        (None, Some(status)) => ops.push(PatchOperation::Add(AddOperation {
            path: pointer(["status"]),
            value: to_value(status)?,
        })),
        _ => {
            let diff = json_patch::diff(
                &json!({ "status": to_value(&before.status)? }),
                &json!({ "status": to_value(&after.status)? }),
            );
            ops.extend(diff.0);
        }
    }
    Ok(Some(json_patch::Patch(ops)))
}

/// Builds the object patch taking `before` to `after`: this controller's
/// finalizer and the spec fields that differ. Finalizers owned by others
/// are left alone. Returns `None` when nothing changed.
pub fn object_patch(
    before: &AWSCluster,
    after: &AWSCluster,
    resource_version: Option<&str>,
) -> Result<Option<json_patch::Patch>, ControllerError> {
    let mut ops = Vec::new();

    match (before.has_finalizer(), after.has_finalizer()) {
        (false, true) => ops.push(match &before.metadata.finalizers {
            Some(_) => PatchOperation::Add(AddOperation {
                path: pointer(["metadata", "finalizers", "-"]),
                value: Value::String(AWS_CLUSTER_FINALIZER.to_string()),
            }),
            None => PatchOperation::Add(AddOperation {
                path: pointer(["metadata", "finalizers"]),
                value: json!([AWS_CLUSTER_FINALIZER]),
            }),
        }),
        (true, false) => {
            let index = before
                .metadata
                .finalizers
                .iter()
                .flatten()
                .position(|f| f == AWS_CLUSTER_FINALIZER)
                .unwrap_or_default()
                .to_string();
            let path = pointer(["metadata", "finalizers", index.as_str()]);
            ops.push(PatchOperation::Test(TestOperation {
                path: path.clone(),
                value: Value::String(AWS_CLUSTER_FINALIZER.to_string()),
            }));
            ops.push(PatchOperation::Remove(RemoveOperation { path }));
        }
        _ => {}
    }

    if before.spec != after.spec {
        let diff = json_patch::diff(
            &json!({ "spec": to_value(&before.spec)? }),
            &json!({ "spec": to_value(&after.spec)? }),
        );
        ops.extend(diff.0);
    }

    if ops.is_empty() {
        return Ok(None);
    }
    let mut guarded: Vec<PatchOperation> = resource_version_guard(resource_version).into_iter().collect();
    guarded.extend(ops);
    Ok(Some(json_patch::Patch(guarded)))
}

/// Kubernetes API backed store.
#[derive(Clone)]
pub struct KubeStore {
    client: Client,
}

impl KubeStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn aws_clusters(&self, namespace: &str) -> Api<AWSCluster> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

#[async_trait::async_trait]
impl ClusterStore for KubeStore {
    async fn get_aws_cluster(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<AWSCluster>, ControllerError> {
        Ok(self.aws_clusters(namespace).get_opt(name).await?)
    }

    async fn get_cluster(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Cluster>, ControllerError> {
        let api: Api<Cluster> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }

    async fn patch_aws_cluster(
        &self,
        before: &AWSCluster,
        after: &AWSCluster,
    ) -> Result<Option<String>, ControllerError> {
        let namespace = after.metadata.namespace.as_deref().unwrap_or("default");
        let name = after.metadata.name.as_deref().ok_or_else(|| {
            ControllerError::InvalidScope("AWSCluster has no name".to_string())
        })?;
        let api = self.aws_clusters(namespace);
        let params = PatchParams {
            field_manager: Some(FIELD_MANAGER.to_string()),
            ..PatchParams::default()
        };
        let mut resource_version = before.metadata.resource_version.clone();

        if let Some(patch) = status_patch(before, after, resource_version.as_deref())? {
            debug!("Patching status of AWSCluster {}/{}", namespace, name);
            let updated = api
                .patch_status(name, &params, &Patch::Json::<()>(patch))
                .await?;
            resource_version = updated.metadata.resource_version;
        }

        if let Some(patch) = object_patch(before, after, resource_version.as_deref())? {
            debug!("Patching finalizer/spec of AWSCluster {}/{}", namespace, name);
            let updated = api.patch(name, &params, &Patch::Json::<()>(patch)).await?;
            resource_version = updated.metadata.resource_version;
        }

        Ok(resource_version)
    }
}
