//! Cluster CRD
//!
//! The logical cluster resource. The controller only reads it: the pause
//! flag, the infrastructure reference and the deletion timestamp.

use crate::annotations::{PAUSED_ANNOTATION, has_annotation};
use crate::references::ObjectReference;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[kube(
    group = "cluster.x-k8s.io",
    version = "v1beta1",
    kind = "Cluster",
    namespaced,
    status = "ClusterStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct ClusterSpec {
    /// Pauses reconciliation of the cluster and everything it owns
    #[serde(default)]
    pub paused: bool,

    /// Reference to the provider-specific infrastructure resource
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub infrastructure_ref: Option<ObjectReference>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClusterStatus {
    /// Whether the infrastructure resource reported ready
    #[serde(default)]
    pub infrastructure_ready: bool,

    /// Lifecycle phase of the cluster
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,
}

impl Cluster {
    /// A cluster is paused through its spec or through the pause annotation.
    pub fn is_paused(&self) -> bool {
        self.spec.paused || has_annotation(&self.metadata, PAUSED_ANNOTATION)
    }

    /// Whether the cluster is being deleted.
    pub fn is_deleting(&self) -> bool {
        self.metadata.deletion_timestamp.is_some()
    }
}
