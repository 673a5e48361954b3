//! Typed object references between Cluster API resources
//!
//! Owner references and infrastructure references carry a free-form
//! `apiVersion`/`kind` pair. They are parsed once into [`ResourceKind`] so
//! lookups match on the API group and kind instead of comparing strings at
//! every call site. The version is ignored: any version of a group refers to
//! the same resource.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// API group of the core Cluster API resources.
pub const CLUSTER_API_GROUP: &str = "cluster.x-k8s.io";

/// API group of infrastructure provider resources.
pub const INFRASTRUCTURE_API_GROUP: &str = "infrastructure.cluster.x-k8s.io";

/// Resource kinds the controller knows how to follow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    /// `cluster.x-k8s.io` `Cluster`
    Cluster,
    /// `infrastructure.cluster.x-k8s.io` `AWSCluster`
    AwsCluster,
    /// Anything else
    Unknown,
}

impl ResourceKind {
    /// Resolves an `apiVersion`/`kind` pair.
    ///
    /// `apiVersion` is `group/version`, or just `version` for the core group.
    pub fn from_type(api_version: &str, kind: &str) -> Self {
        let group = api_version
            .split_once('/')
            .map_or("", |(group, _version)| group);
        match (group, kind) {
            (CLUSTER_API_GROUP, "Cluster") => ResourceKind::Cluster,
            (INFRASTRUCTURE_API_GROUP, "AWSCluster") => ResourceKind::AwsCluster,
            _ => ResourceKind::Unknown,
        }
    }
}

/// Kubernetes object reference as used by `Cluster.spec.infrastructureRef`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ObjectReference {
    /// `group/version` of the referenced resource
    #[serde(default)]
    pub api_version: String,

    /// Kind of the referenced resource
    #[serde(default)]
    pub kind: String,

    /// Name of the referenced resource
    pub name: String,

    /// Namespace of the referenced resource (defaults to the referrer's namespace)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

impl ObjectReference {
    /// Reference to an `AWSCluster` in the referrer's namespace.
    pub fn aws_cluster(name: impl Into<String>) -> Self {
        Self {
            api_version: format!("{INFRASTRUCTURE_API_GROUP}/v1beta1"),
            kind: "AWSCluster".to_string(),
            name: name.into(),
            namespace: None,
        }
    }

    /// Typed kind of the referenced resource.
    pub fn resource_kind(&self) -> ResourceKind {
        ResourceKind::from_type(&self.api_version, &self.kind)
    }
}

/// Name of the owning `Cluster`, taken from the owner references of `meta`.
///
/// Returns `None` when no owner reference points at a `Cluster`.
pub fn owner_cluster_name(meta: &ObjectMeta) -> Option<&str> {
    meta.owner_references
        .as_deref()?
        .iter()
        .find(|owner| ResourceKind::from_type(&owner.api_version, &owner.kind) == ResourceKind::Cluster)
        .map(|owner| owner.name.as_str())
}
