//! Well-known Cluster API annotations.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

/// Present on a `Cluster` or infrastructure resource to stop reconciliation.
pub const PAUSED_ANNOTATION: &str = "cluster.x-k8s.io/paused";

/// Present on an infrastructure resource whose lifecycle is owned by
/// something other than this controller.
pub const MANAGED_BY_ANNOTATION: &str = "cluster.x-k8s.io/managed-by";

/// Whether `meta` carries the annotation `key` (any value, including empty).
pub fn has_annotation(meta: &ObjectMeta, key: &str) -> bool {
    meta.annotations
        .as_ref()
        .is_some_and(|annotations| annotations.contains_key(key))
}

/// Whether an object is externally managed.
pub fn is_externally_managed(meta: &ObjectMeta) -> bool {
    has_annotation(meta, MANAGED_BY_ANNOTATION)
}
