//! Cluster API CRD Definitions
//!
//! Kubernetes Custom Resource Definitions consumed by the AWSCluster controller:
//! - `AWSCluster`: desired and observed state of a cluster's cloud infrastructure
//! - `Cluster`: the logical cluster that owns an `AWSCluster`
//!
//! Also provides the condition bookkeeping, annotation helpers and typed
//! references shared by the controller.

pub mod annotations;
pub mod aws_cluster;
pub mod cluster;
pub mod conditions;
pub mod references;

pub use annotations::*;
pub use aws_cluster::*;
pub use cluster::*;
pub use conditions::{Condition, ConditionSeverity, ConditionStatus};
pub use references::*;
