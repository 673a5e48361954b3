//! Controller-specific error types.
//!
//! This module defines error types specific to the AWSCluster controller
//! that are not covered by upstream library errors.

use cloud_services::{ServiceError, Subsystem};
use kube::Error as KubeError;
use thiserror::Error;

/// Errors that can occur in the AWSCluster controller.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Kubernetes API error
    #[error("Kubernetes error: {0}")]
    Kube(#[from] KubeError),

    /// A subsystem service failed
    #[error("failed to reconcile {subsystem}: {source}")]
    Service {
        subsystem: Subsystem,
        #[source]
        source: ServiceError,
    },

    /// A subsystem deletion failed
    #[error("failed to delete {subsystem}: {source}")]
    ServiceDeletion {
        subsystem: Subsystem,
        #[source]
        source: ServiceError,
    },

    /// The owner reference points at a Cluster that cannot be fetched
    #[error("owner Cluster not found: {0}")]
    OwnerClusterNotFound(String),

    /// The resource cannot back a cluster scope
    #[error("invalid cluster scope: {0}")]
    InvalidScope(String),

    /// The invocation was cancelled before the step finished
    #[error("reconciliation cancelled during {0}")]
    Cancelled(Subsystem),

    /// One or more delete steps failed; the finalizer was kept
    #[error("{failed} deletion step(s) failed, first: {first}")]
    DeleteIncomplete {
        failed: usize,
        #[source]
        first: Box<ControllerError>,
    },

    /// A patch could not be built or applied
    #[error("patch error: {0}")]
    Patch(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Infrastructure gateway setup error
    #[error("gateway error: {0}")]
    Gateway(ServiceError),

    /// Metrics registration error
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    /// Probe/metrics server error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Resource watch failed
    #[error("Resource watch failed: {0}")]
    Watch(String),
}

impl ControllerError {
    /// Label used for the `result` of failed reconciliations in metrics.
    pub fn metric_label(&self) -> &'static str {
        match self {
            ControllerError::Kube(_) => "kube",
            ControllerError::Service { .. } => "service",
            ControllerError::ServiceDeletion { .. } | ControllerError::DeleteIncomplete { .. } => {
                "deletion"
            }
            ControllerError::OwnerClusterNotFound(_) => "owner",
            ControllerError::InvalidScope(_) => "scope",
            ControllerError::Patch(_) => "patch",
            ControllerError::Cancelled(_) => "cancelled",
            ControllerError::InvalidConfig(_)
            | ControllerError::Gateway(_)
            | ControllerError::Metrics(_)
            | ControllerError::Io(_)
            | ControllerError::Watch(_) => "internal",
        }
    }
}
