//! Test utilities for unit testing the reconciler
//!
//! This module provides fixtures, an in-memory `ClusterStore` and a harness
//! wiring the reconciler to mock cloud services.

use crate::error::ControllerError;
use crate::metrics::Metrics;
use crate::reconciler::{Reconciler, ReconcilerSettings};
use crate::store::{AwsClusterLookup, ClusterStore, object_patch, status_patch};
use cloud_services::{MockCloudServices, MockDnsResolver};
use crds::*;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference, Time};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// AWSCluster fixture: us-east-1, an existing VPC, one private and one
/// public subnet, bastion enabled. No owner reference.
pub fn get_aws_cluster(name: &str, namespace: &str) -> AWSCluster {
    AWSCluster {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        },
        spec: AWSClusterSpec {
            region: "us-east-1".to_string(),
            network: NetworkSpec {
                vpc: VpcSpec {
                    id: Some("vpc-exists".to_string()),
                    cidr_block: Some("10.0.0.0/8".to_string()),
                },
                subnets: vec![
                    SubnetSpec {
                        id: Some("subnet-1".to_string()),
                        availability_zone: "us-east-1a".to_string(),
                        cidr_block: "10.0.10.0/24".to_string(),
                        is_public: false,
                    },
                    SubnetSpec {
                        id: Some("subnet-2".to_string()),
                        availability_zone: "us-east-1c".to_string(),
                        cidr_block: "10.0.11.0/24".to_string(),
                        is_public: true,
                    },
                ],
                ..Default::default()
            },
            bastion: Bastion {
                enabled: true,
                ..Default::default()
            },
            ..Default::default()
        },
        status: None,
    }
}

/// Owner reference pointing at a `Cluster`.
pub fn cluster_owner_reference(cluster_name: &str) -> OwnerReference {
    OwnerReference {
        api_version: "cluster.x-k8s.io/v1beta1".to_string(),
        kind: "Cluster".to_string(),
        name: cluster_name.to_string(),
        uid: "4a0a0d46-1f6c-4b38-9d3e-5b7f0f0b7c11".to_string(),
        controller: Some(true),
        block_owner_deletion: Some(true),
    }
}

/// `get_aws_cluster` with an owner reference to `cluster_name`.
pub fn owned_aws_cluster(name: &str, namespace: &str, cluster_name: &str) -> AWSCluster {
    let mut aws_cluster = get_aws_cluster(name, namespace);
    aws_cluster.metadata.owner_references = Some(vec![cluster_owner_reference(cluster_name)]);
    aws_cluster
}

/// Cluster fixture without an infrastructure reference.
pub fn owner_cluster(name: &str, namespace: &str) -> Cluster {
    Cluster {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        },
        spec: ClusterSpec::default(),
        status: None,
    }
}

/// Cluster fixture whose infrastructure reference points at `aws_cluster_name`.
pub fn cluster_with_infra_ref(name: &str, namespace: &str, aws_cluster_name: &str) -> Cluster {
    let mut cluster = owner_cluster(name, namespace);
    cluster.spec.infrastructure_ref = Some(ObjectReference {
        namespace: Some(namespace.to_string()),
        ..ObjectReference::aws_cluster(aws_cluster_name)
    });
    cluster
}

pub fn deletion_timestamp() -> Time {
    serde_json::from_value(serde_json::json!("2024-01-01T00:00:00Z")).unwrap()
}

pub fn annotations(pairs: &[(&str, &str)]) -> Option<BTreeMap<String, String>> {
    Some(
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect(),
    )
}

/// One private subnet per zone, plus a public subnet in the first zone.
pub fn subnets_in_zones(zones: &[&str]) -> Vec<SubnetSpec> {
    let mut subnets: Vec<SubnetSpec> = zones
        .iter()
        .enumerate()
        .map(|(i, zone)| SubnetSpec {
            id: Some(format!("subnet-private-{i}")),
            availability_zone: (*zone).to_string(),
            cidr_block: format!("10.0.{i}.0/24"),
            is_public: false,
        })
        .collect();
    if let Some(zone) = zones.first() {
        subnets.push(SubnetSpec {
            id: Some("subnet-public-0".to_string()),
            availability_zone: (*zone).to_string(),
            cidr_block: "10.0.100.0/24".to_string(),
            is_public: true,
        });
    }
    subnets
}

/// In-memory `ClusterStore`. Patches are the JSON patches `KubeStore` would
/// send, applied to the stored object; each write bumps `resourceVersion`.
/// Objects whose deletion timestamp is set are removed once their last
/// finalizer is gone, like the API server does.
#[derive(Default)]
pub struct MemoryStore {
    aws_clusters: Mutex<HashMap<(String, String), AWSCluster>>,
    clusters: Mutex<HashMap<(String, String), Cluster>>,
    patches: Mutex<Vec<json_patch::Patch>>,
}

fn key_of(meta: &ObjectMeta) -> (String, String) {
    (
        meta.namespace.clone().unwrap_or_default(),
        meta.name.clone().unwrap_or_default(),
    )
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_aws_cluster(&self, mut aws_cluster: AWSCluster) {
        aws_cluster
            .metadata
            .resource_version
            .get_or_insert_with(|| "1".to_string());
        let key = key_of(&aws_cluster.metadata);
        self.aws_clusters.lock().unwrap().insert(key, aws_cluster);
    }

    pub fn insert_cluster(&self, cluster: Cluster) {
        let key = key_of(&cluster.metadata);
        self.clusters.lock().unwrap().insert(key, cluster);
    }

    pub fn aws_cluster(&self, namespace: &str, name: &str) -> Option<AWSCluster> {
        self.aws_clusters
            .lock()
            .unwrap()
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    /// Number of patches that wrote something.
    pub fn patch_count(&self) -> usize {
        self.patches.lock().unwrap().len()
    }

    /// Patches applied so far, in order.
    pub fn patches(&self) -> Vec<json_patch::Patch> {
        self.patches.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl ClusterStore for MemoryStore {
    async fn get_aws_cluster(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<AWSCluster>, ControllerError> {
        Ok(self.aws_cluster(namespace, name))
    }

    async fn get_cluster(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Cluster>, ControllerError> {
        Ok(self
            .clusters
            .lock()
            .unwrap()
            .get(&(namespace.to_string(), name.to_string()))
            .cloned())
    }

    async fn patch_aws_cluster(
        &self,
        before: &AWSCluster,
        after: &AWSCluster,
    ) -> Result<Option<String>, ControllerError> {
        let key = key_of(&after.metadata);
        let mut objects = self.aws_clusters.lock().unwrap();
        let Some(stored) = objects.get_mut(&key) else {
            return Err(ControllerError::InvalidScope(format!(
                "AWSCluster {}/{} does not exist",
                key.0, key.1
            )));
        };

        let mut resource_version = before.metadata.resource_version.clone();
        if let Some(patch) = status_patch(before, after, resource_version.as_deref())? {
            resource_version = apply_patch(stored, &patch)?;
            self.patches.lock().unwrap().push(patch);
        }
        if let Some(patch) = object_patch(before, after, resource_version.as_deref())? {
            resource_version = apply_patch(stored, &patch)?;
            self.patches.lock().unwrap().push(patch);
        }

        let finalizers_empty = stored
            .metadata
            .finalizers
            .as_ref()
            .is_none_or(|f| f.is_empty());
        if stored.metadata.deletion_timestamp.is_some() && finalizers_empty {
            objects.remove(&key);
        }

        Ok(resource_version)
    }
}

/// Applies `patch` to `stored` and bumps its `resourceVersion`. A failing
/// `test` operation leaves `stored` untouched, like a conflict on the API
/// server.
fn apply_patch(
    stored: &mut AWSCluster,
    patch: &json_patch::Patch,
) -> Result<Option<String>, ControllerError> {
    let mut doc = serde_json::to_value(&*stored).unwrap();
    json_patch::patch(&mut doc, patch).map_err(|e| ControllerError::Patch(e.to_string()))?;

    let mut updated: AWSCluster = serde_json::from_value(doc).unwrap();
    let next = updated
        .metadata
        .resource_version
        .as_deref()
        .and_then(|rv| rv.parse::<u64>().ok())
        .unwrap_or_default()
        + 1;
    updated.metadata.resource_version = Some(next.to_string());
    *stored = updated;
    Ok(stored.metadata.resource_version.clone())
}

impl AwsClusterLookup for MemoryStore {
    fn lookup(&self, namespace: &str, name: &str) -> Option<Arc<AWSCluster>> {
        self.aws_cluster(namespace, name).map(Arc::new)
    }
}

/// Reconciler wired to an in-memory store and mock services.
pub struct TestHarness {
    pub store: Arc<MemoryStore>,
    pub services: MockCloudServices,
    pub resolver: MockDnsResolver,
    pub reconciler: Reconciler,
    pub cancel: CancellationToken,
}

pub const TEST_DNS_REQUEUE: Duration = Duration::from_secs(15);

/// Harness whose resolver resolves `www.example.com`.
pub fn harness() -> TestHarness {
    let store = Arc::new(MemoryStore::new());
    let services = MockCloudServices::new();
    let resolver = MockDnsResolver::resolving(&["www.example.com"]);
    let cancel = CancellationToken::new();

    let reconciler = Reconciler::new(
        Arc::clone(&store) as Arc<dyn ClusterStore>,
        Arc::new(services.clone()),
        Arc::new(resolver.clone()),
        ReconcilerSettings {
            dns_requeue: TEST_DNS_REQUEUE,
        },
        Metrics::new().unwrap(),
        cancel.clone(),
    );

    TestHarness {
        store,
        services,
        resolver,
        reconciler,
        cancel,
    }
}

/// Sets the load balancer DNS name in the status of `aws_cluster`.
pub fn with_dns_name(mut aws_cluster: AWSCluster, dns_name: &str) -> AWSCluster {
    aws_cluster
        .status
        .get_or_insert_with(AWSClusterStatus::default)
        .network
        .api_server_load_balancer
        .dns_name = Some(dns_name.to_string());
    aws_cluster
}
