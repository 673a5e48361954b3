//! Cloud Subsystem Services
//!
//! The AWSCluster controller drives four independently failing subsystems:
//! network, security groups, bastion host and the API server load balancer.
//! This crate defines them as traits, a [`ServiceFactory`] that builds them
//! for one cluster, and a DNS probe used to check load balancer readiness.
//!
//! The concrete implementation talks to an infrastructure gateway over REST;
//! the gateway owns the cloud credentials and API semantics.
//!
//! # Example
//!
//! ```no_run
//! use cloud_services::{GatewayServiceFactory, ServiceContext, ServiceFactory};
//!
//! # async fn example(cluster: &mut crds::AWSCluster) -> Result<(), Box<dyn std::error::Error>> {
//! let factory = GatewayServiceFactory::new(
//!     "http://infra-gateway:8080".to_string(),
//!     "gateway-token".to_string(),
//! )?;
//! let ctx = ServiceContext::new("us-east-1", "default", "my-cluster");
//! factory.network(&ctx).reconcile_network(cluster).await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Features
//!
//! - **Retry Logic**: gateway calls retry 5xx/429 responses with exponential backoff
//! - **Idempotent deletes**: a 404 on delete counts as already gone
//! - **`test-util`**: in-memory mocks with call recording and scripted failures

pub mod client;
pub mod common;
pub mod dns;
pub mod error;
pub mod models;
#[path = "trait.rs"]
pub mod service_trait;
#[cfg(feature = "test-util")]
pub mod mock;

pub use client::{GatewayClient, GatewayServiceFactory};
pub use common::HttpClient;
pub use dns::{DnsResolver, SystemDnsResolver};
pub use error::ServiceError;
pub use service_trait::*;
#[cfg(feature = "test-util")]
pub use mock::{MockCloudServices, MockDnsResolver, ServiceCall};
