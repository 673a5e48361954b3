//! DNS probe for load balancer readiness.

use tracing::debug;

/// Checks whether a hostname currently resolves.
#[async_trait::async_trait]
pub trait DnsResolver: Send + Sync {
    /// `true` when the name resolves to at least one address. Lookup
    /// failures count as "not resolvable".
    async fn resolves(&self, host: &str) -> bool;
}

/// Resolver backed by the system resolver.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemDnsResolver;

#[async_trait::async_trait]
impl DnsResolver for SystemDnsResolver {
    async fn resolves(&self, host: &str) -> bool {
        match tokio::net::lookup_host((host, 443)).await {
            Ok(mut addrs) => addrs.next().is_some(),
            Err(e) => {
                debug!("DNS lookup for {} failed: {}", host, e);
                false
            }
        }
    }
}
