//! Controller configuration, read from environment variables.

use crate::error::ControllerError;
use std::net::SocketAddr;
use std::time::Duration;

const DEFAULT_GATEWAY_URL: &str = "http://infra-gateway.capa-system:8080";
const DEFAULT_METRICS_ADDR: &str = "0.0.0.0:8080";
const DEFAULT_DNS_REQUEUE_SECONDS: u64 = 15;
const DEFAULT_MAX_CONCURRENT_RECONCILES: u16 = 10;

#[derive(Debug, Clone)]
pub struct Config {
    /// Namespace to watch; `None` watches all namespaces
    pub namespace: Option<String>,
    pub gateway_url: String,
    pub gateway_token: String,
    pub metrics_addr: SocketAddr,
    /// Requeue delay while the load balancer DNS name is missing or unresolvable
    pub dns_requeue: Duration,
    pub max_concurrent_reconciles: u16,
}

impl Config {
    /// Loads the configuration from the process environment.
    pub fn from_env() -> Result<Self, ControllerError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads the configuration through `lookup`, which returns the value of
    /// a variable or `None` when unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ControllerError> {
        let gateway_token = lookup("CLOUD_GATEWAY_TOKEN").ok_or_else(|| {
            ControllerError::InvalidConfig(
                "CLOUD_GATEWAY_TOKEN environment variable is required".to_string(),
            )
        })?;

        let metrics_addr = lookup("METRICS_ADDR")
            .unwrap_or_else(|| DEFAULT_METRICS_ADDR.to_string());
        let metrics_addr: SocketAddr = metrics_addr.parse().map_err(|e| {
            ControllerError::InvalidConfig(format!("METRICS_ADDR '{metrics_addr}': {e}"))
        })?;

        let dns_requeue_seconds = parse_number(
            &lookup,
            "DNS_REQUEUE_SECONDS",
            DEFAULT_DNS_REQUEUE_SECONDS,
        )?;
        if dns_requeue_seconds == 0 {
            return Err(ControllerError::InvalidConfig(
                "DNS_REQUEUE_SECONDS must be greater than zero".to_string(),
            ));
        }

        Ok(Self {
            namespace: lookup("WATCH_NAMESPACE").filter(|ns| !ns.is_empty()),
            gateway_url: lookup("CLOUD_GATEWAY_URL")
                .unwrap_or_else(|| DEFAULT_GATEWAY_URL.to_string()),
            gateway_token,
            metrics_addr,
            dns_requeue: Duration::from_secs(dns_requeue_seconds),
            max_concurrent_reconciles: parse_number(
                &lookup,
                "MAX_CONCURRENT_RECONCILES",
                DEFAULT_MAX_CONCURRENT_RECONCILES,
            )?,
        })
    }
}

fn parse_number<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T, ControllerError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw
            .parse()
            .map_err(|e| ControllerError::InvalidConfig(format!("{key} '{raw}': {e}"))),
    }
}
