//! Prometheus metrics and the probe/metrics HTTP server.

use crate::error::ControllerError;
use axum::Router;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::IntoResponse;
use axum::routing::get;
use cloud_services::Subsystem;
use prometheus::{Encoder, Histogram, HistogramOpts, IntCounterVec, Opts, Registry, TextEncoder};
use std::net::SocketAddr;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

#[derive(Clone)]
pub struct Metrics {
    pub reconciliations: IntCounterVec,
    pub reconcile_duration: Histogram,
    pub subsystem_failures: IntCounterVec,
}

impl Metrics {
    pub fn new() -> Result<Self, ControllerError> {
        Ok(Self {
            reconciliations: IntCounterVec::new(
                Opts::new(
                    "awscluster_reconciliations_total",
                    "AWSCluster reconciliations by result",
                ),
                &["result"],
            )?,
            reconcile_duration: Histogram::with_opts(
                HistogramOpts::new(
                    "awscluster_reconcile_duration_seconds",
                    "Duration of AWSCluster reconciliations",
                )
                .buckets(vec![0.05, 0.1, 0.5, 1., 5., 15., 30., 60.]),
            )?,
            subsystem_failures: IntCounterVec::new(
                Opts::new(
                    "awscluster_subsystem_failures_total",
                    "Failed subsystem calls by subsystem and operation",
                ),
                &["subsystem", "operation"],
            )?,
        })
    }

    /// Registers every metric with `registry`.
    pub fn register(self, registry: &Registry) -> Result<Self, ControllerError> {
        registry.register(Box::new(self.reconciliations.clone()))?;
        registry.register(Box::new(self.reconcile_duration.clone()))?;
        registry.register(Box::new(self.subsystem_failures.clone()))?;
        Ok(self)
    }

    /// Starts timing a reconciliation; the duration is recorded on drop.
    pub fn measure(&self) -> ReconcileMeasurer {
        ReconcileMeasurer {
            start: Instant::now(),
            histogram: self.reconcile_duration.clone(),
        }
    }

    pub fn record_result(&self, result: &str) {
        self.reconciliations.with_label_values(&[result]).inc();
    }

    pub fn record_subsystem_failure(&self, subsystem: Subsystem, operation: &str) {
        self.subsystem_failures
            .with_label_values(&[subsystem.as_str(), operation])
            .inc();
    }
}

/// Records the elapsed time into the duration histogram when dropped.
pub struct ReconcileMeasurer {
    start: Instant,
    histogram: Histogram,
}

impl Drop for ReconcileMeasurer {
    fn drop(&mut self) {
        self.histogram.observe(self.start.elapsed().as_secs_f64());
    }
}

/// Renders the registry in the Prometheus text format.
pub fn render(registry: &Registry) -> Result<String, ControllerError> {
    let mut buffer = Vec::new();
    TextEncoder::new().encode(&registry.gather(), &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| {
        ControllerError::Metrics(prometheus::Error::Msg(format!(
            "metrics are not valid UTF-8: {e}"
        )))
    })
}

async fn metrics_handler(State(registry): State<Registry>) -> impl IntoResponse {
    match render(&registry) {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => {
            error!("Failed to encode metrics: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn health_handler() -> &'static str {
    "ok"
}

pub fn router(registry: Registry) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/healthz", get(health_handler))
        .route("/readyz", get(health_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(registry)
}

/// Serves `/metrics`, `/healthz` and `/readyz` until `shutdown` is cancelled.
pub async fn serve(
    addr: SocketAddr,
    registry: Registry,
    shutdown: CancellationToken,
) -> Result<(), ControllerError> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Serving metrics and probes on {}", addr);
    axum::serve(listener, router(registry))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
    Ok(())
}
