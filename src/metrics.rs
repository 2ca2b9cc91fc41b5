//! Prometheus metrics HTTP server.
//!
//! Exposes ingestion statistics in Prometheus text format via HTTP
//! endpoint.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{Router, extract::State, http::StatusCode, response::IntoResponse, routing::get};
use tokio::net::TcpListener;
use tracing::info;

use crate::stats::ConnectionStats;

/// Start the Prometheus metrics HTTP server.
///
/// Runs in the background and serves metrics at `/metrics`.
/// Returns an error if the server fails to bind to the port.
pub async fn start_metrics_server(
    port: u16,
    stats: Arc<ConnectionStats>,
) -> Result<(), std::io::Error> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    let app = Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/health", get(health_handler))
        .with_state(stats);

    let listener = TcpListener::bind(addr).await?;
    info!("Prometheus metrics server listening on http://{}/metrics", addr);

    axum::serve(listener, app)
        .await
        .map_err(|e| std::io::Error::other(e.to_string()))
}

/// Health check endpoint.
async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// Prometheus metrics endpoint.
async fn metrics_handler(State(stats): State<Arc<ConnectionStats>>) -> impl IntoResponse {
    let output = format_prometheus_metrics(&stats);
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        output,
    )
}

/// Format statistics as Prometheus text format.
fn format_prometheus_metrics(stats: &ConnectionStats) -> String {
    let summary = stats.summary();
    let mut output = String::with_capacity(4096);

    // Uptime
    output.push_str("# HELP kismet_uptime_seconds Time since the adapter started\n");
    output.push_str("# TYPE kismet_uptime_seconds gauge\n");
    output.push_str(&format!("kismet_uptime_seconds {:.3}\n", summary.elapsed_secs));

    // Sentences by kind
    output.push_str("# HELP kismet_sentences_total Sentences processed by kind\n");
    output.push_str("# TYPE kismet_sentences_total counter\n");
    output.push_str(&format!(
        "kismet_sentences_total{{kind=\"measurement\"}} {}\n",
        summary.measurements
    ));
    output.push_str(&format!(
        "kismet_sentences_total{{kind=\"source\"}} {}\n",
        summary.directory_updates
    ));
    output.push_str(&format!(
        "kismet_sentences_total{{kind=\"ignored\"}} {}\n",
        summary.ignored_sentences
    ));

    // Parse failures
    output.push_str("# HELP kismet_parse_failures_total Lines that failed to parse\n");
    output.push_str("# TYPE kismet_parse_failures_total counter\n");
    output.push_str(&format!("kismet_parse_failures_total {}\n", summary.parse_failures));

    // Batches by outcome
    output.push_str("# HELP kismet_batches_total Batches built at cycle boundaries\n");
    output.push_str("# TYPE kismet_batches_total counter\n");
    output.push_str(&format!(
        "kismet_batches_total{{outcome=\"delivered\"}} {}\n",
        summary.batches_delivered
    ));
    output.push_str(&format!(
        "kismet_batches_total{{outcome=\"failed\"}} {}\n",
        summary.delivery_failures
    ));

    // Bytes processed
    output.push_str("# HELP kismet_bytes_processed_total Raw protocol bytes read\n");
    output.push_str("# TYPE kismet_bytes_processed_total counter\n");
    output.push_str(&format!("kismet_bytes_processed_total {}\n", summary.bytes_processed));

    // Measurement rate
    output.push_str("# HELP kismet_measurements_per_second Current measurement rate\n");
    output.push_str("# TYPE kismet_measurements_per_second gauge\n");
    output.push_str(&format!(
        "kismet_measurements_per_second {:.3}\n",
        summary.measurements_per_second
    ));

    // Signal strength percentiles
    if let Some(ref p) = summary.signal_percentiles {
        output.push_str("# HELP kismet_signal_strength_dbm Signal strength distribution\n");
        output.push_str("# TYPE kismet_signal_strength_dbm gauge\n");
        output.push_str(&format!(
            "kismet_signal_strength_dbm{{quantile=\"0.5\"}} {}\n",
            p.p50
        ));
        output.push_str(&format!(
            "kismet_signal_strength_dbm{{quantile=\"0.9\"}} {}\n",
            p.p90
        ));
        output.push_str(&format!(
            "kismet_signal_strength_dbm{{quantile=\"0.99\"}} {}\n",
            p.p99
        ));
    }

    // Batch size percentiles
    if let Some(ref p) = summary.batch_size_percentiles {
        output.push_str("# HELP kismet_batch_size Measurements per delivered batch\n");
        output.push_str("# TYPE kismet_batch_size gauge\n");
        output.push_str(&format!("kismet_batch_size{{quantile=\"0.5\"}} {}\n", p.p50));
        output.push_str(&format!("kismet_batch_size{{quantile=\"0.9\"}} {}\n", p.p90));
        output.push_str(&format!("kismet_batch_size{{quantile=\"0.99\"}} {}\n", p.p99));
    }

    output
}
