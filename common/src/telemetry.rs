// Telemetry module for structured logging and metrics

use anyhow::Result;
use metrics::{counter, describe_counter};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::models::RunSummary;

/// Initialize structured logging with JSON formatting
///
/// Log level comes from `RUST_LOG` when set, falling back to the configured
/// level.
pub fn init_logging(log_level: &str) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .map_err(|e| anyhow::anyhow!("Failed to create env filter: {}", e))?;

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_filter(env_filter);

    tracing_subscriber::registry()
        .with(json_layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize tracing subscriber: {}", e))?;

    tracing::info!(log_level = log_level, "Structured logging initialized");
    Ok(())
}

/// Start the Prometheus metrics exporter and register metric descriptions
pub fn init_metrics(port: u16) -> Result<()> {
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| anyhow::anyhow!("Failed to install Prometheus exporter: {}", e))?;

    describe_counter!("reminder_batch_runs_total", "Batch runs started, by trigger source");
    describe_counter!("reminder_sent_total", "Reminders delivered successfully");
    describe_counter!("reminder_failed_total", "Reminder deliveries that failed");
    describe_counter!("reminder_skipped_total", "Reminders skipped by the dedup check");

    tracing::info!(port = port, "Prometheus metrics exporter started");
    Ok(())
}

/// Record the counters for one finished batch run
pub fn record_run_summary(summary: &RunSummary) {
    let source = summary.source.to_string();
    counter!("reminder_batch_runs_total", "source" => source.clone()).increment(1);
    counter!("reminder_sent_total", "source" => source.clone()).increment(summary.sent as u64);
    counter!("reminder_failed_total", "source" => source.clone()).increment(summary.failed as u64);
    counter!("reminder_skipped_total", "source" => source).increment(summary.skipped as u64);
}
