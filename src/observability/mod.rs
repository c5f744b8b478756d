//! Tracing and metrics initialization for the stage hosts.

use std::net::SocketAddr;

use metrics_exporter_prometheus::PrometheusBuilder;
use tracing_subscriber::EnvFilter;

use crate::config::{LoggingConfig, MetricsConfig};
use crate::domain::{PipelineError, Result};

/// Initialize the tracing subscriber. Records carry the standard fields
/// plus whatever the stages attach (`invoice_id`, `message_id`, `vendor`,
/// `stage`, `delivery_attempt`); JSON output is newline-delimited for log
/// collectors.
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .map_err(|e| PipelineError::config(format!("invalid log filter: {}", e)))?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true);

    let result = if config.json {
        builder.json().with_current_span(true).try_init()
    } else {
        builder.try_init()
    };

    result.map_err(|e| PipelineError::config(format!("tracing init failed: {}", e)))
}

/// Install the Prometheus exporter when metrics are enabled.
pub fn init_metrics(config: &MetricsConfig) -> Result<()> {
    if !config.enabled {
        tracing::info!("Metrics collection is disabled");
        return Ok(());
    }

    let addr: SocketAddr = config
        .prometheus_addr
        .parse()
        .map_err(|e| PipelineError::config(format!("invalid Prometheus address: {}", e)))?;

    tracing::info!(addr = %addr, "Initializing Prometheus metrics exporter");

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| {
            PipelineError::config(format!("failed to install Prometheus exporter: {}", e))
        })?;

    metrics::counter!("invoice_pipeline_info", 1);

    Ok(())
}
