// packages/runtime/src/observability.rs
//! Tracing and metrics initialisation
//!
//! Logs go to stderr so the binary's stdout carries only API responses.
//! `RUST_LOG` overrides the configured level.

use crate::utils::errors::{EngineError, Result};
use metrics_exporter_prometheus::PrometheusBuilder;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use tracing::{debug, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Default filter directive when `RUST_LOG` is unset
    pub log_level: String,

    pub log_format: LogFormat,

    /// Prometheus listen address, e.g. `127.0.0.1:9000`
    pub metrics_addr: Option<String>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".into(),
            log_format: LogFormat::Pretty,
            metrics_addr: None,
        }
    }
}

pub fn init_tracing(config: &ObservabilityConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let (json, pretty) = match config.log_format {
        LogFormat::Json => (Some(fmt::layer().json().with_writer(std::io::stderr)), None),
        LogFormat::Pretty => (None, Some(fmt::layer().with_writer(std::io::stderr))),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(json)
        .with(pretty)
        .try_init()
        .map_err(|e| EngineError::ConfigError(format!("failed to initialize tracing: {}", e)))
}

/// Install the Prometheus exporter when an address is configured
pub fn init_metrics(addr: Option<&str>) -> Result<()> {
    let Some(addr) = addr else {
        debug!("Metrics exporter disabled");
        return Ok(());
    };

    let addr: SocketAddr = addr
        .parse()
        .map_err(|e| EngineError::ConfigError(format!("invalid metrics address {}: {}", addr, e)))?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| EngineError::ConfigError(format!("failed to install metrics exporter: {}", e)))?;

    describe_metrics();
    info!(%addr, "Metrics exporter listening");
    Ok(())
}

fn describe_metrics() {
    metrics::describe_counter!("agent_runtime_tasks_total", "Settled tasks by outcome");
    metrics::describe_counter!("agent_runtime_circuit_opened_total", "Circuit breaker openings");
    metrics::describe_counter!("agent_runtime_limit_exceeded_total", "Resource limit breaches by kind");
    metrics::describe_counter!("agent_runtime_tool_calls_total", "Tool calls by tool and outcome");
    metrics::describe_gauge!("agent_runtime_agents", "Registered agents (total) and running agents (active)");
    metrics::describe_histogram!("agent_runtime_task_duration_ms", "Task execution time in milliseconds");
}
