//! Prometheus metrics for the cleaner.
//!
//! Provides metrics for:
//! - Items processed per job and outcome
//! - Revisions deleted by reason
//! - Job errors
//! - Lifecycle events delivered or dropped by the event bus
//!
//! Every recording function is a no-op unless the `prometheus` feature is on.

#[cfg(feature = "prometheus")]
use std::net::SocketAddr;

#[cfg(feature = "prometheus")]
use metrics::counter;
#[cfg(feature = "prometheus")]
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::config::MetricsConfig;

/// Install the Prometheus recorder and its scrape endpoint.
#[cfg(feature = "prometheus")]
pub fn init_metrics(config: &MetricsConfig) -> Result<(), MetricsError> {
    if !config.enabled {
        return Ok(());
    }

    let addr: SocketAddr = config
        .listen
        .parse()
        .map_err(|e| MetricsError::Setup(format!("Invalid listen address '{}': {e}", config.listen)))?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(MetricsError::Install)?;

    tracing::info!(listen = %addr, "Prometheus metrics endpoint started");
    Ok(())
}

/// Initialize the metrics system (no-op without prometheus feature).
#[cfg(not(feature = "prometheus"))]
pub fn init_metrics(config: &MetricsConfig) -> Result<(), MetricsError> {
    if config.enabled {
        tracing::warn!(
            "Metrics are enabled in config but the 'prometheus' feature is not compiled. \
            Rebuild with: cargo build --features prometheus"
        );
    }
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Metric Recording Functions
// ─────────────────────────────────────────────────────────────────────────────

/// Record items handled by one job run.
///
/// # Arguments
/// * `job` - The job name (e.g., "revisions", "deleted", "unpublished", "listener")
/// * `outcome` - "cleaned", "failed" or "skipped"
/// * `count` - The number of items
pub fn record_items_processed(job: &str, outcome: &str, count: u64) {
    #[cfg(feature = "prometheus")]
    {
        if count > 0 {
            counter!(
                "history_cleaner_items_total",
                "job" => job.to_string(),
                "outcome" => outcome.to_string()
            )
            .increment(count);
        }
    }
    #[cfg(not(feature = "prometheus"))]
    {
        let _ = (job, outcome, count);
    }
}

/// Record removed revisions.
///
/// `reason` is "aged", "surplus" or "truncated".
pub fn record_revisions_deleted(reason: &str, count: u64) {
    #[cfg(feature = "prometheus")]
    {
        if count > 0 {
            counter!(
                "history_cleaner_revisions_deleted_total",
                "reason" => reason.to_string()
            )
            .increment(count);
        }
    }
    #[cfg(not(feature = "prometheus"))]
    {
        let _ = (reason, count);
    }
}

/// Record a job run that could not complete.
pub fn record_job_error(job: &str) {
    #[cfg(feature = "prometheus")]
    {
        counter!(
            "history_cleaner_job_errors_total",
            "job" => job.to_string()
        )
        .increment(1);
    }
    #[cfg(not(feature = "prometheus"))]
    {
        let _ = job;
    }
}

/// Record a lifecycle event sent on the bus.
///
/// `outcome` is "delivered" or "dropped" (no subscribers).
pub fn record_lifecycle_event(outcome: &str) {
    #[cfg(feature = "prometheus")]
    {
        counter!(
            "history_cleaner_lifecycle_events_total",
            "outcome" => outcome.to_string()
        )
        .increment(1);
    }
    #[cfg(not(feature = "prometheus"))]
    {
        let _ = outcome;
    }
}

/// Metrics initialization errors.
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    #[error("Failed to set up metrics: {0}")]
    Setup(String),

    #[cfg(feature = "prometheus")]
    #[error("Failed to install metrics recorder: {0}")]
    Install(#[from] metrics_exporter_prometheus::BuildError),
}
