//! Tracing subscriber setup with configurable logging formats.

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{LogFormat, LogLevel, LoggingConfig};

/// Install the global tracing subscriber.
///
/// Filtering follows `RUST_LOG` when set, then the configured filter
/// directives on top of the configured level.
pub fn init_tracing(logging: &LoggingConfig) -> Result<(), TracingError> {
    let filter = build_env_filter(logging);

    let result = match (&logging.format, logging.timestamps) {
        (LogFormat::Pretty, true) => tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .pretty()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(logging.file_line)
                    .with_line_number(logging.file_line),
            )
            .try_init(),
        (LogFormat::Pretty, false) => tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .pretty()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(logging.file_line)
                    .with_line_number(logging.file_line)
                    .without_time(),
            )
            .try_init(),
        (LogFormat::Compact, true) => tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .compact()
                    .with_target(true)
                    .with_file(logging.file_line)
                    .with_line_number(logging.file_line),
            )
            .try_init(),
        (LogFormat::Compact, false) => tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .compact()
                    .with_target(true)
                    .with_file(logging.file_line)
                    .with_line_number(logging.file_line)
                    .without_time(),
            )
            .try_init(),
        (LogFormat::Json, true) => tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_file(logging.file_line)
                    .with_line_number(logging.file_line)
                    .with_current_span(logging.include_spans),
            )
            .try_init(),
        (LogFormat::Json, false) => tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_file(logging.file_line)
                    .with_line_number(logging.file_line)
                    .with_current_span(logging.include_spans)
                    .without_time(),
            )
            .try_init(),
    };

    result.map_err(|e| TracingError::Init(e.to_string()))
}

fn level_directive(level: &LogLevel) -> &'static str {
    match level {
        LogLevel::Trace => "trace",
        LogLevel::Debug => "debug",
        LogLevel::Info => "info",
        LogLevel::Warn => "warn",
        LogLevel::Error => "error",
    }
}

/// Build the environment filter from logging config.
fn build_env_filter(config: &LoggingConfig) -> EnvFilter {
    filter_from(config, std::env::var("RUST_LOG").ok())
}

fn filter_from(config: &LoggingConfig, rust_log: Option<String>) -> EnvFilter {
    let base_level = level_directive(&config.level);

    if let Some(env_filter) = rust_log {
        EnvFilter::try_new(env_filter).unwrap_or_else(|_| EnvFilter::new(base_level))
    } else if let Some(filter) = &config.filter {
        let combined = format!("{},{}", base_level, filter);
        EnvFilter::try_new(combined).unwrap_or_else(|_| EnvFilter::new(base_level))
    } else {
        EnvFilter::new(base_level)
    }
}

/// Tracing initialization errors.
#[derive(Debug, thiserror::Error)]
pub enum TracingError {
    #[error("Failed to initialize tracing: {0}")]
    Init(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_uses_configured_level() {
        let config = LoggingConfig {
            level: LogLevel::Debug,
            ..Default::default()
        };
        assert_eq!(filter_from(&config, None).to_string(), "debug");
    }

    #[test]
    fn test_filter_appends_directives() {
        let config = LoggingConfig {
            level: LogLevel::Warn,
            filter: Some("history_cleaner::query=trace".into()),
            ..Default::default()
        };
        let filter = filter_from(&config, None).to_string();
        assert!(filter.contains("warn"));
        assert!(filter.contains("history_cleaner::query=trace"));
    }

    #[test]
    fn test_rust_log_wins() {
        let config = LoggingConfig {
            level: LogLevel::Error,
            filter: Some("history_cleaner=trace".into()),
            ..Default::default()
        };
        assert_eq!(filter_from(&config, Some("info".into())).to_string(), "info");
    }
}
