//! Tracing setup for the pipeline binaries.

use tracing_subscriber::filter::ParseError;
use tracing_subscriber::EnvFilter;

use crate::config::TelemetryConfig;

#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("invalid log filter {value:?}")]
    Filter {
        value: String,
        #[source]
        source: ParseError,
    },
    #[error("telemetry init failed: {0}")]
    Subscriber(#[from] Box<dyn std::error::Error + Send + Sync>),
}

fn filter_from(value: &str) -> Result<EnvFilter, TelemetryError> {
    EnvFilter::try_new(value).map_err(|source| TelemetryError::Filter {
        value: value.to_string(),
        source,
    })
}

/// Install the global subscriber. `RUST_LOG` wins over the configured level
/// so a deployment can raise verbosity without a config change.
pub fn init(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => filter_from(&config.log_level)?,
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .with_ansi(false)
        .try_init()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configured_level_builds_a_filter() {
        assert!(filter_from("villa_flow=debug,info").is_ok());
        assert!(filter_from("warn").is_ok());
    }

    #[test]
    fn garbage_filter_reports_the_offending_value() {
        let err = filter_from("not[a(filter").expect_err("must not parse");
        match err {
            TelemetryError::Filter { value, .. } => assert_eq!(value, "not[a(filter"),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
