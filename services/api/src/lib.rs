mod cli;
mod demo;
mod infra;
mod pages;
mod routes;
mod server;

use std::fmt;

use villa_flow::config::ConfigError;
use villa_flow::error::FlowError;
use villa_flow::store::StoreError;
use villa_flow::telemetry::TelemetryError;

pub async fn run() -> Result<(), ApiError> {
    cli::run().await
}

/// Startup-level failures of the binary itself; everything per-request is
/// handled inside the routes.
#[derive(Debug)]
pub enum ApiError {
    Config(ConfigError),
    Telemetry(TelemetryError),
    Io(std::io::Error),
    Store(StoreError),
    Flow(FlowError),
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::Config(err) => write!(f, "configuration error: {err}"),
            ApiError::Telemetry(err) => write!(f, "telemetry error: {err}"),
            ApiError::Io(err) => write!(f, "io error: {err}"),
            ApiError::Store(err) => write!(f, "store error: {err}"),
            ApiError::Flow(err) => write!(f, "pipeline error: {err}"),
        }
    }
}

impl std::error::Error for ApiError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ApiError::Config(err) => Some(err),
            ApiError::Telemetry(err) => Some(err),
            ApiError::Io(err) => Some(err),
            ApiError::Store(err) => Some(err),
            ApiError::Flow(err) => Some(err),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(value: StoreError) -> Self {
        ApiError::Store(value)
    }
}

impl From<FlowError> for ApiError {
    fn from(value: FlowError) -> Self {
        ApiError::Flow(value)
    }
}

impl From<ConfigError> for ApiError {
    fn from(value: ConfigError) -> Self {
        ApiError::Config(value)
    }
}

impl From<TelemetryError> for ApiError {
    fn from(value: TelemetryError) -> Self {
        ApiError::Telemetry(value)
    }
}

impl From<std::io::Error> for ApiError {
    fn from(value: std::io::Error) -> Self {
        ApiError::Io(value)
    }
}
