use super::config::LogLevel;
use std::sync::OnceLock;
use thiserror::Error;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Crates whose chatter stays at warn unless RUST_LOG says otherwise.
const QUIET_TARGETS: &[&str] = &["hyper", "hyper_util", "tower", "tungstenite", "tokio_tungstenite"];

#[derive(Error, Debug, Clone)]
pub enum LoggingError {
    #[error("Failed to create EnvFilter with '{filter}': {details}")]
    InvalidFilter { filter: String, details: String },
    #[error("Failed to set global tracing subscriber: {0}")]
    InitFailed(String),
}

/// Filter string for the given level with the default per-crate directives.
pub fn build_filter_string(level: LogLevel) -> String {
    let mut parts = Vec::with_capacity(QUIET_TARGETS.len() + 1);
    parts.push(level.as_str().to_string());
    for target in QUIET_TARGETS {
        parts.push(format!("{target}=warn"));
    }
    parts.join(",")
}

/// Installs the global subscriber once per process. Later calls return the
/// outcome of the first one.
pub fn setup_logging(level: LogLevel, json: bool) -> Result<(), LoggingError> {
    static INIT: OnceLock<Result<(), LoggingError>> = OnceLock::new();

    INIT.get_or_init(|| initialize_tracing(level, json)).clone()
}

fn initialize_tracing(level: LogLevel, json: bool) -> Result<(), LoggingError> {
    let filter_string = std::env::var("RUST_LOG")
        .ok()
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| build_filter_string(level));

    let env_filter =
        EnvFilter::try_new(&filter_string).map_err(|e| LoggingError::InvalidFilter {
            filter: filter_string.clone(),
            details: e.to_string(),
        })?;

    let json_layer = json.then(|| fmt::layer().json().with_target(true));
    let text_layer = (!json).then(|| {
        fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .with_level(true)
            .compact()
    });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json_layer)
        .with(text_layer)
        .try_init()
        .map_err(|e| LoggingError::InitFailed(e.to_string()))
}
