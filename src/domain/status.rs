use std::sync::Arc;

/// Callback receiving human-readable status lines from the agent.
pub type StatusLogger = Arc<dyn Fn(&str) + Send + Sync>;

/// Forwards status lines to `tracing` at debug level under the `apianalytics` target.
pub fn tracing_logger() -> StatusLogger {
    Arc::new(|line: &str| tracing::debug!(target: "apianalytics", "{}", line))
}
