use thiserror::Error;

/// Top-level error type for agent construction.
///
/// Only construction-time failures surface here. Everything that can go wrong
/// while recording traffic is absorbed inside the pipeline and logged.
#[derive(Error, Debug)]
pub enum AgentError {
    #[error(
        "a service token is required, visit https://www.apianalytics.com/ to obtain one"
    )]
    MissingServiceToken,

    #[error("Configuration error: {0}")]
    Config(#[from] crate::app::ConfigError),

    #[error("Buffer error: {0}")]
    Buffer(#[from] crate::buffer::BufferError),

    #[error("Transport error: {0}")]
    Transport(#[from] crate::transport::TransportError),

    #[error("Agent must be started from within a Tokio runtime")]
    NoRuntime,
}

impl AgentError {
    /// True for errors caused by what the caller supplied rather than by the environment.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            AgentError::MissingServiceToken | AgentError::Config(_) | AgentError::Buffer(_)
        )
    }
}
