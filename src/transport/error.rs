use super::serialization::SerializationError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Invalid collector address '{address}': {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("Serialization failed: {0}")]
    Serialization(#[from] SerializationError),

    #[error("Collector client is shut down")]
    Closed,

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("Connection attempt timed out after {timeout_ms}ms")]
    ConnectTimeout { timeout_ms: u64 },
}
