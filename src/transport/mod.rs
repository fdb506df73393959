//! Collector connection.
//!
//! [`CollectorClient`] owns one long-lived WebSocket to the collector, reconnects
//! with backoff, and reports connectivity changes to a [`ConnectionListener`].

pub mod backoff;
pub mod client;
pub mod error;
pub mod serialization;

pub use backoff::ReconnectPolicy;
pub use client::{ClientConfig, CollectorClient, TransportStats, collector_url};
pub use error::TransportError;
pub use serialization::{BatchSerializer, SerializationError};

use crate::buffer::Batch;

#[cfg(test)]
use mockall::automock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connected,
    Disconnected,
}

/// Receives connectivity transitions from the connection task.
pub trait ConnectionListener: Send + Sync + 'static {
    fn on_connected(&self);
    fn on_disconnected(&self);
}

/// Outbound side of the pipeline. `send` must not block.
#[cfg_attr(test, automock)]
pub trait BatchTransport: Send + Sync + 'static {
    fn send(&self, batch: &Batch) -> Result<(), TransportError>;
}
