use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BufferError {
    #[error("Invalid batch threshold: {threshold} (must be at least 1)")]
    InvalidThreshold { threshold: usize },

    #[error("Record queue is full (capacity {capacity}), record dropped")]
    QueueFull { capacity: usize },

    #[error("Record queue is closed")]
    QueueClosed,
}
