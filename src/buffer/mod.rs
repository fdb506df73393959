pub mod batch;
pub mod error;
pub mod queue;

pub use batch::{Batch, BatchBuffer, Creator, Envelope, PROTOCOL_VERSION};
pub use error::BufferError;
pub use queue::{QueueCounters, RecordQueue, RecordReceiver};
