pub mod coordinator;
pub mod stats;

pub use coordinator::{Coordinator, CoordinatorWorker, RunState};
pub use stats::PipelineStats;
