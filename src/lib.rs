#![deny(warnings, rust_2024_compatibility)]
// Specific pedantic lints enforced (not blanket allow):
#![deny(
    clippy::explicit_iter_loop,
    clippy::manual_let_else,
    clippy::semicolon_if_nothing_returned,
    clippy::inconsistent_struct_constructor
)]
// Noisy pedantic lints suppressed with justification:
#![allow(
    clippy::cast_possible_truncation, // Durations in ms and byte counts stay far below i64::MAX
    clippy::cast_possible_wrap,       // Same as above
    clippy::missing_errors_doc,       // Internal API
    clippy::module_name_repetitions,  // e.g. TransportError in transport module
    clippy::must_use_candidate,       // Annotated selectively on critical APIs
    clippy::doc_markdown              // Internal API
)]

pub mod agent;
pub mod app;
pub mod buffer;
pub mod capture;
pub mod domain;
pub mod pipeline;
pub mod transport;

// Re-export main types for easy access
pub use agent::Agent;
pub use app::AgentConfig;
pub use capture::{CaptureLayer, InterceptedWriter, ResponseWriter};
pub use domain::{AgentError, Record, ServiceToken};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Name reported to the collector in the batch envelope.
pub const CREATOR_NAME: &str = env!("CARGO_PKG_NAME");
