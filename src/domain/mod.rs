//! Domain layer for apianalytics-agent.
//!
//! Contains the canonical types shared across all modules:
//! - `Record`: one observed HTTP exchange, the pipeline's core data type
//! - `ServiceToken`: the collector credential, redacted in every log path
//! - `StatusLogger`: callback for human-readable status lines
//! - `AgentError`: Top-level error type

pub mod error;
pub mod record;
pub mod status;
pub mod token;

pub use error::AgentError;
pub use record::{
    Cache, Content, NameValue, Record, RequestInfo, ResponseInfo, Timings,
    DEFAULT_MIME_TYPE,
};
pub use status::{StatusLogger, tracing_logger};
pub use token::ServiceToken;
