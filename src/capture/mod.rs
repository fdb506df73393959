//! Response interception.
//!
//! Two front ends share one capture core ([`ExchangeCapture`]):
//! - [`CaptureLayer`] wraps a tower/hyper service and its response bodies
//! - [`InterceptedWriter`] decorates push-style [`ResponseWriter`]s
//!
//! Both forward every byte unchanged and build a [`crate::Record`] once the
//! response is finalized.

pub mod body;
pub mod builder;
pub mod exchange;
pub mod headers;
pub mod layer;
pub mod server_address;
pub mod writer;

pub use body::{CaptureBody, PendingRecord};
pub use builder::{Exchange, ObservedBody, RequestSnapshot, ResponseHead, build_record};
pub use exchange::{CaptureSettings, ExchangeCapture, RecordSink, Recorder};
pub use layer::{CaptureFuture, CaptureLayer, CaptureService};
pub use server_address::{lookup_server_address, server_address};
pub use writer::{InterceptedWriter, ResponseWriter};
