use super::builder::{Exchange, ObservedBody, RequestSnapshot, ResponseHead, build_record};
use crate::domain::{Record, StatusLogger, tracing_logger};
use bytes::{Bytes, BytesMut};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Instant;

/// Downstream consumer of finished records. Must not block.
pub trait RecordSink: Send + Sync + 'static {
    fn accept(&self, record: Record);
}

impl<F> RecordSink for F
where
    F: Fn(Record) + Send + Sync + 'static,
{
    fn accept(&self, record: Record) {
        self(record);
    }
}

/// Capture options shared by every exchange recorded through one [`Recorder`].
#[derive(Clone)]
pub struct CaptureSettings {
    /// Keep the response body text in records.
    pub send_body: bool,
    pub server_address: String,
    pub logger: StatusLogger,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            send_body: false,
            server_address: super::server_address().to_string(),
            logger: tracing_logger(),
        }
    }
}

impl std::fmt::Debug for CaptureSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureSettings")
            .field("send_body", &self.send_body)
            .field("server_address", &self.server_address)
            .finish_non_exhaustive()
    }
}

/// Starts captures and routes the resulting records to a sink.
#[derive(Clone)]
pub struct Recorder {
    settings: Arc<CaptureSettings>,
    sink: Arc<dyn RecordSink>,
}

impl Recorder {
    pub fn new(settings: CaptureSettings, sink: impl RecordSink) -> Self {
        Self {
            settings: Arc::new(settings),
            sink: Arc::new(sink),
        }
    }

    pub fn settings(&self) -> &CaptureSettings {
        &self.settings
    }

    /// Starts the clock for one exchange.
    pub fn begin(&self, request: RequestSnapshot) -> ExchangeCapture {
        ExchangeCapture {
            request,
            started_at: Utc::now(),
            started: Instant::now(),
            body: self.settings.send_body.then(BytesMut::new),
            observed_len: None,
            settings: Arc::clone(&self.settings),
            sink: Arc::clone(&self.sink),
        }
    }
}

impl std::fmt::Debug for Recorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Recorder")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

/// Accumulates what one response sends to its client.
///
/// Consumed by [`ExchangeCapture::finish`], so a capture yields at most one record.
pub struct ExchangeCapture {
    request: RequestSnapshot,
    started_at: DateTime<Utc>,
    started: Instant,
    body: Option<BytesMut>,
    observed_len: Option<usize>,
    settings: Arc<CaptureSettings>,
    sink: Arc<dyn RecordSink>,
}

impl ExchangeCapture {
    /// Notes a chunk that was just delivered to the client.
    pub fn observe(&mut self, chunk: &[u8]) {
        self.observed_len = Some(self.observed_len.unwrap_or(0) + chunk.len());
        if let Some(body) = self.body.as_mut() {
            body.extend_from_slice(chunk);
        }
    }

    pub fn observe_bytes(&mut self, chunk: &Bytes) {
        self.observe(chunk.as_ref());
    }

    /// Builds the record from everything observed and hands it to the sink.
    ///
    /// `last_chunk` is the payload passed with the finalizing call, if any; it
    /// has already been delivered to the client.
    pub fn finish(mut self, head: &ResponseHead, last_chunk: Option<&[u8]>) {
        if let Some(chunk) = last_chunk {
            self.observe(chunk);
        }

        let record = build_record(Exchange {
            server_address: &self.settings.server_address,
            started_at: self.started_at,
            elapsed: self.started.elapsed(),
            request: &self.request,
            response: head,
            body: ObservedBody {
                len: self.observed_len,
                bytes: self.body.take().map(|body| body.to_vec()),
            },
        });

        (self.settings.logger)(&format!(
            "Detected finish with {} response on request, {} {}",
            record.response.status_code, record.request.method, record.request.url
        ));

        self.sink.accept(record);
    }
}

impl std::fmt::Debug for ExchangeCapture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExchangeCapture")
            .field("method", &self.request.method)
            .field("uri", &self.request.uri)
            .field("observed_len", &self.observed_len)
            .finish_non_exhaustive()
    }
}
