//! Push-style interception for servers that write responses chunk by chunk.

use super::builder::{RequestSnapshot, ResponseHead};
use super::exchange::{ExchangeCapture, Recorder};
use std::io;

/// The two mutation points of an in-flight response plus its finalized head.
pub trait ResponseWriter {
    /// Writes one chunk of body data to the client.
    fn write_chunk(&mut self, chunk: &[u8]) -> io::Result<()>;

    /// Finalizes the response, optionally with a last chunk.
    fn end(&mut self, chunk: Option<&[u8]>) -> io::Result<()>;

    /// Status, version and headers as they were sent, plus the raw head block
    /// when the writer rendered it itself.
    fn head(&self) -> ResponseHead;
}

/// Decorator that delegates every call to the wrapped writer unchanged and
/// records the exchange when it is finalized.
///
/// Writes reach the inner writer before they are observed, and `end` is
/// forwarded before the record is built, so the client sees exactly what it
/// would see without the decorator.
pub struct InterceptedWriter<W> {
    inner: W,
    capture: Option<ExchangeCapture>,
}

impl<W: ResponseWriter> InterceptedWriter<W> {
    pub fn new(inner: W, capture: ExchangeCapture) -> Self {
        Self {
            inner,
            capture: Some(capture),
        }
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: ResponseWriter> ResponseWriter for InterceptedWriter<W> {
    fn write_chunk(&mut self, chunk: &[u8]) -> io::Result<()> {
        self.inner.write_chunk(chunk)?;
        if let Some(capture) = self.capture.as_mut() {
            capture.observe(chunk);
        }
        Ok(())
    }

    fn end(&mut self, chunk: Option<&[u8]>) -> io::Result<()> {
        let result = self.inner.end(chunk);
        if let Some(capture) = self.capture.take() {
            capture.finish(&self.inner.head(), chunk);
        }
        result
    }

    fn head(&self) -> ResponseHead {
        self.inner.head()
    }
}

impl Recorder {
    /// Wraps `writer` for one exchange and immediately runs the rest of the
    /// handler chain with the wrapped writer.
    pub fn attach<W, F, R>(&self, request: RequestSnapshot, writer: W, next: F) -> R
    where
        W: ResponseWriter,
        F: FnOnce(InterceptedWriter<W>) -> R,
    {
        let writer = InterceptedWriter::new(writer, self.begin(request));
        next(writer)
    }
}
