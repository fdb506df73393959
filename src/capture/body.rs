use super::builder::ResponseHead;
use super::exchange::ExchangeCapture;
use bytes::Bytes;
use hyper::body::{Body, Frame, SizeHint};
use pin_project_lite::pin_project;
use std::pin::Pin;
use std::task::{Context, Poll, ready};

/// A capture waiting for its response body to finish.
///
/// Finishes on [`PendingRecord::complete`] or, failing that, when dropped, so
/// a body that is never polled to the end (empty bodies, aborted clients)
/// still yields its record exactly once.
pub struct PendingRecord {
    capture: Option<ExchangeCapture>,
    head: ResponseHead,
}

impl PendingRecord {
    pub fn new(capture: ExchangeCapture, head: ResponseHead) -> Self {
        Self {
            capture: Some(capture),
            head,
        }
    }

    fn observe(&mut self, chunk: &Bytes) {
        if let Some(capture) = self.capture.as_mut() {
            capture.observe_bytes(chunk);
        }
    }

    fn complete(&mut self) {
        if let Some(capture) = self.capture.take() {
            capture.finish(&self.head, None);
        }
    }
}

impl Drop for PendingRecord {
    fn drop(&mut self) {
        self.complete();
    }
}

pin_project! {
    /// Response body wrapper that yields every frame of the inner body
    /// unchanged while copying data frames into the capture.
    pub struct CaptureBody<B> {
        #[pin]
        inner: B,
        pending: Option<PendingRecord>,
    }
}

impl<B> CaptureBody<B> {
    pub fn new(inner: B, pending: Option<PendingRecord>) -> Self {
        Self { inner, pending }
    }

}

impl<B> Body for CaptureBody<B>
where
    B: Body<Data = Bytes>,
{
    type Data = Bytes;
    type Error = B::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.project();

        match ready!(this.inner.poll_frame(cx)) {
            Some(Ok(frame)) => {
                if let (Some(data), Some(pending)) = (frame.data_ref(), this.pending.as_mut()) {
                    pending.observe(data);
                }
                Poll::Ready(Some(Ok(frame)))
            }
            Some(Err(err)) => Poll::Ready(Some(Err(err))),
            None => {
                if let Some(mut pending) = this.pending.take() {
                    pending.complete();
                }
                Poll::Ready(None)
            }
        }
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

impl<B> std::fmt::Debug for CaptureBody<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureBody")
            .field("recording", &self.pending.is_some())
            .finish_non_exhaustive()
    }
}
