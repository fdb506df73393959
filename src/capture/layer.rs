//! Tower integration: record every exchange that passes through a service.
//!
//! ```rust,ignore
//! let agent = Agent::start(token, config)?;
//! let service = ServiceBuilder::new()
//!     .layer(agent.layer())
//!     .service(app);
//! ```

use super::body::{CaptureBody, PendingRecord};
use super::builder::{RequestSnapshot, ResponseHead};
use super::exchange::{ExchangeCapture, Recorder};
use bytes::Bytes;
use hyper::body::Body;
use pin_project_lite::pin_project;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll, ready};
use tower::{Layer, Service};

#[derive(Clone, Debug)]
pub struct CaptureLayer {
    recorder: Recorder,
}

impl CaptureLayer {
    pub fn new(recorder: Recorder) -> Self {
        Self { recorder }
    }
}

impl<S> Layer<S> for CaptureLayer {
    type Service = CaptureService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        CaptureService {
            inner,
            recorder: self.recorder.clone(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct CaptureService<S> {
    inner: S,
    recorder: Recorder,
}

impl<S, ReqBody, ResBody> Service<http::Request<ReqBody>> for CaptureService<S>
where
    S: Service<http::Request<ReqBody>, Response = http::Response<ResBody>>,
    ResBody: Body<Data = Bytes>,
{
    type Response = http::Response<CaptureBody<ResBody>>;
    type Error = S::Error;
    type Future = CaptureFuture<S::Future>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: http::Request<ReqBody>) -> Self::Future {
        let capture = self.recorder.begin(RequestSnapshot::from_request(&request));

        // The rest of the chain runs right away; nothing here waits on telemetry.
        CaptureFuture {
            inner: self.inner.call(request),
            capture: Some(capture),
        }
    }
}

pin_project! {
    /// Resolves to the inner response with its body wrapped in a [`CaptureBody`].
    pub struct CaptureFuture<F> {
        #[pin]
        inner: F,
        capture: Option<ExchangeCapture>,
    }
}

impl<F, ResBody, E> Future for CaptureFuture<F>
where
    F: Future<Output = Result<http::Response<ResBody>, E>>,
{
    type Output = Result<http::Response<CaptureBody<ResBody>>, E>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();
        let response = ready!(this.inner.poll(cx))?;

        let (parts, body) = response.into_parts();
        let pending = this
            .capture
            .take()
            .map(|capture| PendingRecord::new(capture, ResponseHead::from_parts(&parts)));

        Poll::Ready(Ok(http::Response::from_parts(
            parts,
            CaptureBody::new(body, pending),
        )))
    }
}
