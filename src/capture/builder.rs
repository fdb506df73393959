use super::headers::{
    header_pairs, header_value, parse_content_length, query_pairs, request_head_size,
    status_text, version_label,
};
use crate::domain::{
    Cache, Content, DEFAULT_MIME_TYPE, Record, RequestInfo, ResponseInfo, Timings,
};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use http::header::{CONTENT_LENGTH, CONTENT_TYPE, HOST, LOCATION};
use http::uri::Scheme;
use http::{HeaderMap, Method, StatusCode, Uri, Version};
use std::time::Duration;

/// What the capture layer keeps from the request while the response is produced.
#[derive(Debug, Clone)]
pub struct RequestSnapshot {
    pub method: Method,
    pub uri: Uri,
    pub version: Version,
    pub headers: HeaderMap,
    /// Whether the connection the request arrived on is encrypted.
    pub secure: bool,
}

impl RequestSnapshot {
    /// Snapshots an `http::Request`.
    ///
    /// The connection is considered secure when the URI is absolute with an
    /// `https` scheme, or when a TLS acceptor stored `Scheme::HTTPS` in the
    /// request extensions.
    pub fn from_request<B>(request: &http::Request<B>) -> Self {
        let secure = match request.uri().scheme() {
            Some(scheme) => *scheme == Scheme::HTTPS,
            None => request
                .extensions()
                .get::<Scheme>()
                .is_some_and(|scheme| *scheme == Scheme::HTTPS),
        };

        Self {
            method: request.method().clone(),
            uri: request.uri().clone(),
            version: request.version(),
            headers: request.headers().clone(),
            secure,
        }
    }

    /// Absolute URL rebuilt from scheme, host header and path.
    pub fn absolute_url(&self) -> String {
        let scheme = if self.secure { "https" } else { "http" };
        let host = self
            .headers
            .get(HOST)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
            .or_else(|| self.uri.authority().map(ToString::to_string))
            .unwrap_or_default();

        format!("{scheme}://{host}{}", self.path_and_query())
    }

    fn path_and_query(&self) -> &str {
        self.uri
            .path_and_query()
            .map_or("/", |path_and_query| path_and_query.as_str())
    }
}

/// Status, version and headers of a response once it has been finalized.
#[derive(Debug, Clone)]
pub struct ResponseHead {
    pub status: StatusCode,
    pub version: Version,
    pub headers: HeaderMap,
    /// Status line plus header block exactly as written to the socket.
    ///
    /// Only servers that render the head themselves can supply it. Headers a
    /// connection layer adds later (`date`, `content-length`, `connection`)
    /// are part of this block but never of `headers`.
    pub raw: Option<Bytes>,
}

impl ResponseHead {
    pub fn new(status: StatusCode, version: Version, headers: HeaderMap) -> Self {
        Self {
            status,
            version,
            headers,
            raw: None,
        }
    }

    /// Head of a response handed to hyper. The wire block is rendered later by
    /// the connection, so it is never available here.
    pub fn from_parts(parts: &http::response::Parts) -> Self {
        Self::new(parts.status, parts.version, parts.headers.clone())
    }

    pub fn with_raw(mut self, raw: impl Into<Bytes>) -> Self {
        self.raw = Some(raw.into());
        self
    }
}

/// Body bytes seen on the way to the client.
#[derive(Debug, Clone, Default)]
pub struct ObservedBody {
    /// Observed length, `None` when no body data was ever written.
    pub len: Option<usize>,
    /// Full body, only kept when body capture is enabled.
    pub bytes: Option<Vec<u8>>,
}

/// Everything needed to turn one finished exchange into a [`Record`].
pub struct Exchange<'a> {
    pub server_address: &'a str,
    pub started_at: DateTime<Utc>,
    pub elapsed: Duration,
    pub request: &'a RequestSnapshot,
    pub response: &'a ResponseHead,
    pub body: ObservedBody,
}

/// Builds a record. Never fails; missing or malformed fields fall back to sentinels.
pub fn build_record(exchange: Exchange<'_>) -> Record {
    let Exchange {
        server_address,
        started_at,
        elapsed,
        request,
        response,
        body,
    } = exchange;

    let request_headers = header_pairs(&request.headers);
    let request_headers_size = request_head_size(
        &request.method,
        request.path_and_query(),
        request.version,
        &request.headers,
    );
    let request_body_size =
        parse_content_length(header_value(&request_headers, CONTENT_LENGTH.as_str())).unwrap_or(-1);

    let response_headers = header_pairs(&response.headers);
    let response_headers_size = response.raw.as_ref().map_or(-1, |raw| raw.len() as i64);
    let observed_size = body.len.map_or(-1, |len| len as i64);
    let response_body_size =
        parse_content_length(header_value(&response_headers, CONTENT_LENGTH.as_str()))
            .unwrap_or(observed_size);
    let mime_type = header_value(&response_headers, CONTENT_TYPE.as_str())
        .unwrap_or(DEFAULT_MIME_TYPE)
        .to_string();
    let redirect_location = header_value(&response_headers, LOCATION.as_str())
        .unwrap_or_default()
        .to_string();
    let text = body
        .bytes
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned());

    Record {
        server_address: server_address.to_string(),
        started_at,
        request: RequestInfo {
            method: request.method.to_string(),
            url: request.absolute_url(),
            http_version: version_label(request.version).to_string(),
            query_parameters: query_pairs(request.uri.query()),
            headers: request_headers,
            headers_size: request_headers_size,
            body_size: request_body_size,
        },
        response: ResponseInfo {
            status_code: response.status.as_u16(),
            status_text: status_text(response.status),
            http_version: version_label(response.version).to_string(),
            headers: response_headers,
            redirect_location,
            headers_size: response_headers_size,
            body_size: response_body_size,
            content: Content {
                size: response_body_size,
                mime_type,
                text,
            },
        },
        cache: Cache::default(),
        timings: Timings {
            send: 0,
            wait: elapsed.as_millis() as u64,
            receive: 0,
        },
    }
}
