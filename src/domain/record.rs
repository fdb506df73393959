use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Fallback content type when the response does not declare one.
pub const DEFAULT_MIME_TYPE: &str = "application/octet-stream";

/// A single header or query parameter, kept in the order it was observed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameValue {
    pub name: String,
    pub value: String,
}

impl NameValue {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// One observed HTTP request/response exchange.
///
/// Built once by the capture layer when the response finishes and then moved
/// through the pipeline untouched. Sizes use `-1` when they are unknown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    pub server_address: String,
    pub started_at: DateTime<Utc>,
    pub request: RequestInfo,
    pub response: ResponseInfo,
    pub cache: Cache,
    pub timings: Timings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestInfo {
    pub method: String,
    pub url: String,
    pub http_version: String,
    pub query_parameters: Vec<NameValue>,
    pub headers: Vec<NameValue>,
    pub headers_size: i64,
    pub body_size: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseInfo {
    pub status_code: u16,
    pub status_text: String,
    pub http_version: String,
    /// Headers set by the handler. Headers the connection adds when writing
    /// the response (`date`, `connection`, a computed `content-length`) are
    /// not listed.
    pub headers: Vec<NameValue>,
    pub redirect_location: String,
    /// Length of the raw status line plus header block, -1 when the block
    /// was not captured.
    pub headers_size: i64,
    pub body_size: i64,
    pub content: Content,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Content {
    pub size: i64,
    pub mime_type: String,
    /// Raw body, only populated when body capture is enabled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

/// Reserved for cache timing data; always empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cache {}

/// Phase timings in milliseconds. Only `wait` is measured.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timings {
    pub send: u64,
    pub wait: u64,
    pub receive: u64,
}

impl Record {
    /// One-line description used by the status logger.
    pub fn summary(&self) -> String {
        format!(
            "{} {} request with a response of {} {}",
            self.request.method,
            self.request.url,
            self.response.status_code,
            self.response.status_text
        )
    }
}
