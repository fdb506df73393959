//! Header and request-line helpers used while building records.
//!
//! Every function here is total: malformed input degrades to a sentinel value
//! instead of an error, so nothing on the capture path can fail a request.

use crate::domain::NameValue;
use http::{HeaderMap, Method, StatusCode, Version};

/// Converts a header map into ordered name/value pairs.
///
/// Values that are not valid UTF-8 are converted lossily.
pub fn header_pairs(headers: &HeaderMap) -> Vec<NameValue> {
    headers
        .iter()
        .map(|(name, value)| {
            NameValue::new(
                name.as_str(),
                String::from_utf8_lossy(value.as_bytes()).into_owned(),
            )
        })
        .collect()
}

/// Case-insensitive lookup of the first value for `name`.
pub fn header_value<'a>(pairs: &'a [NameValue], name: &str) -> Option<&'a str> {
    pairs
        .iter()
        .find(|pair| pair.name.eq_ignore_ascii_case(name))
        .map(|pair| pair.value.as_str())
}

/// Parses a declared content length. Anything but a non-negative integer is ignored.
pub fn parse_content_length(value: Option<&str>) -> Option<i64> {
    let parsed = value?.trim().parse::<u64>().ok()?;
    i64::try_from(parsed).ok()
}

/// Parses a raw query string into ordered, percent-decoded pairs.
pub fn query_pairs(query: Option<&str>) -> Vec<NameValue> {
    let Some(query) = query else {
        return Vec::new();
    };

    url::form_urlencoded::parse(query.as_bytes())
        .map(|(name, value)| NameValue::new(name, value))
        .collect()
}

pub fn version_label(version: Version) -> &'static str {
    match version {
        Version::HTTP_09 => "HTTP/0.9",
        Version::HTTP_10 => "HTTP/1.0",
        Version::HTTP_11 => "HTTP/1.1",
        Version::HTTP_2 => "HTTP/2.0",
        Version::HTTP_3 => "HTTP/3.0",
        _ => "HTTP/1.1",
    }
}

pub fn status_text(status: StatusCode) -> String {
    status.canonical_reason().unwrap_or_default().to_string()
}

/// Bytes taken by `name: value\r\n` lines plus the terminating blank line.
fn header_block_len(headers: &HeaderMap) -> usize {
    headers
        .iter()
        .map(|(name, value)| name.as_str().len() + 2 + value.as_bytes().len() + 2)
        .sum::<usize>()
        + 2
}

/// Size of `GET /path?query HTTP/1.1\r\n` plus the header block.
pub fn request_head_size(
    method: &Method,
    path_and_query: &str,
    version: Version,
    headers: &HeaderMap,
) -> i64 {
    let request_line =
        method.as_str().len() + 1 + path_and_query.len() + 1 + version_label(version).len() + 2;
    (request_line + header_block_len(headers)) as i64
}
