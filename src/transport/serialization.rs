use crate::buffer::{Batch, Creator};
use crate::domain::{Record, ServiceToken};
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SerializationError {
    #[error("JSON serialization failed: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("Batch is empty")]
    EmptyBatch,
}

/// Wire shape of one batch message.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WireBatch<'a> {
    version: &'a str,
    service_token: &'a ServiceToken,
    creator: &'a Creator,
    entries: &'a [Record],
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BatchSerializer;

impl BatchSerializer {
    pub fn new() -> Self {
        Self
    }

    /// Serializes the envelope and entries into one JSON text message.
    pub fn serialize_json(&self, batch: &Batch) -> Result<String, SerializationError> {
        if batch.is_empty() {
            return Err(SerializationError::EmptyBatch);
        }

        let envelope = batch.envelope();
        let wire = WireBatch {
            version: envelope.version,
            service_token: &envelope.service_token,
            creator: &envelope.creator,
            entries: batch.entries(),
        };

        Ok(serde_json::to_string(&wire)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::{BatchBuffer, Envelope};
    use crate::domain::{Cache, Content, RequestInfo, ResponseInfo, Timings};
    use chrono::Utc;

    fn record() -> Record {
        Record {
            server_address: "127.0.0.1".to_string(),
            started_at: Utc::now(),
            request: RequestInfo {
                method: "GET".to_string(),
                url: "http://localhost/".to_string(),
                http_version: "HTTP/1.1".to_string(),
                query_parameters: vec![],
                headers: vec![],
                headers_size: 30,
                body_size: -1,
            },
            response: ResponseInfo {
                status_code: 200,
                status_text: "OK".to_string(),
                http_version: "HTTP/1.1".to_string(),
                headers: vec![],
                redirect_location: String::new(),
                headers_size: 19,
                body_size: 2,
                content: Content {
                    size: 2,
                    mime_type: "text/plain".to_string(),
                    text: None,
                },
            },
            cache: Cache::default(),
            timings: Timings::default(),
        }
    }

    #[test]
    fn test_envelope_fields_on_the_wire() {
        let token = ServiceToken::new("abc123").unwrap();
        let mut buffer = BatchBuffer::new(Envelope::new(token), 1).unwrap();
        buffer.append(record());

        let json = BatchSerializer::new().serialize_json(&buffer.drain()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["version"], "1.2");
        assert_eq!(value["serviceToken"], "abc123");
        assert_eq!(value["creator"]["name"], crate::CREATOR_NAME);
        assert_eq!(value["creator"]["version"], crate::VERSION);
        assert_eq!(value["entries"].as_array().unwrap().len(), 1);
        assert_eq!(value["entries"][0]["response"]["statusCode"], 200);
    }

    #[test]
    fn test_empty_batch_is_rejected() {
        let token = ServiceToken::new("abc123").unwrap();
        let mut buffer = BatchBuffer::new(Envelope::new(token), 1).unwrap();

        assert!(matches!(
            BatchSerializer::new().serialize_json(&buffer.drain()),
            Err(SerializationError::EmptyBatch)
        ));
    }
}
