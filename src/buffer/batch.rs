use super::BufferError;
use crate::domain::{Record, ServiceToken};
use serde::Serialize;
use std::sync::Arc;

/// Protocol version stamped on every batch.
pub const PROTOCOL_VERSION: &str = "1.2";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Creator {
    pub name: String,
    pub version: String,
}

impl Default for Creator {
    fn default() -> Self {
        Self {
            name: crate::CREATOR_NAME.to_string(),
            version: crate::VERSION.to_string(),
        }
    }
}

/// Static part of every batch, created once per agent.
#[derive(Debug, Clone)]
pub struct Envelope {
    pub version: &'static str,
    pub service_token: ServiceToken,
    pub creator: Creator,
}

impl Envelope {
    pub fn new(service_token: ServiceToken) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            service_token,
            creator: Creator::default(),
        }
    }
}

/// A drained set of entries together with the envelope they are sent under.
#[derive(Debug, Clone)]
pub struct Batch {
    envelope: Arc<Envelope>,
    entries: Vec<Record>,
}

impl Batch {
    pub fn new(envelope: Arc<Envelope>, entries: Vec<Record>) -> Self {
        Self { envelope, entries }
    }

    pub fn envelope(&self) -> &Envelope {
        &self.envelope
    }

    pub fn entries(&self) -> &[Record] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<Record> {
        self.entries
    }

    pub fn size(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Accumulates records until the flush threshold is reached.
///
/// Not synchronized on its own; the pipeline keeps it behind the same lock
/// as the run state so append/check/drain happen as one step.
#[derive(Debug)]
pub struct BatchBuffer {
    envelope: Arc<Envelope>,
    entries: Vec<Record>,
    threshold: usize,
}

impl BatchBuffer {
    pub fn new(envelope: Envelope, threshold: usize) -> Result<Self, BufferError> {
        if threshold == 0 {
            return Err(BufferError::InvalidThreshold { threshold });
        }

        Ok(Self {
            envelope: Arc::new(envelope),
            entries: Vec::with_capacity(threshold),
            threshold,
        })
    }

    pub fn append(&mut self, record: Record) {
        self.entries.push(record);
    }

    pub fn is_ready(&self) -> bool {
        self.entries.len() >= self.threshold
    }

    /// Takes up to `threshold` entries from the front.
    ///
    /// Only entries put back by [`BatchBuffer::restore`] can push the length
    /// past the threshold; those leave in threshold-sized batches.
    pub fn drain(&mut self) -> Batch {
        let entries = if self.entries.len() <= self.threshold {
            std::mem::replace(&mut self.entries, Vec::with_capacity(self.threshold))
        } else {
            let rest = self.entries.split_off(self.threshold);
            std::mem::replace(&mut self.entries, rest)
        };
        Batch::new(Arc::clone(&self.envelope), entries)
    }

    /// Puts entries from a refused flush back in front of anything appended since.
    pub fn restore(&mut self, batch: Batch) {
        let mut entries = batch.into_entries();
        entries.append(&mut self.entries);
        self.entries = entries;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    pub fn envelope(&self) -> &Envelope {
        &self.envelope
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Cache, Content, RequestInfo, ResponseInfo, Timings};
    use chrono::Utc;

    fn record(status: u16) -> Record {
        Record {
            server_address: "127.0.0.1".to_string(),
            started_at: Utc::now(),
            request: RequestInfo {
                method: "GET".to_string(),
                url: format!("http://localhost/{status}"),
                http_version: "HTTP/1.1".to_string(),
                query_parameters: vec![],
                headers: vec![],
                headers_size: 0,
                body_size: -1,
            },
            response: ResponseInfo {
                status_code: status,
                status_text: String::new(),
                http_version: "HTTP/1.1".to_string(),
                headers: vec![],
                redirect_location: String::new(),
                headers_size: -1,
                body_size: -1,
                content: Content {
                    size: -1,
                    mime_type: "text/plain".to_string(),
                    text: None,
                },
            },
            cache: Cache::default(),
            timings: Timings::default(),
        }
    }

    fn buffer(threshold: usize) -> BatchBuffer {
        BatchBuffer::new(Envelope::new(ServiceToken::new("abc123").unwrap()), threshold).unwrap()
    }

    #[test]
    fn test_zero_threshold_is_rejected() {
        let result = BatchBuffer::new(Envelope::new(ServiceToken::new("t").unwrap()), 0);
        assert_eq!(
            result.unwrap_err(),
            BufferError::InvalidThreshold { threshold: 0 }
        );
    }

    #[test]
    fn test_ready_at_threshold_and_drain_resets() {
        let mut buffer = buffer(3);
        buffer.append(record(200));
        buffer.append(record(201));
        assert!(!buffer.is_ready());

        buffer.append(record(202));
        assert!(buffer.is_ready());

        let batch = buffer.drain();
        assert_eq!(batch.size(), 3);
        let statuses: Vec<u16> = batch.entries().iter().map(|r| r.response.status_code).collect();
        assert_eq!(statuses, vec![200, 201, 202]);
        assert!(buffer.is_empty());
        assert!(!buffer.is_ready());
    }

    #[test]
    fn test_default_threshold_of_one_flushes_every_record() {
        let mut buffer = buffer(1);
        buffer.append(record(200));
        assert!(buffer.is_ready());
    }

    #[test]
    fn test_restore_puts_entries_back_in_front() {
        let mut buffer = buffer(2);
        buffer.append(record(1));
        buffer.append(record(2));
        let batch = buffer.drain();

        buffer.append(record(3));
        buffer.restore(batch);

        let first: Vec<u16> = buffer
            .drain()
            .entries()
            .iter()
            .map(|r| r.response.status_code)
            .collect();
        assert_eq!(first, vec![1, 2]);

        let rest: Vec<u16> = buffer
            .drain()
            .entries()
            .iter()
            .map(|r| r.response.status_code)
            .collect();
        assert_eq!(rest, vec![3]);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_envelope_persists_across_drains() {
        let mut buffer = buffer(1);
        buffer.append(record(200));
        let first = buffer.drain();
        buffer.append(record(200));
        let second = buffer.drain();

        assert_eq!(first.envelope().version, PROTOCOL_VERSION);
        assert!(Arc::ptr_eq(&first.envelope, &second.envelope));
    }
}
