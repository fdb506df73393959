use super::BufferError;
use crate::domain::Record;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use tokio::sync::mpsc;

/// Lock-free counters shared by both ends of the queue.
#[derive(Debug, Default)]
pub struct QueueCounters {
    enqueued: AtomicU64,
    dropped: AtomicU64,
    queued: AtomicUsize,
}

impl QueueCounters {
    pub fn enqueued(&self) -> u64 {
        self.enqueued.load(Ordering::Relaxed)
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Records pushed but not yet taken by the consumer.
    pub fn queued(&self) -> usize {
        self.queued.load(Ordering::Acquire)
    }
}

/// Producer side of the record queue. Never blocks.
///
/// `capacity == 0` means unbounded. Otherwise a push beyond capacity drops
/// the new record and counts it.
#[derive(Debug, Clone)]
pub struct RecordQueue {
    sender: mpsc::UnboundedSender<Record>,
    counters: Arc<QueueCounters>,
    capacity: usize,
}

/// Consumer side, owned by the single pipeline worker.
#[derive(Debug)]
pub struct RecordReceiver {
    receiver: mpsc::UnboundedReceiver<Record>,
    counters: Arc<QueueCounters>,
}

impl RecordQueue {
    pub fn new(capacity: usize) -> (RecordQueue, RecordReceiver) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let counters = Arc::new(QueueCounters::default());

        (
            RecordQueue {
                sender,
                counters: Arc::clone(&counters),
                capacity,
            },
            RecordReceiver { receiver, counters },
        )
    }

    pub fn push(&self, record: Record) -> Result<(), BufferError> {
        self.reserve_slot()?;

        if self.sender.send(record).is_err() {
            self.counters.queued.fetch_sub(1, Ordering::AcqRel);
            self.counters.dropped.fetch_add(1, Ordering::Relaxed);
            return Err(BufferError::QueueClosed);
        }

        self.counters.enqueued.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn reserve_slot(&self) -> Result<(), BufferError> {
        if self.capacity == 0 {
            self.counters.queued.fetch_add(1, Ordering::AcqRel);
            return Ok(());
        }

        let mut current = self.counters.queued.load(Ordering::Acquire);
        loop {
            if current >= self.capacity {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                return Err(BufferError::QueueFull {
                    capacity: self.capacity,
                });
            }

            match self.counters.queued.compare_exchange_weak(
                current,
                current + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Ok(()),
                Err(actual) => current = actual,
            }
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn counters(&self) -> &Arc<QueueCounters> {
        &self.counters
    }

}

impl RecordReceiver {
    /// Waits for the next record. `None` once every producer is gone.
    pub async fn recv(&mut self) -> Option<Record> {
        let record = self.receiver.recv().await?;
        self.counters.queued.fetch_sub(1, Ordering::AcqRel);
        Some(record)
    }

    pub fn try_recv(&mut self) -> Option<Record> {
        let record = self.receiver.try_recv().ok()?;
        self.counters.queued.fetch_sub(1, Ordering::AcqRel);
        Some(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Cache, Content, RequestInfo, ResponseInfo, Timings};
    use chrono::Utc;

    fn record(n: u16) -> Record {
        Record {
            server_address: String::new(),
            started_at: Utc::now(),
            request: RequestInfo {
                method: "GET".to_string(),
                url: format!("http://localhost/{n}"),
                http_version: "HTTP/1.1".to_string(),
                query_parameters: vec![],
                headers: vec![],
                headers_size: 0,
                body_size: -1,
            },
            response: ResponseInfo {
                status_code: n,
                status_text: String::new(),
                http_version: "HTTP/1.1".to_string(),
                headers: vec![],
                redirect_location: String::new(),
                headers_size: -1,
                body_size: -1,
                content: Content {
                    size: -1,
                    mime_type: String::new(),
                    text: None,
                },
            },
            cache: Cache::default(),
            timings: Timings::default(),
        }
    }

    #[tokio::test]
    async fn test_fifo_order() {
        let (queue, mut receiver) = RecordQueue::new(0);
        for n in 0..5 {
            queue.push(record(n)).unwrap();
        }

        for n in 0..5 {
            assert_eq!(receiver.recv().await.unwrap().response.status_code, n);
        }
        assert_eq!(queue.counters().queued(), 0);
        assert_eq!(queue.counters().enqueued(), 5);
    }

    #[tokio::test]
    async fn test_bounded_queue_drops_newest() {
        let (queue, mut receiver) = RecordQueue::new(2);
        queue.push(record(1)).unwrap();
        queue.push(record(2)).unwrap();
        assert_eq!(
            queue.push(record(3)),
            Err(BufferError::QueueFull { capacity: 2 })
        );
        assert_eq!(queue.counters().dropped(), 1);

        assert_eq!(receiver.recv().await.unwrap().response.status_code, 1);
        queue.push(record(4)).unwrap();

        assert_eq!(receiver.recv().await.unwrap().response.status_code, 2);
        assert_eq!(receiver.recv().await.unwrap().response.status_code, 4);
    }

    #[tokio::test]
    async fn test_push_after_receiver_dropped_fails() {
        let (queue, receiver) = RecordQueue::new(0);
        drop(receiver);

        assert_eq!(queue.push(record(1)), Err(BufferError::QueueClosed));
        assert_eq!(queue.counters().queued(), 0);
    }
}
