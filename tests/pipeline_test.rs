mod common;

use apianalytics_agent::buffer::{BatchBuffer, BufferError, Envelope};
use apianalytics_agent::domain::ServiceToken;
use apianalytics_agent::pipeline::{Coordinator, CoordinatorWorker, RunState};
use common::{RecordingTransport, collecting_logger, record, wait_until};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn pipeline(threshold: usize, max_queued: usize) -> (Coordinator, CoordinatorWorker, Arc<Mutex<Vec<String>>>) {
    let buffer =
        BatchBuffer::new(Envelope::new(ServiceToken::new("abc123").unwrap()), threshold).unwrap();
    let (lines, logger) = collecting_logger();
    let (coordinator, worker) = Coordinator::new(buffer, max_queued, Arc::new(logger));
    (coordinator, worker, lines)
}

#[tokio::test]
async fn test_full_batches_flush_in_order() {
    let (coordinator, worker, _) = pipeline(3, 0);
    let transport = Arc::new(RecordingTransport::default());
    let shutdown = CancellationToken::new();
    coordinator.resume();
    let handle = tokio::spawn(worker.run(transport.clone(), shutdown.clone()));

    for status in 1..=7 {
        coordinator.enqueue(record(status)).unwrap();
    }

    assert!(
        wait_until(|| {
            let stats = coordinator.stats();
            stats.flushed_batches == 2 && stats.buffered == 1
        })
        .await
    );
    assert_eq!(transport.batches(), vec![vec![1, 2, 3], vec![4, 5, 6]]);

    let stats = coordinator.stats();
    assert_eq!(stats.flushed_batches, 2);
    assert_eq!(stats.flushed_records, 6);
    assert_eq!(stats.enqueued, 7);

    shutdown.cancel();
    handle.await.unwrap();
}

#[tokio::test]
async fn test_records_held_while_paused_flush_after_resume() {
    let (coordinator, worker, lines) = pipeline(1, 0);
    let transport = Arc::new(RecordingTransport::default());
    let shutdown = CancellationToken::new();
    let handle = tokio::spawn(worker.run(transport.clone(), shutdown.clone()));

    assert_eq!(coordinator.state(), RunState::Paused);
    for status in [200, 201, 202, 203, 204] {
        coordinator.enqueue(record(status)).unwrap();
    }

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(transport.batches().is_empty());
    // One record is held by the worker, the rest wait in the queue.
    assert_eq!(coordinator.stats().queued, 4);

    coordinator.resume();
    assert!(wait_until(|| transport.batches().len() == 5).await);
    assert_eq!(
        transport.batches(),
        vec![vec![200], vec![201], vec![202], vec![203], vec![204]]
    );
    assert!(
        lines.lock()[0].starts_with("Recorded GET http://localhost/200 request with a response of 200")
    );

    shutdown.cancel();
    handle.await.unwrap();
}

#[tokio::test]
async fn test_pause_while_running_holds_then_flushes_in_order() {
    let (coordinator, worker, _) = pipeline(2, 0);
    let transport = Arc::new(RecordingTransport::default());
    let shutdown = CancellationToken::new();
    coordinator.resume();
    let handle = tokio::spawn(worker.run(transport.clone(), shutdown.clone()));

    coordinator.enqueue(record(1)).unwrap();
    coordinator.enqueue(record(2)).unwrap();
    assert!(wait_until(|| transport.batches().len() == 1).await);

    coordinator.pause();
    assert_eq!(coordinator.state(), RunState::Paused);
    for status in 3..=7 {
        coordinator.enqueue(record(status)).unwrap();
    }

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(transport.batches(), vec![vec![1, 2]]);
    // The worker holds the first of them, the rest wait in the queue.
    assert_eq!(coordinator.stats().queued, 4);

    coordinator.resume();
    assert!(wait_until(|| coordinator.stats().flushed_batches == 3).await);
    assert_eq!(transport.batches(), vec![vec![1, 2], vec![3, 4], vec![5, 6]]);

    // The odd record stays buffered until the next one arrives.
    coordinator.enqueue(record(8)).unwrap();
    assert!(wait_until(|| transport.batches().len() == 4).await);
    assert_eq!(transport.batches()[3], vec![7, 8]);
    assert_eq!(coordinator.stats().pending(), 0);

    shutdown.cancel();
    handle.await.unwrap();
}

#[tokio::test]
async fn test_refused_send_keeps_entries_for_next_connection() {
    let (coordinator, worker, _) = pipeline(2, 0);
    let transport = Arc::new(RecordingTransport::default());
    transport.set_refuse(true);
    let shutdown = CancellationToken::new();
    coordinator.resume();
    let handle = tokio::spawn(worker.run(transport.clone(), shutdown.clone()));

    coordinator.enqueue(record(1)).unwrap();
    coordinator.enqueue(record(2)).unwrap();
    assert!(wait_until(|| coordinator.state() == RunState::Paused).await);
    assert_eq!(coordinator.stats().buffered, 2);
    assert_eq!(coordinator.stats().refused_sends, 1);

    transport.set_refuse(false);
    coordinator.resume();
    coordinator.enqueue(record(3)).unwrap();
    coordinator.enqueue(record(4)).unwrap();

    assert!(wait_until(|| transport.batches().len() == 2).await);
    assert_eq!(transport.batches(), vec![vec![1, 2], vec![3, 4]]);

    shutdown.cancel();
    handle.await.unwrap();
}

#[tokio::test]
async fn test_bounded_queue_drops_newest() {
    let (coordinator, _worker, _) = pipeline(1, 2);

    coordinator.enqueue(record(1)).unwrap();
    coordinator.enqueue(record(2)).unwrap();
    assert_eq!(
        coordinator.enqueue(record(3)),
        Err(BufferError::QueueFull { capacity: 2 })
    );

    let stats = coordinator.stats();
    assert_eq!(stats.enqueued, 2);
    assert_eq!(stats.dropped, 1);
    assert_eq!(stats.queued, 2);
}

#[tokio::test]
async fn test_shutdown_sends_partial_batch_when_running() {
    let (coordinator, worker, _) = pipeline(5, 0);
    let transport = Arc::new(RecordingTransport::default());
    let shutdown = CancellationToken::new();
    coordinator.resume();

    for status in [1, 2, 3] {
        coordinator.enqueue(record(status)).unwrap();
    }
    shutdown.cancel();
    worker.run(transport.clone(), shutdown).await;

    assert_eq!(transport.batches(), vec![vec![1, 2, 3]]);
    assert_eq!(coordinator.stats().pending(), 0);
}

#[tokio::test]
async fn test_shutdown_while_paused_sends_nothing() {
    let (coordinator, worker, _) = pipeline(1, 0);
    let transport = Arc::new(RecordingTransport::default());
    let shutdown = CancellationToken::new();

    coordinator.enqueue(record(1)).unwrap();
    shutdown.cancel();
    worker.run(transport.clone(), shutdown).await;

    assert!(transport.batches().is_empty());
}
