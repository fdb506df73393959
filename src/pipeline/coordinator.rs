//! Drives records from the capture queue into batches and hands full batches
//! to the transport, holding everything while the collector is unreachable.

use super::stats::{FlushCounters, PipelineStats};
use crate::buffer::{BatchBuffer, BufferError, RecordQueue, RecordReceiver};
use crate::capture::RecordSink;
use crate::domain::{Record, StatusLogger};
use crate::transport::{BatchTransport, TransportError};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Running,
    Paused,
}

struct StepState {
    run: RunState,
    buffer: BatchBuffer,
}

struct Shared {
    step: Mutex<StepState>,
    run_tx: watch::Sender<RunState>,
    queue: RecordQueue,
    flushes: FlushCounters,
    logger: StatusLogger,
}

/// Handle used by the capture side and by connectivity events.
///
/// Starts paused. Cloning is cheap and every clone drives the same pipeline.
#[derive(Clone)]
pub struct Coordinator {
    shared: Arc<Shared>,
}

/// The single consumer of the record queue. Run it with [`CoordinatorWorker::run`].
pub struct CoordinatorWorker {
    shared: Arc<Shared>,
    receiver: RecordReceiver,
}

enum Step {
    Buffered,
    Flushed(Option<String>),
    Held(Record),
}

impl Coordinator {
    /// `max_queued == 0` leaves the queue unbounded.
    pub fn new(
        buffer: BatchBuffer,
        max_queued: usize,
        logger: StatusLogger,
    ) -> (Coordinator, CoordinatorWorker) {
        let (queue, receiver) = RecordQueue::new(max_queued);
        let (run_tx, _) = watch::channel(RunState::Paused);

        let shared = Arc::new(Shared {
            step: Mutex::new(StepState {
                run: RunState::Paused,
                buffer,
            }),
            run_tx,
            queue,
            flushes: FlushCounters::default(),
            logger,
        });

        (
            Coordinator {
                shared: Arc::clone(&shared),
            },
            CoordinatorWorker { shared, receiver },
        )
    }

    /// Queues a finished record. Never blocks.
    pub fn enqueue(&self, record: Record) -> Result<(), BufferError> {
        self.shared.queue.push(record)
    }

    pub fn pause(&self) {
        self.shared.set_state(RunState::Paused);
    }

    pub fn resume(&self) {
        self.shared.set_state(RunState::Running);
    }

    pub fn state(&self) -> RunState {
        self.shared.step.lock().run
    }

    pub fn stats(&self) -> PipelineStats {
        let (state, buffered) = {
            let step = self.shared.step.lock();
            (step.run, step.buffer.len())
        };
        let counters = self.shared.queue.counters();
        let flushes = &self.shared.flushes;

        PipelineStats {
            state,
            enqueued: counters.enqueued(),
            dropped: counters.dropped(),
            queued: counters.queued(),
            buffered,
            flushed_batches: flushes.batches.load(Ordering::Relaxed),
            flushed_records: flushes.records.load(Ordering::Relaxed),
            send_failures: flushes.send_failures.load(Ordering::Relaxed),
            refused_sends: flushes.refused.load(Ordering::Relaxed),
        }
    }
}

impl RecordSink for Coordinator {
    fn accept(&self, record: Record) {
        match self.enqueue(record) {
            Ok(()) => {}
            Err(BufferError::QueueFull { capacity }) => {
                let dropped = self.shared.queue.counters().dropped();
                // One warning per thousand drops is enough to notice a stuck collector.
                if dropped % 1000 == 1 {
                    warn!(capacity, dropped, "Record queue full, dropping newest records");
                }
            }
            Err(e) => debug!("Record discarded: {e}"),
        }
    }
}

impl Shared {
    fn set_state(&self, state: RunState) {
        let mut step = self.step.lock();
        if step.run != state {
            debug!(from = ?step.run, to = ?state, "Pipeline state change");
        }
        step.run = state;
        self.run_tx.send_replace(state);
    }

    /// Append, check and drain as one step under the lock.
    fn step(&self, record: Record, transport: &dyn BatchTransport) -> Step {
        let mut step = self.step.lock();
        if step.run == RunState::Paused {
            return Step::Held(record);
        }

        step.buffer.append(record);
        if !step.buffer.is_ready() {
            return Step::Buffered;
        }

        Step::Flushed(self.flush_locked(&mut step, transport))
    }

    /// Sends whatever is buffered, if running. Used on shutdown.
    fn flush_partial(&self, transport: &dyn BatchTransport) -> Vec<String> {
        let mut step = self.step.lock();
        let mut lines = Vec::new();
        while step.run == RunState::Running && !step.buffer.is_empty() {
            lines.extend(self.flush_locked(&mut step, transport));
        }
        lines
    }

    fn flush_locked(&self, step: &mut StepState, transport: &dyn BatchTransport) -> Option<String> {
        let batch = step.buffer.drain();
        let size = batch.size();

        match transport.send(&batch) {
            Ok(()) => {
                self.flushes.record_flush(size);
                debug!(entries = size, "Flushed batch");
                batch.entries().last().map(|record| format!("Recorded {}", record.summary()))
            }
            Err(TransportError::Closed) => {
                warn!(entries = size, "Transport refused batch, holding entries");
                self.flushes.refused.fetch_add(1, Ordering::Relaxed);
                step.buffer.restore(batch);
                step.run = RunState::Paused;
                self.run_tx.send_replace(RunState::Paused);
                None
            }
            Err(e) => {
                error!(entries = size, "Dropping batch: {e}");
                self.flushes.send_failures.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    fn log_status(&self, line: Option<String>) {
        if let Some(line) = line {
            (self.logger)(&line);
        }
    }
}

impl CoordinatorWorker {
    /// Consumes records until cancelled or until every producer is gone, then
    /// flushes what it can.
    pub async fn run(mut self, transport: Arc<dyn BatchTransport>, shutdown: CancellationToken) {
        let mut run_rx = self.shared.run_tx.subscribe();
        let mut held: Option<Record> = None;

        info!(
            threshold = self.shared.step.lock().buffer.threshold(),
            max_queued = self.shared.queue.capacity(),
            "Pipeline worker started"
        );

        'consume: loop {
            let mut record = tokio::select! {
                biased;
                () = shutdown.cancelled() => break 'consume,
                record = self.receiver.recv() => match record {
                    Some(record) => record,
                    None => break 'consume,
                },
            };

            loop {
                match self.shared.step(record, transport.as_ref()) {
                    Step::Buffered => break,
                    Step::Flushed(line) => {
                        self.shared.log_status(line);
                        break;
                    }
                    Step::Held(returned) => {
                        let resumed = tokio::select! {
                            biased;
                            () = shutdown.cancelled() => false,
                            changed = run_rx.wait_for(|state| *state == RunState::Running) => {
                                changed.is_ok()
                            }
                        };
                        if !resumed {
                            held = Some(returned);
                            break 'consume;
                        }
                        record = returned;
                    }
                }
            }
        }

        self.drain_on_shutdown(held, transport.as_ref());
    }

    fn drain_on_shutdown(&mut self, held: Option<Record>, transport: &dyn BatchTransport) {
        let mut discarded = 0_usize;
        let mut pending = held;

        loop {
            let Some(record) = pending.take().or_else(|| self.receiver.try_recv()) else {
                break;
            };
            match self.shared.step(record, transport) {
                Step::Buffered => {}
                Step::Flushed(line) => self.shared.log_status(line),
                Step::Held(_) => discarded += 1,
            }
        }

        for line in self.shared.flush_partial(transport) {
            self.shared.log_status(Some(line));
        }

        let remaining = self.shared.step.lock().buffer.len();
        if discarded > 0 || remaining > 0 {
            warn!(
                discarded,
                buffered = remaining,
                "Pipeline stopped while paused, unsent records discarded"
            );
        }
        info!("Pipeline worker stopped");
    }
}
