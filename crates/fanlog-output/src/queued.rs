//! Async-queued sink
//!
//! Callers serialize a record into a [`ProducerMessage`] and push it onto a
//! bounded queue; a single worker thread pops messages in FIFO order and
//! hands them to the [`Producer`]. The caller only blocks when the queue is
//! full.
//!
//! # Lifecycle
//!
//! `Stopped → Starting → Running → Draining → Stopped`. Closing drops the
//! queue's sender, waits for the worker to report that it has delivered
//! everything already queued, and only then closes the producer.

use crate::transport::{Producer, ProducerMessage};
use crossbeam_channel::{bounded, Receiver, Sender};
use fanlog_core::{Level, LevelCell, Record, Sink, SinkError, SinkStats, SinkStatsSnapshot};
use parking_lot::{Mutex, RwLock};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info, warn};

/// Tracing target of the outgoing-message echo enabled by `debug`
pub const ECHO_TARGET: &str = "fanlog::echo";

/// Layout of the `timeStamp` field in outgoing messages
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3f%z";

/// Configuration for a [`QueuedSink`]
#[derive(Debug, Clone, Default)]
pub struct QueuedSinkConfig {
    /// Explicit threshold; `None` follows the dispatcher's global level
    pub level: Option<Level>,
    pub topic: String,
    /// Constant partition key
    pub key: Option<String>,
    /// Queue capacity; values below 1 are raised to 1
    pub capacity: usize,
    /// Echo every outgoing message to the diagnostics channel
    pub debug: bool,
    /// Static fields merged into every message
    pub fields: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum QueueState {
    Stopped = 0,
    Starting = 1,
    Running = 2,
    Draining = 3,
}

impl QueueState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Starting,
            2 => Self::Running,
            3 => Self::Draining,
            _ => Self::Stopped,
        }
    }
}

struct Worker {
    handle: JoinHandle<()>,
    done: Receiver<()>,
}

/// Sink that delivers records through a background worker
pub struct QueuedSink {
    config: QueuedSinkConfig,
    level: LevelCell,
    producer: Arc<dyn Producer>,
    state: AtomicU8,
    sender: RwLock<Option<Sender<ProducerMessage>>>,
    worker: Mutex<Option<Worker>>,
    stats: Arc<SinkStats>,
}

impl QueuedSink {
    /// Create a stopped sink; [`QueuedSink::start`] (or [`Sink::init`])
    /// connects and spawns the worker
    pub fn new(config: QueuedSinkConfig, producer: Arc<dyn Producer>) -> Self {
        Self {
            level: LevelCell::new(config.level),
            config,
            producer,
            state: AtomicU8::new(QueueState::Stopped as u8),
            sender: RwLock::new(None),
            worker: Mutex::new(None),
            stats: Arc::new(SinkStats::default()),
        }
    }

    pub fn state(&self) -> QueueState {
        QueueState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: QueueState) {
        self.state.store(state as u8, Ordering::Release);
    }

    pub fn stats(&self) -> SinkStatsSnapshot {
        self.stats.snapshot()
    }

    /// Messages waiting for the worker
    pub fn queued_count(&self) -> usize {
        self.sender.read().as_ref().map_or(0, Sender::len)
    }

    /// Connect the producer and spawn the delivery worker
    ///
    /// Starting a running sink is a no-op. If the producer cannot connect the
    /// sink stays stopped and the error is returned.
    pub fn start(&self) -> Result<(), SinkError> {
        if let Err(current) = self.state.compare_exchange(
            QueueState::Stopped as u8,
            QueueState::Starting as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            return match QueueState::from_u8(current) {
                QueueState::Draining => Err(SinkError::Closed),
                _ => Ok(()),
            };
        }

        if let Err(e) = self.producer.open() {
            error!(topic = %self.config.topic, error = %e, "Failed to start queued sink");
            self.set_state(QueueState::Stopped);
            return Err(e);
        }

        let capacity = self.config.capacity.max(1);
        let (tx, rx) = bounded::<ProducerMessage>(capacity);
        let (done_tx, done_rx) = bounded::<()>(1);

        let producer = Arc::clone(&self.producer);
        let stats = Arc::clone(&self.stats);
        let spawned = thread::Builder::new()
            .name(format!("fanlog-queue-{}", self.config.topic))
            .spawn(move || run_worker(rx, producer, stats, done_tx));

        let handle = match spawned {
            Ok(handle) => handle,
            Err(e) => {
                error!(error = %e, "Failed to spawn delivery worker");
                self.producer.close();
                self.set_state(QueueState::Stopped);
                return Err(SinkError::Config(format!("Failed to spawn delivery worker: {}", e)));
            }
        };

        *self.sender.write() = Some(tx);
        *self.worker.lock() = Some(Worker {
            handle,
            done: done_rx,
        });
        self.set_state(QueueState::Running);

        info!(topic = %self.config.topic, capacity, "Queued sink started");
        Ok(())
    }

    /// Close the queue, wait for the worker to drain it, then close the
    /// producer
    ///
    /// Stopping a sink that is not running is a no-op.
    pub fn stop(&self) {
        if self
            .state
            .compare_exchange(
                QueueState::Running as u8,
                QueueState::Draining as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_err()
        {
            return;
        }

        // Waits for writers that are mid-send, then disconnects the queue
        drop(self.sender.write().take());

        if let Some(worker) = self.worker.lock().take() {
            if worker.done.recv().is_err() {
                warn!(topic = %self.config.topic, "Delivery worker exited without signalling completion");
            }
            if worker.handle.join().is_err() {
                error!(topic = %self.config.topic, "Delivery worker panicked");
            }
        }

        self.producer.close();
        self.set_state(QueueState::Stopped);

        let stats = self.stats.snapshot();
        info!(
            topic = %self.config.topic,
            delivered = stats.delivered,
            failed = stats.failed,
            "Queued sink stopped"
        );
    }

    /// Build the outgoing message for a record
    ///
    /// Static fields go in first, then the record's own fields, then the
    /// record-derived `level`, `timeStamp`, `now` and `message`; later
    /// entries replace earlier ones on key collision.
    pub fn build_message(&self, record: &Record) -> Result<ProducerMessage, SinkError> {
        let mut payload = Map::new();
        for (key, value) in &self.config.fields {
            payload.insert(key.clone(), value.clone());
        }
        for (key, value) in record.fields() {
            payload.insert(key.clone(), value.clone());
        }

        let created_at = record.created_at();
        payload.insert("level".to_string(), Value::from(record.level().as_str()));
        payload.insert(
            "timeStamp".to_string(),
            Value::from(created_at.format(TIMESTAMP_FORMAT).to_string()),
        );
        payload.insert("now".to_string(), Value::from(created_at.timestamp()));
        payload.insert("message".to_string(), Value::from(record.info()));

        let value = serde_json::to_string(&payload)
            .map_err(|e| SinkError::Serialization(e.to_string()))?;

        Ok(ProducerMessage {
            topic: self.config.topic.clone(),
            key: self.config.key.clone().filter(|k| !k.is_empty()),
            value,
            timestamp: created_at,
        })
    }
}

/// Deliver messages until the queue is disconnected and empty, then signal
/// completion
fn run_worker(
    rx: Receiver<ProducerMessage>,
    producer: Arc<dyn Producer>,
    stats: Arc<SinkStats>,
    done: Sender<()>,
) {
    debug!("Delivery worker started");

    for message in rx.iter() {
        match producer.send(&message) {
            Ok(()) => stats.record_delivered(1),
            Err(e) => {
                stats.record_failed(1);
                warn!(
                    topic = %message.topic,
                    key = ?message.key,
                    value = %message.value,
                    error = %e,
                    "Failed to deliver message"
                );
            }
        }
    }

    debug!("Delivery worker drained");
    let _ = done.send(());
}

impl Sink for QueuedSink {
    fn name(&self) -> &'static str {
        "queued"
    }

    fn label(&self) -> String {
        format!("queued:{}", self.config.topic)
    }

    fn init(&self) -> Result<(), SinkError> {
        self.start()
    }

    fn write(&self, record: &Record) -> Result<(), SinkError> {
        if self.level.filters(record.level()) || record.info().is_empty() {
            return Ok(());
        }
        if self.state() != QueueState::Running {
            return Err(SinkError::NotRunning);
        }

        let message = self.build_message(record)?;
        if self.config.debug {
            info!(
                target: ECHO_TARGET,
                topic = %message.topic,
                key = ?message.key,
                value = %message.value,
                "Outgoing message"
            );
        }

        // The read guard is held across a possibly blocking send so that
        // stop() cannot disconnect the queue under an in-flight write.
        let sender = self.sender.read();
        let tx = sender.as_ref().ok_or(SinkError::NotRunning)?;
        tx.send(message).map_err(|_| SinkError::Closed)?;
        self.stats.record_written();
        Ok(())
    }

    fn close(&self) -> Result<(), SinkError> {
        self.stop();
        Ok(())
    }

    fn level(&self) -> Option<Level> {
        self.level.get()
    }

    fn set_level(&self, level: Level) {
        self.level.set(level);
    }
}

impl Drop for QueuedSink {
    fn drop(&mut self) {
        self.stop();
    }
}
