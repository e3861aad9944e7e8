//! Batched-flush sink
//!
//! Accumulates records in a fixed-capacity buffer and submits them to a
//! [`LogStore`] as one batch when the buffer is full, on [`Sink::flush`], or
//! on [`Sink::close`]. Submission happens on the calling thread while the
//! buffer lock is held, so concurrent writers never interleave an append with
//! a flush.

use crate::transport::{LogContent, LogGroup, LogItem, LogStore};
use chrono::Utc;
use fanlog_core::{
    Level, LevelCell, Record, Sink, SinkError, SinkStats, SinkStatsSnapshot, TransportError,
};
use parking_lot::Mutex;
use std::net::UdpSocket;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

pub use fanlog_core::FlushErrorPolicy;

/// Configuration for a [`BatchedSink`]
#[derive(Debug, Clone)]
pub struct BatchedSinkConfig {
    /// Explicit threshold; `None` follows the dispatcher's global level
    pub level: Option<Level>,
    /// Topic attached to every batch
    pub log_name: String,
    /// Source attached to every batch
    pub log_source: String,
    /// Entries held before an automatic flush; 0 is treated as 1
    pub capacity: usize,
    pub error_policy: FlushErrorPolicy,
}

impl Default for BatchedSinkConfig {
    fn default() -> Self {
        Self {
            level: None,
            log_name: "fanlog".to_string(),
            log_source: default_source(),
            capacity: 2048,
            error_policy: FlushErrorPolicy::Sticky,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    New,
    Open,
    Closed,
}

struct Buffer {
    entries: Vec<LogItem>,
    last_error: Option<TransportError>,
    lifecycle: Lifecycle,
}

/// Sink that submits records to a [`LogStore`] in batches
pub struct BatchedSink {
    config: BatchedSinkConfig,
    capacity: usize,
    level: LevelCell,
    store: Arc<dyn LogStore>,
    buffer: Mutex<Buffer>,
    stats: SinkStats,
}

impl BatchedSink {
    /// Create a new batched sink; call [`Sink::init`] before relying on it
    pub fn new(config: BatchedSinkConfig, store: Arc<dyn LogStore>) -> Self {
        let capacity = config.capacity.max(1);
        Self {
            level: LevelCell::new(config.level),
            capacity,
            buffer: Mutex::new(Buffer {
                entries: Vec::with_capacity(capacity),
                last_error: None,
                lifecycle: Lifecycle::New,
            }),
            config,
            store,
            stats: SinkStats::default(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of entries waiting for the next flush
    pub fn buffered_count(&self) -> usize {
        self.buffer.lock().entries.len()
    }

    /// The error latched by the most recent failed submission
    pub fn last_error(&self) -> Option<TransportError> {
        self.buffer.lock().last_error.clone()
    }

    /// Forget the latched error so the next flush submits again
    pub fn clear_error(&self) {
        if let Some(err) = self.buffer.lock().last_error.take() {
            info!(error = %err, "Cleared latched flush error");
        }
    }

    pub fn stats(&self) -> SinkStatsSnapshot {
        self.stats.snapshot()
    }

    /// Build the outgoing entry for a record
    fn build_item(&self, record: &Record) -> LogItem {
        let mut contents = vec![
            content("time", record.time()),
            content("level", record.level().as_str()),
            content("code", record.code()),
            content("info", record.info()),
        ];
        for (key, value) in record.fields() {
            let value = match value {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            contents.push(LogContent {
                key: key.clone(),
                value,
            });
        }

        LogItem {
            time: record.created_at().timestamp(),
            contents,
        }
    }

    /// Submit the buffer; the caller holds the lock
    fn flush_locked(&self, buffer: &mut Buffer) -> Result<(), SinkError> {
        if self.config.error_policy == FlushErrorPolicy::Sticky {
            if let Some(err) = &buffer.last_error {
                return Err(err.clone().into());
            }
        }
        if buffer.entries.is_empty() {
            return Ok(());
        }
        if buffer.lifecycle != Lifecycle::Open {
            return Err(SinkError::NotRunning);
        }

        let group = LogGroup {
            topic: self.config.log_name.clone(),
            source: self.config.log_source.clone(),
            time: Utc::now().timestamp(),
            logs: std::mem::take(&mut buffer.entries),
        };
        let count = group.logs.len() as u64;

        match self.store.put_logs(&group) {
            Ok(()) => {
                debug!(entries = count, topic = %group.topic, "Flushed batch");
                buffer.last_error = None;
                buffer.entries = group.logs;
                buffer.entries.clear();
                self.stats.record_delivered(count);
                Ok(())
            }
            Err(e) => {
                warn!(entries = count, error = %e, policy = ?self.config.error_policy, "Batch submission failed");
                buffer.entries = group.logs;
                buffer.last_error = Some(e.clone());
                self.stats.record_failed(count);
                Err(e.into())
            }
        }
    }
}

fn content(key: &str, value: &str) -> LogContent {
    LogContent {
        key: key.to_string(),
        value: value.to_string(),
    }
}

impl Sink for BatchedSink {
    fn name(&self) -> &'static str {
        "batched"
    }

    fn label(&self) -> String {
        format!("batched:{}", self.config.log_name)
    }

    fn init(&self) -> Result<(), SinkError> {
        let mut buffer = self.buffer.lock();
        match buffer.lifecycle {
            Lifecycle::Open => return Ok(()),
            Lifecycle::Closed => return Err(SinkError::Closed),
            Lifecycle::New => {}
        }

        self.store.open().inspect_err(|e| {
            error!(sink = self.name(), error = %e, "Failed to open log store");
        })?;
        buffer.lifecycle = Lifecycle::Open;

        info!(
            topic = %self.config.log_name,
            source = %self.config.log_source,
            capacity = self.capacity,
            "Batched sink initialized"
        );
        Ok(())
    }

    fn write(&self, record: &Record) -> Result<(), SinkError> {
        if self.level.filters(record.level()) {
            return Ok(());
        }
        let item = self.build_item(record);

        let mut buffer = self.buffer.lock();
        if buffer.lifecycle == Lifecycle::Closed {
            return Ok(());
        }

        if buffer.entries.len() >= self.capacity {
            if let Err(e) = self.flush_locked(&mut buffer) {
                self.stats.record_dropped();
                return Err(e);
            }
        }

        buffer.entries.push(item);
        self.stats.record_written();
        Ok(())
    }

    fn flush(&self) -> Result<(), SinkError> {
        let mut buffer = self.buffer.lock();
        self.flush_locked(&mut buffer)
    }

    fn close(&self) -> Result<(), SinkError> {
        let mut buffer = self.buffer.lock();
        if buffer.lifecycle == Lifecycle::Closed {
            return Ok(());
        }

        let result = self.flush_locked(&mut buffer);
        if !buffer.entries.is_empty() {
            let discarded = buffer.entries.len();
            warn!(entries = discarded, "Discarding unsent entries on close");
            self.stats.record_dropped_n(discarded as u64);
            buffer.entries.clear();
        }

        if buffer.lifecycle == Lifecycle::Open {
            self.store.close();
        }
        buffer.lifecycle = Lifecycle::Closed;
        result
    }

    fn level(&self) -> Option<Level> {
        self.level.get()
    }

    fn set_level(&self, level: Level) {
        self.level.set(level);
    }
}

impl Drop for BatchedSink {
    fn drop(&mut self) {
        let buffer = self.buffer.get_mut();
        if buffer.lifecycle != Lifecycle::Closed && !buffer.entries.is_empty() {
            warn!(
                entries = buffer.entries.len(),
                "Batched sink dropped with buffered entries"
            );
        }
    }
}

/// Address of the interface used for outbound traffic, or loopback when it
/// cannot be determined
///
/// Connecting a UDP socket sends nothing; it only asks the OS to pick a
/// route.
pub fn default_source() -> String {
    UdpSocket::bind("0.0.0.0:0")
        .and_then(|socket| {
            socket.connect("8.8.8.8:80")?;
            socket.local_addr()
        })
        .map(|addr| addr.ip().to_string())
        .unwrap_or_else(|_| "127.0.0.1".to_string())
}
