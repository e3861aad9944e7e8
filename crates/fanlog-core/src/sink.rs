use crate::error::SinkError;
use crate::record::{Level, Record};
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};

/// An output destination for log records
///
/// Sinks are shared between every thread that logs, so all methods take
/// `&self` and implementations keep their mutable state behind their own
/// locks or queues. The dispatcher calls `write` once per record; a sink
/// decides whether that means printing, buffering or enqueueing.
pub trait Sink: Send + Sync {
    /// Returns the name of the sink (for diagnostics)
    fn name(&self) -> &'static str;

    /// Identifies this instance among sinks of the same kind, e.g.
    /// `queued:orders`
    fn label(&self) -> String {
        self.name().to_string()
    }

    /// Acquire connections, files or workers needed before the first write
    fn init(&self) -> Result<(), SinkError> {
        Ok(())
    }

    /// Deliver or stage a single record
    ///
    /// Records below the sink's explicit level are accepted as a no-op.
    fn write(&self, record: &Record) -> Result<(), SinkError>;

    /// Push out anything staged by earlier writes
    fn flush(&self) -> Result<(), SinkError> {
        Ok(())
    }

    /// Flush and release resources. Writes after close are ignored.
    fn close(&self) -> Result<(), SinkError> {
        self.flush()
    }

    /// Explicit per-sink threshold, or `None` to follow the dispatcher's
    /// global level
    fn level(&self) -> Option<Level>;

    /// Replace the per-sink threshold
    fn set_level(&self, level: Level);
}

const UNSET: u8 = u8::MAX;

/// Lock-free holder for an optional level, so a sink's threshold can be
/// changed while other threads are writing through it
#[derive(Debug)]
pub struct LevelCell(AtomicU8);

impl LevelCell {
    pub fn new(level: Option<Level>) -> Self {
        Self(AtomicU8::new(level.map_or(UNSET, Level::as_u8)))
    }

    pub fn get(&self) -> Option<Level> {
        Level::from_u8(self.0.load(Ordering::Acquire))
    }

    pub fn set(&self, level: Level) {
        self.0.store(level.as_u8(), Ordering::Release);
    }

    /// True when `level` is below the stored threshold and should be dropped
    pub fn filters(&self, level: Level) -> bool {
        self.get().is_some_and(|threshold| level < threshold)
    }
}

impl Default for LevelCell {
    fn default() -> Self {
        Self::new(None)
    }
}

/// Delivery counters kept by the remote sinks
#[derive(Debug, Default)]
pub struct SinkStats {
    written: AtomicU64,
    delivered: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
}

/// Point-in-time copy of [`SinkStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SinkStatsSnapshot {
    /// Records accepted by `write`
    pub written: u64,
    /// Records the backend acknowledged
    pub delivered: u64,
    /// Records whose submission returned an error
    pub failed: u64,
    /// Records discarded before any submission was attempted
    pub dropped: u64,
}

impl SinkStats {
    pub fn record_written(&self) {
        self.written.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_delivered(&self, n: u64) {
        self.delivered.fetch_add(n, Ordering::Relaxed);
    }

    pub fn record_failed(&self, n: u64) {
        self.failed.fetch_add(n, Ordering::Relaxed);
    }

    pub fn record_dropped(&self) {
        self.record_dropped_n(1);
    }

    pub fn record_dropped_n(&self, n: u64) {
        self.dropped.fetch_add(n, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> SinkStatsSnapshot {
        SinkStatsSnapshot {
            written: self.written.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }
}

/// A sink that accepts and discards everything
///
/// Useful as a placeholder or for testing
#[derive(Debug, Default)]
pub struct NullSink {
    level: LevelCell,
}

impl NullSink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Sink for NullSink {
    fn name(&self) -> &'static str {
        "null"
    }

    fn write(&self, _record: &Record) -> Result<(), SinkError> {
        Ok(())
    }

    fn level(&self) -> Option<Level> {
        self.level.get()
    }

    fn set_level(&self, level: Level) {
        self.level.set(level);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_cell_unset_filters_nothing() {
        let cell = LevelCell::default();
        assert_eq!(cell.get(), None);
        for level in Level::ALL {
            assert!(!cell.filters(level));
        }
    }

    #[test]
    fn test_level_cell_filters_below_threshold() {
        let cell = LevelCell::new(Some(Level::Warning));
        assert!(cell.filters(Level::Debug));
        assert!(cell.filters(Level::Info));
        assert!(!cell.filters(Level::Warning));
        assert!(!cell.filters(Level::Fatal));

        cell.set(Level::Fatal);
        assert_eq!(cell.get(), Some(Level::Fatal));
        assert!(cell.filters(Level::Error));
    }

    #[test]
    fn test_null_sink() {
        let sink = NullSink::new();
        let record = Record::new(Level::Info, "test", "ignored");
        assert!(sink.write(&record).is_ok());
        assert!(sink.close().is_ok());
        assert_eq!(sink.name(), "null");
    }

    #[test]
    fn test_stats_snapshot() {
        let stats = SinkStats::default();
        stats.record_written();
        stats.record_written();
        stats.record_delivered(2);
        stats.record_dropped();
        stats.record_dropped_n(4);

        let snap = stats.snapshot();
        assert_eq!(snap.written, 2);
        assert_eq!(snap.delivered, 2);
        assert_eq!(snap.failed, 0);
        assert_eq!(snap.dropped, 5);
    }
}
