use fanlog_core::{Level, Record, Sink, SinkError};
use parking_lot::RwLock;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Fans every record out to the registered sinks
///
/// Sinks are called in registration order on the caller's thread. A sink
/// that fails is reported on the `tracing` channel and skipped; the other
/// sinks still receive the record and the log call itself never fails.
pub struct Dispatcher {
    sinks: RwLock<Vec<Arc<dyn Sink>>>,
    level: AtomicU8,
    closed: AtomicBool,
}

impl Dispatcher {
    /// Create an empty dispatcher that lets every level through
    pub fn new() -> Self {
        Self::with_level(Level::Debug)
    }

    /// Create an empty dispatcher with a global threshold
    pub fn with_level(level: Level) -> Self {
        Self {
            sinks: RwLock::new(Vec::new()),
            level: AtomicU8::new(level.as_u8()),
            closed: AtomicBool::new(false),
        }
    }

    /// Append a sink; it receives records from the next log call on
    ///
    /// `register` does not call [`Sink::init`]. A sink whose init failed can
    /// still be registered; its write errors are reported and ignored.
    pub fn register(&self, sink: Arc<dyn Sink>) {
        if self.is_closed() {
            warn!(sink = %sink.label(), "Ignoring registration on a closed dispatcher");
            return;
        }
        info!(sink = %sink.label(), level = ?sink.level(), "Registering sink");
        self.sinks.write().push(sink);
    }

    /// Set the threshold used by sinks without an explicit level
    pub fn set_level(&self, level: Level) {
        self.level.store(level.as_u8(), Ordering::Release);
    }

    pub fn level(&self) -> Level {
        Level::from_u8(self.level.load(Ordering::Acquire)).unwrap_or(Level::Debug)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Get the number of registered sinks
    pub fn sink_count(&self) -> usize {
        self.sinks.read().len()
    }

    /// Get the names of all registered sinks, in dispatch order
    pub fn sink_names(&self) -> Vec<&'static str> {
        self.sinks.read().iter().map(|s| s.name()).collect()
    }

    fn threshold(&self, sink: &dyn Sink, global: Level) -> Level {
        sink.level().unwrap_or(global)
    }

    /// True when at least one sink would accept a record at `level`
    pub fn enabled(&self, level: Level) -> bool {
        if self.is_closed() {
            return false;
        }
        let global = self.level();
        self.sinks
            .read_recursive()
            .iter()
            .any(|sink| level >= self.threshold(sink.as_ref(), global))
    }

    /// Format and dispatch one record
    ///
    /// The message is only formatted when some sink will accept it.
    pub fn log(&self, level: Level, code: &str, args: fmt::Arguments<'_>) {
        if !self.enabled(level) {
            return;
        }
        self.dispatch(&Record::new(level, code, args.to_string()));
    }

    /// Dispatch a record that was built by the caller
    pub fn dispatch(&self, record: &Record) {
        if self.is_closed() {
            return;
        }
        let global = self.level();

        // Recursive read: a sink may report through a subscriber that logs
        // back into this dispatcher.
        let sinks = self.sinks.read_recursive();
        for sink in sinks.iter() {
            if record.level() < self.threshold(sink.as_ref(), global) {
                continue;
            }
            if let Err(e) = sink.write(record) {
                report_write_error(sink.as_ref(), &e);
            }
        }
    }

    /// Flush every sink, returning the first failure
    pub fn flush(&self) -> Result<(), SinkError> {
        let mut first = None;
        for sink in self.sinks.read_recursive().iter() {
            if let Err(e) = sink.flush() {
                warn!(sink = %sink.label(), error = %e, "Sink flush failed");
                first.get_or_insert(e);
            }
        }
        first.map_or(Ok(()), Err)
    }

    /// Close every sink in registration order
    ///
    /// Waits for in-flight log calls, closes all sinks even if some fail and
    /// returns the first failure. Later log calls are dropped.
    pub fn close(&self) -> Result<(), SinkError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let sinks = std::mem::take(&mut *self.sinks.write());

        let mut first = None;
        for sink in &sinks {
            debug!(sink = %sink.label(), "Closing sink");
            if let Err(e) = sink.close() {
                warn!(sink = %sink.label(), error = %e, "Sink close failed");
                first.get_or_insert(e);
            }
        }

        info!(sinks = sinks.len(), "Dispatcher closed");
        first.map_or(Ok(()), Err)
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

fn report_write_error(sink: &dyn Sink, e: &SinkError) {
    match e {
        SinkError::NotRunning | SinkError::Closed => {
            debug!(sink = %sink.label(), error = %e, "Sink not accepting writes");
        }
        _ => warn!(sink = %sink.label(), error = %e, "Sink write failed"),
    }
}
