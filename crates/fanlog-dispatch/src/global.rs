//! Process-wide dispatcher used by the logging macros

use crate::dispatcher::Dispatcher;
use fanlog_core::{Level, Sink, SinkError};
use std::sync::{Arc, OnceLock};

static GLOBAL: OnceLock<Dispatcher> = OnceLock::new();

/// The process-wide dispatcher, created empty on first use
pub fn global() -> &'static Dispatcher {
    GLOBAL.get_or_init(Dispatcher::new)
}

/// Register a sink with the process-wide dispatcher
pub fn register(sink: Arc<dyn Sink>) {
    global().register(sink);
}

/// Set the global threshold of the process-wide dispatcher
pub fn set_level(level: Level) {
    global().set_level(level);
}

pub fn flush() -> Result<(), SinkError> {
    global().flush()
}

/// Close every sink of the process-wide dispatcher
///
/// Call once at shutdown; records logged afterwards are dropped.
pub fn close() -> Result<(), SinkError> {
    global().close()
}
