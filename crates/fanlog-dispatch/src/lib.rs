//! fanlog dispatch
//!
//! Routes records to every registered sink. Use a [`Dispatcher`] handle
//! directly, or the process-wide one through [`global`] and the logging
//! macros.

pub mod dispatcher;
pub mod global;
mod macros;
pub mod setup;

pub use dispatcher::Dispatcher;
pub use global::{close, flush, global, register, set_level};
pub use setup::{register_from_config, setup_from_file, SetupReport};

pub use fanlog_core::{Config, FanlogError, Level, Record, Sink, SinkError};
