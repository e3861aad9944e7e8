//! fanlog core
//!
//! Core types, traits, and configuration shared by every fanlog crate.

pub mod config;
pub mod error;
pub mod record;
pub mod sink;

// Re-export commonly used types
pub use config::{Config, FlushErrorPolicy};
pub use error::{FanlogError, Result, SinkError, TransportError};
pub use record::{Level, ParseLevelError, Record, TIME_FORMAT};
pub use sink::{LevelCell, NullSink, Sink, SinkStats, SinkStatsSnapshot};
