//! fanlog output
//!
//! Sinks for the fanlog dispatcher: synchronous console and file output, a
//! batched-flush sink for log-analytics stores and an async-queued sink for
//! message brokers, plus the transports those two deliver through.

pub mod batched;
pub mod console;
pub mod file;
pub mod http;
pub mod memory;
pub mod queued;
pub mod transport;

pub use batched::{BatchedSink, BatchedSinkConfig, FlushErrorPolicy};
pub use console::ConsoleSink;
pub use file::FileSink;
pub use http::{HttpLogStore, RestProducer};
pub use memory::{MemoryLogStore, MemoryProducer};
pub use queued::{QueueState, QueuedSink, QueuedSinkConfig, ECHO_TARGET};
pub use transport::{LogContent, LogGroup, LogItem, LogStore, Producer, ProducerMessage};
