//! Wire-client contracts for the remote sinks
//!
//! The batched sink hands complete [`LogGroup`]s to a [`LogStore`]; the queued
//! sink hands serialized [`ProducerMessage`]s to a [`Producer`]. Neither sink
//! knows how the bytes travel.

use chrono::{DateTime, Local};
use fanlog_core::{SinkError, TransportError};
use serde::Serialize;

/// One key/value pair inside a batched entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogContent {
    pub key: String,
    pub value: String,
}

/// One entry of a batch: a flat, ordered list of string fields
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogItem {
    /// Epoch seconds of the record
    pub time: i64,
    pub contents: Vec<LogContent>,
}

impl LogItem {
    /// Look up a field by key
    pub fn get(&self, key: &str) -> Option<&str> {
        self.contents
            .iter()
            .find(|c| c.key == key)
            .map(|c| c.value.as_str())
    }
}

/// A batch submitted to a [`LogStore`] in one call
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogGroup {
    pub topic: String,
    pub source: String,
    /// Epoch seconds at submission
    pub time: i64,
    pub logs: Vec<LogItem>,
}

/// A single message handed to a [`Producer`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProducerMessage {
    pub topic: String,
    /// Partition/routing key
    pub key: Option<String>,
    /// Serialized JSON object
    pub value: String,
    pub timestamp: DateTime<Local>,
}

/// Remote store that accepts batches of entries
pub trait LogStore: Send + Sync {
    /// Establish the project/store handle
    fn open(&self) -> Result<(), SinkError> {
        Ok(())
    }

    /// Submit one batch, preserving entry order
    fn put_logs(&self, group: &LogGroup) -> Result<(), TransportError>;

    fn close(&self) {}
}

/// Message-broker client that delivers one message at a time
pub trait Producer: Send + Sync {
    /// Connect to the brokers
    fn open(&self) -> Result<(), SinkError> {
        Ok(())
    }

    fn send(&self, message: &ProducerMessage) -> Result<(), TransportError>;

    fn close(&self) {}
}
