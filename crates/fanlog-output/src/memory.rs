//! In-memory transports
//!
//! Both record every submission and can be told to fail, which makes them
//! useful as placeholders and for exercising sink behavior without a network.

use crate::transport::{LogGroup, LogStore, Producer, ProducerMessage};
use fanlog_core::{SinkError, TransportError};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

/// [`LogStore`] that keeps every accepted batch in memory
#[derive(Debug, Default)]
pub struct MemoryLogStore {
    groups: Mutex<Vec<LogGroup>>,
    failure: Mutex<Option<TransportError>>,
    open_error: Mutex<Option<SinkError>>,
    attempts: AtomicUsize,
    opened: AtomicBool,
    closed: AtomicBool,
}

impl MemoryLogStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following `put_logs` fail with `error`, or succeed again
    /// with `None`
    pub fn set_failure(&self, error: Option<TransportError>) {
        *self.failure.lock() = error;
    }

    /// Make `open` fail with `error`
    pub fn fail_open(self, error: SinkError) -> Self {
        *self.open_error.lock() = Some(error);
        self
    }

    /// Batches accepted so far, oldest first
    pub fn groups(&self) -> Vec<LogGroup> {
        self.groups.lock().clone()
    }

    /// Number of `put_logs` calls, successful or not
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn is_opened(&self) -> bool {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl LogStore for MemoryLogStore {
    fn open(&self) -> Result<(), SinkError> {
        if let Some(err) = self.open_error.lock().clone() {
            return Err(err);
        }
        self.opened.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn put_logs(&self, group: &LogGroup) -> Result<(), TransportError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.failure.lock().clone() {
            return Err(err);
        }
        self.groups.lock().push(group.clone());
        Ok(())
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// [`Producer`] that keeps every delivered message in memory
#[derive(Debug, Default)]
pub struct MemoryProducer {
    messages: Mutex<Vec<ProducerMessage>>,
    fail_next: AtomicUsize,
    open_error: Mutex<Option<SinkError>>,
    delay: Duration,
    attempts: AtomicUsize,
    closed: AtomicBool,
}

impl MemoryProducer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep this long inside every `send`, imitating a slow broker
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Make `open` fail with `error`
    pub fn fail_open(self, error: SinkError) -> Self {
        *self.open_error.lock() = Some(error);
        self
    }

    /// Make the next `n` sends fail
    pub fn fail_next(&self, n: usize) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    /// Messages delivered so far, in delivery order
    pub fn messages(&self) -> Vec<ProducerMessage> {
        self.messages.lock().clone()
    }

    /// Number of `send` calls, successful or not
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Producer for MemoryProducer {
    fn open(&self) -> Result<(), SinkError> {
        match self.open_error.lock().clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn send(&self, message: &ProducerMessage) -> Result<(), TransportError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }

        let failing = self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(TransportError::Unavailable("injected failure".to_string()));
        }

        self.messages.lock().push(message.clone());
        Ok(())
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}
