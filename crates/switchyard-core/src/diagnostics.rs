//! Per-request diagnostic buffer.
//!
//! Handlers record verbose messages into a bounded buffer that belongs to the
//! request being dispatched. Nothing is emitted unless a message at or above
//! the flush level arrives, in which case the whole buffer is written out
//! through `tracing` so the failure is logged together with its context.
//! The buffer is cleared after every dispatch, success or failure, by a
//! [`DiagnosticScope`] guard.

use std::collections::VecDeque;
use std::ops::{Deref, DerefMut};

use tracing::Level;

/// Default number of messages kept per request.
pub const DEFAULT_DIAGNOSTIC_CAPACITY: usize = 64;

/// One buffered diagnostic message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagnosticEntry {
    /// Severity.
    pub level: Level,
    /// Message text.
    pub message: String,
}

/// A bounded, per-request ring of diagnostic messages.
///
/// # Example
///
/// ```
/// use switchyard_core::DiagnosticBuffer;
/// use tracing::Level;
///
/// let mut buffer = DiagnosticBuffer::with_capacity(2);
/// buffer.debug("parsed form");
/// buffer.debug("loaded template");
/// buffer.debug("rendered");
///
/// // Oldest message was evicted.
/// assert_eq!(buffer.len(), 2);
/// assert_eq!(buffer.entries().next().unwrap().message, "loaded template");
///
/// {
///     let mut scope = buffer.scope();
///     scope.record(Level::INFO, "inside dispatch");
/// }
/// assert!(buffer.is_empty());
/// ```
#[derive(Debug, Clone)]
pub struct DiagnosticBuffer {
    entries: VecDeque<DiagnosticEntry>,
    capacity: usize,
    flush_level: Level,
    flushes: u64,
}

impl Default for DiagnosticBuffer {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_DIAGNOSTIC_CAPACITY)
    }
}

impl DiagnosticBuffer {
    /// Creates a buffer with the default capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a buffer keeping at most `capacity` messages.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity.min(DEFAULT_DIAGNOSTIC_CAPACITY)),
            capacity: capacity.max(1),
            flush_level: Level::WARN,
            flushes: 0,
        }
    }

    /// Sets the level at or above which the buffer is flushed.
    #[must_use]
    pub const fn flush_at(mut self, level: Level) -> Self {
        self.flush_level = level;
        self
    }

    /// Records a message, flushing the buffer if it is severe enough.
    pub fn record(&mut self, level: Level, message: impl Into<String>) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(DiagnosticEntry {
            level,
            message: message.into(),
        });
        // tracing orders ERROR lowest.
        if level <= self.flush_level {
            self.flush();
        }
    }

    /// Records a `DEBUG` message.
    pub fn debug(&mut self, message: impl Into<String>) {
        self.record(Level::DEBUG, message);
    }

    /// Records an `ERROR` message, which flushes the buffer.
    pub fn error(&mut self, message: impl Into<String>) {
        self.record(Level::ERROR, message);
    }

    /// Writes every buffered message through `tracing` and empties the buffer.
    pub fn flush(&mut self) {
        if self.entries.is_empty() {
            return;
        }
        self.flushes += 1;
        let total = self.entries.len();
        for (seq, entry) in self.entries.drain(..).enumerate() {
            emit(&entry, seq, total);
        }
    }

    /// Discards every buffered message.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Iterates the buffered messages, oldest first.
    pub fn entries(&self) -> impl Iterator<Item = &DiagnosticEntry> {
        self.entries.iter()
    }

    /// Returns the number of buffered messages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing is buffered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the configured capacity.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns how many times the buffer was flushed.
    #[must_use]
    pub const fn flush_count(&self) -> u64 {
        self.flushes
    }

    /// Borrows the buffer for one dispatch; it is cleared when the guard drops.
    pub fn scope(&mut self) -> DiagnosticScope<'_> {
        DiagnosticScope { buffer: self }
    }
}

fn emit(entry: &DiagnosticEntry, seq: usize, total: usize) {
    let message = entry.message.as_str();
    match entry.level {
        Level::ERROR => tracing::error!(seq, total, "{message}"),
        Level::WARN => tracing::warn!(seq, total, "{message}"),
        Level::INFO => tracing::info!(seq, total, "{message}"),
        Level::DEBUG => tracing::debug!(seq, total, "{message}"),
        _ => tracing::trace!(seq, total, "{message}"),
    }
}

/// Guard returned by [`DiagnosticBuffer::scope`].
#[derive(Debug)]
pub struct DiagnosticScope<'a> {
    buffer: &'a mut DiagnosticBuffer,
}

impl Deref for DiagnosticScope<'_> {
    type Target = DiagnosticBuffer;

    fn deref(&self) -> &Self::Target {
        self.buffer
    }
}

impl DerefMut for DiagnosticScope<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.buffer
    }
}

impl Drop for DiagnosticScope<'_> {
    fn drop(&mut self) {
        self.buffer.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_messages_are_buffered() {
        let mut buffer = DiagnosticBuffer::new();
        buffer.debug("one");
        buffer.record(Level::INFO, "two");
        assert_eq!(buffer.len(), 2);
        assert_eq!(buffer.flush_count(), 0);
    }

    #[test]
    fn test_error_flushes_buffer() {
        let mut buffer = DiagnosticBuffer::new();
        buffer.debug("context");
        buffer.error("boom");
        assert!(buffer.is_empty());
        assert_eq!(buffer.flush_count(), 1);
    }

    #[test]
    fn test_custom_flush_level() {
        let mut buffer = DiagnosticBuffer::new().flush_at(Level::ERROR);
        buffer.record(Level::WARN, "not yet");
        assert_eq!(buffer.len(), 1);
        buffer.record(Level::ERROR, "now");
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let mut buffer = DiagnosticBuffer::with_capacity(3);
        for i in 0..5 {
            buffer.debug(format!("msg {i}"));
        }
        let messages: Vec<_> = buffer.entries().map(|e| e.message.clone()).collect();
        assert_eq!(messages, vec!["msg 2", "msg 3", "msg 4"]);
    }

    #[test]
    fn test_zero_capacity_keeps_one() {
        let mut buffer = DiagnosticBuffer::with_capacity(0);
        buffer.debug("a");
        buffer.debug("b");
        assert_eq!(buffer.capacity(), 1);
        assert_eq!(buffer.len(), 1);
    }

    #[test]
    fn test_scope_clears_on_drop() {
        let mut buffer = DiagnosticBuffer::new();
        {
            let mut scope = buffer.scope();
            scope.debug("inside");
            assert_eq!(scope.len(), 1);
        }
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_scope_clears_on_unwind() {
        let mut buffer = DiagnosticBuffer::new();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let mut scope = buffer.scope();
            scope.debug("before panic");
            panic!("handler bug");
        }));
        assert!(result.is_err());
        assert!(buffer.is_empty());
    }
}
