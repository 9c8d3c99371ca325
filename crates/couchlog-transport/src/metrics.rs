//! Counters for transport operations
//!
//! ## Usage
//!
//! ```ignore
//! let snapshot = transport.metrics().snapshot();
//! println!("{} written, {} failed", snapshot.logs_written, snapshot.write_failures);
//! ```

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters for one transport instance.
#[derive(Debug, Default)]
pub struct TransportMetrics {
    /// Logs persisted
    pub logs_written: AtomicU64,
    /// Writes rejected by the store
    pub write_failures: AtomicU64,
    /// Writes dropped because the transport is silent
    pub silent_drops: AtomicU64,
    /// Queries executed
    pub queries: AtomicU64,
    /// Log events delivered to streams
    pub stream_events: AtomicU64,
    /// Streams opened
    pub streams_opened: AtomicU64,
}

impl TransportMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_write(&self) {
        self.logs_written.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_write_failure(&self) {
        self.write_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_silent_drop(&self) {
        self.silent_drops.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_query(&self) {
        self.queries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_stream_event(&self) {
        self.stream_events.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_stream_opened(&self) {
        self.streams_opened.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current metrics snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            logs_written: self.logs_written.load(Ordering::Relaxed),
            write_failures: self.write_failures.load(Ordering::Relaxed),
            silent_drops: self.silent_drops.load(Ordering::Relaxed),
            queries: self.queries.load(Ordering::Relaxed),
            stream_events: self.stream_events.load(Ordering::Relaxed),
            streams_opened: self.streams_opened.load(Ordering::Relaxed),
        }
    }

    /// Reset all counters
    pub fn reset(&self) {
        self.logs_written.store(0, Ordering::Relaxed);
        self.write_failures.store(0, Ordering::Relaxed);
        self.silent_drops.store(0, Ordering::Relaxed);
        self.queries.store(0, Ordering::Relaxed);
        self.stream_events.store(0, Ordering::Relaxed);
        self.streams_opened.store(0, Ordering::Relaxed);
    }
}

/// Point-in-time metrics snapshot
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub logs_written: u64,
    pub write_failures: u64,
    pub silent_drops: u64,
    pub queries: u64,
    pub stream_events: u64,
    pub streams_opened: u64,
}

impl MetricsSnapshot {
    /// Share of attempted writes the store rejected.
    pub fn failure_rate(&self) -> f64 {
        let attempted = self.logs_written + self.write_failures;
        if attempted > 0 {
            self.write_failures as f64 / attempted as f64
        } else {
            0.0
        }
    }
}
