use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Running counters shared by every worker of one handler.
#[derive(Debug, Default)]
pub(crate) struct HandlerCounters {
    received: AtomicU64,
    processed: AtomicU64,
    failed: AtomicU64,
    retries: AtomicU64,
}

impl HandlerCounters {
    pub(crate) fn record_received(&self) {
        self.received.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_processed(&self) {
        self.processed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_retry(&self) {
        self.retries.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self, message_type: &'static str, channel: &str) -> HandlerStats {
        HandlerStats {
            message_type,
            channel: channel.to_string(),
            total_received: self.received.load(Ordering::Relaxed),
            total_processed: self.processed.load(Ordering::Relaxed),
            total_failed: self.failed.load(Ordering::Relaxed),
            total_retries: self.retries.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time view of one handler's counters.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct HandlerStats {
    /// Type tag of the handled message.
    pub message_type: &'static str,
    /// Channel the handler listens on.
    pub channel: String,
    /// Messages taken off the handler's queues.
    pub total_received: u64,
    /// Messages processed successfully.
    pub total_processed: u64,
    /// Messages that failed every attempt or could not be decoded.
    pub total_failed: u64,
    /// Attempts beyond the first.
    pub total_retries: u64,
}

impl fmt::Display for HandlerStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}@{}: received={} processed={} failed={} retries={}",
            self.message_type,
            self.channel,
            self.total_received,
            self.total_processed,
            self.total_failed,
            self.total_retries
        )
    }
}
