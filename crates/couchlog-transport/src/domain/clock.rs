//! Write-time timestamps
//!
//! Every persisted log carries the instant it was written, formatted as an
//! RFC3339 UTC string with millisecond precision. That format sorts
//! lexicographically in time order, which the `byTimestamp` view relies on.

use chrono::{DateTime, SecondsFormat, Utc};

/// Source of the current instant (injectable for tests).
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Format an instant the way keys are stored in the index.
pub fn format_timestamp(instant: &DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Millis, true)
}
