//! Write timestamps for recency ordering.

use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, Utc};

/// Hands out strictly increasing unix-microsecond timestamps
///
/// Two writes never share a timestamp, even within the same microsecond
/// or when the wall clock steps backwards.
#[derive(Debug)]
pub struct RecencyClock {
    last: AtomicI64,
}

impl RecencyClock {
    /// Start after `floor`, usually the newest timestamp already stored
    #[must_use]
    pub const fn starting_after(floor: i64) -> Self {
        Self {
            last: AtomicI64::new(floor),
        }
    }

    /// Next timestamp, greater than every one handed out before
    pub fn next_micros(&self) -> i64 {
        let now = Utc::now().timestamp_micros();
        let mut prev = self.last.load(Ordering::Relaxed);
        loop {
            let next = now.max(prev + 1);
            match self
                .last
                .compare_exchange_weak(prev, next, Ordering::AcqRel, Ordering::Relaxed)
            {
                Ok(_) => return next,
                Err(actual) => prev = actual,
            }
        }
    }
}

/// Convert a stored timestamp back into a `DateTime`
#[must_use]
pub fn from_micros(micros: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_micros(micros).unwrap_or_default()
}
