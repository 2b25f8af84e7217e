//! Wall-clock source for the engine, in epoch milliseconds.

use chrono::{DateTime, Utc};
use tokio::time::Instant;

pub trait Clock: Send + Sync + 'static {
    fn now_ms(&self) -> i64;
}

/// Reads the system UTC clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}

/// Epoch anchored to a `tokio::time::Instant`; advances with tokio's clock,
/// including when time is paused in tests.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    epoch_ms: i64,
    anchor: Instant,
}

impl MonotonicClock {
    pub fn starting_at(epoch_ms: i64) -> Self {
        Self {
            epoch_ms,
            anchor: Instant::now(),
        }
    }
}

impl Clock for MonotonicClock {
    fn now_ms(&self) -> i64 {
        self.epoch_ms + self.anchor.elapsed().as_millis() as i64
    }
}

/// Millisecond timestamp to `DateTime<Utc>`, clamping out-of-range values.
pub fn to_datetime(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or(DateTime::<Utc>::MIN_UTC)
}
