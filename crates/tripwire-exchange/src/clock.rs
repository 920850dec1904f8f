//! Monotonic millisecond timestamps for request signing.
//!
//! Venues reject a signed request whose timestamp is not newer than the
//! previous one, so concurrent signers draw from one shared source.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Trait for obtaining current time, enabling testability.
pub trait Clock: Send + Sync {
    /// Returns current time in milliseconds since Unix epoch.
    fn now_ms(&self) -> u64;
}

/// System clock implementation using real time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        chrono::Utc::now().timestamp_millis().max(0) as u64
    }
}

/// Issues `max(last + 1, now)` so timestamps never repeat or go backwards.
pub struct TimestampSource {
    last: AtomicU64,
    clock: Arc<dyn Clock>,
}

impl TimestampSource {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            last: AtomicU64::new(0),
            clock,
        }
    }

    pub fn system() -> Self {
        Self::new(Arc::new(SystemClock))
    }

    /// Thread-safe via CAS loop.
    pub fn next(&self) -> u64 {
        let now = self.clock.now_ms();
        loop {
            let current = self.last.load(Ordering::Acquire);
            let next_val = current.saturating_add(1).max(now);
            match self.last.compare_exchange_weak(
                current,
                next_val,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return next_val,
                Err(_) => continue,
            }
        }
    }
}
