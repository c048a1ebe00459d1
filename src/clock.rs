//! Time source used to salt every token encoding.

use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Produces the salt for each token encoding.
///
/// A clock never has any say in whether a token is valid; it only makes sure
/// two encodings of the same verifier never produce the same bytes. Every call
/// to [`tick`](Clock::tick) on one instance must return a value that instance
/// has never returned before.
pub trait Clock: Send + Sync + Debug {
    /// Returns the next reading.
    fn tick(&self) -> u64;
}

/// Wall-clock nanoseconds since the Unix epoch, forced to be strictly
/// increasing.
///
/// If the system clock is coarse, stalls, or steps backwards, readings are
/// bumped to one past the previous one.
#[derive(Debug, Default)]
pub struct SystemClock {
    last: AtomicU64,
}

impl SystemClock {
    /// Creates a new clock.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            last: AtomicU64::new(0),
        }
    }

    fn now() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| u64::try_from(d.as_nanos()).unwrap_or(u64::MAX))
            .unwrap_or_default()
    }
}

impl Clock for SystemClock {
    fn tick(&self) -> u64 {
        let now = Self::now();
        let previous = self
            .last
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |last| {
                Some(now.max(last.wrapping_add(1)))
            })
            // The closure always returns `Some`.
            .unwrap_or_else(|last| last);
        now.max(previous.wrapping_add(1))
    }
}
