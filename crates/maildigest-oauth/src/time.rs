//! Wall-clock abstraction for token expiry decisions.
//!
//! Token lifetimes are stored as absolute epoch seconds, so the engine only
//! needs "now" as a UTC instant. Tests swap in [`MockClock`] to pin it.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, Duration, Utc};

/// Source of the current UTC time.
pub trait Clock: Send + Sync {
    /// Returns the current instant.
    fn now(&self) -> DateTime<Utc>;

    /// Current time as epoch seconds.
    fn epoch_seconds(&self) -> i64 {
        self.now().timestamp()
    }
}

/// System clock that uses real time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A settable clock for testing expiry logic.
///
/// # Example
///
/// ```
/// use maildigest_oauth::time::{Clock, MockClock};
/// use chrono::Duration;
///
/// let clock = MockClock::at(1_700_000_000);
/// clock.advance(Duration::seconds(30));
/// assert_eq!(clock.epoch_seconds(), 1_700_000_030);
/// ```
#[derive(Debug)]
pub struct MockClock {
    epoch: AtomicI64,
}

impl Default for MockClock {
    fn default() -> Self {
        Self::at(Utc::now().timestamp())
    }
}

impl MockClock {
    /// Creates a clock frozen at the given epoch second.
    #[must_use]
    pub const fn at(epoch: i64) -> Self {
        Self {
            epoch: AtomicI64::new(epoch),
        }
    }

    /// Creates a mock clock that can be shared across threads.
    #[must_use]
    pub fn shared(epoch: i64) -> Arc<Self> {
        Arc::new(Self::at(epoch))
    }

    /// Advances the clock.
    pub fn advance(&self, by: Duration) {
        self.epoch.fetch_add(by.num_seconds(), Ordering::SeqCst);
    }

    /// Jumps to an absolute epoch second.
    pub fn set(&self, epoch: i64) {
        self.epoch.store(epoch, Ordering::SeqCst);
    }
}

impl Clock for MockClock {
    fn now(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.epoch.load(Ordering::SeqCst), 0).unwrap_or_default()
    }
}

impl<C: Clock + ?Sized> Clock for Arc<C> {
    fn now(&self) -> DateTime<Utc> {
        self.as_ref().now()
    }
}
