//! Clock abstraction for determinism.

use chrono::{DateTime, Duration, Utc};

/// Abstraction over system time for deterministic behavior.
pub trait Clock: Send + Sync {
    /// Returns the current time.
    fn now(&self) -> DateTime<Utc>;

    /// Returns the instant that lies `age` before now. Anything stamped
    /// earlier than the returned cutoff is older than `age`.
    fn cutoff(&self, age: Duration) -> DateTime<Utc> {
        self.now() - age
    }
}

/// Production clock that delegates to the system clock.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
