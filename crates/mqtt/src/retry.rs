//! Fixed-delay retry policy for connection recovery.
//!
//! When a session fails, the supervisor waits a constant amount of time and
//! tries again, forever. The delay does not grow and there is no attempt cap:
//! the bridge's job is to be connected whenever the far side is reachable, and
//! a home broker or bridge that is down for an hour should be picked up the
//! moment it returns, not after a backoff schedule has stretched into minutes.
//!
//! The delay is the single tunable (default 5 seconds). Cancellation, not
//! exhaustion, is the way a retry loop ends.
//!
//! # Examples
//!
//! ```ignore
//! use std::time::Duration;
//! use hivebridge_mqtt::RetryPolicy;
//!
//! let mut retry = RetryPolicy::default();
//!
//! let delay = retry.next_sleep();
//! assert_eq!(delay, Duration::from_secs(5));
//!
//! // A healthy session resets the attempt counter
//! retry.reset();
//! assert_eq!(retry.attempt(), 0);
//! ```

use std::time::Duration;

/// Retry controller with a constant delay and no attempt limit.
///
/// Each failed attempt increments an internal counter, which exists only for
/// logging and diagnostics. `next_sleep()` always succeeds and always returns
/// the configured delay.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// The constant delay between attempts.
    delay: Duration,

    /// Count of attempted retries since the last reset (0 before the first).
    attempt: u32,
}

/// Default delay between reconnection attempts, in seconds.
pub const DEFAULT_RECONNECT_DELAY_SECS: u64 = 5;

impl RetryPolicy {
    /// Creates a policy with a custom delay.
    pub fn new(delay: Duration) -> Self {
        Self { delay, attempt: 0 }
    }

    /// Returns the delay before the next attempt and advances the counter.
    ///
    /// Never fails: the number of attempts is unbounded.
    pub fn next_sleep(&mut self) -> Duration {
        self.attempt += 1;
        self.delay
    }

    /// Resets the attempt counter.
    ///
    /// Call this when a session becomes healthy, so diagnostics count
    /// attempts per outage rather than per process lifetime.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    /// Current attempt count, incremented by `next_sleep()`.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// The configured delay.
    pub fn delay(&self) -> Duration {
        self.delay
    }
}

impl Default for RetryPolicy {
    /// Creates a policy with the 5-second default delay.
    fn default() -> Self {
        Self::new(Duration::from_secs(DEFAULT_RECONNECT_DELAY_SECS))
    }
}
