//! Subscription options.

use std::time::Duration;

use crate::equality::Equality;

/// Options for [`Store::subscribe_with`](crate::Store::subscribe_with).
///
/// # Defaults
///
/// - `run_now = true`: the listener is invoked immediately with the
///   current value, which also primes the equality gate.
/// - no throttle.
/// - [`Equality::Always`]: every `set` counts as a change.
#[derive(Clone)]
pub struct SubscribeOptions<T> {
    /// Invoke the listener with the current value at subscribe time.
    pub run_now: bool,

    /// Coalesce deliveries into a time window. Deliveries inside the
    /// window are deferred to its trailing edge and only the most recent
    /// value survives. The deferred delivery is scheduled on the ambient
    /// tokio runtime.
    pub throttle: Option<Duration>,

    /// Comparator deciding whether a delivery counts as a change relative
    /// to the last value actually delivered to this listener.
    pub equals: Equality<T>,
}

impl<T> SubscribeOptions<T> {
    pub fn run_now(mut self, run_now: bool) -> Self {
        self.run_now = run_now;
        self
    }

    pub fn throttle(mut self, window: Duration) -> Self {
        self.throttle = Some(window);
        self
    }

    pub fn equals(mut self, equals: Equality<T>) -> Self {
        self.equals = equals;
        self
    }
}

impl<T> Default for SubscribeOptions<T> {
    fn default() -> Self {
        Self {
            run_now: true,
            throttle: None,
            equals: Equality::Always,
        }
    }
}
