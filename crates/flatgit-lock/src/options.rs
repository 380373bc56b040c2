use std::time::{Duration, Instant};

/// Time between polls when no interval is configured.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// How long and how often a waiter polls.
///
/// With neither `timeout` nor `max_attempts` set, a waiter polls forever.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LockOptions {
    pub poll_interval: Duration,
    pub timeout: Option<Duration>,
    pub max_attempts: Option<u32>,
}

impl Default for LockOptions {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            timeout: None,
            max_attempts: None,
        }
    }
}

impl LockOptions {
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = Some(attempts);
        self
    }

    /// Whether a waiter that has polled `attempts` times since `started`
    /// should give up.
    pub(crate) fn exhausted(&self, attempts: u32, started: Instant) -> bool {
        self.max_attempts.is_some_and(|max| attempts >= max)
            || self.timeout.is_some_and(|timeout| started.elapsed() >= timeout)
    }

    /// Sleep before the next poll, never past the deadline.
    pub(crate) fn pause(&self, started: Instant) {
        let mut wait = self.poll_interval;
        if let Some(timeout) = self.timeout {
            wait = wait.min(timeout.saturating_sub(started.elapsed()));
        }
        std::thread::sleep(wait);
    }
}

/// How far the timestamp-ordering lock trusts the service's clock.
///
/// Ordering by service timestamps is only sound while those timestamps and
/// the listing agree. `Strict` at least refuses to queue when the marker's
/// timestamp is far from local time.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ClockPolicy {
    #[default]
    Trusting,
    Strict { max_skew: Duration },
}
