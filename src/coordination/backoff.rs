use std::time::Duration;
use tokio::time::Instant;

use crate::config::{POLL_INITIAL_DELAY, POLL_MAX_DELAY};

/// Bounded exponential backoff schedule for polling the signal board
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        let initial = initial.min(max);
        Self {
            initial,
            max,
            current: initial,
        }
    }

    /// Delay before the next poll; doubles on every call up to the cap
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = (self.current * 2).min(self.max);
        delay
    }

    pub fn reset(&mut self) {
        self.current = self.initial;
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(POLL_INITIAL_DELAY, POLL_MAX_DELAY)
    }
}

/// Point in time a wait gives up at
///
/// Timeouts too large for the clock to represent mean the wait never expires.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    started: Instant,
    at: Option<Instant>,
}

impl Deadline {
    pub fn after(timeout: Duration) -> Self {
        let started = Instant::now();
        Self {
            started,
            at: started.checked_add(timeout),
        }
    }

    pub fn expired(&self) -> bool {
        self.at.is_some_and(|at| Instant::now() >= at)
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Shortens `delay` so a sleep does not overshoot the deadline
    pub fn cap(&self, delay: Duration) -> Duration {
        match self.at {
            Some(at) => delay.min(at.saturating_duration_since(Instant::now())),
            None => delay,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_doubles_up_to_cap() {
        let mut backoff = Backoff::new(Duration::from_millis(10), Duration::from_millis(50));
        assert_eq!(backoff.next_delay(), Duration::from_millis(10));
        assert_eq!(backoff.next_delay(), Duration::from_millis(20));
        assert_eq!(backoff.next_delay(), Duration::from_millis(40));
        assert_eq!(backoff.next_delay(), Duration::from_millis(50));
        assert_eq!(backoff.next_delay(), Duration::from_millis(50));

        backoff.reset();
        assert_eq!(backoff.next_delay(), Duration::from_millis(10));
    }

    #[test]
    fn test_initial_clamped_to_max() {
        let mut backoff = Backoff::new(Duration::from_secs(5), Duration::from_secs(1));
        assert_eq!(backoff.next_delay(), Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_expires_and_caps_sleeps() {
        let deadline = Deadline::after(Duration::from_millis(300));
        assert!(!deadline.expired());
        assert_eq!(deadline.cap(Duration::from_millis(100)), Duration::from_millis(100));
        assert_eq!(deadline.cap(Duration::from_secs(1)), Duration::from_millis(300));

        tokio::time::advance(Duration::from_millis(300)).await;
        assert!(deadline.expired());
        assert_eq!(deadline.cap(Duration::from_secs(1)), Duration::ZERO);
        assert!(deadline.elapsed() >= Duration::from_millis(300));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unrepresentable_timeout_never_expires() {
        let deadline = Deadline::after(Duration::MAX);
        assert!(!deadline.expired());
        assert_eq!(deadline.cap(Duration::from_millis(500)), Duration::from_millis(500));

        tokio::time::advance(Duration::from_secs(365 * 24 * 3600)).await;
        assert!(!deadline.expired());
    }
}
