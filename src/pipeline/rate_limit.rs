//! Fixed pause between units.

use std::time::Duration;

/// Sleeps a fixed delay after each unit, whatever its outcome.
///
/// The orchestrator does not call [`RateLimiter::pause`] after the final unit
/// of a run, since nothing follows it; every other unit is followed by the
/// full delay.
#[derive(Debug, Clone, Copy)]
pub struct RateLimiter {
    delay: Duration,
}

impl RateLimiter {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }

    pub fn from_secs(secs: u64) -> Self {
        Self::new(Duration::from_secs(secs))
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Pause after a unit.
    pub async fn pause(&self) {
        if self.delay.is_zero() {
            return;
        }
        tokio::time::sleep(self.delay).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::Instant;

    #[tokio::test(start_paused = true)]
    async fn test_pause_sleeps_delay() {
        let limiter = RateLimiter::from_secs(3);
        let started = Instant::now();
        limiter.pause().await;
        assert!(started.elapsed() >= Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_delay_does_not_sleep() {
        let limiter = RateLimiter::from_secs(0);
        assert!(limiter.delay().is_zero());
        let started = Instant::now();
        limiter.pause().await;
        assert_eq!(started.elapsed(), Duration::ZERO);
    }
}
