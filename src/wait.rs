//! Bounded polling and throttle delays.
//!
//! Every wait in the scraper is a cooperative poll against a deadline: a
//! predicate is re-evaluated with growing pauses until it yields a value or
//! the deadline passes.

use crate::error::{Result, ScraperError};
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, Instant};

/// Geometric backoff between poll attempts, capped at `max`.
#[derive(Debug, Clone, Copy)]
pub struct Backoff {
    pub initial: Duration,
    pub max: Duration,
    pub factor: f64,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max: max.max(initial),
            factor: 1.5,
        }
    }

    /// A fixed interval, as used for the page-change checks.
    pub fn fixed(interval: Duration) -> Self {
        Self {
            initial: interval,
            max: interval,
            factor: 1.0,
        }
    }

    fn next(&self, current: Duration) -> Duration {
        current.mul_f64(self.factor).min(self.max)
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(Duration::from_millis(150), Duration::from_millis(500))
    }
}

/// Poll `predicate` until it returns `Some`, or fail with a timeout error.
///
/// The predicate is always evaluated at least once, even with a zero timeout.
pub async fn poll_until<T, F, Fut>(
    what: &str,
    timeout: Duration,
    backoff: Backoff,
    mut predicate: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Option<T>>,
{
    let deadline = Instant::now() + timeout;
    let mut pause = backoff.initial;
    loop {
        if let Some(value) = predicate().await {
            return Ok(value);
        }
        let now = Instant::now();
        if now >= deadline {
            return Err(ScraperError::Timeout {
                what: what.to_string(),
                secs: timeout.as_secs_f64(),
            });
        }
        sleep(pause.min(deadline - now)).await;
        pause = backoff.next(pause);
    }
}

/// A uniformly random duration in `[min, max]`.
pub fn jitter(min: Duration, max: Duration) -> Duration {
    if max <= min {
        return min;
    }
    let ms = rand::thread_rng().gen_range(min.as_millis() as u64..=max.as_millis() as u64);
    Duration::from_millis(ms)
}

/// Sleep for a random duration within the range.
pub async fn throttle((min, max): (Duration, Duration)) {
    sleep(jitter(min, max)).await;
}
