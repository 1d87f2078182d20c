//! Read-modify-write retry for optimistic-concurrency conflicts.

use std::future::Future;
use std::time::Duration;

use ingop_store::StoreError;
use tracing::debug;

/// Exponential backoff with jitter and a bounded number of attempts.
#[derive(Debug, Clone, PartialEq)]
pub struct Backoff {
    /// Maximum attempts, including the first one.
    pub steps: u32,
    /// Delay after the first failed attempt.
    pub duration: Duration,
    pub factor: f64,
    /// Each delay is stretched by up to `jitter * delay`.
    pub jitter: f64,
    pub cap: Option<Duration>,
}

impl Default for Backoff {
    /// The Kubernetes client default: 4 attempts, 10ms, x5, 10% jitter.
    fn default() -> Self {
        Self {
            steps: 4,
            duration: Duration::from_millis(10),
            factor: 5.0,
            jitter: 0.1,
            cap: None,
        }
    }
}

/// Ceiling for any single delay, whatever the factor and jitter say.
pub const MAX_DELAY: Duration = Duration::from_secs(60);

/// `d * by`, saturating at [`MAX_DELAY`]. Non-finite or non-positive
/// multipliers leave `d` unchanged.
fn scale(d: Duration, by: f64) -> Duration {
    if !by.is_finite() || by <= 0.0 {
        return d;
    }
    let secs = d.as_secs_f64() * by;
    if secs.is_finite() && secs < MAX_DELAY.as_secs_f64() {
        Duration::from_secs_f64(secs)
    } else {
        MAX_DELAY
    }
}

impl Backoff {
    fn jittered(&self, base: Duration) -> Duration {
        if self.jitter.is_nan() || self.jitter <= 0.0 {
            return base;
        }
        scale(base, 1.0 + rand::random::<f64>() * self.jitter)
    }

    fn grow(&self, current: Duration) -> Duration {
        let next = scale(current, self.factor.max(1.0));
        match self.cap {
            Some(cap) if next > cap => cap,
            _ => next,
        }
    }
}

/// Errors that can report an optimistic-concurrency conflict.
pub trait RetryableError {
    fn is_conflict(&self) -> bool;
}

impl RetryableError for StoreError {
    fn is_conflict(&self) -> bool {
        StoreError::is_conflict(self)
    }
}

/// Run `body` until it succeeds, fails with a non-conflict error, or the
/// backoff runs out of attempts; in the last case the final conflict is
/// returned.
///
/// `body` must re-read the object on every attempt: the version it wrote
/// with last time is stale once a conflict has been reported.
pub async fn retry_on_conflict<T, E, F, Fut>(
    backoff: &Backoff,
    mut body: F,
) -> Result<T, E>
where
    E: RetryableError + std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let steps = backoff.steps.max(1);
    let mut delay = backoff.duration;
    let mut attempt = 1;
    loop {
        match body().await {
            Err(e) if e.is_conflict() && attempt < steps => {
                let wait = backoff.jittered(delay);
                debug!(attempt, steps, ?wait, error = %e, "conflict; retrying with a fresh read");
                tokio::time::sleep(wait).await;
                delay = backoff.grow(delay);
                attempt += 1;
            }
            other => return other,
        }
    }
}
