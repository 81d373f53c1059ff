//! Bounded retry with jittered backoff, used around conflicting writes.

use crate::error::CrdbError;
use rand::Rng;
use std::future::Future;
use std::time::Duration;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Backoff {
    /// Total attempts, the first included.
    pub steps: u32,
    pub duration: Duration,
    pub factor: f64,
    pub jitter: f64,
}

/// Five quick attempts 10ms apart; for read-modify-write conflicts.
pub const DEFAULT_RETRY: Backoff = Backoff { steps: 5, duration: Duration::from_millis(10), factor: 1.0, jitter: 0.1 };

/// Four attempts growing 10ms, 50ms, 250ms.
pub const DEFAULT_BACKOFF: Backoff = Backoff { steps: 4, duration: Duration::from_millis(10), factor: 5.0, jitter: 0.1 };

fn scale(d: Duration, by: f64) -> Duration {
    Duration::from_nanos((d.as_nanos() as f64 * by).round() as u64)
}

/// Attempt counter for a retry loop.
#[derive(Debug)]
pub struct Retrier {
    backoff: Backoff,
    attempt: u32,
    delay: Duration,
}

impl Retrier {
    pub fn new(backoff: Backoff) -> Self {
        Retrier { backoff, attempt: 1, delay: backoff.duration }
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Sleep before the next attempt. Returns false, without sleeping, once attempts are used up.
    pub async fn wait(&mut self) -> bool {
        if self.attempt >= self.backoff.steps {
            return false;
        }
        let mut wait = self.delay;
        if self.backoff.jitter > 0.0 {
            let extra = rand::thread_rng().gen_range(0.0..1.0) * self.backoff.jitter;
            wait += scale(self.delay, extra);
        }
        tokio::time::sleep(wait).await;
        self.delay = scale(self.delay, self.backoff.factor.max(1.0));
        self.attempt += 1;
        true
    }
}

/// Run `op` until it succeeds, fails with an error `retriable` rejects, or attempts run out.
pub async fn retry_on<T, F, Fut, P>(backoff: Backoff, retriable: P, mut op: F) -> Result<T, CrdbError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, CrdbError>>,
    P: Fn(&CrdbError) -> bool,
{
    let mut retrier = Retrier::new(backoff);
    loop {
        match op().await {
            Err(e) if retriable(&e) => {
                tracing::debug!(attempt = retrier.attempt(), error = %e, "retrying");
                if !retrier.wait().await {
                    return Err(e);
                }
            }
            other => return other,
        }
    }
}

pub async fn retry_on_conflict<T, F, Fut>(backoff: Backoff, op: F) -> Result<T, CrdbError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, CrdbError>>,
{
    retry_on(backoff, CrdbError::is_conflict, op).await
}
