// dataload-core/src/storage/retry.rs

//! Exponential backoff for remote store requests.

use std::future::Future;
use std::time::Duration;

use rand::Rng;

use crate::config::S3Config;

/// How often and how patiently a failed request is retried.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub base_delay: Duration,
    /// Upper bound of a single backoff, before jitter.
    pub max_delay: Duration,
    pub multiplier: f64,
    /// Stretch each delay by a random factor in [1, 1.25).
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&S3Config::default())
    }
}

impl From<&S3Config> for RetryPolicy {
    fn from(config: &S3Config) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: Duration::from_millis(config.retry_delay_ms),
            max_delay: Duration::from_millis(config.max_retry_delay_ms),
            multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Backoff before retry number `retry` (0 is the first retry), or
    /// `None` once the retries are used up.
    pub fn backoff(&self, retry: u32) -> Option<Duration> {
        if retry >= self.max_retries {
            return None;
        }
        let exponent = i32::try_from(retry).unwrap_or(i32::MAX);
        let capped = self
            .base_delay
            .mul_f64(self.multiplier.powi(exponent))
            .min(self.max_delay);

        if self.jitter {
            Some(capped.mul_f64(rand::thread_rng().gen_range(1.0..1.25)))
        } else {
            Some(capped)
        }
    }
}

/// Runs `request` until it succeeds, fails with an error `is_transient`
/// rejects, or the policy gives up. The last error is returned.
pub async fn with_retries<T, E, F, Fut>(
    policy: &RetryPolicy,
    is_transient: impl Fn(&E) -> bool,
    mut request: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut retry = 0;
    loop {
        let err = match request().await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };
        if !is_transient(&err) {
            return Err(err);
        }
        let Some(delay) = policy.backoff(retry) else {
            return Err(err);
        };

        tracing::debug!(retry, ?delay, "retrying store request");
        tokio::time::sleep(delay).await;
        retry += 1;
    }
}
