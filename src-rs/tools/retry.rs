use std::future::Future;
use std::time::Duration;

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use tracing::warn;

use crate::config::Settings;
use crate::error::AppError;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the first attempt (0 means a single attempt).
    pub max_retries: u32,
    pub initial_interval: Duration,
    pub max_interval: Duration,
    pub multiplier: f64,
    pub randomization_factor: f64,
    pub max_elapsed_time: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_interval: Duration::from_millis(200),
            max_interval: Duration::from_secs(5),
            multiplier: 2.0,
            randomization_factor: 0.2,
            max_elapsed_time: Some(Duration::from_secs(30)),
        }
    }
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            max_retries: settings.anomaly_detection_retries,
            initial_interval: settings.retry_initial_backoff,
            max_elapsed_time: Some(settings.retry_max_elapsed),
            ..Self::default()
        }
    }

    pub async fn execute<F, Fut, T, R>(
        &self,
        label: &str,
        mut operation: F,
        retryable: R,
    ) -> Result<T, AppError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, AppError>>,
        R: Fn(&AppError) -> bool,
    {
        let mut backoff = ExponentialBackoff {
            current_interval: self.initial_interval,
            initial_interval: self.initial_interval,
            max_interval: self.max_interval,
            multiplier: self.multiplier,
            randomization_factor: self.randomization_factor,
            max_elapsed_time: self.max_elapsed_time,
            ..ExponentialBackoff::default()
        };
        backoff.reset();

        let mut attempt: u32 = 0;
        loop {
            let err = match operation(attempt).await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };
            let attempts = attempt + 1;
            if !retryable(&err) || attempt >= self.max_retries {
                return Err(err.with_detail("attempts", attempts));
            }
            let delay = match backoff.next_backoff() {
                Some(delay) => delay,
                None => return Err(err.with_detail("attempts", attempts)),
            };
            warn!(
                operation = label,
                attempt = attempts,
                max_retries = self.max_retries,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "transient failure, retrying"
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}
