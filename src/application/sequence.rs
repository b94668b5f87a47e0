use crate::domain::ports::{GeneratorError, SequenceGeneratorRef};
use crate::error::{BizError, ErrorCode, Result};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, info, warn};

/// Bounded exponential backoff for identifier generation.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total number of generator calls, the first one included.
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_millis(50),
            max_delay: Duration::from_secs(1),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// No waiting between attempts.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            multiplier: 1.0,
        }
    }

    /// Delay before retry number `retry` (0-based), capped at `max_delay`.
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        let delay_ms = self.initial_delay.as_millis() as f64 * self.multiplier.powi(retry as i32);
        let delay = Duration::from_millis(delay_ms as u64);
        delay.min(self.max_delay)
    }
}

/// Hands out identifiers from a [`SequenceGenerator`](crate::domain::ports::SequenceGenerator),
/// retrying transient backend failures.
pub struct SequenceDelegate {
    generator: SequenceGeneratorRef,
    policy: RetryPolicy,
}

impl SequenceDelegate {
    pub fn new(generator: SequenceGeneratorRef, policy: RetryPolicy) -> Self {
        Self { generator, policy }
    }

    pub async fn next_id(&self, key: &str) -> Result<i64> {
        let ids = self.next_batch(key, 1).await?;
        ids.first().copied().ok_or_else(|| {
            BizError::from(ErrorCode::IdGenerateFailed)
                .with_message("sequence returned no identifier")
                .into()
        })
    }

    /// Allocates `size` identifiers under `key`.
    ///
    /// Transient failures are retried until `max_attempts` calls have been made and
    /// then escalate to `ErrorCode::IdGenerateMaxRetry`. Any other failure, and an
    /// empty answer, fails at once with `ErrorCode::IdGenerateFailed`.
    pub async fn next_batch(&self, key: &str, size: usize) -> Result<Vec<i64>> {
        if key.trim().is_empty() {
            return Err(BizError::from(ErrorCode::InvalidParameter)
                .with_message("sequence key must not be blank")
                .into());
        }
        if size == 0 {
            return Err(BizError::from(ErrorCode::InvalidParameter)
                .with_message("batch size must be positive")
                .into());
        }

        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.generator.generate(key, size).await {
                Ok(ids) if ids.is_empty() => {
                    return Err(BizError::from(ErrorCode::IdGenerateFailed)
                        .with_message(format!("sequence {key} returned no identifiers"))
                        .into());
                }
                Ok(ids) => {
                    if attempt > 1 {
                        info!(key, attempt, "sequence generation succeeded after retry");
                    }
                    return Ok(ids);
                }
                Err(err) if err.is_transient() => {
                    if attempt >= max_attempts {
                        error!(key, attempt, error = %err, "sequence generation exhausted retries");
                        return Err(exhausted(key, attempt, err));
                    }
                    let delay = self.policy.delay_for_retry(attempt - 1);
                    warn!(
                        key,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "sequence generation failed, retrying"
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => {
                    warn!(key, error = %err, "sequence generation failed permanently");
                    return Err(BizError::from(ErrorCode::IdGenerateFailed)
                        .with_message(format!("sequence {key} failed: {err}"))
                        .with_cause(err)
                        .into());
                }
            }
        }
    }
}

fn exhausted(key: &str, attempts: u32, err: GeneratorError) -> crate::error::PaymentError {
    BizError::from(ErrorCode::IdGenerateMaxRetry)
        .with_message(format!("sequence {key} failed after {attempts} attempts"))
        .with_cause(err)
        .into()
}
