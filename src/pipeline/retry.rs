//! Retry policy and executor for model calls.
//!
//! One [`RetryPolicy`] parameterises every tier: the primary and the
//! secondary model run through the same [`RetryPolicy::execute`] loop with
//! independent attempt budgets. The fallback decision is a predicate on the
//! policy, not a branch duplicated per tier.
//!
//! ## Backoff
//!
//! `wait(attempt) = base · 2^attempt + U(0, jitter)`. With the defaults
//! (1500 ms base, 1000 ms jitter, 3 attempts) the waits between attempts are
//! ~1.5 s then ~3 s. No wait follows the final attempt: the caller either
//! falls back or gives up immediately.
//!
//! The `2^2` step (~6 s) is only reached with `max_attempts >= 4`. With the
//! defaults a tier spends at most ~6.5 s waiting, so a quota-driven fallback
//! run waits at most ~13 s in total rather than the ~21 s a wait after every
//! attempt would add up to.

use crate::config::AnalysisConfig;
use crate::error::ModelError;
use crate::progress::SessionProgressCallback;
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Attempt ceiling, backoff function and the two error predicates.
#[derive(Clone, Copy)]
pub struct RetryPolicy {
    /// Calls per tier, first call included.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_jitter: Duration,
    /// Which errors are worth another attempt on the same model.
    pub is_transient: fn(&ModelError) -> bool,
    /// Which exhaustion causes hand over to the secondary model.
    pub triggers_fallback: fn(&ModelError) -> bool,
}

impl std::fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .field("base_delay", &self.base_delay)
            .field("max_jitter", &self.max_jitter)
            .finish_non_exhaustive()
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(1500),
            max_jitter: Duration::from_millis(1000),
            is_transient: ModelError::is_transient,
            triggers_fallback: ModelError::is_quota,
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &AnalysisConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_millis(config.retry_base_delay_ms),
            max_jitter: Duration::from_millis(config.retry_jitter_ms),
            ..Self::default()
        }
    }

    /// Same predicates, no waiting. Useful for tests and batch replays.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay: Duration::ZERO,
            max_jitter: Duration::ZERO,
            ..Self::default()
        }
    }

    /// `base · 2^attempt`, saturating.
    pub fn nominal_backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor)
    }

    /// Nominal backoff plus uniform jitter in `[0, max_jitter]`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let jitter_ms = self.max_jitter.as_millis() as u64;
        let jitter = if jitter_ms == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=jitter_ms)
        };
        self.nominal_backoff(attempt) + Duration::from_millis(jitter)
    }

    pub fn should_fall_back(&self, err: &ModelError) -> bool {
        (self.triggers_fallback)(err)
    }

    /// Run `op` until it succeeds, fails permanently, or the budget runs out.
    ///
    /// `op` receives the 0-based attempt index. On exhaustion the last error
    /// is returned unchanged so the caller can apply the fallback predicate.
    pub async fn execute<T, F, Fut>(
        &self,
        model: &str,
        progress: &dyn SessionProgressCallback,
        mut op: F,
    ) -> Result<T, ModelError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, ModelError>>,
    {
        let mut attempt = 0;
        loop {
            debug!(model, attempt = attempt + 1, max = self.max_attempts, "calling model");
            progress.on_model_attempt(model, attempt + 1, self.max_attempts);

            let err = match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };

            let last = attempt + 1 >= self.max_attempts;
            if !(self.is_transient)(&err) || last {
                if (self.is_transient)(&err) {
                    warn!(model, attempts = attempt + 1, "retry budget exhausted: {err}");
                }
                return Err(err);
            }

            let wait = self.backoff(attempt);
            warn!(
                model,
                attempt = attempt + 1,
                wait_ms = wait.as_millis() as u64,
                "transient model error, retrying: {err}"
            );
            progress.on_retry_scheduled(model, attempt + 1, wait);
            sleep(wait).await;
            attempt += 1;
        }
    }
}
