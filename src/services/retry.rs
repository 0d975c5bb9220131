// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Bounded retry with exponential backoff for remote calls.
//!
//! Every attempt runs under a timeout. Idempotent calls (list, fetch, delete)
//! are retried on transient failures. Writes are retried only when the
//! platform confirmed the previous attempt was not applied; a timed-out write
//! is reported as ambiguous and never repeated.

use crate::config::Config;
use crate::services::gateway::{GatewayError, WriteOutcome};
use std::future::Future;
use std::time::Duration;

/// Upper bound on a single backoff delay.
const MAX_BACKOFF: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(500),
            timeout: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_attempts: config.gateway_max_attempts.max(1),
            initial_backoff: config.gateway_initial_backoff,
            timeout: config.gateway_timeout,
        }
    }

    /// Delay before retry number `attempt` (1-based): `initial * 2^(attempt-1)`.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff
            .checked_mul(factor)
            .unwrap_or(MAX_BACKOFF)
            .min(MAX_BACKOFF)
    }

    /// Run one attempt under the timeout.
    async fn attempt<T, Fut>(&self, fut: Fut) -> Result<T, GatewayError>
    where
        Fut: Future<Output = Result<T, GatewayError>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(GatewayError::Timeout(self.timeout)),
        }
    }

    /// Run an idempotent call, retrying transient failures.
    pub async fn run_idempotent<T, F, Fut>(&self, op: &str, mut call: F) -> Result<T, GatewayError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, GatewayError>>,
    {
        let mut attempt = 1;
        loop {
            match self.attempt(call()).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < self.max_attempts => {
                    let delay = self.backoff_for(attempt);
                    tracing::warn!(
                        op,
                        attempt,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Retrying remote call"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    if e.is_retryable() {
                        tracing::warn!(op, attempts = attempt, error = %e, "Retries exhausted");
                    }
                    return Err(e);
                }
            }
        }
    }

    /// Run a non-idempotent write.
    ///
    /// Only `NotApplied` transient failures are retried. A timeout becomes
    /// `Ambiguous` because the request may have reached the platform.
    pub async fn run_write<T, F, Fut>(&self, op: &str, mut call: F) -> WriteOutcome<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = WriteOutcome<T>>,
    {
        let mut attempt = 1;
        loop {
            let outcome = match tokio::time::timeout(self.timeout, call()).await {
                Ok(outcome) => outcome,
                Err(_) => WriteOutcome::Ambiguous(GatewayError::Timeout(self.timeout)),
            };

            match outcome {
                WriteOutcome::NotApplied(e) if e.is_retryable() && attempt < self.max_attempts => {
                    let delay = self.backoff_for(attempt);
                    tracing::warn!(
                        op,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Write not applied, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                WriteOutcome::Ambiguous(e) => {
                    tracing::warn!(op, error = %e, "Write outcome unknown, not retrying");
                    return WriteOutcome::Ambiguous(e);
                }
                other => return other,
            }
        }
    }
}
