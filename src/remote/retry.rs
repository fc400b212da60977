//! Bounded-attempt retry around a single remote operation.

use crate::config::RetryPolicy;
use crate::error::TransportError;
use crate::remote::types::ExecutionResult;
use std::future::Future;
use tokio::time::{sleep, timeout};

/// Wraps a zero-argument operation producing an [`ExecutionResult`] —
/// typically "reconnect and run from scratch" — with bounded-attempt retry
/// and a fixed inter-attempt delay.
///
/// Because every attempt re-establishes its connection and replays the whole
/// operation, operations routed through here must be safe to re-execute from
/// scratch. That is a correctness precondition on the scripts and commands,
/// not something this executor can enforce.
pub struct RetryExecutor {
    policy: RetryPolicy,
}

impl RetryExecutor {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run `op` until it succeeds or the attempt budget is spent. Transport
    /// errors and failed results are treated alike, with one exception:
    /// permanent failures (rejected credentials) stop immediately instead of
    /// burning the remaining budget.
    ///
    /// Returns the first successful result unchanged; on exhaustion, a
    /// synthetic failed result whose message records the attempt count and
    /// the last underlying failure.
    pub async fn run<F, Fut>(&self, label: &str, mut op: F) -> ExecutionResult
    where
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = Result<ExecutionResult, TransportError>> + Send,
    {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut last_result: Option<ExecutionResult> = None;
        let mut last_detail = String::new();
        let mut attempts_made = 0;

        for attempt in 1..=max_attempts {
            attempts_made = attempt;

            match timeout(self.policy.per_attempt_timeout(), op()).await {
                Ok(Ok(result)) if result.success => {
                    if attempt > 1 {
                        tracing::info!(
                            "[RetryExecutor] '{}' succeeded on attempt {}/{}",
                            label,
                            attempt,
                            max_attempts
                        );
                    }
                    return result;
                }
                Ok(Ok(result)) => {
                    last_detail = result.failure_detail();
                    tracing::warn!(
                        "[RetryExecutor] '{}' attempt {}/{} failed: {}",
                        label,
                        attempt,
                        max_attempts,
                        last_detail
                    );
                    last_result = Some(result);
                }
                Ok(Err(transport)) => {
                    last_detail = transport.to_string();
                    tracing::warn!(
                        "[RetryExecutor] '{}' attempt {}/{} failed: {}",
                        label,
                        attempt,
                        max_attempts,
                        last_detail
                    );
                    if transport.is_permanent() {
                        tracing::error!(
                            "[RetryExecutor] '{}' failed permanently, not retrying",
                            label
                        );
                        break;
                    }
                }
                Err(_) => {
                    let result = ExecutionResult::timed_out(self.policy.per_attempt_timeout());
                    last_detail = result.message.clone();
                    tracing::warn!(
                        "[RetryExecutor] '{}' attempt {}/{} {}",
                        label,
                        attempt,
                        max_attempts,
                        last_detail
                    );
                    last_result = Some(result);
                }
            }

            if attempt < max_attempts {
                sleep(self.policy.inter_attempt_delay()).await;
            }
        }

        // Exhausted. Keep the last attempt's captured output around, with a
        // message recording the attempt count and the final failure.
        let mut result = last_result.unwrap_or_else(|| ExecutionResult {
            success: false,
            exit_code: -1,
            stdout: String::new(),
            stderr: String::new(),
            message: String::new(),
        });
        result.success = false;
        result.message = format!(
            "'{}' failed after {} attempt(s): {}",
            label, attempts_made, last_detail
        );
        result
    }
}
