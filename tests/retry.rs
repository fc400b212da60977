//! Retry discipline: attempt budgets, first-success short-circuit, permanent
//! failure handling.

use kubeboot::{ExecutionResult, RetryExecutor, RetryPolicy, TransportError};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

fn fast_policy(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        per_attempt_timeout_secs: 5,
        inter_attempt_delay_ms: 0,
    }
}

#[tokio::test]
async fn permanently_failing_operation_is_attempted_exactly_max_times() {
    let executor = RetryExecutor::new(fast_policy(3));
    let attempts = Arc::new(AtomicU32::new(0));

    let counter = Arc::clone(&attempts);
    let result = executor
        .run("install packages", move || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(ExecutionResult::command_failed(
                    7,
                    String::new(),
                    "disk full".to_string(),
                ))
            }
        })
        .await;

    assert_eq!(attempts.load(Ordering::SeqCst), 3);
    assert!(!result.success);
    // The final message records the attempt count and the last failure.
    assert!(result.message.contains("3 attempt"), "{}", result.message);
    assert!(result.message.contains("disk full"), "{}", result.message);
}

#[tokio::test]
async fn stops_at_first_success_with_that_attempts_result() {
    let executor = RetryExecutor::new(fast_policy(5));
    let attempts = Arc::new(AtomicU32::new(0));

    let counter = Arc::clone(&attempts);
    let result = executor
        .run("flaky op", move || {
            let counter = Arc::clone(&counter);
            async move {
                let attempt = counter.fetch_add(1, Ordering::SeqCst) + 1;
                if attempt < 3 {
                    Ok(ExecutionResult::command_failed(1, String::new(), String::new()))
                } else {
                    Ok(ExecutionResult::ok(format!("attempt-{}", attempt), String::new()))
                }
            }
        })
        .await;

    // Succeeded on attempt 3; no attempt 4 was made and the success result
    // came through unchanged.
    assert_eq!(attempts.load(Ordering::SeqCst), 3);
    assert!(result.success);
    assert_eq!(result.stdout, "attempt-3");
    assert!(result.message.is_empty());
}

#[tokio::test]
async fn authentication_failures_do_not_burn_the_remaining_budget() {
    let executor = RetryExecutor::new(fast_policy(3));
    let attempts = Arc::new(AtomicU32::new(0));

    let counter = Arc::clone(&attempts);
    let result = executor
        .run("connect", move || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(TransportError::Authentication {
                    host: "10.0.0.9:22".to_string(),
                    detail: "key rejected".to_string(),
                })
            }
        })
        .await;

    assert_eq!(attempts.load(Ordering::SeqCst), 1);
    assert!(!result.success);
    assert!(result.message.contains("1 attempt"), "{}", result.message);
    assert!(result.message.contains("key rejected"), "{}", result.message);
}

#[tokio::test]
async fn transient_transport_errors_are_retried() {
    let executor = RetryExecutor::new(fast_policy(3));
    let attempts = Arc::new(AtomicU32::new(0));

    let counter = Arc::clone(&attempts);
    let result = executor
        .run("connect", move || {
            let counter = Arc::clone(&counter);
            async move {
                let attempt = counter.fetch_add(1, Ordering::SeqCst) + 1;
                if attempt == 1 {
                    Err(TransportError::Connect {
                        host: "10.0.0.9:22".to_string(),
                        detail: "connection reset".to_string(),
                    })
                } else {
                    Ok(ExecutionResult::ok("ready".to_string(), String::new()))
                }
            }
        })
        .await;

    assert_eq!(attempts.load(Ordering::SeqCst), 2);
    assert!(result.success);
    assert_eq!(result.stdout, "ready");
}

#[tokio::test(start_paused = true)]
async fn hung_attempts_time_out_and_count_against_the_budget() {
    let executor = RetryExecutor::new(RetryPolicy {
        max_attempts: 2,
        per_attempt_timeout_secs: 1,
        inter_attempt_delay_ms: 100,
    });
    let attempts = Arc::new(AtomicU32::new(0));

    let counter = Arc::clone(&attempts);
    let result = executor
        .run("stuck command", move || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                std::future::pending::<Result<ExecutionResult, TransportError>>().await
            }
        })
        .await;

    assert_eq!(attempts.load(Ordering::SeqCst), 2);
    assert!(!result.success);
    assert!(result.message.contains("2 attempt"), "{}", result.message);
    assert!(result.message.contains("timeout"), "{}", result.message);
}
