//! Fixed-delay waits and opt-in retries

use probe_core::{ProbeError, Result};
use std::future::Future;
use std::time::Duration;
use tracing::{info, warn};

/// Pauses before a check that depends on asynchronous work on the server,
/// such as a row disappearing after a delete.
pub async fn wait_for(milliseconds: u64) {
    if milliseconds > 0 {
        info!("Waiting {}ms...", milliseconds);
        tokio::time::sleep(Duration::from_millis(milliseconds)).await;
    }
}

/// Runs `operation` up to `attempts` times with `delay` between failures.
/// The operation receives the 1-based attempt number.
pub async fn retry_operation<T, F, Fut>(attempts: u32, delay: Duration, mut operation: F) -> Result<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    if attempts == 0 {
        return Err(ProbeError::invalid("Max retries must be a positive integer"));
    }

    let mut last_error = None;
    for attempt in 1..=attempts {
        info!("Attempt {}/{}", attempt, attempts);
        match operation(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) => {
                warn!("Attempt {} failed: {}", attempt, e);
                last_error = Some(e);
                if attempt < attempts {
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    let last = last_error.map(|e| e.to_string()).unwrap_or_default();
    Err(ProbeError::Http {
        reason: format!(
            "Operation failed after {} attempts. Last error: {}",
            attempts, last
        ),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let result = retry_operation(3, Duration::from_millis(1), |attempt| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt < 3 {
                    Err(ProbeError::invalid("not yet"))
                } else {
                    Ok(attempt)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_reports_last_error_after_exhaustion() {
        let err = retry_operation::<(), _, _>(2, Duration::ZERO, |attempt| async move {
            Err(ProbeError::invalid(format!("boom {}", attempt)))
        })
        .await
        .unwrap_err();

        let message = err.to_string();
        assert!(message.contains("after 2 attempts"));
        assert!(message.contains("boom 2"));
    }

    #[tokio::test]
    async fn test_wait_for_sleeps() {
        let started = std::time::Instant::now();
        wait_for(0).await;
        wait_for(15).await;
        assert!(started.elapsed() >= Duration::from_millis(15));
    }

    #[tokio::test]
    async fn test_zero_attempts_is_invalid() {
        let err = retry_operation(0, Duration::ZERO, |_| async { Ok(()) })
            .await
            .unwrap_err();
        assert!(matches!(err, ProbeError::InvalidArgument { .. }));
    }
}
