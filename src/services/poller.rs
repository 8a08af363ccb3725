use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

/// Vendor job state normalized by the client layer. Clients map malformed or
/// field-missing responses to `Failed` before this type is produced, so the
/// poll loop only ever sees a clean tri-state.
#[derive(Debug, Clone, PartialEq)]
pub enum RawStatus {
    Pending,
    Completed(String),
    Failed,
}

/// Terminal outcome of one bounded poll loop.
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    Completed(String),
    Failed,
    TimedOut,
}

/// Check an external job's status up to `max_attempts` times, sleeping
/// `interval` after each non-terminal check. Terminal statuses return
/// immediately; an exhausted budget returns `TimedOut`. Errors from the
/// check call (network, vendor 5xx) propagate to the caller, which owns
/// retry of the whole start+poll cycle.
pub async fn poll<F, Fut, E>(
    mut check: F,
    interval: Duration,
    max_attempts: u32,
) -> Result<PollOutcome, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<RawStatus, E>>,
{
    for attempt in 0..max_attempts {
        match check().await? {
            RawStatus::Completed(locator) => return Ok(PollOutcome::Completed(locator)),
            RawStatus::Failed => return Ok(PollOutcome::Failed),
            RawStatus::Pending => {
                tracing::trace!(attempt, "job still pending");
                if attempt + 1 < max_attempts {
                    sleep(interval).await;
                }
            }
        }
    }
    Ok(PollOutcome::TimedOut)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::Infallible;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_returns_completed_immediately() {
        let calls = AtomicU32::new(0);
        let outcome = poll(
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok::<_, Infallible>(RawStatus::Completed("path/img.jpg".into())) }
            },
            Duration::from_secs(60),
            15,
        )
        .await
        .unwrap();
        assert_eq!(outcome, PollOutcome::Completed("path/img.jpg".into()));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_returns_failed_immediately() {
        let outcome = poll(
            || async { Ok::<_, Infallible>(RawStatus::Failed) },
            Duration::from_millis(1),
            15,
        )
        .await
        .unwrap();
        assert_eq!(outcome, PollOutcome::Failed);
    }

    #[tokio::test]
    async fn test_always_pending_times_out_after_exact_budget() {
        let calls = AtomicU32::new(0);
        let outcome = poll(
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok::<_, Infallible>(RawStatus::Pending) }
            },
            Duration::from_millis(0),
            7,
        )
        .await
        .unwrap();
        assert_eq!(outcome, PollOutcome::TimedOut);
        assert_eq!(calls.load(Ordering::SeqCst), 7);
    }

    #[tokio::test]
    async fn test_completes_after_pending_run() {
        let calls = AtomicU32::new(0);
        let outcome = poll(
            || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 3 {
                        Ok::<_, Infallible>(RawStatus::Pending)
                    } else {
                        Ok(RawStatus::Completed("done".into()))
                    }
                }
            },
            Duration::from_millis(0),
            10,
        )
        .await
        .unwrap();
        assert_eq!(outcome, PollOutcome::Completed("done".into()));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_check_error_propagates() {
        let result: Result<PollOutcome, &str> = poll(
            || async { Err("connection reset") },
            Duration::from_millis(1),
            5,
        )
        .await;
        assert_eq!(result.unwrap_err(), "connection reset");
    }
}
