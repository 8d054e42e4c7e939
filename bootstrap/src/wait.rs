//! Bounded polling used by every readiness gate
//!
//! A condition is checked immediately and then once per interval until it
//! reports done, fails with a terminal error, or the deadline passes.
//! "Not done yet" and a retryable error are treated the same way.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::{BootstrapError, BootstrapResult};

/// Default interval between condition checks
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Poll `condition` until it returns `Ok(true)`.
///
/// Returns the first terminal error unchanged, or
/// [`BootstrapError::Timeout`] once `timeout` has elapsed. A condition call
/// that is still running at the deadline is abandoned, so the call returns
/// no later than `timeout + interval`.
pub async fn poll_immediate<F, Fut>(
    description: &str,
    interval: Duration,
    timeout: Duration,
    mut condition: F,
) -> BootstrapResult<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = BootstrapResult<bool>>,
{
    let deadline = Instant::now() + timeout;
    let mut attempt = 0u32;

    loop {
        attempt += 1;

        match tokio::time::timeout_at(deadline, condition()).await {
            Ok(Ok(true)) => {
                debug!(what = %description, attempt, "condition met");
                return Ok(());
            }
            Ok(Ok(false)) => {}
            Ok(Err(e)) if e.is_retryable() => {
                warn!(what = %description, attempt, error = %e, "retryable error while polling");
            }
            Ok(Err(e)) => return Err(e),
            Err(_) => return Err(BootstrapError::timeout(description, timeout)),
        }

        if Instant::now() >= deadline {
            return Err(BootstrapError::timeout(description, timeout));
        }

        tokio::time::sleep(interval).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_immediately() {
        let result = poll_immediate("ready", Duration::from_secs(1), Duration::from_secs(5), || async {
            Ok(true)
        })
        .await;
        assert!(result.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_once_condition_turns_true() {
        let count = Arc::new(AtomicU32::new(0));
        let c = count.clone();

        let result = poll_immediate("third time", Duration::from_secs(1), Duration::from_secs(30), || {
            let c = c.clone();
            async move { Ok(c.fetch_add(1, Ordering::SeqCst) >= 2) }
        })
        .await;

        assert!(result.is_ok());
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_times_out_within_timeout_plus_interval() {
        let interval = Duration::from_secs(2);
        let timeout = Duration::from_secs(10);
        let start = Instant::now();

        let result = poll_immediate("never", interval, timeout, || async { Ok(false) }).await;

        let elapsed = start.elapsed();
        assert!(matches!(result, Err(BootstrapError::Timeout { .. })));
        assert!(elapsed >= timeout);
        assert!(elapsed <= timeout + interval, "took {:?}", elapsed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_condition_is_cut_at_deadline() {
        let interval = Duration::from_secs(1);
        let timeout = Duration::from_secs(5);
        let start = Instant::now();

        let result = poll_immediate("hangs", interval, timeout, || async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(true)
        })
        .await;

        assert!(matches!(result, Err(BootstrapError::Timeout { .. })));
        assert!(start.elapsed() <= timeout + interval);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retryable_errors_keep_polling() {
        let count = Arc::new(AtomicU32::new(0));
        let c = count.clone();

        let result = poll_immediate("flaky", Duration::from_secs(1), Duration::from_secs(30), || {
            let c = c.clone();
            async move {
                if c.fetch_add(1, Ordering::SeqCst) < 3 {
                    Err(BootstrapError::transient("apiserver busy"))
                } else {
                    Ok(true)
                }
            }
        })
        .await;

        assert!(result.is_ok());
        assert_eq!(count.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_terminal_error_stops_immediately() {
        let count = Arc::new(AtomicU32::new(0));
        let c = count.clone();

        let result = poll_immediate("broken", Duration::from_secs(1), Duration::from_secs(30), || {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err(BootstrapError::ip_family("gone"))
            }
        })
        .await;

        assert!(matches!(result, Err(BootstrapError::IpFamily(_))));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
