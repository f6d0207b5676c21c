use std::{future::Future, time::Duration};
use thiserror::Error;
use tokio::time::Instant;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Error)]
#[error("condition not met within {timeout:?} ({attempts} attempts)")]
pub struct PollTimeout {
    pub timeout: Duration,
    pub attempts: u32,
}

/// Repeatedly evaluate `condition` every `interval` until it returns `Some`, or `timeout` has
/// elapsed.
///
/// The condition is always evaluated at least once, and once more at the deadline.
pub async fn poll_until<T, F, Fut>(
    interval: Duration,
    timeout: Duration,
    mut condition: F,
) -> Result<T, PollTimeout>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Option<T>>,
{
    let deadline = Instant::now() + timeout;
    let mut attempts = 0;

    loop {
        attempts += 1;
        if let Some(output) = condition().await {
            return Ok(output);
        }

        let now = Instant::now();
        if now >= deadline {
            return Err(PollTimeout { timeout, attempts });
        }

        tokio::time::sleep_until(std::cmp::min(now + interval, deadline)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{
        Arc,
        atomic::{AtomicU32, Ordering},
    };

    #[tokio::test(start_paused = true)]
    async fn test_poll_until_succeeds_after_attempts() {
        let counter = Arc::new(AtomicU32::new(0));
        let start = Instant::now();

        let result = poll_until(Duration::from_millis(100), Duration::from_secs(4), || {
            let counter = Arc::clone(&counter);
            async move { (counter.fetch_add(1, Ordering::SeqCst) >= 2).then_some("ready") }
        })
        .await;

        assert_eq!(result, Ok("ready"));
        assert_eq!(counter.load(Ordering::SeqCst), 3);
        assert_eq!(start.elapsed(), Duration::from_millis(200));
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_until_times_out() {
        let start = Instant::now();

        let result = poll_until(Duration::from_millis(100), Duration::from_secs(4), || async {
            None::<()>
        })
        .await;

        assert_eq!(
            result,
            Err(PollTimeout {
                timeout: Duration::from_secs(4),
                attempts: 41
            })
        );
        assert_eq!(start.elapsed(), Duration::from_secs(4));
    }
}
