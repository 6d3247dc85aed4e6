use std::future::Future;
use std::time::Duration;
use tokio::task::yield_now;
use tokio::time::sleep;

#[derive(Debug, Clone, Copy)]
pub(crate) struct RetryBackoff {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub max_attempts: usize,
}

impl RetryBackoff {
    pub(crate) fn new(initial_delay: Duration, max_delay: Duration, max_attempts: usize) -> Self {
        Self {
            initial_delay,
            max_delay,
            max_attempts: max_attempts.max(1),
        }
    }
}

/// Runs `operation` until it succeeds or `max_attempts` is spent, doubling
/// the delay between attempts up to `max_delay`. The last error is returned.
///
/// `on_retry` sees the failed attempt number, the delay before the next one,
/// the error, and whether another attempt will follow.
pub(crate) async fn retry_with_backoff<T, E, F, Fut, L>(
    config: RetryBackoff,
    mut operation: F,
    mut on_retry: L,
) -> Result<T, E>
where
    F: FnMut(usize) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    L: FnMut(usize, Duration, &E, bool),
{
    let mut attempt = 0;
    let mut backoff = config.initial_delay;

    loop {
        attempt += 1;

        match operation(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) => {
                let exhausted = attempt >= config.max_attempts;
                on_retry(attempt, backoff, &err, !exhausted);

                if exhausted {
                    return Err(err);
                }

                pause(backoff).await;
                backoff = next_backoff(backoff, config.max_delay);
            }
        }
    }
}

async fn pause(delay: Duration) {
    if delay.is_zero() {
        yield_now().await;
    } else {
        sleep(delay).await;
    }
}

fn next_backoff(current: Duration, max_backoff: Duration) -> Duration {
    if current.is_zero() {
        return max_backoff.min(Duration::from_millis(1));
    }

    current.saturating_mul(2).min(max_backoff)
}
