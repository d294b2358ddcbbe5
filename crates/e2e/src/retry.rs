//! Bounded retry with fixed or exponential backoff

use std::future::Future;
use std::time::{Duration, Instant};

use tokio::time::sleep;

/// Polling schedule for [`retry`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    /// Delay after the first failed attempt
    pub initial: Duration,

    /// Upper bound on the delay between attempts
    pub max: Duration,

    /// Total time budget; no attempt starts after it elapses
    pub timeout: Duration,
}

impl Backoff {
    /// Poll on a fixed interval.
    pub fn fixed(interval: Duration, timeout: Duration) -> Self {
        Self {
            initial: interval,
            max: interval,
            timeout,
        }
    }

    /// Double the delay after each failure, capped at `max`.
    pub fn exponential(initial: Duration, max: Duration, timeout: Duration) -> Self {
        Self {
            initial,
            max: max.max(initial),
            timeout,
        }
    }

    fn next_delay(&self, current: Duration) -> Duration {
        current.saturating_mul(2).min(self.max)
    }
}

/// Retries were exhausted
#[derive(Debug)]
pub struct RetryError<E> {
    pub attempts: usize,
    pub last: E,
}

/// Run `op` until it succeeds or the backoff's timeout elapses.
///
/// At least one attempt is always made, even with a zero timeout.
pub async fn retry<T, E, F, Fut>(backoff: Backoff, mut op: F) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let start = Instant::now();
    let mut delay = backoff.initial;
    let mut attempts = 0;

    loop {
        attempts += 1;
        let last = match op().await {
            Ok(v) => return Ok(v),
            Err(e) => e,
        };

        let elapsed = start.elapsed();
        if elapsed >= backoff.timeout {
            return Err(RetryError { attempts, last });
        }

        sleep(delay.min(backoff.timeout - elapsed)).await;
        delay = backoff.next_delay(delay);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[tokio::test]
    async fn test_retry_succeeds_after_failures() {
        let calls = Cell::new(0);
        let result = retry(
            Backoff::fixed(Duration::from_millis(1), Duration::from_secs(5)),
            || {
                calls.set(calls.get() + 1);
                let n = calls.get();
                async move {
                    if n < 3 {
                        Err(n)
                    } else {
                        Ok(n)
                    }
                }
            },
        )
        .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.get(), 3);
    }

    #[tokio::test]
    async fn test_retry_reports_last_error() {
        let calls = Cell::new(0);
        let err = retry(
            Backoff::fixed(Duration::from_millis(5), Duration::from_millis(40)),
            || {
                calls.set(calls.get() + 1);
                let n = calls.get();
                async move { Err::<(), _>(format!("attempt {}", n)) }
            },
        )
        .await
        .unwrap_err();

        assert!(err.attempts >= 2);
        assert_eq!(err.attempts, calls.get());
        assert_eq!(err.last, format!("attempt {}", err.attempts));
    }

    #[tokio::test]
    async fn test_zero_timeout_still_attempts_once() {
        let err = retry(Backoff::fixed(Duration::ZERO, Duration::ZERO), || async {
            Err::<(), _>("nope")
        })
        .await
        .unwrap_err();
        assert_eq!(err.attempts, 1);
    }

    #[test]
    fn test_exponential_delay_is_capped() {
        let b = Backoff::exponential(
            Duration::from_millis(50),
            Duration::from_millis(300),
            Duration::from_secs(1),
        );
        let d1 = b.next_delay(b.initial);
        let d2 = b.next_delay(d1);
        let d3 = b.next_delay(d2);
        assert_eq!(d1, Duration::from_millis(100));
        assert_eq!(d2, Duration::from_millis(200));
        assert_eq!(d3, Duration::from_millis(300));
    }
}
