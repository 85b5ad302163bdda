//! Retry with pluggable cool-off intervals.
//!
//! A backoff [`strategy`] is any `Iterator<Item = Duration>`; [`retry`] drives a
//! fallible async operation, sleeping for the next interval between attempts for
//! as long as the condition says the error is retryable. When the iterator is
//! exhausted the last error is returned to the caller.

use std::future::Future;
use std::time::Duration;

pub mod strategy;

/// Runs `operation` until it succeeds, the `can_retry` condition rejects the
/// error, or the `intervals` iterator runs dry.
///
/// The first run is not counted as a retry; an iterator yielding N intervals
/// allows N+1 runs in total.
pub async fn retry<I, T, E, F, Fut, C>(
    intervals: I,
    mut operation: F,
    can_retry: C,
) -> Result<T, E>
where
    I: IntoIterator<Item = Duration>,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    C: Fn(&E) -> bool,
{
    let mut intervals = intervals.into_iter();
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) if can_retry(&e) => match intervals.next() {
                Some(cool_off) => tokio::time::sleep(cool_off).await,
                None => return Err(e),
            },
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::future;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::strategy::Fixed;

    #[tokio::test]
    async fn successful_first_attempt() {
        let result: Result<u64, ()> =
            retry(Fixed::from_millis(1).take(3), || future::ready(Ok(42)), |_| {
                true
            })
            .await;
        assert_eq!(result, Ok(42));
    }

    #[tokio::test]
    async fn non_retryable_failure() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counted = Arc::clone(&attempts);
        let result: Result<(), &str> = retry(
            Fixed::from_millis(1).take(3),
            move || {
                counted.fetch_add(1, Ordering::SeqCst);
                future::ready(Err("boom"))
            },
            |_| false,
        )
        .await;
        assert_eq!(result, Err("boom"));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_until_exhaustion() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counted = Arc::clone(&attempts);
        let result: Result<(), usize> = retry(
            Fixed::from_millis(1).take(4),
            move || {
                let n = counted.fetch_add(1, Ordering::SeqCst);
                future::ready(Err(n + 1))
            },
            |_| true,
        )
        .await;
        // 4 intervals allow 5 runs in total
        assert_eq!(result, Err(5));
        assert_eq!(attempts.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn stops_when_condition_flips() {
        let result: Result<(), usize> = retry(
            Fixed::from_millis(1).take(10),
            {
                let attempts = AtomicUsize::new(0);
                move || future::ready(Err(attempts.fetch_add(1, Ordering::SeqCst) + 1))
            },
            |e| *e < 3,
        )
        .await;
        assert_eq!(result, Err(3));
    }
}
