use np_domain::error::Result;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Run `fut_fn` up to `attempts` times with exponential back-off,
/// starting at `delay` and multiplying by `backoff` after each failure.
/// The last failure is returned if every attempt is exhausted.
///
/// `fut_fn` is called fresh on every attempt since a `Future` can only
/// be polled to completion once.
pub async fn with_retry<F, Fut, T>(attempts: u32, delay: Duration, backoff: f64, mut fut_fn: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut current_delay = delay;
    let mut last_err = None;
    for attempt in 1..=attempts.max(1) {
        match fut_fn().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                warn!(attempt, %e, "provider call failed, retrying");
                last_err = Some(e);
                if attempt < attempts {
                    tokio::time::sleep(current_delay).await;
                    current_delay = current_delay.mul_f64(backoff);
                }
            }
        }
    }
    Err(last_err.expect("at least one attempt always runs"))
}

/// The standard retry policy used by every external-provider client:
/// 3 attempts, 1.0s initial delay, 2.0x back-off.
pub async fn with_default_retry<F, Fut, T>(fut_fn: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    with_retry(3, Duration::from_secs(1), 2.0, fut_fn).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn succeeds_immediately_without_retry() {
        let calls = AtomicU32::new(0);
        let result = with_retry(3, Duration::from_millis(1), 2.0, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok::<_, np_domain::error::Error>(42) }
        })
        .await
        .unwrap();
        assert_eq!(result, 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_until_success() {
        let calls = AtomicU32::new(0);
        let result = with_retry(3, Duration::from_millis(1), 2.0, || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(np_domain::error::Error::Other("transient".into()))
                } else {
                    Ok(7)
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(result, 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhausts_attempts_and_returns_last_error() {
        let calls = AtomicU32::new(0);
        let result: Result<i32> = with_retry(3, Duration::from_millis(1), 2.0, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(np_domain::error::Error::Other("permanent".into())) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
