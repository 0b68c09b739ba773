use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::config::{MAX_RETRIES, RETRY_BACKOFF_SECS};
use crate::error::Result;

/// Bounded retries with linear backoff: the n-th failure sleeps n × `backoff`.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: MAX_RETRIES,
            backoff: Duration::from_secs(RETRY_BACKOFF_SECS),
        }
    }
}

impl RetryPolicy {
    pub fn no_backoff(attempts: u32) -> Self {
        Self { attempts, backoff: Duration::ZERO }
    }

    /// Runs `op` until it succeeds or attempts run out; returns the last error.
    pub async fn run<T, F, Fut>(&self, label: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let attempts = self.attempts.max(1);
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if attempt >= attempts => return Err(e),
                Err(e) => {
                    let wait = self.backoff * attempt;
                    warn!("{label} failed (attempt {attempt}/{attempts}): {e}; retrying in {:.0}s", wait.as_secs_f64());
                    tokio::time::sleep(wait).await;
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn stops_at_first_success() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result = RetryPolicy::no_backoff(3)
            .run("op", move || async move {
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                if n < 2 {
                    Err(AppError::Generation("busy".to_string()))
                } else {
                    Ok(n)
                }
            })
            .await;
        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn gives_up_after_the_last_attempt() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result: Result<()> = RetryPolicy::no_backoff(3)
            .run("op", move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(AppError::Publish("refused".to_string()))
            })
            .await;
        assert!(matches!(result, Err(AppError::Publish(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn backoff_grows_linearly() {
        let started = tokio::time::Instant::now();
        let _: Result<()> = RetryPolicy { attempts: 3, backoff: Duration::from_secs(10) }
            .run("op", || async { Err(AppError::Generation("down".to_string())) })
            .await;
        // 10s after the first failure, 20s after the second
        assert_eq!(started.elapsed().as_secs(), 30);
    }
}
