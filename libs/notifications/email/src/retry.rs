//! Fixed-delay retries that stop on a cancellation signal.
//!
//! Cancellation is a `watch::Receiver<bool>`; `true` means stop. It is checked
//! before every attempt and watched during the pause between attempts. An
//! attempt that is already running is never interrupted.

use std::fmt;
use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Default number of attempts per send
pub const DEFAULT_ATTEMPTS: usize = 5;

/// Default pause between attempts
pub const DEFAULT_DELAY: Duration = Duration::from_millis(250);

/// Outcome of a run that didn't succeed
#[derive(Debug)]
pub enum RetryError<E> {
    /// Cancellation was observed before an attempt or during a pause
    Cancelled,
    /// Every attempt failed; holds the last error
    Failed(E),
}

impl<E: fmt::Display> fmt::Display for RetryError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cancelled => write!(f, "canceled"),
            Self::Failed(e) => write!(f, "{}", e),
        }
    }
}

/// Retry policy: a fixed number of attempts separated by a fixed delay
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Repeater {
    /// Maximum number of attempts, at least one is always made
    pub attempts: usize,
    /// Pause between attempts
    pub delay: Duration,
}

impl Repeater {
    /// Create a repeater with defaults: 5 attempts, 250ms apart
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_attempts(mut self, attempts: usize) -> Self {
        self.attempts = attempts;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Run `operation` until it succeeds, attempts run out, or `cancel` flips
    /// to `true`. The operation receives the 1-based attempt number.
    ///
    /// If the sender side of `cancel` is dropped the run can no longer be
    /// cancelled and simply continues.
    pub async fn run<F, Fut, T, E>(
        &self,
        cancel: &watch::Receiver<bool>,
        mut operation: F,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut(usize) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        let attempts = self.attempts.max(1);
        let mut cancel = cancel.clone();
        let mut attempt = 0;

        loop {
            if is_cancelled(&cancel) {
                return Err(RetryError::Cancelled);
            }

            attempt += 1;
            match operation(attempt).await {
                Ok(result) => {
                    if attempt > 1 {
                        debug!("Operation succeeded after {} retries", attempt - 1);
                    }
                    return Ok(result);
                }
                Err(e) => {
                    if attempt >= attempts {
                        warn!("Operation failed after {} attempts: {}", attempts, e);
                        return Err(RetryError::Failed(e));
                    }

                    debug!(
                        "Operation failed (attempt {}/{}): {}. Retrying in {:?}...",
                        attempt, attempts, e, self.delay
                    );

                    if !self.pause(&mut cancel).await {
                        return Err(RetryError::Cancelled);
                    }
                }
            }
        }
    }

    /// Wait out the delay. Returns `false` if cancellation arrived first.
    async fn pause(&self, cancel: &mut watch::Receiver<bool>) -> bool {
        if is_cancelled(cancel) {
            return false;
        }

        let deadline = Instant::now() + self.delay;
        loop {
            tokio::select! {
                _ = tokio::time::sleep_until(deadline) => return true,
                changed = cancel.changed() => {
                    if changed.is_err() {
                        // sender gone, nobody can cancel anymore
                        tokio::time::sleep_until(deadline).await;
                        return true;
                    }
                    if *cancel.borrow() {
                        return false;
                    }
                }
            }
        }
    }
}

impl Default for Repeater {
    fn default() -> Self {
        Self {
            attempts: DEFAULT_ATTEMPTS,
            delay: DEFAULT_DELAY,
        }
    }
}

fn is_cancelled(cancel: &watch::Receiver<bool>) -> bool {
    *cancel.borrow()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn failing_until(ok_at: usize, calls: Arc<AtomicUsize>) -> impl FnMut(usize) -> std::future::Ready<Result<usize, String>> {
        move |attempt| {
            calls.fetch_add(1, Ordering::SeqCst);
            std::future::ready(if attempt >= ok_at {
                Ok(attempt)
            } else {
                Err(format!("attempt {} failed", attempt))
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_attempt_succeeds() {
        let (_tx, rx) = watch::channel(false);
        let calls = Arc::new(AtomicUsize::new(0));

        let result = Repeater::new().run(&rx, failing_until(1, calls.clone())).await;

        assert_eq!(result.unwrap(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_after_retries_with_delay() {
        let (_tx, rx) = watch::channel(false);
        let calls = Arc::new(AtomicUsize::new(0));
        let start = Instant::now();

        let result = Repeater::new().run(&rx, failing_until(4, calls.clone())).await;

        assert_eq!(result.unwrap(), 4);
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert!(start.elapsed() >= DEFAULT_DELAY * 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_returns_last_error_when_exhausted() {
        let (_tx, rx) = watch::channel(false);
        let calls = Arc::new(AtomicUsize::new(0));

        let result = Repeater::new()
            .run(&rx, failing_until(usize::MAX, calls.clone()))
            .await;

        match result {
            Err(RetryError::Failed(e)) => assert_eq!(e, "attempt 5 failed"),
            other => panic!("unexpected result: {:?}", other),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_attempts_still_tries_once() {
        let (_tx, rx) = watch::channel(false);
        let calls = Arc::new(AtomicUsize::new(0));

        let result = Repeater::new()
            .with_attempts(0)
            .run(&rx, failing_until(usize::MAX, calls.clone()))
            .await;

        assert!(matches!(result, Err(RetryError::Failed(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_before_first_attempt() {
        let (_tx, rx) = watch::channel(true);
        let calls = Arc::new(AtomicUsize::new(0));

        let result = Repeater::new().run(&rx, failing_until(1, calls.clone())).await;

        assert!(matches!(result, Err(RetryError::Cancelled)));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_during_pause() {
        let (tx, rx) = watch::channel(false);
        let calls = Arc::new(AtomicUsize::new(0));
        let start = Instant::now();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            let _ = tx.send(true);
        });

        let result = Repeater::new()
            .run(&rx, failing_until(usize::MAX, calls.clone()))
            .await;

        assert!(matches!(result, Err(RetryError::Cancelled)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(start.elapsed() < DEFAULT_DELAY);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_sender_keeps_retrying() {
        let (tx, rx) = watch::channel(false);
        drop(tx);
        let calls = Arc::new(AtomicUsize::new(0));
        let start = Instant::now();

        let result = Repeater::new()
            .with_delay(Duration::from_millis(50))
            .run(&rx, failing_until(3, calls.clone()))
            .await;

        assert_eq!(result.unwrap(), 3);
        assert!(start.elapsed() >= Duration::from_millis(100));
    }

    #[test]
    fn test_retry_error_display() {
        let failed: RetryError<String> = RetryError::Failed("boom".to_string());
        assert_eq!(failed.to_string(), "boom");
        assert_eq!(RetryError::<String>::Cancelled.to_string(), "canceled");
    }
}
