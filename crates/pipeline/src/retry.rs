//! Exponential backoff shared by downloads and uploads.

use crate::error::{Error, ErrorKind};
use std::future::Future;
use std::time::Duration;

/// How many times to try an operation, and how long to wait in between.
///
/// After failed attempt `k` (1-based) the delay before attempt `k + 1` is
/// `unit * base^k`. There is no jitter, and no delay after the final attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    base: u32,
    unit: Duration,
}

impl RetryPolicy {
    /// `max_attempts` is clamped to at least one.
    pub fn new(max_attempts: u32, base: u32, unit: Duration) -> Self {
        Self { max_attempts: max_attempts.max(1), base, unit }
    }

    /// Retry without ever sleeping.
    pub fn immediate(max_attempts: u32) -> Self {
        Self::new(max_attempts, 2, Duration::ZERO)
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay after failed attempt `attempt` before the next one starts.
    /// Saturates at [`Duration::MAX`].
    pub fn delay_after(&self, attempt: u32) -> Duration {
        if self.unit.is_zero() {
            return Duration::ZERO;
        }
        self.base
            .checked_pow(attempt)
            .and_then(|factor| self.unit.checked_mul(factor))
            .unwrap_or(Duration::MAX)
    }

    /// Run `operation` until it succeeds or the attempt budget is spent.
    ///
    /// The closure receives the 1-based attempt number. Every failure is
    /// retried; the caller decides what a failed attempt must clean up before
    /// returning its error.
    pub async fn run<T, F, Fut>(&self, what: &str, mut operation: F) -> Result<T, RetryState>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = crate::Result<T>>,
    {
        let mut state = RetryState::default();
        loop {
            state.attempts += 1;
            let error = match operation(state.attempts).await {
                Ok(value) => {
                    if state.attempts > 1 {
                        tracing::debug!(what, attempts = state.attempts, "Succeeded after retrying");
                    }
                    return Ok(value);
                },
                Err(error) => error,
            };
            let kind: &ErrorKind = &error;
            tracing::warn!(
                what,
                attempt = state.attempts,
                max_attempts = self.max_attempts,
                error = %kind,
                "Attempt failed"
            );
            state.last_error = Some(error);
            if state.attempts >= self.max_attempts {
                return Err(state);
            }
            let delay = self.delay_after(state.attempts);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }
    }
}

/// Book-keeping of one [`RetryPolicy::run`] call.
#[derive(Debug, Default)]
pub struct RetryState {
    attempts: u32,
    last_error: Option<Error>,
}

impl RetryState {
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn last_error(&self) -> Option<&Error> {
        self.last_error.as_ref()
    }

    /// Turn an exhausted retry loop into a single error. `kind` receives the
    /// number of attempts made and the message of the last failure.
    pub fn exhausted(self, kind: impl FnOnce(u32, String) -> ErrorKind) -> Error {
        let cause = self.last_error.as_ref().map(|e| (**e).to_string()).unwrap_or_default();
        let kind = kind(self.attempts, cause);
        match self.last_error {
            Some(error) => error.raise(kind),
            None => exn::Exn::from(kind),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[rstest]
    #[case(1, Duration::from_secs(2))]
    #[case(2, Duration::from_secs(4))]
    #[case(3, Duration::from_secs(8))]
    #[case(4, Duration::from_secs(16))]
    fn test_delay_is_base_to_the_attempt(#[case] attempt: u32, #[case] expected: Duration) {
        let policy = RetryPolicy::new(5, 2, Duration::from_secs(1));
        assert_eq!(policy.delay_after(attempt), expected);
    }

    #[rstest]
    #[case(10, 99)]
    #[case(2, 32)]
    #[case(u32::MAX, 2)]
    #[case(2, 2)]
    fn test_delay_saturates(#[case] base: u32, #[case] attempt: u32) {
        let policy = RetryPolicy::new(100, base, Duration::from_secs(u64::MAX / 2));
        assert_eq!(policy.delay_after(attempt), Duration::MAX);
    }

    #[test]
    fn test_zero_unit_never_sleeps() {
        assert_eq!(RetryPolicy::immediate(5).delay_after(40), Duration::ZERO);
    }

    #[test]
    fn test_zero_attempts_means_one() {
        assert_eq!(RetryPolicy::immediate(0).max_attempts(), 1);
    }

    #[tokio::test]
    async fn test_succeeds_on_third_attempt() {
        let calls = AtomicU32::new(0);
        let result = RetryPolicy::immediate(5)
            .run("test", |attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt < 3 {
                        exn::bail!(ErrorKind::Transient(format!("attempt {attempt}")));
                    }
                    Ok(attempt)
                }
            })
            .await;
        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhausted_after_exactly_max_attempts() {
        let calls = AtomicU32::new(0);
        let state = RetryPolicy::immediate(5)
            .run("test", |attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move { Err::<(), _>(exn::Exn::from(ErrorKind::Transient(format!("attempt {attempt}")))) }
            })
            .await
            .unwrap_err();
        assert_eq!(calls.load(Ordering::SeqCst), 5);
        assert_eq!(state.attempts(), 5);
        let err = state.exhausted(|attempts, cause| ErrorKind::Upload { key: "k".into(), attempts, cause });
        assert_eq!((*err).to_string(), "upload to k failed after 5 attempt(s): attempt 5");
    }

    #[tokio::test(start_paused = true)]
    async fn test_sleeps_between_attempts_but_not_after_the_last() {
        let start = tokio::time::Instant::now();
        let policy = RetryPolicy::new(3, 2, Duration::from_secs(1));
        let _ = policy
            .run("test", |_| async { Err::<(), _>(exn::Exn::from(ErrorKind::Transient("nope".into()))) })
            .await;
        // 2s after attempt 1, 4s after attempt 2, nothing after attempt 3.
        assert_eq!(start.elapsed(), Duration::from_secs(6));
    }
}
