//! Retry - bounded retry with exponential backoff
//!
//! Remote control planes are eventually consistent: a freshly attached IAM
//! role or a cluster that is still settling rejects calls for a while. An
//! operation is retried only while the caller's predicate classifies its
//! error as retryable and the timeout has not run out.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub multiplier: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_backoff: Duration::from_secs(2),
            max_backoff: Duration::from_secs(30),
            multiplier: 2,
        }
    }
}

#[derive(Debug)]
pub enum RetryError<E> {
    /// Time ran out while the error was still retryable
    Timeout { last: Option<E>, timeout: Duration },
    Cancelled,
    /// A non-retryable error
    Failed(E),
}

impl<E> RetryError<E> {
    pub fn is_timeout(&self) -> bool {
        matches!(self, RetryError::Timeout { .. })
    }
}

impl<E: fmt::Display> fmt::Display for RetryError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetryError::Timeout {
                last: Some(last),
                timeout,
            } => write!(f, "timeout after {:?}, last error: {}", timeout, last),
            RetryError::Timeout { last: None, timeout } => {
                write!(f, "timeout after {:?}", timeout)
            }
            RetryError::Cancelled => write!(f, "retry cancelled"),
            RetryError::Failed(e) => write!(f, "{}", e),
        }
    }
}

impl<E> std::error::Error for RetryError<E>
where
    E: std::error::Error + 'static,
{
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RetryError::Timeout { last: Some(e), .. } | RetryError::Failed(e) => Some(e),
            _ => None,
        }
    }
}

/// Run `op` until it succeeds, fails with a non-retryable error, or
/// `timeout` elapses.
pub async fn retry_when<T, E, F, Fut, P>(
    timeout: Duration,
    cancel: &CancellationToken,
    config: RetryConfig,
    mut op: F,
    retryable: P,
) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
    E: fmt::Display,
{
    let deadline = Instant::now() + timeout;
    let mut backoff = config.initial_backoff;
    let mut attempt = 1u32;

    loop {
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(RetryError::Cancelled),
            result = tokio::time::timeout_at(deadline, op()) => match result {
                Ok(result) => result,
                Err(_) => return Err(RetryError::Timeout { last: None, timeout }),
            },
        };

        let err = match result {
            Ok(value) => return Ok(value),
            Err(err) if retryable(&err) => err,
            Err(err) => return Err(RetryError::Failed(err)),
        };

        let wake = Instant::now() + backoff;
        if wake >= deadline {
            return Err(RetryError::Timeout {
                last: Some(err),
                timeout,
            });
        }
        log::debug!("attempt {} failed with retryable error, retrying in {:?}: {}", attempt, backoff, err);

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(RetryError::Cancelled),
            _ = tokio::time::sleep_until(wake) => {}
        }

        attempt += 1;
        backoff = std::cmp::min(backoff * config.multiplier.max(1), config.max_backoff);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    enum CallError {
        Busy,
        Denied,
    }

    impl fmt::Display for CallError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            match self {
                CallError::Busy => write!(f, "cluster is busy"),
                CallError::Denied => write!(f, "access denied"),
            }
        }
    }

    fn is_busy(e: &CallError) -> bool {
        *e == CallError::Busy
    }

    #[tokio::test(start_paused = true)]
    async fn retries_retryable_errors_until_success() {
        let cancel = CancellationToken::new();
        let mut calls = 0;
        let start = Instant::now();
        let value = retry_when(
            Duration::from_secs(60),
            &cancel,
            RetryConfig::default(),
            || {
                calls += 1;
                let outcome = if calls < 3 { Err(CallError::Busy) } else { Ok(calls) };
                std::future::ready(outcome)
            },
            is_busy,
        )
        .await
        .unwrap();

        assert_eq!(value, 3);
        // 2s + 4s of backoff
        assert_eq!(start.elapsed(), Duration::from_secs(6));
    }

    #[tokio::test(start_paused = true)]
    async fn non_retryable_error_fails_immediately() {
        let cancel = CancellationToken::new();
        let mut calls = 0;
        let err = retry_when(
            Duration::from_secs(60),
            &cancel,
            RetryConfig::default(),
            || {
                calls += 1;
                std::future::ready(Err::<(), _>(CallError::Denied))
            },
            is_busy,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, RetryError::Failed(CallError::Denied)));
        assert_eq!(calls, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_exhaustion_becomes_timeout() {
        let cancel = CancellationToken::new();
        let start = Instant::now();
        let err = retry_when(
            Duration::from_secs(20),
            &cancel,
            RetryConfig::default(),
            || std::future::ready(Err::<(), _>(CallError::Busy)),
            is_busy,
        )
        .await
        .unwrap_err();

        assert!(err.is_timeout());
        assert!(start.elapsed() <= Duration::from_secs(20));
        assert_eq!(
            err.to_string(),
            "timeout after 20s, last error: cluster is busy"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn backoff_is_capped() {
        let cancel = CancellationToken::new();
        let config = RetryConfig {
            initial_backoff: Duration::from_secs(10),
            max_backoff: Duration::from_secs(15),
            multiplier: 3,
        };
        let mut calls = 0;
        let start = Instant::now();
        retry_when(
            Duration::from_secs(120),
            &cancel,
            config,
            || {
                calls += 1;
                let outcome = if calls < 4 { Err(CallError::Busy) } else { Ok(()) };
                std::future::ready(outcome)
            },
            is_busy,
        )
        .await
        .unwrap();

        // 10s, then 15s twice
        assert_eq!(start.elapsed(), Duration::from_secs(40));
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_interrupts_backoff() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = retry_when(
            Duration::from_secs(60),
            &cancel,
            RetryConfig::default(),
            || std::future::ready(Err::<(), _>(CallError::Busy)),
            is_busy,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, RetryError::Cancelled));
    }
}
