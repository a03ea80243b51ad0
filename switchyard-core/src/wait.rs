//! Wait - generic state-change waiter
//!
//! `StateChangeConf` polls a refresh function until the observed status lands
//! in the target set. Any status outside `pending ∪ target` stops the wait at
//! once; so do the timeout and the cancellation token. The refresh function
//! reports a missing object with the status type's `ABSENT` sentinel: that is
//! a success when `ABSENT` is a target (deletion waits) and is otherwise
//! tolerated for `not_found_checks` consecutive polls, covering the window in
//! which a freshly created object is not yet visible.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// A closed set of remote statuses a waiter can observe
pub trait WaitStatus: Copy + Eq + fmt::Debug + fmt::Display + Send + Sync + 'static {
    /// Sentinel reported when the remote object does not exist
    const ABSENT: Self;
}

/// One poll result
#[derive(Debug, Clone)]
pub struct Observation<T, S> {
    pub object: Option<T>,
    pub status: S,
    /// Remote status-detail message, if the API returned one
    pub detail: Option<String>,
}

impl<T, S: WaitStatus> Observation<T, S> {
    pub fn found(object: T, status: S) -> Self {
        Self {
            object: Some(object),
            status,
            detail: None,
        }
    }

    pub fn absent() -> Self {
        Self {
            object: None,
            status: S::ABSENT,
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: Option<String>) -> Self {
        self.detail = detail;
        self
    }

    pub fn is_absent(&self) -> bool {
        self.status == S::ABSENT
    }
}

/// Why a wait ended without reaching its target
#[derive(Debug)]
pub enum WaitError<S, E> {
    /// Still pending when the timeout elapsed
    Timeout {
        last_status: Option<S>,
        target: Vec<S>,
        timeout: Duration,
    },
    /// The remote reported a status that is neither pending nor target
    UnexpectedState {
        status: S,
        target: Vec<S>,
        detail: Option<String>,
    },
    /// The object stayed absent for more polls than allowed
    NotFound { checks: u32 },
    Cancelled,
    /// The refresh function itself failed
    Refresh(E),
}

impl<S, E> WaitError<S, E> {
    pub fn is_timeout(&self) -> bool {
        matches!(self, WaitError::Timeout { .. })
    }

    pub fn is_unexpected_state(&self) -> bool {
        matches!(self, WaitError::UnexpectedState { .. })
    }
}

fn join_statuses<S: fmt::Display>(statuses: &[S]) -> String {
    statuses
        .iter()
        .map(|s| s.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

impl<S: fmt::Display, E: fmt::Display> fmt::Display for WaitError<S, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WaitError::Timeout {
                last_status,
                target,
                timeout,
            } => {
                write!(
                    f,
                    "timeout while waiting for state to become '{}' (timeout: {:?}",
                    join_statuses(target),
                    timeout
                )?;
                if let Some(last) = last_status {
                    write!(f, ", last state: '{}'", last)?;
                }
                write!(f, ")")
            }
            WaitError::UnexpectedState {
                status,
                target,
                detail,
            } => {
                write!(
                    f,
                    "unexpected state '{}', wanted target '{}'",
                    status,
                    join_statuses(target)
                )?;
                if let Some(detail) = detail.as_deref().filter(|d| !d.is_empty()) {
                    write!(f, ": {}", detail)?;
                }
                Ok(())
            }
            WaitError::NotFound { checks } => {
                write!(f, "couldn't find resource ({} retries)", checks)
            }
            WaitError::Cancelled => write!(f, "wait cancelled"),
            WaitError::Refresh(e) => write!(f, "{}", e),
        }
    }
}

impl<S, E> std::error::Error for WaitError<S, E>
where
    S: fmt::Debug + fmt::Display,
    E: std::error::Error + 'static,
{
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            WaitError::Refresh(e) => Some(e),
            _ => None,
        }
    }
}

/// Configuration of a single wait
#[derive(Debug, Clone)]
pub struct StateChangeConf<S> {
    pub pending: Vec<S>,
    pub target: Vec<S>,
    pub timeout: Duration,
    /// Sleep before the first refresh
    pub delay: Duration,
    pub poll_interval: Duration,
    pub not_found_checks: u32,
    /// Consecutive target observations required before succeeding
    pub continuous_target_occurence: u32,
}

impl<S: WaitStatus> StateChangeConf<S> {
    pub const DEFAULT_NOT_FOUND_CHECKS: u32 = 20;

    pub fn new(pending: &[S], target: &[S]) -> Self {
        Self {
            pending: pending.to_vec(),
            target: target.to_vec(),
            timeout: Duration::from_secs(20 * 60),
            delay: Duration::ZERO,
            poll_interval: Duration::from_secs(10),
            not_found_checks: Self::DEFAULT_NOT_FOUND_CHECKS,
            continuous_target_occurence: 1,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_not_found_checks(mut self, checks: u32) -> Self {
        self.not_found_checks = checks;
        self
    }

    pub fn with_continuous_target_occurence(mut self, occurences: u32) -> Self {
        self.continuous_target_occurence = occurences.max(1);
        self
    }

    /// Poll `refresh` until a target status is observed.
    ///
    /// Returns the object of the final observation, which is `None` when the
    /// target was `ABSENT`.
    pub async fn wait_for_state<T, E, F, Fut>(
        &self,
        cancel: &CancellationToken,
        mut refresh: F,
    ) -> Result<Option<T>, WaitError<S, E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Observation<T, S>, E>>,
    {
        let deadline = Instant::now() + self.timeout;
        let mut last_status: Option<S> = None;
        let mut not_found = 0u32;
        let mut target_seen = 0u32;

        if !self.delay.is_zero() {
            self.pause(cancel, deadline, self.delay, last_status).await?;
        }

        loop {
            let observation = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(WaitError::Cancelled),
                result = tokio::time::timeout_at(deadline, refresh()) => match result {
                    Ok(refreshed) => refreshed.map_err(WaitError::Refresh)?,
                    Err(_) => return Err(self.timed_out(last_status)),
                },
            };

            let status = observation.status;
            last_status = Some(status);
            log::trace!("waiting for [{}], observed {}", join_statuses(&self.target), status);

            if self.target.contains(&status) {
                target_seen += 1;
                if target_seen >= self.continuous_target_occurence {
                    return Ok(observation.object);
                }
            } else if status == S::ABSENT {
                target_seen = 0;
                not_found += 1;
                if not_found > self.not_found_checks {
                    return Err(WaitError::NotFound { checks: not_found });
                }
            } else {
                target_seen = 0;
                not_found = 0;
                if !self.pending.contains(&status) {
                    return Err(WaitError::UnexpectedState {
                        status,
                        target: self.target.clone(),
                        detail: observation.detail,
                    });
                }
            }

            self.pause(cancel, deadline, self.poll_interval, last_status)
                .await?;
        }
    }

    async fn pause<E>(
        &self,
        cancel: &CancellationToken,
        deadline: Instant,
        period: Duration,
        last_status: Option<S>,
    ) -> Result<(), WaitError<S, E>> {
        let now = Instant::now();
        if now >= deadline {
            return Err(self.timed_out(last_status));
        }

        let wake = std::cmp::min(now + period, deadline);
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(WaitError::Cancelled),
            _ = tokio::time::sleep_until(wake) => {
                if wake >= deadline {
                    Err(self.timed_out(last_status))
                } else {
                    Ok(())
                }
            }
        }
    }

    fn timed_out<E>(&self, last_status: Option<S>) -> WaitError<S, E> {
        WaitError::Timeout {
            last_status,
            target: self.target.clone(),
            timeout: self.timeout,
        }
    }
}
