//! Retry policy for transient platform API failures.

use crate::error::Result;
use std::time::Duration;

/// Exponential backoff: `delay = base_delay * multiplier^(attempts - 1)`.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// A single attempt, no retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay before the next attempt after `attempts` failures (1-indexed).
    pub fn next_delay(&self, attempts: u32) -> Duration {
        let base_secs = self.base_delay.as_secs_f64();
        let delay_secs = base_secs * self.multiplier.powi(attempts.saturating_sub(1) as i32);
        Duration::from_secs_f64(delay_secs)
    }

    /// Run `op`, retrying while it fails with a transient error.
    pub fn run<T>(&self, what: &str, mut op: impl FnMut() -> Result<T>) -> Result<T> {
        let mut attempts = 0;
        loop {
            attempts += 1;
            match op() {
                Ok(v) => return Ok(v),
                Err(e) if e.is_transient() && attempts < self.max_attempts => {
                    let delay = self.next_delay(attempts);
                    tracing::warn!(%what, attempts, ?delay, error = %e, "transient failure, retrying");
                    std::thread::sleep(delay);
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FlashpointError;
    use std::cell::Cell;

    fn instant(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::ZERO,
            multiplier: 2.0,
        }
    }

    #[test]
    fn exponential_backoff_increases() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.next_delay(1), Duration::from_millis(500));
        assert_eq!(policy.next_delay(2), Duration::from_millis(1000));
        assert_eq!(policy.next_delay(3), Duration::from_millis(2000));
    }

    #[test]
    fn retries_transient_errors_until_success() {
        let calls = Cell::new(0);
        let result = instant(3).run("probe", || {
            calls.set(calls.get() + 1);
            if calls.get() < 3 {
                Err(FlashpointError::Transport("reset".into()))
            } else {
                Ok(calls.get())
            }
        });
        assert_eq!(result.unwrap(), 3);
    }

    #[test]
    fn gives_up_after_max_attempts() {
        let calls = Cell::new(0);
        let result: Result<()> = instant(2).run("probe", || {
            calls.set(calls.get() + 1);
            Err(FlashpointError::Api {
                status: 503,
                body: "unavailable".into(),
            })
        });
        assert!(result.is_err());
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn permanent_errors_are_not_retried() {
        let calls = Cell::new(0);
        let result: Result<()> = instant(5).run("probe", || {
            calls.set(calls.get() + 1);
            Err(FlashpointError::Api {
                status: 401,
                body: "unauthorized".into(),
            })
        });
        assert!(result.is_err());
        assert_eq!(calls.get(), 1);
    }
}
