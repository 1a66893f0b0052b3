use crate::error::LedgerError;
use std::time::Duration;
use tokio::time;
use tracing::{
    debug,
    warn,
};

/// How many times a remote call is attempted and how long to wait in between.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    /// Account and contract state reads.
    pub const READ: Self = Self::new(3, Duration::from_secs(1));
    /// Receipt polling after a submission.
    pub const RECEIPT: Self = Self::new(10, Duration::from_secs(2));

    pub const fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
        }
    }

    fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Longest total time spent sleeping between attempts.
    pub fn max_wait(&self) -> Duration {
        self.delay * (self.attempts() - 1)
    }
}

/// Run `op` until it succeeds, retrying transient failures per `policy`.
///
/// Non-transient failures (rejections, insufficient funds) are returned at once. After
/// the last attempt the final error is returned. Only use this for operations that are
/// safe to repeat; the wager submission itself never goes through here.
pub async fn with_retry<T, F, Fut>(
    policy: RetryPolicy,
    label: &'static str,
    mut op: F,
) -> Result<T, LedgerError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, LedgerError>>,
{
    let attempts = policy.attempts();
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && attempt < attempts => {
                warn!(label, attempt, attempts, %err, "remote call failed; retrying");
                time::sleep(policy.delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

/// Poll `op` until it yields a value or the attempts run out.
///
/// `Ok(None)` and errors both count as "not yet available" for that cycle; errors are
/// logged and never propagated.
pub async fn poll_until_some<T, F, Fut>(
    policy: RetryPolicy,
    label: &'static str,
    mut op: F,
) -> Option<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>, LedgerError>>,
{
    let attempts = policy.attempts();
    for attempt in 1..=attempts {
        match op().await {
            Ok(Some(value)) => return Some(value),
            Ok(None) => debug!(label, attempt, attempts, "not yet available"),
            Err(err) => warn!(label, attempt, attempts, %err, "poll attempt failed"),
        }
        if attempt < attempts {
            time::sleep(policy.delay).await;
        }
    }
    None
}
