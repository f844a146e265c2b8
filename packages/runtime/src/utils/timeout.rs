// packages/runtime/src/utils/timeout.rs
//! Bounded execution: race an operation against a deadline

use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

/// About 30 years; stands in for deadlines that overflow `Instant`
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// The deadline won the race
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeout {
    pub limit: Duration,
}

impl Timeout {
    pub fn limit_ms(&self) -> u64 {
        self.limit.as_millis() as u64
    }
}

impl std::fmt::Display for Timeout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "timed out after {}ms", self.limit_ms())
    }
}

/// `Instant::now() + period`, saturating to a far-future deadline instead of
/// panicking when a configured period is out of range
pub fn deadline_after(period: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(period)
        .or_else(|| now.checked_add(FAR_FUTURE))
        .unwrap_or(now)
}

/// Run `operation` until it settles or `limit` elapses, whichever comes first.
///
/// On timeout the operation future is dropped; anything it spawned elsewhere
/// keeps running unless the caller terminates it separately.
pub async fn with_timeout<F>(operation: F, limit: Duration) -> Result<F::Output, Timeout>
where
    F: Future,
{
    tokio::time::timeout(limit, operation)
        .await
        .map_err(|_| Timeout { limit })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_operation_wins() {
        let out = with_timeout(async { 7 }, Duration::from_millis(50)).await;
        assert_eq!(out, Ok(7));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_wins() {
        let start = tokio::time::Instant::now();
        let out = with_timeout(
            tokio::time::sleep(Duration::from_millis(500)),
            Duration::from_millis(100),
        )
        .await;

        assert_eq!(out.unwrap_err().limit_ms(), 100);
        assert!(start.elapsed() < Duration::from_millis(500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_after_saturates() {
        let now = Instant::now();
        assert_eq!(deadline_after(Duration::from_millis(250)), now + Duration::from_millis(250));

        let huge = deadline_after(Duration::from_millis(u64::MAX));
        assert!(huge > now + Duration::from_secs(86_400 * 365));
    }
}
