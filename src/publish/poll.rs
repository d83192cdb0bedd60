use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;

#[derive(Debug, Clone, Copy, thiserror::Error)]
#[error("condition not met within {timeout:?} ({attempts} attempts)")]
pub struct PollTimeout {
    pub timeout: Duration,
    pub attempts: u32,
}

/// Calls `probe` every `interval` until it yields `Some`, giving up once
/// `timeout` has elapsed. The first probe runs immediately.
pub async fn poll_until<T, F, Fut>(
    interval: Duration,
    timeout: Duration,
    mut probe: F,
) -> Result<T, PollTimeout>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Option<T>>,
{
    let deadline = Instant::now() + timeout;
    let mut attempts = 0u32;
    loop {
        attempts += 1;
        if let Some(value) = probe().await {
            return Ok(value);
        }
        let now = Instant::now();
        if now >= deadline {
            return Err(PollTimeout { timeout, attempts });
        }
        tokio::time::sleep(interval.min(deadline - now)).await;
    }
}
