use std::future::Future;
use std::time::Duration;

use tokio::time::{sleep, Instant};

/// Polls `condition` until it returns true or `timeout` elapses.
///
/// Returns whether the condition was met. Without a timeout the wait is
/// unbounded; callers rely on the condition itself to eventually flip (the
/// loop's enable flag, a page probe succeeding).
pub async fn wait_for_condition<F, Fut>(
    mut condition: F,
    timeout: Option<Duration>,
    poll_interval: Duration,
) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = timeout.map(|t| Instant::now() + t);
    loop {
        if condition().await {
            return true;
        }
        let delay = match deadline {
            Some(deadline) => {
                let now = Instant::now();
                if now >= deadline {
                    return false;
                }
                poll_interval.min(deadline - now)
            }
            None => poll_interval,
        };
        sleep(delay).await;
    }
}

/// Awaits `fut` and reports how long it took.
pub async fn measure<T>(fut: impl Future<Output = T>) -> (T, Duration) {
    let start = Instant::now();
    let result = fut.await;
    (result, start.elapsed())
}
