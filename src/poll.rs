//! Bounded retry-with-timeout polling.

use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

/// Poll `f` at a fixed `interval` until it yields `Some`, giving up
/// after `max_wait`. Returns `None` on deadline. The first probe runs
/// after one interval, matching a "submit then wait" call pattern.
pub async fn poll_until<T, F, Fut>(interval: Duration, max_wait: Duration, mut f: F) -> Option<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Option<T>>,
{
    let deadline = Instant::now() + max_wait;
    loop {
        if Instant::now() >= deadline {
            return None;
        }
        tokio::time::sleep(interval).await;
        if let Some(value) = f().await {
            return Some(value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test(start_paused = true)]
    async fn resolves_once_predicate_holds() {
        let calls = AtomicU32::new(0);
        let result = poll_until(Duration::from_secs(2), Duration::from_secs(120), || {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            async move { if n >= 3 { Some(n) } else { None } }
        })
        .await;
        assert_eq!(result, Some(3));
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_at_deadline() {
        let calls = AtomicU32::new(0);
        let result: Option<()> =
            poll_until(Duration::from_secs(2), Duration::from_secs(120), || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { None }
            })
            .await;
        assert_eq!(result, None);
        // 2s interval over a 120s budget: 60 probes, never 61.
        assert_eq!(calls.load(Ordering::SeqCst), 60);
    }
}
