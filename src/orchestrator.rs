//! Retry/backoff orchestration.
//!
//! Runs acquisition attempts in bounded-concurrency batches: each batch
//! fans out as spawned tasks, the first success wins and the remaining
//! in-flight attempts are ignored — each still runs to completion,
//! records its own outcome, and releases its session. Failed batches
//! back off geometrically in the *cumulative* attempt count.
//! Exhaustion hands over to the fallback document generator, so the
//! HTTP boundary always gets a PDF unless even that fails.

use crate::attempt::AttemptExecutor;
use crate::config::RetryPolicy;
use crate::error::{AcquireError, AcquireResult};
use crate::fallback::FallbackGenerator;
use crate::proxy::ProxyPool;
use crate::telemetry::{AttemptRecord, TelemetryStore};
use futures::stream::{FuturesUnordered, StreamExt};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Backoff before the next batch, given the cumulative attempt count.
pub(crate) fn backoff_delay(policy: &RetryPolicy, attempts_used: u32) -> Duration {
    let millis = policy.base_delay.as_millis() as f64
        * policy.backoff_multiplier.powi(attempts_used as i32);
    Duration::from_millis(millis as u64)
}

/// Drives proxy-rotated attempt batches to the first success or to
/// exhaustion.
pub struct Orchestrator {
    executor: Arc<AttemptExecutor>,
    pool: Arc<ProxyPool>,
    telemetry: Arc<TelemetryStore>,
    fallback: FallbackGenerator,
    policy: RetryPolicy,
}

impl Orchestrator {
    pub fn new(
        executor: AttemptExecutor,
        pool: Arc<ProxyPool>,
        telemetry: Arc<TelemetryStore>,
        fallback: FallbackGenerator,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            executor: Arc::new(executor),
            pool,
            telemetry,
            fallback,
            policy,
        }
    }

    /// Acquire a PDF for `query`: the real page if any attempt wins,
    /// the synthetic fallback report on exhaustion.
    ///
    /// Every attempt records itself in telemetry exactly once and
    /// deadens its proxy on failure. On a mid-batch success the
    /// in-flight siblings are left to finish detached: their results
    /// are recorded but discarded, and their sessions still release.
    pub async fn acquire(&self, query: &str) -> AcquireResult<Vec<u8>> {
        let max_attempts = self.policy.max_attempts;
        let mut attempts_used: u32 = 0;
        let mut last_error: Option<String> = None;

        while attempts_used < max_attempts {
            let batch_size = self
                .policy
                .concurrency_limit
                .min(max_attempts - attempts_used);
            info!(
                "dispatching batch of {batch_size} (attempts used: {attempts_used}/{max_attempts})"
            );

            let mut in_flight: FuturesUnordered<JoinHandle<Result<Vec<u8>, String>>> =
                FuturesUnordered::new();
            for i in 0..batch_size {
                let attempt_no = attempts_used + i + 1;
                let proxy = self.pool.select_candidate();
                in_flight.push(self.spawn_attempt(query, attempt_no, proxy));
            }
            attempts_used += batch_size;

            let mut winner: Option<Vec<u8>> = None;
            while let Some(joined) = in_flight.next().await {
                match joined {
                    Ok(Ok(bytes)) => {
                        // First success wins; siblings finish detached.
                        winner = Some(bytes);
                        break;
                    }
                    Ok(Err(classification)) => last_error = Some(classification),
                    Err(e) => warn!("attempt task failed to join: {e}"),
                }
            }

            if let Some(bytes) = winner {
                return Ok(bytes);
            }

            if attempts_used < max_attempts {
                let delay = backoff_delay(&self.policy, attempts_used);
                info!("batch exhausted, backing off {}ms", delay.as_millis());
                tokio::time::sleep(delay).await;
            }
        }

        warn!("all {attempts_used} attempts exhausted for {query:?}");
        self.telemetry.append(AttemptRecord::new(
            query,
            attempts_used,
            None,
            false,
            Some(
                AcquireError::TotalExhaustion {
                    attempts: attempts_used,
                }
                .classification()
                .to_string(),
            ),
            0,
        ));

        self.fallback
            .generate(attempts_used, last_error.as_deref())
            .await
    }

    /// Spawn one attempt as its own task. The task records its outcome
    /// and feeds proxy health itself, so it stays correct even when
    /// the orchestrator stops listening after a sibling's success.
    fn spawn_attempt(
        &self,
        query: &str,
        attempt_no: u32,
        proxy: Option<crate::proxy::ProxyDescriptor>,
    ) -> JoinHandle<Result<Vec<u8>, String>> {
        let executor = Arc::clone(&self.executor);
        let telemetry = Arc::clone(&self.telemetry);
        let pool = Arc::clone(&self.pool);
        let query = query.to_string();

        tokio::spawn(async move {
            let origin = proxy.as_ref().map(|p| p.origin.clone());
            let started = Instant::now();
            let result = executor.run(&query, proxy).await;
            let duration_ms = started.elapsed().as_millis() as u64;

            match result {
                Ok(bytes) => {
                    telemetry.append(AttemptRecord::new(
                        &query,
                        attempt_no,
                        origin,
                        true,
                        None,
                        duration_ms,
                    ));
                    Ok(bytes)
                }
                Err(e) => {
                    warn!("attempt {attempt_no} failed: {e}");
                    if let Some(origin) = &origin {
                        pool.mark_dead(origin);
                    }
                    let classification = e.classification().to_string();
                    telemetry.append(AttemptRecord::new(
                        &query,
                        attempt_no,
                        origin,
                        false,
                        Some(classification.clone()),
                        duration_ms,
                    ));
                    Err(classification)
                }
            }
        })
    }
}
