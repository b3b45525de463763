//! End-to-end retry/backoff scenarios against a scripted driver.

mod common;

use common::{MockDriver, MockOutcome, MOCK_PDF};
use informe::attempt::AttemptExecutor;
use informe::captcha::CaptchaProtocol;
use informe::config::RetryPolicy;
use informe::fallback::FallbackGenerator;
use informe::orchestrator::Orchestrator;
use informe::proxy::ProxyPool;
use informe::telemetry::TelemetryStore;
use std::sync::Arc;
use std::time::Duration;

fn policy(max_attempts: u32, concurrency_limit: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        base_delay: Duration::from_millis(1000),
        backoff_multiplier: 2.0,
        concurrency_limit,
    }
}

/// Protocol whose challenge handling runs through the driver's
/// auto-solver; a still-blocked page then classifies as Blocked.
fn plugin_protocol() -> Arc<CaptchaProtocol> {
    Arc::new(CaptchaProtocol::new(Some("test-key"), true))
}

fn harness(
    driver: &Arc<MockDriver>,
    protocol: Arc<CaptchaProtocol>,
    pool: Arc<ProxyPool>,
    policy: RetryPolicy,
) -> (Orchestrator, Arc<TelemetryStore>) {
    let telemetry = Arc::new(TelemetryStore::ephemeral());
    let driver_dyn: Arc<dyn informe::driver::Driver> = driver.clone();
    let orchestrator = Orchestrator::new(
        AttemptExecutor::new(Arc::clone(&driver_dyn), protocol),
        pool,
        Arc::clone(&telemetry),
        FallbackGenerator::new(driver_dyn),
        policy,
    );
    (orchestrator, telemetry)
}

fn empty_pool() -> Arc<ProxyPool> {
    Arc::new(ProxyPool::new(&[], Duration::from_secs(1)))
}

#[tokio::test(start_paused = true)]
async fn third_attempt_succeeds_without_fallback() {
    let driver = MockDriver::scripted(&[
        MockOutcome::Blocked,
        MockOutcome::Blocked,
        MockOutcome::Success,
    ]);
    let (orchestrator, telemetry) = harness(&driver, plugin_protocol(), empty_pool(), policy(3, 1));

    let bytes = orchestrator.acquire("maria quispe").await.unwrap();
    assert_eq!(bytes, MOCK_PDF);

    let snap = telemetry.snapshot();
    assert_eq!(snap.stats.total, 3);
    assert_eq!(snap.stats.successes, 1);
    assert_eq!(snap.stats.failures, 2);
    // Newest first: the success is the most recent record.
    assert!(snap.recent[0].success);
    assert_eq!(snap.recent[1].error.as_deref(), Some("Blocked"));
    assert_eq!(snap.recent[2].error.as_deref(), Some("Blocked"));

    // No fallback: exactly the three attempt sessions were opened,
    // and every session was released.
    assert_eq!(driver.sessions_opened(), 3);
    assert_eq!(driver.sessions_closed(), 3);
}

#[tokio::test(start_paused = true)]
async fn exhaustion_returns_fallback_pdf_and_records_it() {
    let driver = MockDriver::scripted(&[MockOutcome::Blocked, MockOutcome::Blocked]);
    let (orchestrator, telemetry) = harness(&driver, plugin_protocol(), empty_pool(), policy(2, 2));

    let bytes = orchestrator.acquire("empresa fantasma").await.unwrap();
    assert_eq!(bytes, MOCK_PDF);

    // 2 attempt failures + 1 exhaustion record.
    let snap = telemetry.snapshot();
    assert_eq!(snap.stats.total, 3);
    assert_eq!(snap.stats.failures, 3);
    assert_eq!(snap.recent[0].error.as_deref(), Some("TotalExhaustion"));

    // 2 attempt sessions + 1 fallback render session, all released.
    assert_eq!(driver.sessions_opened(), 3);
    assert_eq!(driver.sessions_closed(), 3);
}

#[tokio::test(start_paused = true)]
async fn missing_solver_credential_fails_attempt_immediately() {
    let driver = MockDriver::scripted(&[MockOutcome::Blocked]);
    // Challenge present, no credential configured: the protocol must
    // fail without any solver interaction.
    let protocol = Arc::new(CaptchaProtocol::new(None, false));
    let (orchestrator, telemetry) = harness(&driver, protocol, empty_pool(), policy(1, 1));

    let bytes = orchestrator.acquire("consulta bloqueada").await.unwrap();
    assert_eq!(bytes, MOCK_PDF); // fallback render

    let snap = telemetry.snapshot();
    assert_eq!(snap.stats.failures, 2);
    assert_eq!(snap.recent[1].error.as_deref(), Some("NoSolverCredential"));
    assert_eq!(snap.recent[0].error.as_deref(), Some("TotalExhaustion"));
}

#[tokio::test(start_paused = true)]
async fn failed_attempt_marks_its_proxy_dead() {
    let driver = MockDriver::scripted(&[MockOutcome::Blocked]);
    let pool = Arc::new(ProxyPool::new(
        &["http://10.0.0.1:8080".to_string()],
        Duration::from_secs(1),
    ));
    let (orchestrator, _telemetry) =
        harness(&driver, plugin_protocol(), Arc::clone(&pool), policy(1, 1));

    let _ = orchestrator.acquire("q").await.unwrap();

    let (total, dead) = pool.summary();
    assert_eq!((total, dead), (1, 1));
    assert!(pool.select_candidate().is_none());

    let used = driver.proxies_used.lock().unwrap();
    assert_eq!(used[0].as_deref(), Some("http://10.0.0.1:8080"));
}

#[tokio::test(start_paused = true)]
async fn attempts_used_never_exceeds_budget() {
    let driver = MockDriver::scripted(&[
        MockOutcome::Blocked,
        MockOutcome::Blocked,
        MockOutcome::Blocked,
        MockOutcome::Blocked,
        MockOutcome::Blocked,
    ]);
    let (orchestrator, telemetry) = harness(&driver, plugin_protocol(), empty_pool(), policy(5, 3));

    let _ = orchestrator.acquire("agotamiento").await.unwrap();

    let snap = telemetry.snapshot();
    // 5 attempts + 1 exhaustion marker, nothing beyond the budget.
    assert_eq!(snap.stats.total, 6);
    let max_attempt_no = snap
        .recent
        .iter()
        .filter(|r| r.error.as_deref() != Some("TotalExhaustion"))
        .map(|r| r.attempt)
        .max()
        .unwrap();
    assert!(max_attempt_no <= 5);
    assert_eq!(driver.sessions_opened(), driver.sessions_closed());
}
