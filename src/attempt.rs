//! One complete acquisition attempt.
//!
//! Acquires an isolated browser session (proxy-bound when a candidate
//! was selected), navigates to the search target, runs the captcha
//! protocol if triggered, cleans visual artifacts, and captures the
//! page as a PDF. The session is released unconditionally on every
//! exit path.

use crate::captcha::{CaptchaProtocol, Resolution};
use crate::driver::{commands, Driver, DriverSession, SessionOptions};
use crate::error::{AcquireError, AcquireResult};
use crate::poll::poll_until;
use crate::proxy::ProxyDescriptor;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

/// Navigation budget, matching the page's network-quiescence wait.
const NAV_TIMEOUT: Duration = Duration::from_secs(60);

/// Fixed settle delay after navigation.
const SETTLE_DELAY: Duration = Duration::from_secs(3);

/// Image-load wait: best-effort, bounded, non-fatal.
const IMAGE_WAIT: Duration = Duration::from_secs(8);
const IMAGE_POLL: Duration = Duration::from_millis(500);

/// Build the search target for a query (AI-overview results view,
/// Spanish locale).
pub fn build_search_url(query: &str) -> String {
    let mut url = Url::parse("https://www.google.com/search").expect("static url");
    url.query_pairs_mut()
        .append_pair("q", query)
        .append_pair("udm", "14")
        .append_pair("hl", "es")
        .append_pair("gl", "pe");
    url.to_string()
}

/// Runs single attempts against the browser driver.
pub struct AttemptExecutor {
    driver: Arc<dyn Driver>,
    protocol: Arc<CaptchaProtocol>,
}

impl AttemptExecutor {
    pub fn new(driver: Arc<dyn Driver>, protocol: Arc<CaptchaProtocol>) -> Self {
        Self { driver, protocol }
    }

    /// Run one attempt. Returns the captured PDF bytes or a classified
    /// error; never leaks the session.
    pub async fn run(
        &self,
        query: &str,
        proxy: Option<ProxyDescriptor>,
    ) -> AcquireResult<Vec<u8>> {
        let options = SessionOptions {
            proxy,
            ..SessionOptions::default()
        };

        let mut session = self.driver.open_session(options).await?;
        let result = self.run_in_session(&mut session, query).await;
        session.close().await;
        result
    }

    async fn run_in_session(
        &self,
        session: &mut Box<dyn DriverSession>,
        query: &str,
    ) -> AcquireResult<Vec<u8>> {
        let target = build_search_url(query);
        info!("navigating to search target for {query:?}");

        session.navigate(&target, NAV_TIMEOUT).await?;
        tokio::time::sleep(SETTLE_DELAY).await;

        match self.protocol.resolve(session, &target, NAV_TIMEOUT).await? {
            Resolution::NotDetected => debug!("no challenge on page"),
            Resolution::Verified => info!("challenge resolved and verified"),
            Resolution::StillBlocked => {
                return Err(AcquireError::Blocked(
                    "blocking markers persist after resolution".to_string(),
                ));
            }
        }

        // Cleanup runs whether or not a challenge was seen: residual
        // overlays make the capture unusable either way.
        if let Err(e) = session.evaluate(commands::CLEANUP_OVERLAYS).await {
            debug!("overlay cleanup failed: {e}");
        }

        // Give visible images a bounded chance to finish; a timeout
        // here degrades the capture but does not fail the attempt.
        let page: &dyn DriverSession = session.as_ref();
        let images_done = poll_until(IMAGE_POLL, IMAGE_WAIT, move || async move {
            match page.evaluate(commands::IMAGES_COMPLETE).await {
                Ok(v) if v.as_bool() == Some(true) => Some(()),
                _ => None,
            }
        })
        .await;
        if images_done.is_none() {
            debug!("images still loading at capture time");
        }

        let bytes = session.pdf().await?;
        info!("captured {} PDF bytes", bytes.len());
        Ok(bytes)
    }
}
