//! Chromium-based driver using chromiumoxide.
//!
//! Every session launches its own headless Chromium instance: proxy
//! routing is a launch argument, so isolation per attempt requires
//! isolation per browser. Sessions are short-lived (one acquisition
//! attempt) and always closed by the executor.

use super::{Driver, DriverSession, SessionOptions};
use crate::error::{AcquireError, AcquireResult};
use async_trait::async_trait;
use base64::Engine as _;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::network::{Headers, SetExtraHttpHeadersParams};
use chromiumoxide::cdp::browser_protocol::page::PrintToPdfParams;
use chromiumoxide::page::Page;
use futures::StreamExt;
use std::path::PathBuf;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// 20px at the default 96 DPI, in inches.
const MARGIN_IN: f64 = 20.0 / 96.0;

/// A4 paper, in inches.
const A4_WIDTH_IN: f64 = 8.27;
const A4_HEIGHT_IN: f64 = 11.69;

/// Find the Chromium binary path.
pub fn find_chromium() -> Option<PathBuf> {
    // 1. CHROMIUM_PATH env
    if let Ok(p) = std::env::var("CHROMIUM_PATH") {
        let path = PathBuf::from(&p);
        if path.exists() {
            return Some(path);
        }
    }

    // 2. System PATH
    for name in ["google-chrome", "chromium", "chromium-browser"] {
        if let Ok(path) = which::which(name) {
            return Some(path);
        }
    }

    // 3. Common macOS location
    if cfg!(target_os = "macos") {
        let common = PathBuf::from("/Applications/Google Chrome.app/Contents/MacOS/Google Chrome");
        if common.exists() {
            return Some(common);
        }
    }

    None
}

fn drv(e: impl std::fmt::Display) -> AcquireError {
    AcquireError::DriverError(e.to_string())
}

/// Time left of a navigation budget after `elapsed` has been spent.
fn remaining_budget(timeout: Duration, elapsed: Duration) -> Duration {
    timeout.saturating_sub(elapsed)
}

/// Chromium driver. Holds only the binary path; browsers are launched
/// per session.
pub struct ChromiumDriver {
    chrome_path: PathBuf,
}

impl ChromiumDriver {
    pub fn new() -> anyhow::Result<Self> {
        let chrome_path = find_chromium()
            .ok_or_else(|| anyhow::anyhow!("Chromium not found; set CHROMIUM_PATH"))?;
        Ok(Self { chrome_path })
    }
}

#[async_trait]
impl Driver for ChromiumDriver {
    async fn open_session(&self, options: SessionOptions) -> AcquireResult<Box<dyn DriverSession>> {
        let mut builder = BrowserConfig::builder()
            .chrome_executable(&self.chrome_path)
            .window_size(options.viewport.0, options.viewport.1)
            .arg("--headless=new")
            .arg("--no-sandbox")
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-blink-features=AutomationControlled");

        // Proxy routing is credential-less at the launch-arg level;
        // credentials ride on a Proxy-Authorization header below.
        let mut proxy_auth: Option<String> = None;
        if let Some(proxy) = &options.proxy {
            builder = builder.arg(format!(
                "--proxy-server={}://{}:{}",
                proxy.protocol, proxy.host, proxy.port
            ));
            match (&proxy.username, &proxy.password) {
                (Some(user), Some(pass)) => {
                    let encoded =
                        base64::engine::general_purpose::STANDARD.encode(format!("{user}:{pass}"));
                    proxy_auth = Some(format!("Basic {encoded}"));
                }
                (Some(_), None) => {
                    // Half-parsed credentials: proceed unauthenticated.
                    warn!(
                        "{}",
                        AcquireError::ProxyAuthParseError(proxy.origin.clone())
                    );
                }
                _ => {}
            }
        }

        let config = builder
            .build()
            .map_err(|e| AcquireError::DriverError(format!("browser config: {e}")))?;

        let (browser, mut handler) = Browser::launch(config).await.map_err(drv)?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                let _ = event;
            }
        });

        let page = browser.new_page("about:blank").await.map_err(drv)?;

        page.set_user_agent(options.user_agent.clone())
            .await
            .map_err(drv)?;

        let mut header_map = serde_json::Map::new();
        for (name, value) in &options.headers {
            header_map.insert(name.clone(), serde_json::Value::String(value.clone()));
        }
        if let Some(auth) = proxy_auth {
            header_map.insert(
                "Proxy-Authorization".to_string(),
                serde_json::Value::String(auth),
            );
        }
        if !header_map.is_empty() {
            page.execute(SetExtraHttpHeadersParams {
                headers: Headers::new(serde_json::Value::Object(header_map)),
            })
            .await
            .map_err(drv)?;
        }

        debug!("chromium session ready (proxy: {:?})", options.proxy.as_ref().map(|p| &p.host));

        Ok(Box::new(ChromiumSession {
            browser,
            page,
            handler_task,
        }))
    }
}

/// One per-attempt Chromium instance.
pub struct ChromiumSession {
    browser: Browser,
    page: Page,
    handler_task: JoinHandle<()>,
}

#[async_trait]
impl DriverSession for ChromiumSession {
    async fn navigate(&mut self, url: &str, timeout: Duration) -> AcquireResult<()> {
        let started = std::time::Instant::now();
        let result = tokio::time::timeout(timeout, self.page.goto(url)).await;
        match result {
            Ok(Ok(_)) => {
                // Let in-flight requests quiesce within what is left of
                // the budget; not all pages fire a clean load event, so
                // failure here is non-fatal.
                let remaining = remaining_budget(timeout, started.elapsed());
                let _ =
                    tokio::time::timeout(remaining, self.page.wait_for_navigation()).await;
                Ok(())
            }
            Ok(Err(e)) => Err(drv(format!("navigation failed: {e}"))),
            Err(_) => Err(drv(format!(
                "navigation timed out after {}ms",
                timeout.as_millis()
            ))),
        }
    }

    async fn evaluate(&self, script: &str) -> AcquireResult<serde_json::Value> {
        let result = self.page.evaluate(script).await.map_err(drv)?;
        result
            .into_value()
            .map_err(|e| AcquireError::DriverError(format!("script result conversion: {e:?}")))
    }

    async fn set_content(&self, html: &str) -> AcquireResult<()> {
        self.page.set_content(html).await.map_err(drv)?;
        Ok(())
    }

    async fn pdf(&self) -> AcquireResult<Vec<u8>> {
        let params = PrintToPdfParams {
            print_background: Some(true),
            paper_width: Some(A4_WIDTH_IN),
            paper_height: Some(A4_HEIGHT_IN),
            margin_top: Some(MARGIN_IN),
            margin_bottom: Some(MARGIN_IN),
            margin_left: Some(MARGIN_IN),
            margin_right: Some(MARGIN_IN),
            ..Default::default()
        };
        self.page.pdf(params).await.map_err(drv)
    }

    async fn close(self: Box<Self>) {
        let mut browser = self.browser;
        let _ = self.page.close().await;
        if let Err(e) = browser.close().await {
            warn!("browser close failed: {e}");
        }
        let _ = browser.wait().await;
        self.handler_task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn navigation_budget_never_grows_past_the_timeout() {
        let timeout = Duration::from_secs(60);
        assert_eq!(
            remaining_budget(timeout, Duration::from_secs(10)),
            Duration::from_secs(50)
        );
        // A goto that already ate the full budget leaves nothing for
        // the quiescence wait.
        assert_eq!(
            remaining_budget(timeout, Duration::from_secs(75)),
            Duration::ZERO
        );
    }
}
