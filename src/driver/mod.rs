//! Browser Driver abstraction.
//!
//! Defines the `Driver` and `DriverSession` traits that abstract over
//! the browser engine (currently Chromium via chromiumoxide). The core
//! never touches a live document: all page-side work is issued as
//! commands (JS evaluation) through this seam, which also makes the
//! whole pipeline testable with a scripted mock.

pub mod chromium;
pub mod commands;

use crate::error::{AcquireError, AcquireResult};
use crate::proxy::ProxyDescriptor;
use async_trait::async_trait;
use std::time::Duration;

/// Options for one isolated browser session.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Proxy to route through, if one was selected for the attempt.
    pub proxy: Option<ProxyDescriptor>,
    pub user_agent: String,
    /// Extra HTTP headers sent with every request in the session.
    pub headers: Vec<(String, String)>,
    pub viewport: (u32, u32),
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            proxy: None,
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                         (KHTML, like Gecko) Chrome/121.0.0.0 Safari/537.36"
                .to_string(),
            headers: vec![
                (
                    "Accept-Language".to_string(),
                    "es-ES,es;q=0.9,en;q=0.8".to_string(),
                ),
                (
                    "Accept".to_string(),
                    "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8"
                        .to_string(),
                ),
                ("Upgrade-Insecure-Requests".to_string(), "1".to_string()),
                ("Connection".to_string(), "keep-alive".to_string()),
            ],
            viewport: (1366, 768),
        }
    }
}


/// A browser engine that can spawn isolated sessions.
#[async_trait]
pub trait Driver: Send + Sync {
    /// Open a fresh, isolated session (own browser state, own proxy
    /// routing). Each acquisition attempt gets exactly one.
    async fn open_session(&self, options: SessionOptions) -> AcquireResult<Box<dyn DriverSession>>;
}

/// One isolated browser session.
///
/// Sessions must be released via `close` on every exit path; the
/// attempt executor guarantees this.
#[async_trait]
pub trait DriverSession: Send + Sync {
    /// Navigate and wait for load, bounded by `timeout`.
    async fn navigate(&mut self, url: &str, timeout: Duration) -> AcquireResult<()>;

    /// Evaluate a script in the page and return its JSON result.
    async fn evaluate(&self, script: &str) -> AcquireResult<serde_json::Value>;

    /// Replace the page content without navigating (fallback report).
    async fn set_content(&self, html: &str) -> AcquireResult<()>;

    /// Capture the current page as a PDF (A4, printed backgrounds,
    /// 20px margins).
    async fn pdf(&self) -> AcquireResult<Vec<u8>>;

    /// Driver-native captcha auto-solver, if the engine ships one.
    /// Returns true when the challenge was solved. Engines without the
    /// capability return `DriverError`.
    async fn auto_solve_captcha(&self) -> AcquireResult<bool> {
        Err(AcquireError::DriverError(
            "driver has no built-in captcha solver".to_string(),
        ))
    }

    /// Release the session. Best-effort; never fails the caller.
    async fn close(self: Box<Self>);
}
