//! Scripted mock of the browser driver seam, shared by the
//! integration suites.
#![allow(dead_code)]

use async_trait::async_trait;
use informe::driver::{commands, Driver, DriverSession, SessionOptions};
use informe::error::AcquireResult;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Bytes every successful mock capture returns.
pub const MOCK_PDF: &[u8] = b"%PDF-1.4 mock capture";

/// Behavior of one scripted attempt session.
#[derive(Debug, Clone, Copy)]
pub enum MockOutcome {
    /// Page loads clean; PDF capture succeeds.
    Success,
    /// Blocking markers present and they persist through resolution.
    Blocked,
}

/// Driver whose sessions follow a script, in pop order. Once the
/// script is exhausted, sessions behave as clean content renderers
/// (the fallback generator path).
pub struct MockDriver {
    script: Mutex<VecDeque<MockOutcome>>,
    pub opened: Arc<AtomicUsize>,
    pub closed: Arc<AtomicUsize>,
    pub proxies_used: Mutex<Vec<Option<String>>>,
}

impl MockDriver {
    pub fn scripted(outcomes: &[MockOutcome]) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(outcomes.iter().copied().collect()),
            opened: Arc::new(AtomicUsize::new(0)),
            closed: Arc::new(AtomicUsize::new(0)),
            proxies_used: Mutex::new(Vec::new()),
        })
    }

    pub fn sessions_opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn sessions_closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Driver for MockDriver {
    async fn open_session(&self, options: SessionOptions) -> AcquireResult<Box<dyn DriverSession>> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        self.proxies_used
            .lock()
            .unwrap()
            .push(options.proxy.map(|p| p.origin));

        let outcome = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(MockOutcome::Success);

        Ok(Box::new(MockSession {
            blocked: matches!(outcome, MockOutcome::Blocked),
            closed: Arc::clone(&self.closed),
        }))
    }
}

struct MockSession {
    blocked: bool,
    closed: Arc<AtomicUsize>,
}

#[async_trait]
impl DriverSession for MockSession {
    async fn navigate(&mut self, _url: &str, _timeout: Duration) -> AcquireResult<()> {
        Ok(())
    }

    async fn evaluate(&self, script: &str) -> AcquireResult<serde_json::Value> {
        let value = if script == commands::DETECT_BLOCKING {
            serde_json::json!(self.blocked)
        } else if script == commands::IMAGES_COMPLETE {
            serde_json::json!(true)
        } else if script == commands::CLEANUP_OVERLAYS {
            serde_json::json!(0)
        } else if script == commands::FIND_SITE_KEY {
            serde_json::Value::Null
        } else if script == commands::FRAME_URLS {
            serde_json::json!([])
        } else {
            serde_json::json!(true)
        };
        Ok(value)
    }

    async fn set_content(&self, _html: &str) -> AcquireResult<()> {
        Ok(())
    }

    async fn pdf(&self) -> AcquireResult<Vec<u8>> {
        Ok(MOCK_PDF.to_vec())
    }

    async fn auto_solve_captcha(&self) -> AcquireResult<bool> {
        Ok(true)
    }

    async fn close(self: Box<Self>) {
        self.closed.fetch_add(1, Ordering::SeqCst);
    }
}
