//! Solver Service client (anti-captcha.com REST API).
//!
//! Two calls: `createTask` to enqueue a challenge, `getTaskResult`
//! polled at a fixed interval until the provider reports `ready` or
//! the polling budget runs out.

use crate::error::{AcquireError, AcquireResult};
use crate::poll::poll_until;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

const DEFAULT_BASE_URL: &str = "https://api.anti-captcha.com";

/// Provider poll cadence: every 2 s, up to ~120 s.
const POLL_INTERVAL: Duration = Duration::from_secs(2);
const POLL_BUDGET: Duration = Duration::from_secs(120);

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateTaskRequest<'a> {
    client_key: &'a str,
    task: TaskSpec<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TaskSpec<'a> {
    #[serde(rename = "type")]
    task_type: &'a str,
    #[serde(rename = "websiteURL")]
    website_url: &'a str,
    website_key: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateTaskResponse {
    error_id: i64,
    #[serde(default)]
    task_id: Option<u64>,
    #[serde(default)]
    error_description: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TaskResultRequest<'a> {
    client_key: &'a str,
    task_id: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TaskResultResponse {
    error_id: i64,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    solution: Option<Solution>,
    #[serde(default)]
    error_description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Solution {
    #[serde(rename = "gRecaptchaResponse")]
    g_recaptcha_response: String,
}

/// REST client for the solver provider.
pub struct SolverClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    poll_budget: Duration,
}

impl SolverClient {
    pub fn new(api_key: &str) -> Self {
        Self::with_base_url(api_key, DEFAULT_BASE_URL)
    }

    /// Base-URL override, used by tests to point at a local mock.
    pub fn with_base_url(api_key: &str, base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            poll_budget: POLL_BUDGET,
        }
    }

    /// Shrink the polling budget; tests use this to reach the timeout
    /// path without waiting out the full production budget.
    pub fn poll_budget(mut self, budget: Duration) -> Self {
        self.poll_budget = budget;
        self
    }

    /// Submit a RecaptchaV2 proxyless task. The provider solves from
    /// its own egress; our proxy choice is irrelevant to it.
    pub async fn create_task(&self, website_url: &str, site_key: &str) -> AcquireResult<u64> {
        let body = CreateTaskRequest {
            client_key: &self.api_key,
            task: TaskSpec {
                task_type: "RecaptchaV2TaskProxyless",
                website_url,
                website_key: site_key,
            },
        };

        let resp: CreateTaskResponse = self
            .client
            .post(format!("{}/createTask", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| AcquireError::SolverCreateError(e.to_string()))?
            .json()
            .await
            .map_err(|e| AcquireError::SolverCreateError(e.to_string()))?;

        if resp.error_id != 0 {
            return Err(AcquireError::SolverCreateError(
                resp.error_description
                    .unwrap_or_else(|| format!("errorId {}", resp.error_id)),
            ));
        }

        resp.task_id
            .ok_or_else(|| AcquireError::SolverCreateError("no taskId in response".to_string()))
    }

    /// One status poll. `Ok(Some(token))` when ready, `Ok(None)` while
    /// the task is still queued or processing.
    pub async fn fetch_result(&self, task_id: u64) -> AcquireResult<Option<String>> {
        let body = TaskResultRequest {
            client_key: &self.api_key,
            task_id,
        };

        let resp: TaskResultResponse = self
            .client
            .post(format!("{}/getTaskResult", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| AcquireError::SolverResultError(e.to_string()))?
            .json()
            .await
            .map_err(|e| AcquireError::SolverResultError(e.to_string()))?;

        if resp.error_id != 0 {
            return Err(AcquireError::SolverResultError(
                resp.error_description
                    .unwrap_or_else(|| format!("errorId {}", resp.error_id)),
            ));
        }

        if resp.status.as_deref() == Some("ready") {
            let token = resp
                .solution
                .map(|s| s.g_recaptcha_response)
                .ok_or_else(|| {
                    AcquireError::SolverResultError("ready without a solution".to_string())
                })?;
            return Ok(Some(token));
        }

        Ok(None)
    }

    /// Full solve: create the task, then poll until ready or the
    /// budget expires.
    pub async fn solve(&self, website_url: &str, site_key: &str) -> AcquireResult<String> {
        let task_id = self.create_task(website_url, site_key).await?;
        info!("solver task {task_id} created, polling");

        let client = &*self;
        let outcome = poll_until(POLL_INTERVAL, self.poll_budget, move || async move {
            match client.fetch_result(task_id).await {
                Ok(Some(token)) => Some(Ok(token)),
                Ok(None) => {
                    debug!("solver task {task_id} still processing");
                    None
                }
                // Provider-reported errors stop the poll immediately.
                Err(e) => Some(Err(e)),
            }
        })
        .await;

        match outcome {
            Some(Ok(token)) => Ok(token),
            Some(Err(e)) => Err(e),
            None => Err(AcquireError::SolverTimeout),
        }
    }
}
