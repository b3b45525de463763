// Copyright 2026 Informe Contributors
// SPDX-License-Identifier: Apache-2.0

//! HTTP REST API.
//!
//! All JSON except the PDF endpoints. The sliding-window rate limiter
//! sits in front of `/generar-pdf` only and rejects excess requests
//! before any acquisition attempt starts.

use crate::attempt::build_search_url;
use crate::captcha::CaptchaProtocol;
use crate::config::Config;
use crate::driver::{Driver, SessionOptions};
use crate::error::AcquireError;
use crate::lookup::LookupClient;
use crate::orchestrator::Orchestrator;
use crate::proxy::ProxyPool;
use crate::telemetry::TelemetryStore;
use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

/// Sliding-window request limiter: at most `max` requests inside any
/// trailing `window`.
pub struct RateLimiter {
    window: Duration,
    max: usize,
    hits: VecDeque<Instant>,
}

impl RateLimiter {
    pub fn new(window: Duration, max: usize) -> Self {
        Self {
            window,
            max,
            hits: VecDeque::new(),
        }
    }

    /// Record-and-check: true when the request is admitted.
    pub fn admit(&mut self) -> bool {
        let now = Instant::now();
        while let Some(front) = self.hits.front() {
            if now.duration_since(*front) >= self.window {
                self.hits.pop_front();
            } else {
                break;
            }
        }
        if self.hits.len() >= self.max {
            return false;
        }
        self.hits.push_back(now);
        true
    }
}

/// Shared state behind every handler.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub pool: Arc<ProxyPool>,
    pub telemetry: Arc<TelemetryStore>,
    pub driver: Arc<dyn Driver>,
    pub lookup: Arc<LookupClient>,
    pub limiter: Arc<Mutex<RateLimiter>>,
    pub config: Arc<Config>,
    pub started_at: Instant,
}

/// Build the axum Router with all endpoints.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(landing))
        .route("/api/dni/:numero", get(dni_lookup))
        .route("/api/ruc/:numero", get(ruc_lookup))
        .route("/generar-pdf", post(generar_pdf))
        .route("/debug-captcha", get(debug_captcha))
        .route("/status", get(status))
        .route("/proxy-health", get(proxy_health))
        .route("/version", get(version))
        .layer(cors)
        .with_state(state)
}

/// Bind and serve until the process exits.
pub async fn serve(port: u16, state: AppState) -> anyhow::Result<()> {
    let app = router(state);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    info!("listening on http://{addr}");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn json_error(status: StatusCode, error: &str, details: &str) -> Response {
    (status, Json(json!({ "error": error, "details": details }))).into_response()
}

// ── Handlers ────────────────────────────────────────────────────

/// Serve the embedded landing page.
async fn landing() -> impl IntoResponse {
    Html(include_str!("buscador.html"))
}

async fn dni_lookup(State(state): State<AppState>, Path(numero): Path<String>) -> Response {
    match state.lookup.dni(&numero).await {
        Ok(value) => Json(value).into_response(),
        Err(e @ AcquireError::InvalidInput(_)) => {
            json_error(StatusCode::BAD_REQUEST, "DNI inválido", &e.to_string())
        }
        Err(e) => json_error(
            StatusCode::BAD_GATEWAY,
            "Error al consultar DNI",
            &e.to_string(),
        ),
    }
}

async fn ruc_lookup(State(state): State<AppState>, Path(numero): Path<String>) -> Response {
    match state.lookup.ruc(&numero).await {
        Ok(value) => Json(value).into_response(),
        Err(e) => json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Error al consultar RUC",
            &e.to_string(),
        ),
    }
}

/// Run the orchestrator and stream back a PDF (real or fallback).
async fn generar_pdf(State(state): State<AppState>, Json(body): Json<Value>) -> Response {
    let Some(query) = body.get("query").and_then(|v| v.as_str()).filter(|q| !q.trim().is_empty())
    else {
        return json_error(StatusCode::BAD_REQUEST, "Falta el query", "body.query is required");
    };

    // Rate limiting happens before any attempt is dispatched.
    let admitted = state
        .limiter
        .lock()
        .unwrap_or_else(|p| p.into_inner())
        .admit();
    if !admitted {
        return json_error(
            StatusCode::TOO_MANY_REQUESTS,
            "Demasiadas solicitudes",
            &AcquireError::RateLimited.to_string(),
        );
    }

    match state.orchestrator.acquire(query).await {
        Ok(bytes) => (
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, "application/pdf".to_string()),
                (
                    header::CONTENT_DISPOSITION,
                    "attachment; filename=\"reporte_ia.pdf\"".to_string(),
                ),
                (header::CONTENT_LENGTH, bytes.len().to_string()),
            ],
            bytes,
        )
            .into_response(),
        Err(e) => {
            error!("acquisition terminally failed: {e}");
            json_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Error generando PDF",
                &e.to_string(),
            )
        }
    }
}

#[derive(serde::Deserialize, Default)]
struct DebugParams {
    query: Option<String>,
}

/// One-shot challenge-detection probe: navigate, inspect, report.
/// No resolution is attempted.
async fn debug_captcha(State(state): State<AppState>, Query(params): Query<DebugParams>) -> Response {
    let Some(query) = params.query.filter(|q| !q.trim().is_empty()) else {
        return json_error(StatusCode::BAD_REQUEST, "Falta el query", "?query= is required");
    };

    let result = async {
        let mut session = state.driver.open_session(SessionOptions::default()).await?;
        let probe = async {
            session
                .navigate(&build_search_url(&query), Duration::from_secs(60))
                .await?;
            CaptchaProtocol::probe(session.as_ref()).await
        }
        .await;
        session.close().await;
        probe
    }
    .await;

    match result {
        Ok(challenge) => Json(json!({
            "hasCaptcha": challenge.has_captcha,
            "siteKey": challenge.site_key,
        }))
        .into_response(),
        Err(e) => json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Error en la prueba de captcha",
            &e.to_string(),
        ),
    }
}

/// Process health plus the telemetry snapshot.
async fn status(State(state): State<AppState>) -> Json<Value> {
    let snapshot = state.telemetry.snapshot();
    let (proxies_total, proxies_dead) = state.pool.summary();
    Json(json!({
        "running": true,
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_seconds": state.started_at.elapsed().as_secs_f64(),
        "stats": snapshot.stats,
        "recent": snapshot.recent,
        "proxies": {
            "total": proxies_total,
            "alive": proxies_total - proxies_dead,
            "dead": proxies_dead,
        },
    }))
}

/// Force a health sweep and return the report.
async fn proxy_health(State(state): State<AppState>) -> Json<Value> {
    let report = state.pool.run_health_sweep().await;
    Json(serde_json::to_value(&report).unwrap_or_else(|_| json!({})))
}

async fn version(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "version": env!("CARGO_PKG_VERSION"),
        "commit": state.config.deploy_commit,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limiter_admits_up_to_max_within_window() {
        let mut limiter = RateLimiter::new(Duration::from_secs(60), 2);
        assert!(limiter.admit());
        assert!(limiter.admit());
        assert!(!limiter.admit());
    }

    #[test]
    fn limiter_window_slides() {
        let mut limiter = RateLimiter::new(Duration::from_millis(0), 1);
        assert!(limiter.admit());
        // Zero-width window: the first hit has already expired.
        assert!(limiter.admit());
    }
}
