//! Identity/registry lookup passthrough.
//!
//! Thin clients for the external DNI and RUC services. DNI format
//! validation (exactly 8 decimal digits) happens here, before and
//! independent of any upstream call.

use crate::error::{AcquireError, AcquireResult};
use serde_json::{json, Value};
use std::time::Duration;

const RUC_BASE_URL: &str = "https://api.apis.net.pe/v1/ruc";
const LOOKUP_TIMEOUT: Duration = Duration::from_secs(15);

/// Exactly 8 decimal digits.
pub fn validate_dni(numero: &str) -> AcquireResult<()> {
    if numero.len() == 8 && numero.bytes().all(|b| b.is_ascii_digit()) {
        Ok(())
    } else {
        Err(AcquireError::InvalidInput(format!(
            "DNI must be exactly 8 digits, got {numero:?}"
        )))
    }
}

/// Lookup client. When no DNI upstream is configured, DNI queries
/// answer from a local mock so the landing page keeps working in
/// development.
pub struct LookupClient {
    client: reqwest::Client,
    dni_base: Option<String>,
    ruc_base: String,
}

impl LookupClient {
    pub fn new(dni_base: Option<String>) -> Self {
        Self::with_ruc_base(dni_base, RUC_BASE_URL)
    }

    /// RUC base override for tests.
    pub fn with_ruc_base(dni_base: Option<String>, ruc_base: &str) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(LOOKUP_TIMEOUT)
                .build()
                .unwrap_or_default(),
            dni_base,
            ruc_base: ruc_base.trim_end_matches('/').to_string(),
        }
    }

    /// DNI lookup: validate, then pass through (or mock).
    pub async fn dni(&self, numero: &str) -> AcquireResult<Value> {
        validate_dni(numero)?;

        let Some(base) = &self.dni_base else {
            return Ok(json!({
                "dni": numero,
                "nombre": "CONSULTA LOCAL (sin upstream configurado)",
                "mock": true,
            }));
        };

        let sep = if base.contains('?') { '&' } else { '?' };
        let url = format!("{base}{sep}dni={numero}");
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| AcquireError::UpstreamError(e.to_string()))?;
        resp.json()
            .await
            .map_err(|e| AcquireError::UpstreamError(e.to_string()))
    }

    /// RUC lookup, reshaped to the response the landing page expects.
    pub async fn ruc(&self, numero: &str) -> AcquireResult<Value> {
        let url = format!("{}?numero={numero}", self.ruc_base);
        let resp: Value = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| AcquireError::UpstreamError(e.to_string()))?
            .json()
            .await
            .map_err(|e| AcquireError::UpstreamError(e.to_string()))?;

        let nombre = resp.get("nombre").cloned().unwrap_or(Value::Null);
        Ok(json!({ "data": { "nombre_o_razon_social": nombre } }))
    }
}
