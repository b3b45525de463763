//! Fallback document generation.
//!
//! When every attempt is exhausted, the caller still gets a PDF: a
//! minimal static report stating the attempt count and the last
//! recorded error classification, rendered through the same browser
//! driver (content-to-PDF, no navigation). This is the one path where
//! a failure becomes visible to the client — if even this render
//! fails, the error propagates.

use crate::driver::{Driver, SessionOptions};
use crate::error::AcquireResult;
use chrono::Utc;
use std::sync::Arc;
use tracing::info;

/// Renders the synthetic failure report.
pub struct FallbackGenerator {
    driver: Arc<dyn Driver>,
}

impl FallbackGenerator {
    pub fn new(driver: Arc<dyn Driver>) -> Self {
        Self { driver }
    }

    /// Produce the fallback PDF. Proxy-less session: this render never
    /// leaves the process.
    pub async fn generate(
        &self,
        attempts_used: u32,
        last_error: Option<&str>,
    ) -> AcquireResult<Vec<u8>> {
        info!("generating fallback report after {attempts_used} attempts");
        let html = report_html(attempts_used, last_error);

        let session = self
            .driver
            .open_session(SessionOptions {
                proxy: None,
                ..SessionOptions::default()
            })
            .await?;

        let result = async {
            session.set_content(&html).await?;
            session.pdf().await
        }
        .await;

        session.close().await;
        result
    }
}

fn report_html(attempts_used: u32, last_error: Option<&str>) -> String {
    let error_line = last_error.unwrap_or("desconocido");
    let generated = Utc::now().to_rfc3339();
    format!(
        r#"<!DOCTYPE html>
<html lang="es">
<head><meta charset="utf-8"><title>Reporte no disponible</title>
<style>
  body {{ font-family: Arial, sans-serif; margin: 40px; color: #333; }}
  h1 {{ color: #b00020; font-size: 22px; }}
  .box {{ border: 1px solid #ddd; padding: 16px; border-radius: 6px; }}
  .meta {{ color: #777; font-size: 12px; margin-top: 24px; }}
</style></head>
<body>
  <h1>No se pudo obtener la página de resultados</h1>
  <div class="box">
    <p>Se agotaron los <strong>{attempts_used}</strong> intentos de adquisición.</p>
    <p>Último error registrado: <strong>{error_line}</strong></p>
    <p>Intente nuevamente en unos minutos.</p>
  </div>
  <p class="meta">Generado {generated}</p>
</body>
</html>"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_states_attempts_and_error() {
        let html = report_html(3, Some("Blocked"));
        assert!(html.contains("<strong>3</strong>"));
        assert!(html.contains("<strong>Blocked</strong>"));
    }

    #[test]
    fn report_handles_missing_error() {
        let html = report_html(2, None);
        assert!(html.contains("desconocido"));
    }
}
