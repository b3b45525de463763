//! Environment-driven configuration.
//!
//! Everything tunable about the service is read once at startup.
//! Misconfiguration that would leave the service silently degraded
//! (a required solver credential that is absent) is a startup error,
//! not a warning.

use anyhow::{bail, Result};
use std::time::Duration;

/// Retry/backoff policy for the orchestrator.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub backoff_multiplier: f64,
    pub concurrency_limit: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(1000),
            backoff_multiplier: 2.0,
            concurrency_limit: 2,
        }
    }
}

/// Full service configuration, loaded from the environment.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub anti_captcha_key: Option<String>,
    pub anti_captcha_required: bool,
    pub rate_limit_window: Duration,
    pub rate_limit_max: usize,
    pub retry: RetryPolicy,
    pub proxy_list: Vec<String>,
    pub proxy_health_interval: Duration,
    pub proxy_health_timeout: Duration,
    pub use_recaptcha_plugin: bool,
    pub dni_api_url: Option<String>,
    pub deploy_commit: Option<String>,
    pub telemetry_log: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 3000,
            anti_captcha_key: None,
            anti_captcha_required: true,
            rate_limit_window: Duration::from_millis(60_000),
            rate_limit_max: 10,
            retry: RetryPolicy::default(),
            proxy_list: Vec::new(),
            proxy_health_interval: Duration::from_millis(300_000),
            proxy_health_timeout: Duration::from_millis(8_000),
            use_recaptcha_plugin: false,
            dni_api_url: None,
            deploy_commit: None,
            telemetry_log: "informe-telemetry.jsonl".to_string(),
        }
    }
}

fn env_nonempty(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    env_nonempty(name)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn env_bool(name: &str, default: bool) -> bool {
    match env_nonempty(name) {
        Some(v) => matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"),
        None => default,
    }
}

impl Config {
    /// Load from the process environment and validate.
    ///
    /// Fails fast when `ANTI_CAPTCHA_REQUIRED` is true (the default)
    /// and no `ANTI_CAPTCHA_KEY` is set.
    pub fn from_env() -> Result<Self> {
        let d = Config::default();

        let config = Config {
            port: env_parse("PORT", d.port),
            anti_captcha_key: env_nonempty("ANTI_CAPTCHA_KEY"),
            anti_captcha_required: env_bool("ANTI_CAPTCHA_REQUIRED", true),
            rate_limit_window: Duration::from_millis(env_parse(
                "RATE_LIMIT_WINDOW_MS",
                d.rate_limit_window.as_millis() as u64,
            )),
            rate_limit_max: env_parse("RATE_LIMIT_MAX", d.rate_limit_max),
            retry: RetryPolicy {
                max_attempts: env_parse("MAX_RETRIES", d.retry.max_attempts),
                base_delay: Duration::from_millis(env_parse(
                    "RETRY_DELAY_MS",
                    d.retry.base_delay.as_millis() as u64,
                )),
                backoff_multiplier: env_parse("BACKOFF_MULT", d.retry.backoff_multiplier),
                concurrency_limit: env_parse("PARALLEL_CONCURRENCY", d.retry.concurrency_limit),
            },
            proxy_list: env_nonempty("PROXY_LIST")
                .map(|v| {
                    v.split(',')
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .collect()
                })
                .unwrap_or_default(),
            proxy_health_interval: Duration::from_millis(env_parse(
                "PROXY_HEALTH_INTERVAL_MS",
                d.proxy_health_interval.as_millis() as u64,
            )),
            proxy_health_timeout: Duration::from_millis(env_parse(
                "PROXY_HEALTH_TIMEOUT_MS",
                d.proxy_health_timeout.as_millis() as u64,
            )),
            use_recaptcha_plugin: env_bool("USE_RECAPTCHA_PLUGIN", false),
            dni_api_url: env_nonempty("DNI_API_URL"),
            deploy_commit: env_nonempty("DEPLOY_COMMIT"),
            telemetry_log: env_nonempty("TELEMETRY_LOG").unwrap_or(d.telemetry_log),
        };

        config.validate()?;
        Ok(config)
    }

    /// Startup validation. No degraded captcha handling in production:
    /// a required-but-missing solver key halts the process.
    pub fn validate(&self) -> Result<()> {
        if self.anti_captcha_required && self.anti_captcha_key.is_none() {
            bail!(
                "ANTI_CAPTCHA_KEY is not set but ANTI_CAPTCHA_REQUIRED is true; \
                 set the key or export ANTI_CAPTCHA_REQUIRED=false"
            );
        }
        if self.retry.max_attempts == 0 {
            bail!("MAX_RETRIES must be at least 1");
        }
        if self.retry.concurrency_limit == 0 {
            bail!("PARALLEL_CONCURRENCY must be at least 1");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn required_key_missing_is_fatal() {
        let config = Config {
            anti_captcha_key: None,
            anti_captcha_required: true,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn optional_key_missing_is_fine() {
        let config = Config {
            anti_captcha_key: None,
            anti_captcha_required: false,
            ..Config::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_attempts_rejected() {
        let config = Config {
            anti_captcha_required: false,
            retry: RetryPolicy {
                max_attempts: 0,
                ..RetryPolicy::default()
            },
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }
}
