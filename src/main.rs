// Copyright 2026 Informe Contributors
// SPDX-License-Identifier: Apache-2.0

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use informe::attempt::AttemptExecutor;
use informe::captcha::CaptchaProtocol;
use informe::config::Config;
use informe::driver::chromium::{find_chromium, ChromiumDriver};
use informe::driver::Driver;
use informe::fallback::FallbackGenerator;
use informe::lookup::LookupClient;
use informe::orchestrator::Orchestrator;
use informe::proxy::ProxyPool;
use informe::rest::{self, AppState, RateLimiter};
use informe::telemetry::TelemetryStore;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::info;

#[derive(Parser)]
#[command(
    name = "informe",
    about = "Informe — resilient search-report acquisition service",
    version
)]
struct Cli {
    /// Enable verbose/debug logging
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP service (default)
    Serve {
        /// Override the PORT environment variable
        #[arg(long)]
        port: Option<u16>,
    },
    /// Check environment and configuration, then exit
    Check,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "informe=debug" } else { "informe=info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(default_level.parse().expect("static directive")),
        )
        .init();

    match cli.command {
        Some(Commands::Check) => check(),
        Some(Commands::Serve { port }) => serve(port).await,
        None => serve(None).await,
    }
}

/// Diagnose the environment without starting the service.
fn check() -> Result<()> {
    match Config::from_env() {
        Ok(config) => {
            println!("configuration: ok");
            println!("  port: {}", config.port);
            println!("  proxies: {}", config.proxy_list.len());
            println!(
                "  solver credential: {}",
                if config.anti_captcha_key.is_some() { "set" } else { "not set" }
            );
        }
        Err(e) => {
            println!("configuration: INVALID — {e:#}");
            std::process::exit(1);
        }
    }
    match find_chromium() {
        Some(path) => println!("chromium: {}", path.display()),
        None => {
            println!("chromium: NOT FOUND — set CHROMIUM_PATH");
            std::process::exit(1);
        }
    }
    Ok(())
}

async fn serve(port_override: Option<u16>) -> Result<()> {
    // Misconfiguration halts here, before anything binds.
    let mut config = Config::from_env().context("invalid configuration")?;
    if let Some(port) = port_override {
        config.port = port;
    }
    let config = Arc::new(config);

    info!("starting informe v{}", env!("CARGO_PKG_VERSION"));

    let telemetry = Arc::new(TelemetryStore::open(Path::new(&config.telemetry_log)));
    let pool = Arc::new(ProxyPool::new(
        &config.proxy_list,
        config.proxy_health_timeout,
    ));

    let driver: Arc<dyn Driver> =
        Arc::new(ChromiumDriver::new().context("browser driver unavailable")?);

    let protocol = Arc::new(CaptchaProtocol::new(
        config.anti_captcha_key.as_deref(),
        config.use_recaptcha_plugin,
    ));

    let orchestrator = Arc::new(Orchestrator::new(
        AttemptExecutor::new(Arc::clone(&driver), Arc::clone(&protocol)),
        Arc::clone(&pool),
        Arc::clone(&telemetry),
        FallbackGenerator::new(Arc::clone(&driver)),
        config.retry.clone(),
    ));

    // One sweep before serving, then a background interval. Neither
    // blocks request handling once the server is up.
    if !pool.is_empty() {
        let report = pool.run_health_sweep().await;
        info!(
            "initial proxy sweep: {}/{} alive",
            report.alive, report.total
        );
        let sweep_pool = Arc::clone(&pool);
        let interval = config.proxy_health_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await; // first tick fires immediately
            loop {
                ticker.tick().await;
                let report = sweep_pool.run_health_sweep().await;
                info!("proxy sweep: {}/{} alive", report.alive, report.total);
            }
        });
    }

    let state = AppState {
        orchestrator,
        pool,
        telemetry,
        driver,
        lookup: Arc::new(LookupClient::new(config.dni_api_url.clone())),
        limiter: Arc::new(Mutex::new(RateLimiter::new(
            config.rate_limit_window,
            config.rate_limit_max,
        ))),
        config: Arc::clone(&config),
        started_at: Instant::now(),
    };

    rest::serve(config.port, state).await
}
