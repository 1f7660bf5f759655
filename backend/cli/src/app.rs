//! Server wiring: config → driver → pool → gateway.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use hudbridge_browser::ChromiumDriver;
use hudbridge_config::{env as config_env, io as config_io, normalize};
use hudbridge_core::MemoryStateSink;
use hudbridge_gateway::GatewayState;
use hudbridge_renderer::RendererPool;

use hudbridge_config::defaults::DEFAULT_LISTEN_PORT;

pub async fn run_server(
    port_override: Option<u16>,
    config_path: Option<PathBuf>,
    console_log: bool,
) -> Result<()> {
    let config_dir = config_io::config_dir();
    let path = config_path.unwrap_or_else(|| config_io::config_file_path(&config_dir));

    let mut raw = config_io::load_config(&path).await?;
    config_env::apply_env_overrides(&mut raw);
    let (mut settings, report) = normalize(&raw);

    if console_log {
        hudbridge_logging::init_console_logger(&settings.log_level);
    } else {
        hudbridge_logging::init_logger(config_dir.join("logs"), &settings.log_level);
    }

    if !report.is_valid() {
        for finding in &report.errors {
            error!(path = %finding.path, message = %finding.message, "config error");
        }
        bail!("refusing to start with an invalid config: {}", path.display());
    }
    if let Some(port) = port_override {
        settings.listen_port = port;
    }
    info!(
        config = %path.display(),
        views = settings.views.len(),
        "starting hudbridge"
    );
    if settings.views.is_empty() {
        warn!("no views configured; every frame request will return 404");
    }

    let state_sink = Arc::new(MemoryStateSink::new());
    let driver = Arc::new(ChromiumDriver::new());
    let pool = RendererPool::new(settings.clone(), driver, state_sink.clone());

    let addr = format!("{}:{}", settings.listen_host, settings.listen_port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    let state = GatewayState::new(Arc::new(settings), Some(pool.clone()), state_sink)
        .with_config_path(path.clone());

    let server = tokio::spawn(hudbridge_gateway::serve(listener, state));

    tokio::signal::ctrl_c()
        .await
        .context("waiting for shutdown signal")?;
    info!("shutting down");
    pool.shutdown().await;
    server.abort();
    Ok(())
}

pub async fn print_status(port: Option<u16>, token: Option<String>) -> Result<()> {
    let port = port.unwrap_or(DEFAULT_LISTEN_PORT);
    let client = reqwest::Client::new();

    let health = client
        .get(format!("http://localhost:{port}/healthz"))
        .send()
        .await;
    match health {
        Ok(_) => {}
        Err(_) => {
            println!("hudbridge is not running on port {port}");
            return Ok(());
        }
    }

    let mut request = client.get(format!("http://localhost:{port}/status.json"));
    if let Some(token) = token {
        request = request.bearer_auth(token);
    }
    let body: serde_json::Value = request.send().await?.json().await?;
    println!("{}", serde_json::to_string_pretty(&body)?);
    Ok(())
}
