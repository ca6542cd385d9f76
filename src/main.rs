use anyhow::{Context, Result};
use clap::Parser;
use link_card::{
    server, setup_logging, FetcherConfig, LogConfig, PreviewService, PreviewServiceConfig,
    RenderSettings, UrlValidationConfig,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Link preview server
#[derive(Debug, Parser)]
#[command(name = "link-card", version, about)]
struct Cli {
    #[arg(long, env = "HOST", default_value = "127.0.0.1")]
    host: String,

    #[arg(short, long, env = "PORT", default_value = "3001")]
    port: u16,

    /// Page fetch timeout in seconds
    #[arg(long, env = "FETCH_TIMEOUT_SECS", default_value = "10")]
    fetch_timeout: u64,

    /// Browser navigation timeout in seconds
    #[arg(long, env = "NAVIGATION_TIMEOUT_SECS", default_value = "20")]
    navigation_timeout: u64,

    /// Wait for the post root element, in seconds
    #[arg(long, env = "SELECTOR_TIMEOUT_SECS", default_value = "15")]
    selector_timeout: u64,

    #[arg(long, env = "MAX_RENDER_SESSIONS", default_value = "4")]
    max_render_sessions: usize,

    #[arg(long, env = "CHROME_PATH")]
    chrome_path: Option<PathBuf>,

    /// Launch Chromium without its sandbox (containers)
    #[arg(long, env = "CHROME_NO_SANDBOX")]
    no_sandbox: bool,

    /// Admit loopback and private-network hosts
    #[arg(long, env = "ALLOW_PRIVATE_HOSTS")]
    allow_private_hosts: bool,

    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    #[arg(long, env = "LOG_DIR", default_value = "logs")]
    log_dir: PathBuf,

    /// Also write daily-rotated log files to `log_dir`
    #[arg(long, env = "LOG_TO_FILE")]
    log_to_file: bool,
}

impl Cli {
    fn service_config(&self) -> PreviewServiceConfig {
        let url_validation = if self.allow_private_hosts {
            UrlValidationConfig::permissive()
        } else {
            UrlValidationConfig::default()
        };

        PreviewServiceConfig::new()
            .with_fetcher_config(FetcherConfig {
                timeout: Duration::from_secs(self.fetch_timeout),
                ..FetcherConfig::default()
            })
            .with_render_settings(RenderSettings {
                navigation_timeout: Duration::from_secs(self.navigation_timeout),
                selector_timeout: Duration::from_secs(self.selector_timeout),
                max_sessions: self.max_render_sessions,
                chrome_executable: self.chrome_path.clone(),
                no_sandbox: self.no_sandbox,
                ..RenderSettings::default()
            })
            .with_url_validation(url_validation)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    setup_logging(LogConfig {
        log_dir: cli.log_dir.clone(),
        log_level: cli.log_level.clone(),
        console_output: true,
        file_output: cli.log_to_file,
    })?;

    let service = PreviewService::new_with_config(cli.service_config())
        .context("failed to build preview service")?;
    let app = server::router(Arc::new(service));

    let addr = format!("{}:{}", cli.host, cli.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("link-card listening on http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
