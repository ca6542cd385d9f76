use crate::utils::truncate_str;
use crate::PreviewResult;
use std::fmt::Display;
use std::path::PathBuf;
use thiserror::Error;
use tracing::{debug, error, info};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    fmt as subscriber_fmt, layer::SubscriberExt, util::SubscriberInitExt, util::TryInitError,
    EnvFilter, Layer,
};

#[derive(Debug, Clone)]
pub struct LogConfig {
    pub log_dir: PathBuf,
    pub log_level: String,
    pub console_output: bool,
    pub file_output: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            log_dir: "logs".into(),
            log_level: "info".into(),
            console_output: true,
            file_output: true,
        }
    }
}

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("failed to create log directory: {0}")]
    LogDir(#[from] std::io::Error),

    #[error("failed to install global subscriber: {0}")]
    Init(#[from] TryInitError),
}

const CARD_WIDTH: usize = 80;
const CONTENT_WIDTH: usize = CARD_WIDTH - 12;

fn create_separator(width: usize, ch: char) -> String {
    std::iter::repeat_n(ch, width).collect()
}

fn card_line(label: &str, value: Option<&str>) -> String {
    format!(
        "{label:<9} {}",
        truncate_str(value.unwrap_or("N/A"), CONTENT_WIDTH)
    )
}

/// Logs a boxed summary of a successful preview at info level.
pub fn log_preview_card(result: &PreviewResult, url: &str) {
    let lines = match result {
        PreviewResult::Page(page) => vec![
            card_line("Type:", Some("page")),
            card_line("URL:", Some(url)),
            card_line("Title:", Some(&page.title)),
            card_line("Desc:", page.description.as_deref()),
            card_line("Image:", page.image.as_deref()),
            card_line("Site:", Some(&page.domain)),
            card_line("Favicon:", Some(&page.favicon)),
        ],
        PreviewResult::SocialPost(post) => {
            let media = post.media_urls.len().to_string();
            vec![
                card_line("Type:", Some("tweet")),
                card_line("URL:", Some(url)),
                card_line("Author:", Some(&post.author)),
                card_line("Handle:", Some(&post.handle)),
                card_line("Text:", post.text.as_deref()),
                card_line("Media:", Some(&media)),
            ]
        }
    };

    let horizontal_line = create_separator(CARD_WIDTH - 2, '═');
    info!(
        "\n╔{}╗\n{}\n╚{}╝",
        horizontal_line,
        lines.join("\n"),
        horizontal_line,
    );
}

/// Logs a boxed summary of a failed preview at error level.
pub fn log_error_card<E: Display + std::error::Error>(url: &str, error: &E) {
    let top_bottom = create_separator(CARD_WIDTH - 2, '═');
    let middle = create_separator(CARD_WIDTH - 2, '─');

    let mut error_details = error.to_string();
    if let Some(source) = error.source() {
        error_details = format!("{error_details} (cause: {source})");
    }

    error!(
        "\n╔{}╗\n{}\n{}\n{}\n╚{}╝",
        top_bottom,
        card_line("URL:", Some(url)),
        middle,
        card_line("Error:", Some(&error_details)),
        top_bottom,
    );
}

/// Installs the global subscriber. `RUST_LOG` takes precedence over
/// `config.log_level`.
pub fn setup_logging(config: LogConfig) -> Result<(), LoggingError> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let mut layers = Vec::new();

    if config.console_output {
        let console_layer = subscriber_fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .with_line_number(true)
            .with_file(true);
        layers.push(console_layer.boxed());
    }

    if config.file_output {
        std::fs::create_dir_all(&config.log_dir)?;

        let file_appender =
            RollingFileAppender::new(Rotation::DAILY, &config.log_dir, "link-card.log");

        let file_layer = subscriber_fmt::layer()
            .with_ansi(false)
            .with_target(true)
            .with_thread_ids(true)
            .with_line_number(true)
            .with_file(true)
            .with_writer(file_appender);

        layers.push(file_layer.boxed());
    }

    tracing_subscriber::registry()
        .with(env_filter)
        .with(layers)
        .try_init()?;

    debug!("Logging system initialized with config: {:?}", config);
    Ok(())
}
