use thiserror::Error;
use tracing::{error, warn};

#[derive(Debug, Error)]
pub enum PreviewError {
    #[error("Malformed URL: {0}")]
    MalformedUrl(String),

    #[error("URL not allowed: {0}")]
    UrlNotAllowed(String),

    #[error("Failed to fetch content: {0}")]
    FetchFailed(String),

    #[error("Unparsable content: {0}")]
    UnparsableContent(String),

    #[error("Timed out waiting for rendered content: {0}")]
    RenderTimeout(String),

    #[error("No post content found: {0}")]
    NoContentFound(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl From<url::ParseError> for PreviewError {
    fn from(e: url::ParseError) -> Self {
        PreviewError::MalformedUrl(e.to_string())
    }
}

impl PreviewError {
    /// Stable, machine-readable name of the failure kind.
    pub fn kind(&self) -> &'static str {
        match self {
            PreviewError::MalformedUrl(_) => "malformed_url",
            PreviewError::UrlNotAllowed(_) => "url_not_allowed",
            PreviewError::FetchFailed(_) => "fetch_failed",
            PreviewError::UnparsableContent(_) => "unparsable_content",
            PreviewError::RenderTimeout(_) => "render_timeout",
            PreviewError::NoContentFound(_) => "no_content_found",
            PreviewError::InternalError(_) => "internal_error",
        }
    }

    /// Whether the caller, not the upstream or this process, is at fault.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            PreviewError::MalformedUrl(_) | PreviewError::UrlNotAllowed(_)
        )
    }

    pub fn log(&self) {
        match self {
            PreviewError::MalformedUrl(e) => {
                warn!(error = %e, "URL parsing failed");
            }
            PreviewError::UrlNotAllowed(e) => {
                warn!(error = %e, "URL rejected by admission policy");
            }
            PreviewError::FetchFailed(e) => {
                error!(error = %e, "Content fetch failed");
            }
            PreviewError::UnparsableContent(e) => {
                warn!(error = %e, "Fetched content could not be parsed as HTML");
            }
            PreviewError::RenderTimeout(e) => {
                error!(error = %e, "Rendered content did not appear in time");
            }
            PreviewError::NoContentFound(e) => {
                warn!(error = %e, "Rendered page held no post content");
            }
            PreviewError::InternalError(e) => {
                error!(error = %e, "Internal error during preview generation");
            }
        }
    }
}
