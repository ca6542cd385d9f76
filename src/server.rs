//! HTTP surface: `POST /preview` and `GET /health`.

use crate::{log_error_card, log_preview_card, PreviewError, PreviewService};
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tracing::{debug, warn};

pub const MAX_BODY_SIZE: usize = 64 * 1024;
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Clone)]
struct AppState {
    service: Arc<PreviewService>,
}

#[derive(Debug, Deserialize)]
pub struct PreviewRequest {
    pub url: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub kind: String,
}

impl ErrorBody {
    fn new(error: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            kind: kind.into(),
        }
    }
}

/// Caller-visible status for each failure kind.
pub fn status_for(error: &PreviewError) -> StatusCode {
    match error {
        PreviewError::MalformedUrl(_) => StatusCode::BAD_REQUEST,
        PreviewError::UrlNotAllowed(_) => StatusCode::FORBIDDEN,
        PreviewError::FetchFailed(_)
        | PreviewError::UnparsableContent(_)
        | PreviewError::NoContentFound(_) => StatusCode::BAD_GATEWAY,
        PreviewError::RenderTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
        PreviewError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for PreviewError {
    fn into_response(self) -> Response {
        let status = status_for(&self);
        (status, Json(ErrorBody::new(self.to_string(), self.kind()))).into_response()
    }
}

pub fn router(service: Arc<PreviewService>) -> Router {
    Router::new()
        .route("/health", get(handle_health))
        .route("/preview", post(handle_preview))
        .with_state(AppState { service })
        .layer(RequestBodyLimitLayer::new(MAX_BODY_SIZE))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::GATEWAY_TIMEOUT,
            REQUEST_TIMEOUT,
        ))
}

async fn handle_health() -> &'static str {
    "healthy"
}

async fn handle_preview(
    State(state): State<AppState>,
    payload: Result<Json<PreviewRequest>, JsonRejection>,
) -> Response {
    let url = match payload {
        Ok(Json(PreviewRequest { url: Some(url) })) => url,
        Ok(Json(PreviewRequest { url: None })) => {
            return missing_url("`url` is required");
        }
        Err(rejection) if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE => {
            return (
                StatusCode::PAYLOAD_TOO_LARGE,
                Json(ErrorBody::new(rejection.body_text(), "payload_too_large")),
            )
                .into_response();
        }
        Err(rejection) => {
            warn!(error = %rejection, "Rejected preview request body");
            return missing_url(&rejection.body_text());
        }
    };

    debug!(url = %url, "Preview requested");
    match state.service.get_preview(&url).await {
        Ok(result) => {
            log_preview_card(&result, &url);
            Json(result).into_response()
        }
        Err(e) => {
            log_error_card(&url, &e);
            e.into_response()
        }
    }
}

fn missing_url(message: &str) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorBody::new(message, "missing_url")),
    )
        .into_response()
}
