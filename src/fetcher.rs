use crate::security::{UrlValidationConfig, UrlValidator};
use crate::PreviewError;
use reqwest::redirect::Policy;
use reqwest::{header, Client};
use std::error::Error as _;
use std::time::Duration;
use tracing::{debug, error, instrument, warn};
use url::Url;

pub const DEFAULT_USER_AGENT: &str = concat!("link-card/", env!("CARGO_PKG_VERSION"));

/// Configuration for the generic page fetcher.
///
/// # Examples
/// ```ignore
/// let fetcher = Fetcher::new_with_config(FetcherConfig {
///     timeout: Duration::from_secs(5),
///     ..FetcherConfig::default()
/// })?;
/// ```
#[derive(Debug, Clone)]
pub struct FetcherConfig {
    pub user_agent: String,
    pub timeout: Duration,
    pub max_redirects: usize,
    pub max_body_bytes: usize,
    /// Admission policy re-applied to every redirect hop
    pub url_validation: UrlValidationConfig,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout: Duration::from_secs(10),
            max_redirects: 10,
            max_body_bytes: 5 * 1024 * 1024,
            url_validation: UrlValidationConfig::default(),
        }
    }
}

/// An HTML document as served, after redirects.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub final_url: Url,
    pub html: String,
}

#[derive(Clone)]
pub struct Fetcher {
    client: Client,
    max_body_bytes: usize,
}

impl Fetcher {
    pub fn new() -> Result<Self, PreviewError> {
        Self::new_with_config(FetcherConfig::default())
    }

    pub fn new_with_config(config: FetcherConfig) -> Result<Self, PreviewError> {
        let client = Client::builder()
            .user_agent(config.user_agent)
            .timeout(config.timeout)
            .redirect(redirect_policy(
                config.max_redirects,
                UrlValidator::new(config.url_validation),
            ))
            .build()
            .map_err(|e| {
                error!(error = %e, "Failed to create HTTP client");
                PreviewError::InternalError(format!("failed to initialize HTTP client: {e}"))
            })?;

        debug!("Fetcher initialized");
        Ok(Self {
            client,
            max_body_bytes: config.max_body_bytes,
        })
    }

    /// Single GET with the configured timeout. No retries.
    #[instrument(level = "debug", skip(self, url), fields(url = %url), err)]
    pub async fn fetch(&self, url: &Url) -> Result<FetchedPage, PreviewError> {
        let mut response = self
            .client
            .get(url.clone())
            .header(header::ACCEPT, "text/html,application/xhtml+xml;q=0.9,*/*;q=0.5")
            .send()
            .await
            .map_err(|e| {
                if let Some(rejection) = rejected_redirect(&e) {
                    warn!(error = %rejection, "Redirect target rejected");
                    PreviewError::UrlNotAllowed(format!("redirect rejected: {rejection}"))
                } else if e.is_timeout() {
                    warn!(error = %e, "Request timed out");
                    PreviewError::FetchFailed(format!("request timed out: {e}"))
                } else {
                    error!(error = %e, "Failed to send request");
                    PreviewError::FetchFailed(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(PreviewError::FetchFailed(format!("upstream returned status {status}")));
        }

        if let Some(content_type) = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
        {
            if !is_html_content_type(content_type) {
                return Err(PreviewError::UnparsableContent(format!(
                    "expected HTML, got {content_type}"
                )));
            }
        }

        if let Some(len) = response.content_length() {
            if len as usize > self.max_body_bytes {
                return Err(PreviewError::UnparsableContent(format!(
                    "body of {len} bytes exceeds limit of {}",
                    self.max_body_bytes
                )));
            }
        }

        let final_url = response.url().clone();

        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await.map_err(|e| {
            error!(error = %e, "Failed to read response body");
            PreviewError::FetchFailed(format!("failed to read body: {e}"))
        })? {
            if body.len() + chunk.len() > self.max_body_bytes {
                return Err(PreviewError::UnparsableContent(format!(
                    "body exceeds limit of {} bytes",
                    self.max_body_bytes
                )));
            }
            body.extend_from_slice(&chunk);
        }

        let html = String::from_utf8_lossy(&body).into_owned();
        if html.trim().is_empty() {
            return Err(PreviewError::UnparsableContent("empty body".to_string()));
        }

        debug!(final_url = %final_url, content_length = html.len(), "Fetched webpage");
        Ok(FetchedPage { final_url, html })
    }
}

/// Follows at most `max_redirects` hops, refusing any hop the validator
/// would refuse as a request URL.
fn redirect_policy(max_redirects: usize, validator: UrlValidator) -> Policy {
    Policy::custom(move |attempt| {
        if attempt.previous().len() > max_redirects {
            return attempt.error(format!("too many redirects (limit {max_redirects})"));
        }
        match validator.validate(attempt.url().as_str()) {
            Ok(_) => attempt.follow(),
            Err(e) => attempt.error(e),
        }
    })
}

/// The admission error carried by a redirect refused in [`redirect_policy`].
fn rejected_redirect(e: &reqwest::Error) -> Option<&PreviewError> {
    if !e.is_redirect() {
        return None;
    }
    let mut source = e.source();
    while let Some(err) = source {
        if let Some(rejection) = err.downcast_ref::<PreviewError>() {
            return Some(rejection);
        }
        source = err.source();
    }
    None
}

fn is_html_content_type(content_type: &str) -> bool {
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    mime == "text/html" || mime == "application/xhtml+xml"
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    // wiremock listens on loopback, so the redirect checks must admit it.
    fn fetcher_with_timeout(timeout: Duration) -> Fetcher {
        Fetcher::new_with_config(FetcherConfig {
            timeout,
            url_validation: UrlValidationConfig::permissive(),
            ..FetcherConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn test_html_content_types() {
        assert!(is_html_content_type("text/html"));
        assert!(is_html_content_type("text/html; charset=utf-8"));
        assert!(is_html_content_type("Application/XHTML+XML"));
        assert!(!is_html_content_type("application/json"));
        assert!(!is_html_content_type("image/png"));
    }

    #[tokio::test]
    async fn test_fetch_html() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/page"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(
                "<html><head><title>Hi</title></head></html>",
                "text/html; charset=utf-8",
            ))
            .mount(&server)
            .await;

        let url = Url::parse(&format!("{}/page", server.uri())).unwrap();
        let page = fetcher_with_timeout(Duration::from_secs(5))
            .fetch(&url)
            .await
            .unwrap();
        assert!(page.html.contains("<title>Hi</title>"));
        assert_eq!(page.final_url, url);
    }

    #[tokio::test]
    async fn test_fetch_follows_redirect() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/old"))
            .respond_with(ResponseTemplate::new(301).insert_header("location", "/new"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/new"))
            .respond_with(ResponseTemplate::new(200).set_body_raw("<p>moved</p>", "text/html"))
            .mount(&server)
            .await;

        let url = Url::parse(&format!("{}/old", server.uri())).unwrap();
        let page = fetcher_with_timeout(Duration::from_secs(5))
            .fetch(&url)
            .await
            .unwrap();
        assert_eq!(page.final_url.path(), "/new");
    }

    #[tokio::test]
    async fn test_redirect_to_refused_host_is_not_followed() {
        let server = MockServer::start().await;
        let port = server.address().port();
        Mock::given(method("GET"))
            .and(path("/start"))
            .respond_with(
                ResponseTemplate::new(302)
                    .insert_header("location", format!("http://localhost:{port}/secret")),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/secret"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(
                "<title>internal secret</title>",
                "text/html",
            ))
            .expect(0)
            .mount(&server)
            .await;

        let mut url_validation = UrlValidationConfig::permissive();
        url_validation.blocked_domains.insert("localhost".to_string());
        let fetcher = Fetcher::new_with_config(FetcherConfig {
            url_validation,
            ..FetcherConfig::default()
        })
        .unwrap();

        let url = Url::parse(&format!("{}/start", server.uri())).unwrap();
        match fetcher.fetch(&url).await {
            Err(PreviewError::UrlNotAllowed(msg)) => assert!(msg.contains("localhost")),
            other => panic!("expected UrlNotAllowed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_redirect_to_private_host_blocked_by_default() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(302).insert_header("location", "http://127.0.0.1:9/admin"),
            )
            .mount(&server)
            .await;

        // Only the hop is checked here; the caller admitted the first URL.
        let url = Url::parse(&server.uri()).unwrap();
        let result = Fetcher::new().unwrap().fetch(&url).await;
        assert!(matches!(result, Err(PreviewError::UrlNotAllowed(_))));
    }

    #[tokio::test]
    async fn test_redirect_limit() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(302).insert_header("location", "/loop"))
            .mount(&server)
            .await;

        let fetcher = Fetcher::new_with_config(FetcherConfig {
            max_redirects: 3,
            url_validation: UrlValidationConfig::permissive(),
            ..FetcherConfig::default()
        })
        .unwrap();
        let url = Url::parse(&server.uri()).unwrap();
        let result = fetcher.fetch(&url).await;
        assert!(matches!(result, Err(PreviewError::FetchFailed(_))));
        assert!(server.received_requests().await.unwrap().len() <= 4);
    }

    #[tokio::test]
    async fn test_fetch_rejects_non_html() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_raw("{}", "application/json"))
            .mount(&server)
            .await;

        let url = Url::parse(&server.uri()).unwrap();
        let result = fetcher_with_timeout(Duration::from_secs(5)).fetch(&url).await;
        assert!(matches!(result, Err(PreviewError::UnparsableContent(_))));
    }

    #[tokio::test]
    async fn test_fetch_rejects_empty_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_raw("  \n ", "text/html"))
            .mount(&server)
            .await;

        let url = Url::parse(&server.uri()).unwrap();
        let result = fetcher_with_timeout(Duration::from_secs(5)).fetch(&url).await;
        assert!(matches!(result, Err(PreviewError::UnparsableContent(_))));
    }

    #[tokio::test]
    async fn test_fetch_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let url = Url::parse(&server.uri()).unwrap();
        match fetcher_with_timeout(Duration::from_secs(5)).fetch(&url).await {
            Err(PreviewError::FetchFailed(msg)) => assert!(msg.contains("404")),
            other => panic!("expected FetchFailed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_fetch_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw("<p>late</p>", "text/html")
                    .set_delay(Duration::from_secs(2)),
            )
            .mount(&server)
            .await;

        let url = Url::parse(&server.uri()).unwrap();
        let result = fetcher_with_timeout(Duration::from_millis(200)).fetch(&url).await;
        assert!(matches!(result, Err(PreviewError::FetchFailed(_))));
    }

    #[tokio::test]
    async fn test_fetch_body_limit() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_raw("x".repeat(2048), "text/html"))
            .mount(&server)
            .await;

        let fetcher = Fetcher::new_with_config(FetcherConfig {
            max_body_bytes: 1024,
            ..FetcherConfig::default()
        })
        .unwrap();
        let url = Url::parse(&server.uri()).unwrap();
        let result = fetcher.fetch(&url).await;
        assert!(matches!(result, Err(PreviewError::UnparsableContent(_))));
    }
}
