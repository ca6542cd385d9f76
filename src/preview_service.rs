use crate::browser_fetcher::{default_renderer, RenderSettings, Renderer};
use crate::security::{UrlValidationConfig, UrlValidator};
use crate::social::{PostSelectors, SocialPostExtractor};
use crate::{
    classify_url, Fetcher, FetcherConfig, LinkKind, MetadataExtractor, PreviewError,
    PreviewResult,
};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, instrument};

pub const MAX_CONCURRENT_REQUESTS: usize = 500;

/// PreviewService turns a URL into a preview card. Social post URLs are
/// rendered in a browser, everything else is fetched and read from its
/// metadata.
#[derive(Clone)]
pub struct PreviewService {
    validator: UrlValidator,
    fetcher: Fetcher,
    extractor: MetadataExtractor,
    social: Arc<SocialPostExtractor>,
    // Max Concurrent Requests
    semaphore: Arc<Semaphore>,
}

impl PreviewService {
    /// Creates a service with default limits and the default renderer.
    pub fn new() -> Result<Self, PreviewError> {
        Self::new_with_config(PreviewServiceConfig::default())
    }

    pub fn new_with_config(config: PreviewServiceConfig) -> Result<Self, PreviewError> {
        debug!("Initializing PreviewService with custom configuration");

        // Redirect hops are held to the same admission policy as request URLs.
        let fetcher = Fetcher::new_with_config(FetcherConfig {
            url_validation: config.url_validation.clone(),
            ..config.fetcher_config
        })?;
        let renderer = config
            .renderer
            .unwrap_or_else(|| default_renderer(&config.render_settings));
        let social =
            SocialPostExtractor::new(renderer, config.render_settings, &config.post_selectors)?;
        let semaphore = Arc::new(Semaphore::new(config.max_concurrent_requests));

        debug!("PreviewService initialized with custom configuration");

        Ok(Self {
            validator: UrlValidator::new(config.url_validation),
            fetcher,
            extractor: MetadataExtractor::new(),
            social: Arc::new(social),
            semaphore,
        })
    }

    /// Validates, classifies and dispatches `url`. Rejected URLs never reach
    /// the network or the renderer.
    #[instrument(level = "debug", skip(self))]
    pub async fn get_preview(&self, url: &str) -> Result<PreviewResult, PreviewError> {
        let url = self.validator.validate(url).inspect_err(|e| e.log())?;

        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|_| PreviewError::InternalError("request queue closed".to_string()))?;

        let result = match classify_url(&url) {
            LinkKind::Social => {
                debug!("Detected social post URL, rendering");
                self.social
                    .extract(&url)
                    .await
                    .map(PreviewResult::SocialPost)
            }
            LinkKind::Generic => {
                debug!("Using default URL handler");
                match self.fetcher.fetch(&url).await {
                    Ok(page) => self
                        .extractor
                        .extract(&page.html, &page.final_url)
                        .map(PreviewResult::Page),
                    Err(e) => Err(e),
                }
            }
        };

        result.inspect_err(|e| e.log())
    }
}

/// Read-only configuration, injected into every component at construction.
///
/// # Examples
/// ```ignore
/// let service = PreviewService::new_with_config(
///     PreviewServiceConfig::new()
///         .with_max_concurrent_requests(50)
///         .with_render_settings(RenderSettings { max_sessions: 2, ..Default::default() }),
/// )?;
/// ```
#[derive(Clone)]
pub struct PreviewServiceConfig {
    pub max_concurrent_requests: usize,
    pub fetcher_config: FetcherConfig,
    pub render_settings: RenderSettings,
    pub post_selectors: PostSelectors,
    pub url_validation: UrlValidationConfig,
    /// Overrides the renderer built from `render_settings`
    pub renderer: Option<Arc<dyn Renderer>>,
}

impl Default for PreviewServiceConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl PreviewServiceConfig {
    pub fn new() -> Self {
        Self {
            max_concurrent_requests: MAX_CONCURRENT_REQUESTS,
            fetcher_config: FetcherConfig::default(),
            render_settings: RenderSettings::default(),
            post_selectors: PostSelectors::default(),
            url_validation: UrlValidationConfig::default(),
            renderer: None,
        }
    }

    pub fn with_max_concurrent_requests(mut self, max_concurrent_requests: usize) -> Self {
        self.max_concurrent_requests = max_concurrent_requests;
        self
    }

    pub fn with_fetcher_config(mut self, fetcher_config: FetcherConfig) -> Self {
        self.fetcher_config = fetcher_config;
        self
    }

    pub fn with_render_settings(mut self, render_settings: RenderSettings) -> Self {
        self.render_settings = render_settings;
        self
    }

    pub fn with_post_selectors(mut self, post_selectors: PostSelectors) -> Self {
        self.post_selectors = post_selectors;
        self
    }

    pub fn with_url_validation(mut self, url_validation: UrlValidationConfig) -> Self {
        self.url_validation = url_validation;
        self
    }

    pub fn with_renderer(mut self, renderer: Arc<dyn Renderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }
}
