//! Social post extraction from a browser-rendered page.
//!
//! Every markup dependency lives in [`PostSelectors`] plus the two
//! derivation rules `derive_handle` and `derive_author`; a layout change on
//! the target site should only touch those.

use crate::browser_fetcher::{RenderSession, RenderSettings, Renderer};
use crate::extractor::parse_date;
use crate::utils::{collapse_whitespace, resolve_url};
use crate::{PreviewError, SocialPost};
use scraper::{ElementRef, Html, Selector};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, instrument, warn};
use url::Url;

/// CSS selectors for each logical field of a rendered post.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostSelectors {
    /// Container of one post; a thread renders several of these
    pub post_root: String,
    /// Language-tagged body text
    pub text: String,
    /// Element carrying a `datetime` attribute
    pub timestamp: String,
    pub media: String,
    pub link: String,
    /// Block holding "Display Name @handle"
    pub author_block: String,
}

impl Default for PostSelectors {
    fn default() -> Self {
        Self {
            post_root: "article".to_string(),
            text: "div[lang]".to_string(),
            timestamp: "time".to_string(),
            media: "img".to_string(),
            link: "a".to_string(),
            author_block: r#"div[data-testid="User-Name"]"#.to_string(),
        }
    }
}

impl PostSelectors {
    /// Compiles every selector, failing on the first invalid one.
    pub fn compile(&self) -> Result<PostParser, PreviewError> {
        Ok(PostParser {
            post_root: compile_selector("post_root", &self.post_root)?,
            text: compile_selector("text", &self.text)?,
            timestamp: compile_selector("timestamp", &self.timestamp)?,
            media: compile_selector("media", &self.media)?,
            link: compile_selector("link", &self.link)?,
            author_block: compile_selector("author_block", &self.author_block)?,
        })
    }
}

fn compile_selector(field: &str, css: &str) -> Result<Selector, PreviewError> {
    Selector::parse(css).map_err(|e| {
        PreviewError::InternalError(format!("invalid `{field}` selector {css:?}: {e:?}"))
    })
}

/// Compiled [`PostSelectors`], applied to serialized DOM.
#[derive(Debug, Clone)]
pub struct PostParser {
    post_root: Selector,
    text: Selector,
    timestamp: Selector,
    media: Selector,
    link: Selector,
    author_block: Selector,
}

impl PostParser {
    /// One record per post root, in document order. Each record only sees
    /// elements inside its own root.
    pub fn parse_posts(&self, html: &str, page_url: &Url) -> Vec<SocialPost> {
        let document = Html::parse_document(html);
        document
            .select(&self.post_root)
            .map(|root| self.parse_post(root, page_url))
            .collect()
    }

    fn parse_post(&self, root: ElementRef, page_url: &Url) -> SocialPost {
        let text = root
            .select(&self.text)
            .map(|el| collapse_whitespace(&el.text().collect::<String>()))
            .find(|text| !text.is_empty());

        let timestamp_utc = root
            .select(&self.timestamp)
            .filter_map(|el| el.value().attr("datetime"))
            .find_map(parse_date);

        let media_urls: Vec<String> = root
            .select(&self.media)
            .filter_map(|el| el.value().attr("src"))
            .filter_map(|src| resolve_url(page_url, src))
            .map(|url| url.to_string())
            .collect();

        let links: Vec<Url> = root
            .select(&self.link)
            .filter_map(|el| el.value().attr("href"))
            .filter_map(|href| resolve_url(page_url, href))
            .collect();

        let author_block = root
            .select(&self.author_block)
            .next()
            .map(|el| el.text().collect::<String>());

        SocialPost {
            author: author_block
                .as_deref()
                .map(derive_author)
                .unwrap_or_default(),
            handle: derive_handle(links.first(), page_url),
            profile_image: media_urls.first().cloned(),
            text,
            timestamp_utc,
            media_urls,
            outbound_links: links.iter().map(|url| url.to_string()).collect(),
        }
    }
}

/// The first link of a post points at its author's profile, so its first
/// path segment is the handle. Falls back to the requested URL's first
/// segment (`/someuser/status/123`).
fn derive_handle(first_link: Option<&Url>, page_url: &Url) -> String {
    first_link
        .and_then(first_path_segment)
        .or_else(|| first_path_segment(page_url))
        .unwrap_or_default()
}

fn first_path_segment(url: &Url) -> Option<String> {
    url.path_segments()?
        .next()
        .filter(|segment| !segment.is_empty())
        .map(|segment| segment.trim_start_matches('@').to_string())
}

/// Display name is whatever precedes the first `@` of the author block.
fn derive_author(block_text: &str) -> String {
    let name = block_text.split('@').next().unwrap_or_default();
    collapse_whitespace(name)
}

fn is_degraded(post: &SocialPost) -> bool {
    post.author.is_empty() || post.handle.is_empty() || post.text.is_none()
}

/// Renders social post URLs and extracts the primary post.
pub struct SocialPostExtractor {
    renderer: Arc<dyn Renderer>,
    parser: PostParser,
    selectors: PostSelectors,
    settings: RenderSettings,
    sessions: Arc<Semaphore>,
}

impl SocialPostExtractor {
    pub fn new(
        renderer: Arc<dyn Renderer>,
        settings: RenderSettings,
        selectors: &PostSelectors,
    ) -> Result<Self, PreviewError> {
        let parser = selectors.compile()?;
        let sessions = Arc::new(Semaphore::new(settings.max_sessions.max(1)));

        Ok(Self {
            renderer,
            parser,
            selectors: selectors.clone(),
            settings,
            sessions,
        })
    }

    /// Renders `url`, waits for the post root and returns the first post.
    ///
    /// The browser session is closed exactly once on every path that
    /// launched one.
    #[instrument(level = "debug", skip(self, url), fields(url = %url))]
    pub async fn extract(&self, url: &Url) -> Result<SocialPost, PreviewError> {
        let _permit = self
            .sessions
            .acquire()
            .await
            .map_err(|_| PreviewError::InternalError("render queue closed".to_string()))?;

        let mut session = self.renderer.launch().await?;
        let rendered = self.render(session.as_mut(), url).await;
        if let Err(e) = session.close().await {
            warn!(error = %e, "Failed to close render session");
        }
        let html = rendered?;

        let mut posts = self.parser.parse_posts(&html, url);
        debug!(count = posts.len(), "Parsed rendered posts");
        if posts.is_empty() {
            return Err(PreviewError::NoContentFound(format!(
                "no `{}` element in rendered page",
                self.selectors.post_root
            )));
        }

        let post = posts.swap_remove(0);
        if is_degraded(&post) {
            warn!(
                author = %post.author,
                handle = %post.handle,
                has_text = post.text.is_some(),
                "Post rendered with missing fields"
            );
        }
        Ok(post)
    }

    async fn render(
        &self,
        session: &mut dyn RenderSession,
        url: &Url,
    ) -> Result<String, PreviewError> {
        session
            .navigate(url.as_str(), self.settings.navigation_timeout)
            .await?;
        session
            .wait_for_selector(&self.selectors.post_root, self.settings.selector_timeout)
            .await?;
        session.content().await
    }
}
