use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

mod article;
mod browser_fetcher;
mod classifier;
mod error;
mod extractor;
mod fetcher;
mod logging;
mod preview_service;
mod security;
pub mod server;
mod social;
mod utils;

pub use article::{extract_article, Article};
#[cfg(feature = "browser")]
pub use browser_fetcher::ChromeRenderer;
pub use browser_fetcher::{RenderSession, RenderSettings, Renderer};
pub use classifier::{classify, classify_url, is_social_host, LinkKind};
pub use error::PreviewError;
pub use extractor::{MetadataExtractor, UNTITLED_PLACEHOLDER};
pub use fetcher::{FetchedPage, Fetcher, FetcherConfig};
pub use logging::{log_error_card, log_preview_card, setup_logging, LogConfig, LoggingError};
pub use preview_service::{PreviewService, PreviewServiceConfig, MAX_CONCURRENT_REQUESTS};
pub use security::{UrlValidationConfig, UrlValidator};
pub use social::{PostParser, PostSelectors, SocialPostExtractor};

/// Link card for an ordinary web page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PagePreview {
    pub title: String,
    pub description: Option<String>,
    pub image: Option<String>,
    pub author: Option<String>,
    pub publisher: Option<String>,
    pub date: Option<DateTime<Utc>>,
    pub canonical_url: String,
    pub domain: String,
    pub favicon: String,
    /// Distinct absolute http(s) links, in first-seen order.
    pub outbound_links: Vec<String>,
}

/// A social-media post as rendered in a browser.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SocialPost {
    pub author: String,
    pub handle: String,
    pub profile_image: Option<String>,
    pub text: Option<String>,
    pub timestamp_utc: Option<DateTime<Utc>>,
    /// Every image in the post, document order, duplicates kept.
    pub media_urls: Vec<String>,
    /// Every link in the post, document order, duplicates kept.
    pub outbound_links: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum PreviewResult {
    #[serde(rename = "page")]
    Page(PagePreview),
    #[serde(rename = "tweet")]
    SocialPost(SocialPost),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_page_wire_shape() {
        let result = PreviewResult::Page(PagePreview {
            title: "Post".into(),
            description: None,
            image: Some("https://blog.example/og.png".into()),
            author: None,
            publisher: None,
            date: None,
            canonical_url: "https://blog.example/post".into(),
            domain: "blog.example".into(),
            favicon: "https://blog.example/favicon.ico".into(),
            outbound_links: vec![],
        });

        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["type"], "page");
        assert_eq!(value["data"]["title"], "Post");
        assert_eq!(value["data"]["canonicalUrl"], "https://blog.example/post");
        assert_eq!(value["data"]["description"], json!(null));
    }

    #[test]
    fn test_tweet_wire_shape() {
        let result = PreviewResult::SocialPost(SocialPost {
            author: "Some User".into(),
            handle: "someuser".into(),
            profile_image: None,
            text: Some("hello".into()),
            timestamp_utc: Some("2024-05-01T12:30:00Z".parse().unwrap()),
            media_urls: vec!["https://pbs.twimg.com/a.jpg".into()],
            outbound_links: vec![],
        });

        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["type"], "tweet");
        assert_eq!(value["data"]["handle"], "someuser");
        assert_eq!(value["data"]["timestampUtc"], "2024-05-01T12:30:00Z");
        assert_eq!(value["data"]["mediaUrls"][0], "https://pbs.twimg.com/a.jpg");

        let back: PreviewResult = serde_json::from_value(value).unwrap();
        assert_eq!(back, result);
    }
}
