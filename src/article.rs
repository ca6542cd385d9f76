//! Readability-style article extraction, used only as a fallback source for
//! title and description.

use crate::utils::{collapse_whitespace, truncate_str};
use std::io::Cursor;
use tracing::debug;
use url::Url;

/// Display width of the description excerpt taken from the article body.
pub const EXCERPT_WIDTH: usize = 200;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Article {
    pub title: Option<String>,
    pub text: Option<String>,
}

impl Article {
    /// Leading portion of the article body, ellipsized when cut.
    pub fn excerpt(&self) -> Option<String> {
        self.text
            .as_deref()
            .map(|text| truncate_str(text, EXCERPT_WIDTH))
    }
}

/// Runs the readability algorithm over `html`. A failed extraction yields an
/// empty article rather than an error.
pub fn extract_article(html: &str, url: &Url) -> Article {
    let mut cursor = Cursor::new(html.as_bytes());
    match readability::extractor::extract(&mut cursor, url) {
        Ok(product) => Article {
            title: non_empty(&product.title),
            text: non_empty(&product.text),
        },
        Err(e) => {
            debug!(url = %url, error = ?e, "Readability extraction failed");
            Article::default()
        }
    }
}

fn non_empty(s: &str) -> Option<String> {
    let collapsed = collapse_whitespace(s);
    (!collapsed.is_empty()).then_some(collapsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extracts_article_body() {
        let body = "Rust is a systems programming language. ".repeat(20);
        let html = format!(
            "<html><head><title>Rust notes</title></head><body>\
             <nav><a href=\"/\">Home</a></nav>\
             <article><h1>Rust notes</h1><p>{body}</p><p>{body}</p></article>\
             </body></html>"
        );
        let url = Url::parse("https://blog.example/post").unwrap();
        let article = extract_article(&html, &url);

        assert!(article.text.as_deref().unwrap().contains("systems programming"));
        let excerpt = article.excerpt().unwrap();
        assert!(excerpt.ends_with("..."));
        assert!(excerpt.chars().count() <= EXCERPT_WIDTH);
    }

    #[test]
    fn test_short_text_is_not_ellipsized() {
        let article = Article {
            title: None,
            text: Some("Short body.".to_string()),
        };
        assert_eq!(article.excerpt().as_deref(), Some("Short body."));
    }
}
