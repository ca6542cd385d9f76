//! Decides which extraction strategy a URL needs.

use crate::utils::normalize_host;
use crate::PreviewError;
use url::Url;

/// Hostnames whose posts are rendered client-side and need a browser.
const SOCIAL_HOSTS: &[&str] = &["twitter.com", "x.com", "mobile.twitter.com", "mobile.x.com"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkKind {
    Social,
    Generic,
}

/// Parses `url` and classifies it. Performs no network access.
pub fn classify(url: &str) -> Result<LinkKind, PreviewError> {
    let parsed = Url::parse(url)?;
    Ok(classify_url(&parsed))
}

pub fn classify_url(url: &Url) -> LinkKind {
    match url.host_str() {
        Some(host) if is_social_host(host) => LinkKind::Social,
        _ => LinkKind::Generic,
    }
}

pub fn is_social_host(host: &str) -> bool {
    let host = normalize_host(host);
    SOCIAL_HOSTS.contains(&host.as_str())
}
