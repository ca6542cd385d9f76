use crate::article::{extract_article, Article};
use crate::utils::{collapse_whitespace, favicon_fallback, normalize_host, resolve_url};
use crate::{PagePreview, PreviewError};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use scraper::{ElementRef, Html, Selector};
use serde_json::Value;
use std::cell::OnceCell;
use std::collections::HashSet;
use tracing::{debug, instrument};
use url::Url;

/// Title used when every title source comes up empty.
pub const UNTITLED_PLACEHOLDER: &str = "Untitled";

const TITLE_META: &[&str] = &[
    "meta[property='og:title']",
    "meta[name='og:title']",
    "meta[name='twitter:title']",
    "meta[property='twitter:title']",
];

const DESCRIPTION_META: &[&str] = &[
    "meta[property='og:description']",
    "meta[name='og:description']",
    "meta[name='twitter:description']",
    "meta[property='twitter:description']",
    "meta[name='description']",
];

const IMAGE_META: &[&str] = &[
    "meta[property='og:image']",
    "meta[property='og:image:url']",
    "meta[property='og:image:secure_url']",
    "meta[name='twitter:image']",
    "meta[property='twitter:image']",
    "meta[name='twitter:image:src']",
];

const AUTHOR_META: &[&str] = &[
    "meta[name='author']",
    "meta[property='article:author']",
    "meta[property='author']",
];

const PUBLISHER_META: &[&str] = &[
    "meta[property='og:site_name']",
    "meta[name='application-name']",
];

const DATE_META: &[&str] = &[
    "meta[property='article:published_time']",
    "meta[property='og:published_time']",
    "meta[name='date']",
    "meta[name='pubdate']",
    "meta[itemprop='datePublished']",
];

/// Metadata extractor, responsible for turning a fetched HTML document into a page preview
#[derive(Clone, Default)]
pub struct MetadataExtractor;

/// Per-request state for one extraction: the parsed tree and the URLs it is
/// resolved against. Dropped when `extract` returns.
struct ExtractionContext<'a> {
    html: &'a str,
    document: Html,
    page_url: &'a Url,
    base_url: Url,
    linked_data: LinkedData,
    article: OnceCell<Article>,
}

impl<'a> ExtractionContext<'a> {
    fn new(html: &'a str, page_url: &'a Url) -> Self {
        let document = Html::parse_document(html);
        let base_url = Selector::parse("base[href]")
            .ok()
            .and_then(|sel| {
                document
                    .select(&sel)
                    .next()
                    .and_then(|el| el.value().attr("href"))
                    .and_then(|href| resolve_url(page_url, href))
            })
            .unwrap_or_else(|| page_url.clone());
        let linked_data = LinkedData::collect(&document);

        Self {
            html,
            document,
            page_url,
            base_url,
            linked_data,
            article: OnceCell::new(),
        }
    }

    /// Readability output, computed on first use.
    fn article(&self) -> &Article {
        self.article
            .get_or_init(|| extract_article(self.html, self.page_url))
    }

    fn meta(&self, selectors: &[&str]) -> Option<String> {
        selectors.iter().find_map(|css| {
            let selector = Selector::parse(css).ok()?;
            self.document
                .select(&selector)
                .filter_map(|el| el.value().attr("content"))
                .find_map(non_empty)
        })
    }

    fn element_text(&self, css: &str) -> Option<String> {
        let selector = Selector::parse(css).ok()?;
        self.document
            .select(&selector)
            .map(|el| text_of(&el))
            .find_map(|text| non_empty(&text))
    }

    /// `href` of the first `<link>`/`<a>` whose `rel` token list contains `rel`.
    fn rel_href(&self, rel: &str) -> Option<Url> {
        self.rel_href_by(|el| has_rel(el, rel))
    }

    fn rel_href_by(&self, matches: impl Fn(&ElementRef) -> bool) -> Option<Url> {
        let selector = Selector::parse("link[rel][href], a[rel][href]").ok()?;
        self.document
            .select(&selector)
            .filter(|el| matches(el))
            .filter_map(|el| el.value().attr("href"))
            .find_map(|href| self.resolve(href))
    }

    fn resolve(&self, href: &str) -> Option<Url> {
        resolve_url(&self.base_url, href)
    }
}

impl MetadataExtractor {
    pub fn new() -> Self {
        Self
    }

    #[instrument(level = "debug", skip(self, html), fields(url = %page_url))]
    pub fn extract(&self, html: &str, page_url: &Url) -> Result<PagePreview, PreviewError> {
        if !html.contains('<') {
            return Err(PreviewError::UnparsableContent(
                "body does not look like HTML".to_string(),
            ));
        }

        let cx = ExtractionContext::new(html, page_url);

        let title = self.extract_title(&cx);
        let description = self.extract_description(&cx, &title);
        let image = self.extract_image(&cx);
        let author = self.extract_author(&cx);
        let publisher = self.extract_publisher(&cx);
        let date = self.extract_date(&cx);
        let canonical_url = self.extract_canonical_url(&cx);
        let favicon = self.extract_favicon(&cx);
        let outbound_links = self.extract_outbound_links(&cx);
        let domain = page_url.host_str().map(normalize_host).unwrap_or_default();

        debug!(
            title = %title,
            has_description = description.is_some(),
            has_image = image.is_some(),
            links = outbound_links.len(),
            "Page metadata extracted"
        );

        Ok(PagePreview {
            title,
            description,
            image,
            author,
            publisher,
            date,
            canonical_url,
            domain,
            favicon,
            outbound_links,
        })
    }

    fn extract_title(&self, cx: &ExtractionContext) -> String {
        cx.meta(TITLE_META)
            .or_else(|| cx.element_text("title"))
            .or_else(|| cx.linked_data.text("headline", &["name"]))
            .or_else(|| cx.article().title.clone())
            .unwrap_or_else(|| UNTITLED_PLACEHOLDER.to_string())
    }

    /// An excerpt that only repeats the title is not a description.
    fn extract_description(&self, cx: &ExtractionContext, title: &str) -> Option<String> {
        cx.meta(DESCRIPTION_META)
            .or_else(|| cx.article().excerpt().filter(|excerpt| excerpt != title))
    }

    fn extract_image(&self, cx: &ExtractionContext) -> Option<String> {
        cx.meta(IMAGE_META)
            .and_then(|src| cx.resolve(&src))
            .or_else(|| cx.rel_href("image_src"))
            .or_else(|| {
                cx.meta(&["meta[itemprop='image']"])
                    .and_then(|src| cx.resolve(&src))
            })
            .or_else(|| {
                cx.linked_data
                    .text("image", &["url", "contentUrl"])
                    .and_then(|src| cx.resolve(&src))
            })
            .map(|url| url.to_string())
    }

    fn extract_author(&self, cx: &ExtractionContext) -> Option<String> {
        let candidates = [
            cx.meta(AUTHOR_META),
            cx.linked_data.text("author", &["name"]),
            cx.element_text("a[rel~='author']"),
            cx.element_text("[itemprop~='author'] [itemprop='name']"),
            cx.element_text("[itemprop~='author']"),
        ];
        // Profile links are not names.
        candidates
            .into_iter()
            .flatten()
            .find(|value| !is_web_url(value))
    }

    fn extract_publisher(&self, cx: &ExtractionContext) -> Option<String> {
        cx.meta(PUBLISHER_META)
            .or_else(|| cx.linked_data.text("publisher", &["name"]))
    }

    fn extract_date(&self, cx: &ExtractionContext) -> Option<DateTime<Utc>> {
        let time_selector = Selector::parse("time[datetime]").ok()?;
        let candidates = DATE_META
            .iter()
            .filter_map(|css| cx.meta(&[*css]))
            .chain(cx.linked_data.text("datePublished", &[]))
            .chain(
                cx.document
                    .select(&time_selector)
                    .filter_map(|el| el.value().attr("datetime"))
                    .map(str::to_string),
            );

        candidates.into_iter().find_map(|value| parse_date(&value))
    }

    fn extract_canonical_url(&self, cx: &ExtractionContext) -> String {
        cx.rel_href("canonical")
            .or_else(|| {
                cx.meta(&["meta[property='og:url']"])
                    .and_then(|href| cx.resolve(&href))
            })
            .unwrap_or_else(|| cx.page_url.clone())
            .to_string()
    }

    fn extract_favicon(&self, cx: &ExtractionContext) -> String {
        // A bare `rel="icon"` wins over `rel="shortcut icon"` regardless of order.
        cx.rel_href_by(|el| has_exact_rel(el, "icon"))
            .or_else(|| cx.rel_href("icon"))
            .or_else(|| cx.rel_href("apple-touch-icon"))
            .map(|url| url.to_string())
            .unwrap_or_else(|| favicon_fallback(cx.page_url))
    }

    fn extract_outbound_links(&self, cx: &ExtractionContext) -> Vec<String> {
        let Ok(selector) = Selector::parse("a[href]") else {
            return Vec::new();
        };

        let mut seen = HashSet::new();
        cx.document
            .select(&selector)
            .filter_map(|el| el.value().attr("href"))
            .filter(|href| !href.trim_start().starts_with('#'))
            .filter_map(|href| cx.resolve(href))
            .filter(|url| matches!(url.scheme(), "http" | "https"))
            .map(|mut url| {
                url.set_fragment(None);
                url.to_string()
            })
            .filter(|url| seen.insert(url.clone()))
            .collect()
    }
}

fn non_empty(s: &str) -> Option<String> {
    let collapsed = collapse_whitespace(s);
    (!collapsed.is_empty()).then_some(collapsed)
}

fn is_web_url(value: &str) -> bool {
    Url::parse(value)
        .map(|url| matches!(url.scheme(), "http" | "https"))
        .unwrap_or(false)
}

fn text_of(el: &ElementRef) -> String {
    el.text().collect::<Vec<_>>().join(" ")
}

fn has_rel(el: &ElementRef, rel: &str) -> bool {
    el.value()
        .attr("rel")
        .map(|value| {
            value
                .split_ascii_whitespace()
                .any(|token| token.eq_ignore_ascii_case(rel))
        })
        .unwrap_or(false)
}

fn has_exact_rel(el: &ElementRef, rel: &str) -> bool {
    el.value()
        .attr("rel")
        .is_some_and(|value| value.trim().eq_ignore_ascii_case(rel))
}

/// Parses the date formats seen in publication metadata into UTC.
pub(crate) fn parse_date(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(value) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f%z") {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, fmt) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Flattened schema.org JSON-LD nodes found in the document.
#[derive(Debug, Default)]
struct LinkedData {
    nodes: Vec<Value>,
}

impl LinkedData {
    fn collect(document: &Html) -> Self {
        let mut nodes = Vec::new();
        let Ok(selector) = Selector::parse("script[type='application/ld+json']") else {
            return Self { nodes };
        };

        for script in document.select(&selector) {
            let raw = script.text().collect::<String>();
            match serde_json::from_str::<Value>(raw.trim()) {
                Ok(value) => flatten_nodes(value, &mut nodes),
                Err(e) => debug!(error = %e, "Skipping malformed JSON-LD block"),
            }
        }
        Self { nodes }
    }

    /// First usable text for `key` across all nodes. Object values are read
    /// through `object_keys` in order; arrays yield their first usable entry.
    fn text(&self, key: &str, object_keys: &[&str]) -> Option<String> {
        self.nodes
            .iter()
            .filter_map(|node| node.get(key))
            .find_map(|value| value_text(value, object_keys))
    }
}

fn flatten_nodes(value: Value, out: &mut Vec<Value>) {
    match value {
        Value::Array(items) => items.into_iter().for_each(|item| flatten_nodes(item, out)),
        Value::Object(mut map) => {
            if let Some(graph) = map.remove("@graph") {
                flatten_nodes(graph, out);
            }
            out.push(Value::Object(map));
        }
        _ => {}
    }
}

fn value_text(value: &Value, object_keys: &[&str]) -> Option<String> {
    match value {
        Value::String(s) => non_empty(s),
        Value::Array(items) => items.iter().find_map(|v| value_text(v, object_keys)),
        Value::Object(map) => object_keys
            .iter()
            .filter_map(|key| map.get(*key))
            .find_map(|v| value_text(v, object_keys)),
        _ => None,
    }
}
