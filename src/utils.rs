use unicode_width::UnicodeWidthChar;

use url::Url;

/// Safely truncate a string, ensuring it is not truncated in the middle of multi-byte characters
///
/// The output's display width never exceeds `max_width`, ellipsis included.
pub fn truncate_str(s: &str, max_width: usize) -> String {
    use unicode_width::UnicodeWidthStr;

    if s.width() <= max_width {
        return s.to_string();
    }

    let mut result = String::new();
    let mut current_width = 0;

    for c in s.chars() {
        let char_width = c.width().unwrap_or(1);

        if current_width + char_width + 3 > max_width {
            break;
        }

        result.push(c);
        current_width += char_width;
    }

    result.push_str("...");
    result
}

/// Lowercases a hostname and strips one leading `www.`.
pub fn normalize_host(host: &str) -> String {
    let host = host.to_ascii_lowercase();
    match host.strip_prefix("www.") {
        Some(rest) => rest.to_string(),
        None => host,
    }
}

/// Same-origin `/favicon.ico` for a page URL.
pub fn favicon_fallback(page_url: &Url) -> String {
    match page_url.join("/favicon.ico") {
        Ok(url) => url.to_string(),
        Err(_) => format!("{}/favicon.ico", page_url.origin().ascii_serialization()),
    }
}

/// Resolves `href` against `base`. Empty values and values that do not
/// produce an absolute URL yield `None`.
pub fn resolve_url(base: &Url, href: &str) -> Option<Url> {
    let href = href.trim();
    if href.is_empty() {
        return None;
    }
    base.join(href).ok()
}

/// Collapses runs of whitespace into single spaces.
pub fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_str() {
        assert_eq!(truncate_str("Hello, world!", 10), "Hello, ...");
        assert_eq!(truncate_str("你好，世界！", 8), "你好...");
        assert_eq!(truncate_str("Hello 你好！", 10), "Hello ...");
        assert_eq!(truncate_str("Hi!", 10), "Hi!");
    }

    #[test]
    fn test_normalize_host() {
        assert_eq!(normalize_host("WWW.X.com"), "x.com");
        assert_eq!(normalize_host("blog.example"), "blog.example");
        assert_eq!(normalize_host("www.www.example.com"), "www.example.com");
    }

    #[test]
    fn test_favicon_fallback() {
        let url = Url::parse("https://example.com/a/b?c=d").unwrap();
        assert_eq!(favicon_fallback(&url), "https://example.com/favicon.ico");

        let url = Url::parse("http://example.com:8080/a").unwrap();
        assert_eq!(favicon_fallback(&url), "http://example.com:8080/favicon.ico");
    }

    #[test]
    fn test_resolve_url() {
        let base = Url::parse("https://example.com/a/page").unwrap();
        assert_eq!(
            resolve_url(&base, "/f.ico").unwrap().as_str(),
            "https://example.com/f.ico"
        );
        assert_eq!(
            resolve_url(&base, "img.png").unwrap().as_str(),
            "https://example.com/a/img.png"
        );
        assert_eq!(
            resolve_url(&base, "//cdn.example.net/x.jpg").unwrap().as_str(),
            "https://cdn.example.net/x.jpg"
        );
        assert!(resolve_url(&base, "   ").is_none());
    }

    #[test]
    fn test_collapse_whitespace() {
        assert_eq!(collapse_whitespace("  a \n\t b  c "), "a b c");
    }
}
