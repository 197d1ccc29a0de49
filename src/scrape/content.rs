// src/scrape/content.rs
//! HTML → normalized text using prioritized selector lists with a generic
//! fallback, plus link discovery that unwraps redirector URLs.

use chrono::{DateTime, Utc};
use once_cell::sync::OnceCell;
use scraper::{Html, Selector};
use url::Url;

/// Query parameters commonly used by redirector endpoints to wrap the real
/// destination (`/redirect?target=<encoded-url>` and friends).
const WRAPPER_PARAMS: [&str; 4] = ["url", "target", "u", "q"];

/// Extract text using an ordered, comma-separated selector fallback chain.
/// Returns the cleaned text from the first selector that yields a non-empty
/// match; selectors that fail to parse or match are skipped, not fatal.
pub fn extract_by_selectors(html: &str, selector_list: &str) -> Option<String> {
    let doc = Html::parse_document(html);
    for raw in selector_list.split(',') {
        let raw = raw.trim();
        if raw.is_empty() {
            continue;
        }
        let Ok(sel) = Selector::parse(raw) else {
            continue;
        };
        let mut parts = Vec::new();
        for el in doc.select(&sel) {
            let text = el.text().collect::<Vec<_>>().join(" ");
            if !text.trim().is_empty() {
                parts.push(text);
            }
        }
        let joined = clean_text(&parts.join(" "));
        if !joined.is_empty() {
            return Some(joined);
        }
    }
    None
}

/// Heuristic fallback: heading + paragraph text. Used when no selector list
/// is configured or every configured selector failed.
pub fn extract_generic(html: &str) -> Option<String> {
    extract_by_selectors(html, "h1, h2, h3, p")
}

/// Best-effort title: configured selectors first, then `<title>`, then `h1`.
pub fn extract_title(html: &str, selector_list: &str) -> Option<String> {
    if !selector_list.trim().is_empty() {
        if let Some(t) = extract_by_selectors(html, selector_list) {
            return Some(t);
        }
    }
    extract_by_selectors(html, "title, h1")
}

/// Published timestamp from common article metadata, if present.
pub fn extract_published(html: &str) -> Option<DateTime<Utc>> {
    let doc = Html::parse_document(html);

    let meta_sel = Selector::parse(
        r#"meta[property="article:published_time"], meta[name="date"]"#,
    )
    .expect("published meta selector");
    for el in doc.select(&meta_sel) {
        if let Some(dt) = el.value().attr("content").and_then(parse_timestamp) {
            return Some(dt);
        }
    }

    let time_sel = Selector::parse("time[datetime]").expect("time selector");
    for el in doc.select(&time_sel) {
        if let Some(dt) = el.value().attr("datetime").and_then(parse_timestamp) {
            return Some(dt);
        }
    }
    None
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw.trim()) {
        return Some(dt.with_timezone(&Utc));
    }
    // Date-only values ("2026-03-01") are common in <time datetime=...>.
    chrono::NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|ndt| DateTime::from_naive_utc_and_offset(ndt, Utc))
}

/// Collapse whitespace/control artifacts and decode HTML entities.
pub fn clean_text(text: &str) -> String {
    let decoded = html_escape::decode_html_entities(text);

    static RE_WS: OnceCell<regex::Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"[\s\u{200b}\u{feff}]+").unwrap());
    re_ws.replace_all(decoded.as_ref(), " ").trim().to_string()
}

/// Reject stub/placeholder pages before they reach extraction.
pub fn is_valid_content(text: &str, min_length: usize) -> bool {
    text.trim().chars().count() >= min_length
}

/// Extract candidate links from `html` using a selector fallback chain,
/// resolved against `base_url`. Redirector links with a query-parameter
/// wrapped destination are unwrapped (percent-decoded); any link whose
/// final scheme is not http/https is discarded. Order-preserving dedup.
pub fn extract_links(html: &str, selector_list: &str, base_url: &Url) -> Vec<String> {
    let doc = Html::parse_document(html);
    let mut out = Vec::new();
    let mut seen = std::collections::HashSet::new();

    for raw in selector_list.split(',') {
        let raw = raw.trim();
        if raw.is_empty() {
            continue;
        }
        let Ok(sel) = Selector::parse(raw) else {
            continue;
        };
        for el in doc.select(&sel) {
            let Some(href) = el.value().attr("href") else {
                continue;
            };
            if href.starts_with('#') || href.starts_with("javascript:") || href.starts_with("mailto:")
            {
                continue;
            }
            let Ok(resolved) = base_url.join(href) else {
                continue;
            };
            let Some(mut link) = unwrap_redirector(resolved) else {
                continue;
            };
            link.set_fragment(None);
            let s = link.to_string();
            if seen.insert(s.clone()) {
                out.push(s);
            }
        }
        if !out.is_empty() {
            break;
        }
    }
    out
}

/// If `url` wraps its real destination in a known query parameter, return
/// the decoded destination; a wrapped destination with a non-http(s) scheme
/// poisons the whole link. Unwrapped http(s) links pass through.
fn unwrap_redirector(url: Url) -> Option<Url> {
    for (k, v) in url.query_pairs() {
        if !WRAPPER_PARAMS.contains(&k.as_ref()) {
            continue;
        }
        // query_pairs() already percent-decodes the value.
        if let Ok(inner) = Url::parse(&v) {
            return match inner.scheme() {
                "http" | "https" => Some(inner),
                _ => None,
            };
        }
    }
    match url.scheme() {
        "http" | "https" => Some(url),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ARTICLE: &str = r#"
        <html><head><title>Page Title</title>
        <meta property="article:published_time" content="2026-03-01T08:30:00Z">
        </head><body>
        <div class="article-body"><p>Body from article selector.</p></div>
        <main><p>Body from main.</p></main>
        </body></html>"#;

    #[test]
    fn selector_chain_falls_through_to_later_selectors() {
        // First selector matches nothing; the second must still be tried.
        let text = extract_by_selectors(ARTICLE, ".missing, .article-body").unwrap();
        assert_eq!(text, "Body from article selector.");
    }

    #[test]
    fn all_selectors_failing_yields_none_and_generic_recovers() {
        assert!(extract_by_selectors(ARTICLE, ".nope, .also-nope").is_none());
        let generic = extract_generic(ARTICLE).unwrap();
        assert!(generic.contains("Body from article selector."));
    }

    #[test]
    fn title_falls_back_to_document_title() {
        assert_eq!(extract_title(ARTICLE, ".headline"), Some("Page Title".into()));
    }

    #[test]
    fn published_timestamp_parses_from_meta() {
        let dt = extract_published(ARTICLE).unwrap();
        assert_eq!(dt.to_rfc3339(), "2026-03-01T08:30:00+00:00");
    }

    #[test]
    fn clean_text_collapses_entities_and_whitespace() {
        let s = "  Hello&nbsp;&nbsp; world \n\t again  ";
        assert_eq!(clean_text(s), "Hello world again");
    }

    #[test]
    fn short_content_is_invalid() {
        assert!(!is_valid_content("too short", 50));
        assert!(is_valid_content(&"x".repeat(50), 50));
    }

    #[test]
    fn links_resolve_relative_and_unwrap_redirectors() {
        let html = r##"<html><body>
            <a href="/news/one">One</a>
            <a href="/redirect?target=https%3A%2F%2Fother.example%2Fstory%2F2">Two</a>
            <a href="/redirect?target=javascript%3Aalert(1)">Bad</a>
            <a href="#top">Anchor</a>
            <a href="/news/one">Dup</a>
        </body></html>"##;
        let base = Url::parse("https://news.example.com/").unwrap();
        let links = extract_links(html, "a[href]", &base);
        assert_eq!(
            links,
            vec![
                "https://news.example.com/news/one".to_string(),
                "https://other.example/story/2".to_string(),
            ]
        );
    }
}
