//! HTML parser for extracting links and metadata
//!
//! This module handles parsing HTML content to extract:
//! - Links to follow (from <a> tags and canonical links)
//! - Page title and language
//! - Visible text length, which feeds the client-rendering heuristic

use scraper::{Html, Selector};
use url::Url;

/// Elements whose text never reaches the reader
const HIDDEN_TEXT_TAGS: &[&str] = &["script", "style", "noscript", "template"];

/// Markup left behind by client-side frameworks that render into an empty shell
const SPA_MARKERS: &[&str] = &[
    "id=\"app\"",
    "id=\"root\"",
    "id=\"__next\"",
    "window.__INITIAL_STATE__",
    "window.__NUXT__",
];

/// Fragments of CAPTCHA and bot-verification pages, lowercase
const CAPTCHA_MARKERS: &[&str] = &[
    "g-recaptcha",
    "hcaptcha",
    "cf-challenge",
    "cf-turnstile",
    "are you human",
    "bot verification",
    "attention required",
];

/// Metadata extracted from an HTML page
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageMetadata {
    /// The page title (from <title> tag)
    pub title: Option<String>,

    /// The `lang` attribute of the <html> element
    pub language: Option<String>,

    /// Count of non-whitespace characters of visible text
    pub text_length: usize,
}

/// Link and metadata extraction over a fetched body
pub trait Parser: Send + Sync {
    /// Returns every navigable href, resolved against `base` where possible
    ///
    /// Hrefs that cannot be resolved are returned verbatim so the caller can
    /// count them as invalid.
    fn extract_links(&self, body: &str, base: &Url) -> Vec<String>;

    fn extract_metadata(&self, body: &str) -> PageMetadata;
}

/// `Parser` backed by the `scraper` crate
#[derive(Debug, Clone, Copy, Default)]
pub struct HtmlParser;

impl HtmlParser {
    pub fn new() -> Self {
        Self
    }
}

impl Parser for HtmlParser {
    /// Extracts links from the document
    ///
    /// # Link Extraction Rules
    ///
    /// **Include:**
    /// - `<a href="...">` tags anywhere in the document
    /// - `<link rel="canonical" href="...">`
    ///
    /// **Exclude:**
    /// - `<a href="..." download>`
    /// - `javascript:`, `mailto:`, `tel:` links and data URIs
    /// - Fragment-only links (same page anchors)
    /// - Links that resolve to a non-HTTP(S) scheme
    ///
    /// `rel="nofollow"` links are followed. A `<base href>` element changes the
    /// resolution base.
    ///
    /// # Example
    ///
    /// ```
    /// use sumi_crawl::crawler::{HtmlParser, Parser};
    /// use url::Url;
    ///
    /// let html = r#"<html><body><a href="/page">Link</a></body></html>"#;
    /// let base = Url::parse("https://example.com/").unwrap();
    /// let links = HtmlParser::new().extract_links(html, &base);
    /// assert_eq!(links, vec!["https://example.com/page".to_string()]);
    /// ```
    fn extract_links(&self, body: &str, base: &Url) -> Vec<String> {
        let document = Html::parse_document(body);
        let base = document_base(&document, base);
        let mut links = Vec::new();

        if let Ok(a_selector) = Selector::parse("a[href]") {
            for element in document.select(&a_selector) {
                if element.value().attr("download").is_some() {
                    continue;
                }
                let href = element.value().attr("href");
                if let Some(link) = href.and_then(|h| resolve_link(h, &base)) {
                    links.push(link);
                }
            }
        }

        if let Ok(canonical_selector) = Selector::parse("link[rel='canonical'][href]") {
            for element in document.select(&canonical_selector) {
                let href = element.value().attr("href");
                if let Some(link) = href.and_then(|h| resolve_link(h, &base)) {
                    links.push(link);
                }
            }
        }

        links
    }

    fn extract_metadata(&self, body: &str) -> PageMetadata {
        let document = Html::parse_document(body);
        PageMetadata {
            title: extract_title(&document),
            language: extract_language(&document),
            text_length: visible_text_length(&document),
        }
    }
}

/// Decides whether a fetched page was rendered client-side
///
/// True when the visible text is shorter than `min_text_length` or the body
/// carries a known single-page-application marker.
pub fn looks_client_rendered(body: &str, metadata: &PageMetadata, min_text_length: usize) -> bool {
    metadata.text_length < min_text_length || SPA_MARKERS.iter().any(|marker| body.contains(marker))
}

/// Whether the body is a CAPTCHA challenge rather than the requested page
pub fn looks_like_captcha(body: &str) -> bool {
    let lower = body.to_ascii_lowercase();
    CAPTCHA_MARKERS.iter().any(|marker| lower.contains(marker))
}

fn document_base(document: &Html, fallback: &Url) -> Url {
    Selector::parse("base[href]")
        .ok()
        .and_then(|selector| {
            document
                .select(&selector)
                .next()
                .and_then(|element| element.value().attr("href"))
                .and_then(|href| fallback.join(href.trim()).ok())
        })
        .unwrap_or_else(|| fallback.clone())
}

/// Extracts the page title from the HTML document
fn extract_title(document: &Html) -> Option<String> {
    let title_selector = Selector::parse("title").ok()?;

    document
        .select(&title_selector)
        .next()
        .map(|element| element.text().collect::<String>().trim().to_string())
        .filter(|s| !s.is_empty())
}

fn extract_language(document: &Html) -> Option<String> {
    let selector = Selector::parse("html[lang]").ok()?;
    document
        .select(&selector)
        .next()
        .and_then(|element| element.value().attr("lang"))
        .map(|lang| lang.trim().to_string())
        .filter(|lang| !lang.is_empty())
}

fn visible_text_length(document: &Html) -> usize {
    document
        .root_element()
        .descendants()
        .filter(|node| {
            !node.ancestors().any(|ancestor| {
                ancestor
                    .value()
                    .as_element()
                    .map_or(false, |element| HIDDEN_TEXT_TAGS.contains(&element.name()))
            })
        })
        .filter_map(|node| {
            node.value()
                .as_text()
                .map(|text| text.chars().filter(|c| !c.is_whitespace()).count())
        })
        .sum()
}

/// Filters and resolves one href
///
/// Returns None if the link should be excluded:
/// - javascript:, mailto:, tel: schemes
/// - data: URIs
/// - fragment-only or empty hrefs
/// - Non-HTTP(S) URLs after resolution
fn resolve_link(href: &str, base: &Url) -> Option<String> {
    let href = href.trim();

    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    let lowered = href.to_ascii_lowercase();
    if ["javascript:", "mailto:", "tel:", "data:"]
        .iter()
        .any(|scheme| lowered.starts_with(scheme))
    {
        return None;
    }

    match base.join(href) {
        Ok(absolute) if absolute.scheme() == "http" || absolute.scheme() == "https" => {
            Some(absolute.to_string())
        }
        Ok(_) => None,
        // Left for the normalizer to reject and count
        Err(_) => Some(href.to_string()),
    }
}
