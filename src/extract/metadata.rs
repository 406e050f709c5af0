//! Page metadata extraction
//!
//! Indexes every `<meta>` tag by `name`/`property`/`itemprop` (lowercased)
//! and reads the fields the response carries. Favicon and canonical URLs
//! are resolved against the final URL; the status code defaults to 200.

use std::collections::HashMap;

use chrono::{DateTime, SecondsFormat, Utc};
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use url::Url;

/// Metadata attached to every extraction result
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PageMetadata {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(rename = "sourceURL")]
    pub source_url: String,
    pub status_code: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub site_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub og_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub og_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub published_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modified_time: Option<String>,
    #[serde(rename = "canonicalURL", skip_serializing_if = "Option::is_none")]
    pub canonical_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub favicon: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keywords: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generator: Option<String>,
}

/// Build metadata from the parsed document.
///
/// `article_title` / `article_excerpt` come from main-content detection and
/// take precedence over the OpenGraph and plain meta fallbacks.
pub fn build(
    doc: &Html,
    final_url: &Url,
    status_code: u16,
    article_title: Option<&str>,
    article_excerpt: Option<&str>,
) -> PageMetadata {
    let meta = index_meta_tags(doc);
    let get = |key: &str| meta.get(key).cloned();

    let title = article_title
        .map(str::to_string)
        .filter(|t| !t.is_empty())
        .or_else(|| get("og:title"))
        .or_else(|| title_tag(doc))
        .unwrap_or_default();

    let description = article_excerpt
        .map(str::to_string)
        .filter(|d| !d.is_empty())
        .or_else(|| get("og:description"))
        .or_else(|| get("description"));

    let language = html_lang(doc).or_else(|| get("og:locale"));

    PageMetadata {
        title,
        description,
        language,
        source_url: final_url.to_string(),
        status_code,
        author: get("author").or_else(|| get("article:author")),
        site_name: get("og:site_name"),
        og_type: get("og:type"),
        og_url: get("og:url"),
        image: get("og:image").or_else(|| get("twitter:image")),
        published_time: get("article:published_time")
            .or_else(|| get("date"))
            .map(|d| normalize_date(&d)),
        modified_time: get("article:modified_time").map(|d| normalize_date(&d)),
        canonical_url: canonical(doc, final_url),
        favicon: favicon(doc, final_url),
        keywords: get("keywords"),
        generator: get("generator"),
    }
}

/// Index all meta tags by name/property/itemprop, lowercased. The first
/// occurrence of a key wins.
fn index_meta_tags(doc: &Html) -> HashMap<String, String> {
    let mut index = HashMap::new();
    let Ok(selector) = Selector::parse("meta[content]") else {
        return index;
    };
    for element in doc.select(&selector) {
        let Some(content) = element.value().attr("content") else {
            continue;
        };
        let content = content.trim();
        if content.is_empty() {
            continue;
        }
        for attr in ["name", "property", "itemprop"] {
            if let Some(key) = element.value().attr(attr) {
                index
                    .entry(key.to_ascii_lowercase())
                    .or_insert_with(|| content.to_string());
            }
        }
    }
    index
}

fn title_tag(doc: &Html) -> Option<String> {
    let selector = Selector::parse("title").ok()?;
    let title = doc.select(&selector).next()?;
    let text: String = title.text().collect();
    let text = text.trim().to_string();
    (!text.is_empty()).then_some(text)
}

fn html_lang(doc: &Html) -> Option<String> {
    let selector = Selector::parse("html[lang]").ok()?;
    doc.select(&selector)
        .next()
        .and_then(|el| el.value().attr("lang"))
        .map(|lang| lang.to_string())
}

fn canonical(doc: &Html, base: &Url) -> Option<String> {
    let selector = Selector::parse("link[rel='canonical']").ok()?;
    let href = doc
        .select(&selector)
        .next()
        .and_then(|el| el.value().attr("href"))?;
    base.join(href).map(|u| u.to_string()).ok()
}

/// Normalise a date to RFC 3339 when it parses; pass it through otherwise
fn normalize_date(raw: &str) -> String {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return dt
            .with_timezone(&Utc)
            .to_rfc3339_opts(SecondsFormat::Secs, true);
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(raw) {
        return dt
            .with_timezone(&Utc)
            .to_rfc3339_opts(SecondsFormat::Secs, true);
    }
    let formats = ["%Y-%m-%d", "%Y/%m/%d", "%B %d, %Y", "%b %d, %Y", "%Y-%m-%dT%H:%M:%S"];
    for format in formats {
        if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(raw, format) {
            return DateTime::<Utc>::from_naive_utc_and_offset(naive, Utc)
                .to_rfc3339_opts(SecondsFormat::Secs, true);
        }
        if let Ok(date) = chrono::NaiveDate::parse_from_str(raw, format) {
            if let Some(naive) = date.and_hms_opt(0, 0, 0) {
                return DateTime::<Utc>::from_naive_utc_and_offset(naive, Utc)
                    .to_rfc3339_opts(SecondsFormat::Secs, true);
            }
        }
    }
    raw.to_string()
}

/// Favicon resolution is cosmetic; any failure just leaves the field empty
fn favicon(doc: &Html, base: &Url) -> Option<String> {
    let selector = Selector::parse("link[rel~='icon']").ok()?;
    let href = doc
        .select(&selector)
        .next()
        .and_then(|el| el.value().attr("href"))?;
    base.join(href).map(|u| u.to_string()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
        <html lang="en">
        <head>
            <title>Plain Title</title>
            <meta property="og:title" content="OG Title">
            <meta property="og:description" content="OG description text">
            <meta property="og:site_name" content="Example Site">
            <meta property="og:type" content="article">
            <meta property="og:image" content="https://cdn.example.com/hero.png">
            <meta name="author" content="Ada Lovelace">
            <meta name="keywords" content="one, two">
            <meta name="generator" content="hugo">
            <meta property="article:published_time" content="2024-05-01T10:00:00Z">
            <meta property="article:modified_time" content="2024-06-01T10:00:00Z">
            <link rel="canonical" href="/canonical-page">
            <link rel="icon" href="/favicon.ico">
        </head>
        <body><p>hello</p></body>
        </html>
    "#;

    fn url() -> Url {
        Url::parse("https://example.com/articles/1").unwrap()
    }

    #[test]
    fn test_full_metadata_extraction() {
        let doc = Html::parse_document(PAGE);
        let meta = build(&doc, &url(), 200, None, None);

        assert_eq!(meta.title, "OG Title");
        assert_eq!(meta.description.as_deref(), Some("OG description text"));
        assert_eq!(meta.language.as_deref(), Some("en"));
        assert_eq!(meta.source_url, "https://example.com/articles/1");
        assert_eq!(meta.status_code, 200);
        assert_eq!(meta.author.as_deref(), Some("Ada Lovelace"));
        assert_eq!(meta.site_name.as_deref(), Some("Example Site"));
        assert_eq!(meta.og_type.as_deref(), Some("article"));
        assert_eq!(meta.image.as_deref(), Some("https://cdn.example.com/hero.png"));
        assert_eq!(meta.published_time.as_deref(), Some("2024-05-01T10:00:00Z"));
        assert_eq!(meta.modified_time.as_deref(), Some("2024-06-01T10:00:00Z"));
        assert_eq!(
            meta.canonical_url.as_deref(),
            Some("https://example.com/canonical-page")
        );
        assert_eq!(
            meta.favicon.as_deref(),
            Some("https://example.com/favicon.ico")
        );
        assert_eq!(meta.keywords.as_deref(), Some("one, two"));
        assert_eq!(meta.generator.as_deref(), Some("hugo"));
    }

    #[test]
    fn test_article_title_wins_over_og() {
        let doc = Html::parse_document(PAGE);
        let meta = build(&doc, &url(), 200, Some("Readability Title"), None);
        assert_eq!(meta.title, "Readability Title");
    }

    #[test]
    fn test_title_falls_back_to_title_tag() {
        let html = "<html><head><title>Only Title</title></head><body></body></html>";
        let doc = Html::parse_document(html);
        let meta = build(&doc, &url(), 200, None, None);
        assert_eq!(meta.title, "Only Title");
    }

    #[test]
    fn test_defaults_on_empty_page() {
        let doc = Html::parse_document("<html><body></body></html>");
        let meta = build(&doc, &url(), 200, None, None);
        assert_eq!(meta.title, "");
        assert!(meta.description.is_none());
        assert!(meta.favicon.is_none());
        assert!(meta.canonical_url.is_none());
    }

    #[test]
    fn test_date_normalization() {
        assert_eq!(normalize_date("2024-05-01T10:00:00Z"), "2024-05-01T10:00:00Z");
        assert_eq!(normalize_date("2024-01-15"), "2024-01-15T00:00:00Z");
        assert_eq!(normalize_date("January 15, 2024"), "2024-01-15T00:00:00Z");
        // Unparseable strings pass through untouched
        assert_eq!(normalize_date("last Tuesday"), "last Tuesday");
    }

    #[test]
    fn test_wire_field_names() {
        let doc = Html::parse_document(PAGE);
        let meta = build(&doc, &url(), 200, None, None);
        let json = serde_json::to_value(&meta).unwrap();
        assert!(json.get("sourceURL").is_some());
        assert!(json.get("statusCode").is_some());
        assert!(json.get("ogType").is_some());
        assert!(json.get("canonicalURL").is_some());
        assert!(json.get("siteName").is_some());
        assert!(json.get("publishedTime").is_some());
    }
}
