//! Content extraction
//!
//! Turns captured HTML into LLM-ready Markdown:
//! pre-strip CSS → parse → main-content detection (with one relaxed retry,
//! then a whole-body fallback) → sanitise → Markdown → metadata.

pub mod markdown;
pub mod metadata;
pub mod readability;
pub mod sanitize;

use std::sync::OnceLock;

use regex_lite::Regex;
use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::error::ScrapeError;
use metadata::PageMetadata;

/// Extraction options
#[derive(Debug, Clone)]
pub struct ExtractOptions {
    /// Run main-content detection instead of converting the whole body
    pub only_main_content: bool,
    /// Markdown length cap; 0 disables
    pub max_length: usize,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            only_main_content: true,
            max_length: 0,
        }
    }
}

/// Everything the extraction chain produces for one page
#[derive(Debug, Clone)]
pub struct Extraction {
    pub markdown: String,
    /// Sanitised HTML (tag + href only)
    pub html: String,
    /// Anchor targets in document order
    pub links: Vec<String>,
    pub metadata: PageMetadata,
}

/// Run the full chain over captured HTML
pub fn extract(
    raw_html: &str,
    final_url: &Url,
    status_code: u16,
    opts: &ExtractOptions,
) -> Result<Extraction, ScrapeError> {
    let cleaned = pre_strip(raw_html);
    let doc = Html::parse_document(&cleaned);

    // Main-content detection with one relaxed retry, then the whole body
    let content_root = if opts.only_main_content {
        readability::find_main_content(&doc, &readability::DEFAULT)
            .or_else(|| readability::find_main_content(&doc, &readability::RELAXED))
    } else {
        None
    };

    let nodes = match content_root.and_then(|id| doc.tree.get(id)) {
        Some(node) => sanitize::sanitize(node, final_url),
        None => match body_node(&doc) {
            Some(body) => sanitize::sanitize(body, final_url),
            None => sanitize::sanitize(doc.tree.root(), final_url),
        },
    };

    let article_title = content_title(&doc);
    let article_excerpt = content_root
        .and_then(|id| doc.tree.get(id))
        .and_then(|node| first_paragraph_excerpt(node));

    let metadata = metadata::build(
        &doc,
        final_url,
        status_code,
        article_title.as_deref(),
        article_excerpt.as_deref(),
    );

    let markdown = markdown::cap_length(markdown::to_markdown(&nodes), opts.max_length);
    if markdown.is_empty() {
        return Err(ScrapeError::ExtractionFailed(
            "no textual content in page".into(),
        ));
    }

    Ok(Extraction {
        markdown,
        html: sanitize::render_html(&nodes),
        links: sanitize::collect_links(&nodes),
        metadata,
    })
}

/// Strip style blocks, stylesheet links and inline style attributes before
/// parsing. Keeps CSS tokens out of the DOM and cuts parse cost.
fn pre_strip(html: &str) -> String {
    static STYLE_BLOCK: OnceLock<Regex> = OnceLock::new();
    static STYLESHEET_LINK: OnceLock<Regex> = OnceLock::new();
    static INLINE_STYLE: OnceLock<Regex> = OnceLock::new();

    let style_block = STYLE_BLOCK
        .get_or_init(|| Regex::new(r"(?is)<style[^>]*>.*?</style>").expect("valid regex"));
    let stylesheet_link = STYLESHEET_LINK.get_or_init(|| {
        Regex::new(r#"(?i)<link[^>]*rel\s*=\s*["']?stylesheet["']?[^>]*>"#).expect("valid regex")
    });
    let inline_style = INLINE_STYLE.get_or_init(|| {
        Regex::new(r#"(?i)\s+style\s*=\s*("[^"]*"|'[^']*')"#).expect("valid regex")
    });

    let html = style_block.replace_all(html, "");
    let html = stylesheet_link.replace_all(&html, "");
    inline_style.replace_all(&html, "").into_owned()
}

fn body_node(doc: &Html) -> Option<ego_tree::NodeRef<'_, scraper::node::Node>> {
    let selector = Selector::parse("body").ok()?;
    doc.select(&selector).next().map(|el| *el)
}

fn content_title(doc: &Html) -> Option<String> {
    let selector = Selector::parse("title").ok()?;
    let text: String = doc.select(&selector).next()?.text().collect();
    let text = text.trim().to_string();
    (!text.is_empty()).then_some(text)
}

/// Excerpt from the detected content: the first reasonably long paragraph
fn first_paragraph_excerpt(node: ego_tree::NodeRef<'_, scraper::node::Node>) -> Option<String> {
    let root = ElementRef::wrap(node)?;
    let selector = Selector::parse("p").ok()?;
    for p in root.select(&selector) {
        let text: String = p.text().collect();
        let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
        if text.len() >= 60 {
            let words: Vec<&str> = text.split_whitespace().take(40).collect();
            let mut excerpt = words.join(" ");
            if text.split_whitespace().count() > 40 {
                excerpt.push_str("...");
            }
            return Some(excerpt);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url() -> Url {
        Url::parse("https://example.com/post").unwrap()
    }

    const ARTICLE: &str = r#"
        <html lang="en">
        <head>
            <title>A Fine Article</title>
            <style>p { color: red; }</style>
            <link rel="stylesheet" href="/main.css">
        </head>
        <body>
            <nav><a href="/">Home</a><a href="/archive">Archive</a></nav>
            <article class="post-content">
                <h1 style="font-size: 3em">A Fine Article</h1>
                <p>The opening paragraph sets the scene, with commas, and enough
                length to convince the detector that this is the story itself.</p>
                <p>The second paragraph continues, adding details, nuance, and
                weight, so the subtree scores comfortably above the threshold.</p>
                <p>See the <a href="/related">related piece</a> for more context,
                or keep reading, as this paragraph continues the article at length.</p>
                <script>track();</script>
            </article>
            <footer>© Example</footer>
        </body>
        </html>
    "#;

    #[test]
    fn test_full_chain_produces_markdown() {
        let out = extract(ARTICLE, &url(), 200, &ExtractOptions::default()).unwrap();
        assert!(out.markdown.contains("# A Fine Article"));
        assert!(out.markdown.contains("opening paragraph"));
        assert!(!out.markdown.contains("Home"));
        assert!(!out.markdown.contains("© Example"));
        assert!(!out.markdown.contains("track()"));
        assert!(!out.markdown.contains("color: red"));
        assert!(!out.markdown.contains("font-size"));
    }

    #[test]
    fn test_sanitised_output_has_no_scripts_or_attributes() {
        let out = extract(ARTICLE, &url(), 200, &ExtractOptions::default()).unwrap();
        assert!(!out.html.contains("<script"));
        assert!(!out.html.contains("<style"));
        assert!(!out.html.contains("class="));
        assert!(!out.html.contains("style="));
        assert!(out.html.contains("href=\"https://example.com/related\""));
    }

    #[test]
    fn test_links_are_absolute() {
        let out = extract(ARTICLE, &url(), 200, &ExtractOptions::default()).unwrap();
        assert_eq!(out.links, vec!["https://example.com/related".to_string()]);
    }

    #[test]
    fn test_metadata_carries_source_and_status() {
        let out = extract(ARTICLE, &url(), 200, &ExtractOptions::default()).unwrap();
        assert_eq!(out.metadata.source_url, "https://example.com/post");
        assert_eq!(out.metadata.status_code, 200);
        assert_eq!(out.metadata.title, "A Fine Article");
        assert_eq!(out.metadata.language.as_deref(), Some("en"));
        assert!(out
            .metadata
            .description
            .as_deref()
            .unwrap_or_default()
            .contains("opening paragraph"));
    }

    #[test]
    fn test_whole_body_mode_keeps_more() {
        let opts = ExtractOptions {
            only_main_content: false,
            max_length: 0,
        };
        let out = extract(ARTICLE, &url(), 200, &opts).unwrap();
        assert!(out.markdown.contains("opening paragraph"));
        // Footer text survives whole-body conversion
        assert!(out.markdown.contains("© Example"));
    }

    #[test]
    fn test_empty_page_is_an_error() {
        let err = extract(
            "<html><body><script>x()</script></body></html>",
            &url(),
            200,
            &ExtractOptions::default(),
        )
        .unwrap_err();
        assert_eq!(err.kind(), "extraction_failed");
    }

    #[test]
    fn test_max_length_truncates() {
        let opts = ExtractOptions {
            only_main_content: true,
            max_length: 40,
        };
        let out = extract(ARTICLE, &url(), 200, &opts).unwrap();
        assert!(out.markdown.ends_with("[…truncated]"));
        assert!(out.markdown.len() < 80);
    }

    #[test]
    fn test_pre_strip_removes_css_sources() {
        let html = r#"<style>a{}</style><link rel="stylesheet" href=x><p style="x:y">t</p>"#;
        let cleaned = pre_strip(html);
        assert!(!cleaned.contains("<style"));
        assert!(!cleaned.contains("stylesheet"));
        assert!(!cleaned.contains("style="));
        assert!(cleaned.contains("<p"));
    }
}
