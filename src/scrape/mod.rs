//! Scrape orchestration
//!
//! The pipeline for one URL: SSRF preflight → cache probe → (inside the
//! concurrency limiter) fast HTTP fetch with browser fallback → content
//! extraction → cache write. Failures are surfaced with a stable kind and
//! never cached.

pub mod cache;
pub mod fetcher;
pub mod limiter;
pub mod ssrf;

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;
use url::Url;

use crate::browser::{page as browser_page, BrowserPool};
use crate::error::ScrapeError;
use crate::extract::{self, metadata::PageMetadata, ExtractOptions};
use crate::metrics::ServiceMetrics;
use cache::{cache_key, ResultCache};
use fetcher::FastFetcher;
use limiter::Limiter;

/// Output formats a caller can request. Markdown is implicit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Format {
    Markdown,
    Html,
    RawHtml,
    Links,
}

impl Format {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "markdown" => Some(Self::Markdown),
            "html" => Some(Self::Html),
            "rawHtml" => Some(Self::RawHtml),
            "links" => Some(Self::Links),
            _ => None,
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            Self::Markdown => "markdown",
            Self::Html => "html",
            Self::RawHtml => "rawHtml",
            Self::Links => "links",
        }
    }
}

/// Options for one scrape
#[derive(Debug, Clone)]
pub struct ScrapeOptions {
    pub formats: Vec<Format>,
    pub only_main_content: bool,
    pub timeout: Duration,
}

impl Default for ScrapeOptions {
    fn default() -> Self {
        Self {
            formats: vec![Format::Markdown],
            only_main_content: true,
            timeout: Duration::from_secs(30),
        }
    }
}

/// The response payload for one scraped page
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionResult {
    pub markdown: String,
    pub metadata: PageMetadata,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub html: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_html: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub links: Option<Vec<String>>,
}

/// Scraper configuration
#[derive(Debug, Clone)]
pub struct ScraperConfig {
    pub max_concurrency: usize,
    pub cache_max_items: usize,
    pub cache_ttl: Duration,
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 5,
            cache_max_items: 1000,
            cache_ttl: Duration::from_secs(300),
        }
    }
}

/// The scrape pipeline and its supporting machinery
pub struct Scraper {
    limiter: Limiter,
    cache: ResultCache<ExtractionResult>,
    fetcher: FastFetcher,
    pool: Arc<BrowserPool>,
    metrics: Arc<ServiceMetrics>,
}

impl Scraper {
    pub fn new(
        config: ScraperConfig,
        pool: Arc<BrowserPool>,
        metrics: Arc<ServiceMetrics>,
    ) -> Result<Self, ScrapeError> {
        let fetcher = FastFetcher::new()
            .map_err(|e| ScrapeError::ExtractionFailed(format!("http client: {e}")))?;
        Ok(Self {
            limiter: Limiter::new(config.max_concurrency),
            cache: ResultCache::new(config.cache_max_items, config.cache_ttl),
            fetcher,
            pool,
            metrics,
        })
    }

    /// Limiter shared with the search fan-out
    pub fn limiter(&self) -> &Limiter {
        &self.limiter
    }

    /// Scrape one URL and shape the result per the requested formats
    pub async fn scrape(
        &self,
        url_str: &str,
        opts: &ScrapeOptions,
    ) -> Result<ExtractionResult, ScrapeError> {
        self.metrics.scrape_requests_total.inc();
        let started = Instant::now();

        let url = ssrf::preflight(url_str).await.inspect_err(|_| {
            self.metrics.scrape_failures_total.inc();
        })?;

        let key = scrape_cache_key(url_str, opts);
        if let Some(hit) = self.cache.get(&key) {
            debug!("cache hit for {}", url_str);
            self.metrics.cache_hits_total.inc();
            return Ok(hit);
        }
        self.metrics.cache_misses_total.inc();

        let result = self
            .limiter
            .run(async { self.scrape_inner(&url, opts).await })
            .await;

        self.metrics.scrape_latency.observe(started.elapsed());
        match result {
            Ok(result) => {
                self.cache.set(key, result.clone());
                Ok(result)
            }
            Err(e) => {
                self.metrics.scrape_failures_total.inc();
                Err(e)
            }
        }
    }

    async fn scrape_inner(
        &self,
        url: &Url,
        opts: &ScrapeOptions,
    ) -> Result<ExtractionResult, ScrapeError> {
        let (html, final_url, status_code) =
            match self.fetcher.fetch(url, opts.timeout).await {
                Some(fast) => {
                    debug!("fast fetch served {}", url);
                    self.metrics.fast_fetch_hits_total.inc();
                    (fast.html, fast.final_url, fast.status_code)
                }
                None => {
                    debug!("fast fetch missed, using browser for {}", url);
                    self.metrics.browser_fetches_total.inc();
                    let rendered =
                        browser_page::fetch_page(&self.pool, url, opts.timeout).await?;
                    (rendered.html, rendered.final_url, rendered.status_code)
                }
            };

        let extract_opts = ExtractOptions {
            only_main_content: opts.only_main_content,
            max_length: 0,
        };
        let extraction = extract::extract(&html, &final_url, status_code, &extract_opts)?;

        Ok(shape_response(extraction, html, &opts.formats))
    }
}

/// Attach only the requested optional outputs to the response
fn shape_response(
    extraction: extract::Extraction,
    raw_html: String,
    formats: &[Format],
) -> ExtractionResult {
    ExtractionResult {
        markdown: extraction.markdown,
        metadata: extraction.metadata,
        html: formats.contains(&Format::Html).then_some(extraction.html),
        raw_html: formats.contains(&Format::RawHtml).then_some(raw_html),
        links: formats.contains(&Format::Links).then_some(extraction.links),
    }
}

/// Deterministic cache key: operation name plus the inputs that define the
/// cacheable result. Formats are sorted so request order never matters.
fn scrape_cache_key(url: &str, opts: &ScrapeOptions) -> String {
    let mut formats: Vec<&'static str> = opts.formats.iter().map(Format::as_str).collect();
    formats.sort_unstable();
    formats.dedup();
    cache_key(
        "scrape",
        &json!({
            "url": url,
            "formats": formats.join(","),
            "onlyMainContent": opts.only_main_content,
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::Extraction;

    fn sample_extraction() -> Extraction {
        Extraction {
            markdown: "# Title\n\nBody".into(),
            html: "<h1>Title</h1><p>Body</p>".into(),
            links: vec!["https://example.com/a".into()],
            metadata: PageMetadata {
                title: "Title".into(),
                source_url: "https://example.com/".into(),
                status_code: 200,
                ..Default::default()
            },
        }
    }

    #[test]
    fn test_format_parsing() {
        assert_eq!(Format::parse("markdown"), Some(Format::Markdown));
        assert_eq!(Format::parse("rawHtml"), Some(Format::RawHtml));
        assert_eq!(Format::parse("links"), Some(Format::Links));
        assert_eq!(Format::parse("pdf"), None);
    }

    #[test]
    fn test_shape_response_markdown_only() {
        let out = shape_response(sample_extraction(), "<raw>".into(), &[Format::Markdown]);
        assert_eq!(out.markdown, "# Title\n\nBody");
        assert!(out.html.is_none());
        assert!(out.raw_html.is_none());
        assert!(out.links.is_none());
    }

    #[test]
    fn test_shape_response_all_formats() {
        let out = shape_response(
            sample_extraction(),
            "<raw>".into(),
            &[Format::Markdown, Format::Html, Format::RawHtml, Format::Links],
        );
        assert_eq!(out.html.as_deref(), Some("<h1>Title</h1><p>Body</p>"));
        assert_eq!(out.raw_html.as_deref(), Some("<raw>"));
        assert_eq!(out.links.as_deref(), Some(&["https://example.com/a".to_string()][..]));
    }

    #[test]
    fn test_cache_key_ignores_format_order() {
        let mut a = ScrapeOptions::default();
        a.formats = vec![Format::Links, Format::Markdown];
        let mut b = ScrapeOptions::default();
        b.formats = vec![Format::Markdown, Format::Links];
        assert_eq!(
            scrape_cache_key("https://example.com/", &a),
            scrape_cache_key("https://example.com/", &b),
        );
    }

    #[test]
    fn test_cache_key_varies_by_inputs() {
        let opts = ScrapeOptions::default();
        let mut main_off = ScrapeOptions::default();
        main_off.only_main_content = false;

        let base = scrape_cache_key("https://example.com/", &opts);
        assert_ne!(base, scrape_cache_key("https://example.com/other", &opts));
        assert_ne!(base, scrape_cache_key("https://example.com/", &main_off));
    }

    #[test]
    fn test_serialized_result_uses_wire_names() {
        let out = shape_response(
            sample_extraction(),
            "<raw>".into(),
            &[Format::RawHtml],
        );
        let json = serde_json::to_value(&out).unwrap();
        assert!(json.get("rawHtml").is_some());
        assert!(json.get("markdown").is_some());
        assert!(json.get("html").is_none());
    }
}
