//! Keyword search via an external meta-search engine
//!
//! Thin JSON client for a SearXNG-compatible upstream plus result
//! post-processing (domain include/exclude, de-duplication, score sort,
//! truncation) and an optional scrape fan-out that shares the scrape
//! pipeline's limiter and cache.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use url::Url;

use crate::error::ScrapeError;
use crate::extract::metadata::PageMetadata;
use crate::metrics::ServiceMetrics;
use crate::scrape::{ScrapeOptions, Scraper};

/// One search result on the wire
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    pub url: String,
    pub title: String,
    pub description: String,
    /// 1-based rank after post-processing
    pub position: usize,
    pub category: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub markdown: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub html: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_html: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub links: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<PageMetadata>,
}

/// Search request after handler-level validation
#[derive(Debug, Clone, Default)]
pub struct SearchQuery {
    pub query: String,
    pub limit: usize,
    pub include_domains: Vec<String>,
    pub exclude_domains: Vec<String>,
    /// When set, each result is scraped with these options
    pub scrape: Option<ScrapeOptions>,
}

/// Upstream response shape (SearXNG JSON API)
#[derive(Debug, Deserialize)]
struct UpstreamResponse {
    #[serde(default)]
    results: Vec<UpstreamResult>,
}

#[derive(Debug, Deserialize)]
struct UpstreamResult {
    url: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    score: Option<f64>,
    #[serde(default)]
    category: Option<String>,
}

/// Search upstream configuration
#[derive(Debug, Clone)]
pub struct SearchConfig {
    pub base_url: String,
    pub timeout: Duration,
}

/// The search service: upstream client + post-processing + fan-out
pub struct SearchService {
    http: reqwest::Client,
    config: SearchConfig,
    scraper: Arc<Scraper>,
    metrics: Arc<ServiceMetrics>,
}

impl SearchService {
    pub fn new(
        config: SearchConfig,
        scraper: Arc<Scraper>,
        metrics: Arc<ServiceMetrics>,
    ) -> Result<Self, ScrapeError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ScrapeError::UpstreamSearchError(format!("http client: {e}")))?;
        Ok(Self {
            http,
            config,
            scraper,
            metrics,
        })
    }

    /// Run a search and, when scrape options are present, fetch-and-convert
    /// each result through the shared scrape pipeline.
    pub async fn search(&self, query: &SearchQuery) -> Result<Vec<SearchResult>, ScrapeError> {
        self.metrics.search_requests_total.inc();

        let upstream = self.fetch_upstream(query).await.inspect_err(|_| {
            self.metrics.search_failures_total.inc();
        })?;

        let mut results = post_process(upstream, &query.exclude_domains, query.limit);

        if let Some(scrape_opts) = &query.scrape {
            self.fan_out(&mut results, scrape_opts).await;
        }

        Ok(results)
    }

    async fn fetch_upstream(&self, query: &SearchQuery) -> Result<Vec<UpstreamResult>, ScrapeError> {
        let effective_query = rewrite_query(&query.query, &query.include_domains);
        let url = format!("{}/search", self.config.base_url.trim_end_matches('/'));

        debug!("search upstream query: {}", effective_query);
        let response = self
            .http
            .get(&url)
            .query(&[("q", effective_query.as_str()), ("format", "json")])
            .send()
            .await
            .map_err(|e| ScrapeError::UpstreamSearchError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ScrapeError::UpstreamSearchError(format!(
                "upstream returned {status}"
            )));
        }

        let body: UpstreamResponse = response
            .json()
            .await
            .map_err(|e| ScrapeError::UpstreamSearchError(format!("bad upstream body: {e}")))?;
        Ok(body.results)
    }

    /// Scrape each result, sharing the pipeline's limiter and cache.
    /// Per-result failures leave the extraction fields empty.
    async fn fan_out(&self, results: &mut [SearchResult], opts: &ScrapeOptions) {
        let futures = results.iter().map(|r| self.scraper.scrape(&r.url, opts));
        let outcomes = futures::future::join_all(futures).await;

        for (result, outcome) in results.iter_mut().zip(outcomes) {
            match outcome {
                Ok(extraction) => {
                    result.markdown = Some(extraction.markdown);
                    result.html = extraction.html;
                    result.raw_html = extraction.raw_html;
                    result.links = extraction.links;
                    result.metadata = Some(extraction.metadata);
                }
                Err(e) => {
                    warn!("search fan-out scrape failed for {}: {}", result.url, e);
                }
            }
        }
    }
}

/// Append `site:` filters when include-domains are set
fn rewrite_query(query: &str, include_domains: &[String]) -> String {
    if include_domains.is_empty() {
        return query.to_string();
    }
    let sites: Vec<String> = include_domains.iter().map(|d| format!("site:{d}")).collect();
    format!("{} ({})", query, sites.join(" OR "))
}

/// Exclude-domain filter, URL de-duplication, score sort, truncation
fn post_process(
    upstream: Vec<UpstreamResult>,
    exclude_domains: &[String],
    limit: usize,
) -> Vec<SearchResult> {
    let mut kept: Vec<UpstreamResult> = Vec::new();
    let mut seen: Vec<String> = Vec::new();

    let mut sorted = upstream;
    sorted.sort_by(|a, b| {
        b.score
            .unwrap_or(0.0)
            .partial_cmp(&a.score.unwrap_or(0.0))
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    for result in sorted {
        if excluded(&result.url, exclude_domains) {
            continue;
        }
        let canonical = dedup_key(&result.url);
        if seen.contains(&canonical) {
            continue;
        }
        seen.push(canonical);
        kept.push(result);
        if kept.len() == limit {
            break;
        }
    }

    kept.into_iter()
        .enumerate()
        .map(|(i, r)| SearchResult {
            url: r.url,
            title: r.title,
            description: r.content.unwrap_or_default(),
            position: i + 1,
            category: r.category.unwrap_or_else(|| "web".to_string()),
            markdown: None,
            html: None,
            raw_html: None,
            links: None,
            metadata: None,
        })
        .collect()
}

fn excluded(url: &str, exclude_domains: &[String]) -> bool {
    if exclude_domains.is_empty() {
        return false;
    }
    let Some(host) = Url::parse(url).ok().and_then(|u| u.host_str().map(str::to_string)) else {
        return false;
    };
    let host = host.to_ascii_lowercase();
    exclude_domains.iter().any(|domain| {
        let domain = domain.to_ascii_lowercase();
        host == domain || host.ends_with(&format!(".{domain}"))
    })
}

/// De-duplication key: trailing slash and case are ignored
fn dedup_key(url: &str) -> String {
    url.trim_end_matches('/').to_ascii_lowercase()
}
