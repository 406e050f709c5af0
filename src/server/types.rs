//! HTTP request/response types
//!
//! JSON-serialisable wire types for the scrape and search endpoints.
//! `url` and `query` are optional at the serde layer so the handlers can
//! answer a clean 400 with a structured body instead of a generic
//! deserialisation rejection.

use serde::{Deserialize, Serialize};

use crate::scrape::ExtractionResult;
use crate::search::SearchResult;

/// Scrape request body
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrapeRequest {
    /// Target URL (required; validated in the handler)
    pub url: Option<String>,
    /// Requested output formats; markdown is implicit
    #[serde(default)]
    pub formats: Option<Vec<String>>,
    /// Run main-content detection (default true)
    #[serde(default)]
    pub only_main_content: Option<bool>,
    /// Per-request timeout, clamped to the configured cap
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

/// Scrape response body
#[derive(Debug, Clone, Serialize)]
pub struct ScrapeResponse {
    pub success: bool,
    pub data: ExtractionResult,
}

/// Search request body
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest {
    /// Query text (required; validated in the handler)
    pub query: Option<String>,
    /// Result count, clamped to 1..=20 (default 5)
    #[serde(default)]
    pub limit: Option<usize>,
    /// Result sources; only "web" is served
    #[serde(default)]
    pub sources: Option<Vec<String>>,
    #[serde(default)]
    pub include_domains: Option<Vec<String>>,
    #[serde(default)]
    pub exclude_domains: Option<Vec<String>>,
    /// When present with non-empty formats, every result is scraped
    #[serde(default)]
    pub scrape_options: Option<SearchScrapeOptions>,
}

/// Scrape options embedded in a search request
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchScrapeOptions {
    #[serde(default)]
    pub formats: Option<Vec<String>>,
    #[serde(default)]
    pub only_main_content: Option<bool>,
}

/// Search response body
#[derive(Debug, Clone, Serialize)]
pub struct SearchResponse {
    pub success: bool,
    pub data: SearchData,
}

/// Search results grouped by source
#[derive(Debug, Clone, Serialize)]
pub struct SearchData {
    pub web: Vec<SearchResult>,
}

/// Health check response
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub healthy: bool,
    pub version: String,
}

/// Error response body: a stable kind plus free-form detail
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, detail: Option<String>) -> Self {
        Self {
            error: error.into(),
            detail,
        }
    }

    pub fn bad_request(detail: impl Into<String>) -> Self {
        Self::new("bad_request", Some(detail.into()))
    }

    pub fn unauthorized() -> Self {
        Self::new("unauthorized", Some("invalid or missing API key".into()))
    }
}
