//! HTTP request handlers

use std::sync::Arc;
use std::time::Duration;

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use tracing::debug;

use crate::error::ScrapeError;
use crate::metrics::ServiceMetrics;
use crate::scrape::{Format, ScrapeOptions, Scraper};
use crate::search::{SearchQuery, SearchService};

use super::types::*;

/// Default per-request timeout when the caller does not set one
const DEFAULT_TIMEOUT_MS: u64 = 30_000;
const DEFAULT_SEARCH_LIMIT: usize = 5;
const MAX_SEARCH_LIMIT: usize = 20;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub scraper: Arc<Scraper>,
    pub search: Option<Arc<SearchService>>,
    pub metrics: Arc<ServiceMetrics>,
    /// Configured cap for per-request timeouts, in milliseconds
    pub max_timeout_ms: u64,
    pub metrics_enabled: bool,
}

/// Health check endpoint
pub async fn health() -> impl IntoResponse {
    Json(HealthResponse {
        healthy: true,
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Prometheus exposition endpoint
pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    if !state.metrics_enabled {
        return (StatusCode::NOT_FOUND, String::new()).into_response();
    }
    (StatusCode::OK, state.metrics.to_prometheus()).into_response()
}

/// Scrape endpoint
pub async fn scrape(
    State(state): State<AppState>,
    Json(request): Json<ScrapeRequest>,
) -> impl IntoResponse {
    state.metrics.http_requests_total.inc();

    let Some(url) = request.url.filter(|u| !u.trim().is_empty()) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::bad_request("url is required")),
        )
            .into_response();
    };

    let formats = match parse_formats(request.formats.as_deref()) {
        Ok(formats) => formats,
        Err(unknown) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse::bad_request(format!(
                    "unknown format: {unknown}"
                ))),
            )
                .into_response();
        }
    };

    let opts = ScrapeOptions {
        formats,
        only_main_content: request.only_main_content.unwrap_or(true),
        timeout: clamp_timeout(request.timeout_ms, state.max_timeout_ms),
    };

    debug!("scrape request: url={}", url);
    match state.scraper.scrape(&url, &opts).await {
        Ok(data) => (
            StatusCode::OK,
            Json(ScrapeResponse {
                success: true,
                data,
            }),
        )
            .into_response(),
        Err(e) => error_response(&e),
    }
}

/// Search endpoint
pub async fn search(
    State(state): State<AppState>,
    Json(request): Json<SearchRequest>,
) -> impl IntoResponse {
    state.metrics.http_requests_total.inc();

    let Some(query) = request.query.filter(|q| !q.trim().is_empty()) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::bad_request("query is required")),
        )
            .into_response();
    };

    let Some(service) = &state.search else {
        return error_response(&ScrapeError::UpstreamSearchError(
            "search is not configured (SEARXNG_URL unset)".into(),
        ));
    };

    let scrape = match request.scrape_options {
        Some(scrape_opts) => {
            let formats = match parse_formats(scrape_opts.formats.as_deref()) {
                Ok(formats) => formats,
                Err(unknown) => {
                    return (
                        StatusCode::BAD_REQUEST,
                        Json(ErrorResponse::bad_request(format!(
                            "unknown format: {unknown}"
                        ))),
                    )
                        .into_response();
                }
            };
            // An empty formats list means "search only", no fan-out
            scrape_opts.formats.is_some().then(|| ScrapeOptions {
                formats,
                only_main_content: scrape_opts.only_main_content.unwrap_or(true),
                timeout: clamp_timeout(None, state.max_timeout_ms),
            })
        }
        None => None,
    };

    let search_query = SearchQuery {
        query,
        limit: request
            .limit
            .unwrap_or(DEFAULT_SEARCH_LIMIT)
            .clamp(1, MAX_SEARCH_LIMIT),
        include_domains: request.include_domains.unwrap_or_default(),
        exclude_domains: request.exclude_domains.unwrap_or_default(),
        scrape,
    };

    match service.search(&search_query).await {
        Ok(web) => (
            StatusCode::OK,
            Json(SearchResponse {
                success: true,
                data: SearchData { web },
            }),
        )
            .into_response(),
        Err(e) => error_response(&e),
    }
}

/// Map a pipeline error to its status and structured body
fn error_response(e: &ScrapeError) -> axum::response::Response {
    let status =
        StatusCode::from_u16(e.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(ErrorResponse::new(e.kind(), e.detail()))).into_response()
}

/// Parse requested formats; markdown is always included
fn parse_formats(formats: Option<&[String]>) -> Result<Vec<Format>, String> {
    let mut parsed = vec![Format::Markdown];
    for format in formats.unwrap_or_default() {
        match Format::parse(format) {
            Some(f) => {
                if !parsed.contains(&f) {
                    parsed.push(f);
                }
            }
            None => return Err(format.clone()),
        }
    }
    Ok(parsed)
}

fn clamp_timeout(requested_ms: Option<u64>, max_ms: u64) -> Duration {
    let ms = requested_ms.unwrap_or(DEFAULT_TIMEOUT_MS).min(max_ms).max(1);
    Duration::from_millis(ms)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_formats_always_includes_markdown() {
        let parsed = parse_formats(None).unwrap();
        assert_eq!(parsed, vec![Format::Markdown]);

        let formats = vec!["links".to_string(), "markdown".to_string()];
        let parsed = parse_formats(Some(&formats)).unwrap();
        assert_eq!(parsed, vec![Format::Markdown, Format::Links]);
    }

    #[test]
    fn test_parse_formats_rejects_unknown() {
        let formats = vec!["pdf".to_string()];
        assert_eq!(parse_formats(Some(&formats)).unwrap_err(), "pdf");
    }

    #[test]
    fn test_clamp_timeout() {
        assert_eq!(clamp_timeout(None, 60_000), Duration::from_millis(30_000));
        assert_eq!(clamp_timeout(Some(5_000), 60_000), Duration::from_millis(5_000));
        assert_eq!(clamp_timeout(Some(120_000), 60_000), Duration::from_millis(60_000));
        assert_eq!(clamp_timeout(Some(0), 60_000), Duration::from_millis(1));
    }
}
