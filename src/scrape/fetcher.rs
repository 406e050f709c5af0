//! Fast HTTP fetch tier
//!
//! One plain GET with a short timeout, realistic headers, and automatic
//! redirect following. Accepts only HTML bodies above a minimum size; every
//! other outcome returns `None` so the caller falls through to the browser
//! tier. For static pages this path skips ~95% of the latency of a full
//! browser navigation.

use std::time::Duration;

use rand::seq::SliceRandom;
use reqwest::header;
use url::Url;

/// Fast fetch never waits longer than this, whatever the request deadline
const FAST_TIMEOUT_CAP: Duration = Duration::from_secs(5);

/// Bodies shorter than this are paywall / interstitial shells, not content
const MIN_HTML_BYTES: usize = 2_000;

const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/130.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:133.0) Gecko/20100101 Firefox/133.0",
];

const ACCEPT_HTML: &str =
    "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8";

/// Result of a successful fast fetch
#[derive(Debug, Clone)]
pub struct FastFetchResult {
    /// Rendered-as-served HTML body
    pub html: String,
    /// URL after all redirects
    pub final_url: Url,
    /// Final HTTP status
    pub status_code: u16,
}

/// Cheap HTTP tier tried before the browser
pub struct FastFetcher {
    client: reqwest::Client,
}

impl FastFetcher {
    pub fn new() -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(3))
            .redirect(reqwest::redirect::Policy::limited(10))
            .gzip(true)
            .brotli(true)
            .build()?;
        Ok(Self { client })
    }

    /// Attempt the fast path. Returns `None` when the transport fails, the
    /// final body is not HTML, or the body is too small to be real content.
    pub async fn fetch(&self, url: &Url, request_timeout: Duration) -> Option<FastFetchResult> {
        let timeout = request_timeout.min(FAST_TIMEOUT_CAP);
        let ua = USER_AGENTS
            .choose(&mut rand::thread_rng())
            .copied()
            .unwrap_or(USER_AGENTS[0]);

        let response = match self
            .client
            .get(url.clone())
            .timeout(timeout)
            .header(header::USER_AGENT, ua)
            .header(header::ACCEPT, ACCEPT_HTML)
            .header(header::ACCEPT_LANGUAGE, "en-US,en;q=0.9")
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                tracing::debug!("fast fetch transport error for {}: {}", url, e);
                return None;
            }
        };

        let status_code = response.status().as_u16();
        let final_url = response.url().clone();

        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();

        let html = response.text().await.ok()?;

        if !acceptable(&content_type, html.len()) {
            tracing::debug!(
                "fast fetch rejected for {}: content-type={}, {} bytes",
                url,
                content_type,
                html.len()
            );
            return None;
        }

        Some(FastFetchResult {
            html,
            final_url,
            status_code,
        })
    }
}

/// Gate on the final content type and body size
fn acceptable(content_type: &str, body_len: usize) -> bool {
    content_type.contains("text/html") && body_len >= MIN_HTML_BYTES
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acceptable_requires_html() {
        assert!(acceptable("text/html; charset=utf-8", 5_000));
        assert!(!acceptable("application/pdf", 5_000));
        assert!(!acceptable("application/json", 5_000));
        assert!(!acceptable("", 5_000));
    }

    #[test]
    fn test_acceptable_requires_minimum_size() {
        assert!(!acceptable("text/html", MIN_HTML_BYTES - 1));
        assert!(acceptable("text/html", MIN_HTML_BYTES));
    }
}
