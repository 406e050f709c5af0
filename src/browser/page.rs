//! Browser fetch tier
//!
//! Opens a fresh page with a stealth profile and a request filter,
//! navigates, waits for the page to settle, dismisses consent overlays,
//! and captures the rendered HTML. The page is closed on every exit path;
//! a guard spawns the close when the future is dropped mid-flight.

use std::sync::OnceLock;
use std::time::{Duration, Instant};

use chromiumoxide::cdp::browser_protocol::emulation::{
    SetDeviceMetricsOverrideParams, SetLocaleOverrideParams, SetTimezoneOverrideParams,
    SetTouchEmulationEnabledParams,
};
use chromiumoxide::cdp::browser_protocol::fetch::{
    ContinueRequestParams, EnableParams as FetchEnableParams, EventRequestPaused,
    FailRequestParams,
};
use chromiumoxide::cdp::browser_protocol::network::{
    EnableParams as NetworkEnableParams, ErrorReason, EventResponseReceived, Headers,
    ResourceType, SetExtraHttpHeadersParams, SetUserAgentOverrideParams,
};
use chromiumoxide::cdp::browser_protocol::page::AddScriptToEvaluateOnNewDocumentParams;
use chromiumoxide::Page;
use futures::StreamExt;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, warn};
use url::Url;

use super::stealth::{self, StealthProfile};
use super::BrowserPool;
use crate::error::ScrapeError;
use crate::scrape::ssrf;

/// Cap on the best-effort network-idle wait
const NETWORK_IDLE_CAP: Duration = Duration::from_secs(2);
/// No new resource entries for this long counts as idle
const NETWORK_IDLE_QUIET: Duration = Duration::from_millis(500);
/// Cap on the best-effort wait for a content container to attach
const CONTENT_SELECTOR_WAIT: Duration = Duration::from_secs(3);

/// Result of a browser fetch
#[derive(Debug, Clone)]
pub struct BrowserFetchResult {
    pub html: String,
    pub final_url: Url,
    pub status_code: u16,
}

/// Tracker and analytics endpoints aborted by the request filter
fn tracker_pattern() -> &'static regex_lite::Regex {
    static RE: OnceLock<regex_lite::Regex> = OnceLock::new();
    RE.get_or_init(|| {
        regex_lite::Regex::new(
            r"(?i)google-analytics\.com|googletagmanager\.com|doubleclick\.net|facebook\.net|fbcdn\.net|analytics|hotjar\.com|segment\.io|sentry\.io|newrelic\.com|datadome|cloudflareinsights\.com",
        )
        .expect("valid tracker pattern")
    })
}

/// Resource types that never contribute to text extraction. Anything not
/// explicitly allowed is blocked (fail closed).
fn is_blocked_resource(resource_type: &ResourceType) -> bool {
    !matches!(
        resource_type,
        ResourceType::Document
            | ResourceType::Script
            | ResourceType::Xhr
            | ResourceType::Fetch
            | ResourceType::Ping
            | ResourceType::Preflight
            | ResourceType::CspViolationReport
    )
}

/// Decide whether a sub-request should be aborted
fn should_abort(url: &str, resource_type: &ResourceType) -> bool {
    ssrf::should_block_request(url)
        || is_blocked_resource(resource_type)
        || tracker_pattern().is_match(url)
}

/// RAII guard that closes the page on every exit path. An explicit
/// `close()` is preferred; the drop path spawns the close because CDP
/// teardown is async.
struct PageGuard {
    page: Option<Page>,
}

impl PageGuard {
    fn new(page: Page) -> Self {
        Self { page: Some(page) }
    }

    fn page(&self) -> &Page {
        self.page.as_ref().expect("page not yet consumed")
    }

    async fn close(mut self) {
        if let Some(page) = self.page.take() {
            if let Err(e) = page.close().await {
                debug!("page close error (non-fatal): {}", e);
            }
        }
    }
}

impl Drop for PageGuard {
    fn drop(&mut self) {
        if let Some(page) = self.page.take() {
            tokio::spawn(async move {
                let _ = page.close().await;
            });
        }
    }
}

/// Fetch a page through the shared browser
pub async fn fetch_page(
    pool: &Arc<BrowserPool>,
    url: &Url,
    timeout: Duration,
) -> Result<BrowserFetchResult, ScrapeError> {
    let lease = pool.acquire().await?;
    let guard = PageGuard::new(lease.page);

    let result = match tokio::time::timeout(timeout, drive(guard.page(), url)).await {
        Ok(result) => result,
        Err(_) => Err(ScrapeError::NavigationFailed(format!(
            "navigation timed out after {}ms",
            timeout.as_millis()
        ))),
    };

    guard.close().await;
    result
}

async fn drive(page: &Page, url: &Url) -> Result<BrowserFetchResult, ScrapeError> {
    let profile = stealth::random_profile();
    configure_context(page, profile).await?;

    // Request filter: every sub-request passes the synchronous SSRF guard,
    // the resource-type allow list, and the tracker pattern.
    let filter_task = install_request_filter(page)
        .await
        .map_err(|e| ScrapeError::NavigationFailed(format!("request filter: {e}")))?;

    // Main-document status/mime capture, citescrape-style: the first
    // document-like response on the page is the navigation response.
    let status_task = install_status_capture(page).await;

    let nav = page.goto(url.as_str()).await;
    if let Err(e) = nav {
        filter_task.abort();
        if let Some(task) = status_task {
            task.1.abort();
        }
        return Err(ScrapeError::NavigationFailed(e.to_string()));
    }

    // Best-effort settle: bounded network-idle, consent dismissal, and a
    // short wait for a recognisable content container. None of these can
    // fail the fetch.
    wait_for_network_idle(page, NETWORK_IDLE_QUIET, NETWORK_IDLE_CAP).await;
    dismiss_overlays(page).await;
    wait_for_content_selector(page, CONTENT_SELECTOR_WAIT).await;

    let (status_code, mime_type) = match status_task {
        Some((rx, task)) => match tokio::time::timeout(Duration::from_secs(2), rx).await {
            Ok(Ok(captured)) => captured,
            _ => {
                task.abort();
                (200, String::new())
            }
        },
        None => (200, String::new()),
    };

    if mime_type.contains("application/pdf") {
        filter_task.abort();
        return Err(ScrapeError::UnsupportedContentType(mime_type));
    }

    let final_url = page
        .url()
        .await
        .ok()
        .flatten()
        .and_then(|u| Url::parse(&u).ok())
        .unwrap_or_else(|| url.clone());

    let html = page.content().await;
    filter_task.abort();
    let html =
        html.map_err(|e| ScrapeError::NavigationFailed(format!("content capture: {e}")))?;

    Ok(BrowserFetchResult {
        html,
        final_url,
        status_code,
    })
}

fn context_err(stage: &str, e: impl std::fmt::Display) -> ScrapeError {
    ScrapeError::NavigationFailed(format!("context setup ({stage}): {e}"))
}

/// Apply the stealth profile to a fresh page: UA, viewport, locale,
/// timezone, touch, Client-Hints-consistent headers, and the init script
/// that runs before any page script in every frame.
async fn configure_context(page: &Page, profile: &StealthProfile) -> Result<(), ScrapeError> {
    let ua = SetUserAgentOverrideParams::builder()
        .user_agent(profile.user_agent)
        .accept_language(profile.locale)
        .platform(profile.platform)
        .build()
        .map_err(|e| context_err("user agent", e))?;
    page.execute(ua).await.map_err(|e| context_err("user agent", e))?;

    page.execute(SetDeviceMetricsOverrideParams::new(
        profile.viewport.0 as i64,
        profile.viewport.1 as i64,
        if profile.mobile { 2.0 } else { 1.0 },
        profile.mobile,
    ))
    .await
    .map_err(|e| context_err("viewport", e))?;

    page.execute(SetTouchEmulationEnabledParams::new(profile.mobile))
        .await
        .map_err(|e| context_err("touch", e))?;

    page.execute(SetTimezoneOverrideParams::new(profile.timezone))
        .await
        .map_err(|e| context_err("timezone", e))?;

    let mut locale = SetLocaleOverrideParams::default();
    locale.locale = Some(profile.locale.to_string());
    page.execute(locale)
        .await
        .map_err(|e| context_err("locale", e))?;

    let mut headers = serde_json::Map::new();
    for (name, value) in stealth::extra_headers(profile) {
        headers.insert(name, json!(value));
    }
    page.execute(SetExtraHttpHeadersParams::new(Headers::new(json!(headers))))
        .await
        .map_err(|e| context_err("headers", e))?;

    page.execute(AddScriptToEvaluateOnNewDocumentParams::new(
        stealth::build_init_script(profile),
    ))
    .await
    .map_err(|e| context_err("init script", e))?;

    Ok(())
}

/// Enable CDP request interception and spawn the filter loop
async fn install_request_filter(
    page: &Page,
) -> Result<tokio::task::JoinHandle<()>, chromiumoxide::error::CdpError> {
    page.execute(FetchEnableParams::default()).await?;
    let mut paused = page.event_listener::<EventRequestPaused>().await?;

    let intercept_page = page.clone();
    Ok(tokio::spawn(async move {
        while let Some(event) = paused.next().await {
            let request_url = event.request.url.clone();
            let outcome = if should_abort(&request_url, &event.resource_type) {
                debug!("aborting sub-request: {}", request_url);
                intercept_page
                    .execute(FailRequestParams::new(
                        event.request_id.clone(),
                        ErrorReason::BlockedByClient,
                    ))
                    .await
                    .map(|_| ())
            } else {
                intercept_page
                    .execute(ContinueRequestParams::new(event.request_id.clone()))
                    .await
                    .map(|_| ())
            };
            if outcome.is_err() {
                // Page is gone; stop filtering
                break;
            }
        }
    }))
}

type StatusCapture = (
    tokio::sync::oneshot::Receiver<(u16, String)>,
    tokio::task::JoinHandle<()>,
);

/// Capture the status and mime type of the main document response
async fn install_status_capture(page: &Page) -> Option<StatusCapture> {
    if let Err(e) = page.execute(NetworkEnableParams::default()).await {
        warn!("failed to enable network events: {}", e);
        return None;
    }
    let mut responses = match page.event_listener::<EventResponseReceived>().await {
        Ok(stream) => stream,
        Err(e) => {
            warn!("failed to subscribe to response events: {}", e);
            return None;
        }
    };

    let (tx, rx) = tokio::sync::oneshot::channel();
    let task = tokio::spawn(async move {
        let mut seen = 0u32;
        while let Some(event) = responses.next().await {
            seen += 1;
            let mime = event.response.mime_type.to_ascii_lowercase();
            let document_like = mime.starts_with("text/html")
                || mime.starts_with("application/xhtml+xml")
                || mime.starts_with("application/pdf");
            // The first document-type response is the navigation response,
            // redirects included; the first response overall is a fallback.
            if document_like || seen == 1 {
                let _ = tx.send((event.response.status as u16, mime));
                break;
            }
        }
    });
    Some((rx, task))
}

/// Poll `performance` resource entries until the page is quiet or the cap
/// elapses. Best effort; never fails the fetch.
async fn wait_for_network_idle(page: &Page, quiet: Duration, cap: Duration) {
    let started = Instant::now();
    let mut last_count = 0u64;
    let mut stable_since = Instant::now();

    while started.elapsed() < cap {
        let count = eval_u64(page, "performance.getEntriesByType('resource').length").await;
        let ready = eval_bool(page, "document.readyState === 'complete'").await;

        if !ready || count != last_count {
            last_count = count;
            stable_since = Instant::now();
        } else if stable_since.elapsed() >= quiet {
            return;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}

/// Click the first visible consent button and hide residual banners.
/// The script swallows its own errors and the evaluation error is ignored.
async fn dismiss_overlays(page: &Page) {
    if let Err(e) = page.evaluate(OVERLAY_DISMISS_SCRIPT).await {
        debug!("overlay dismissal failed (ignored): {}", e);
    }
}

/// Wait for any recognisable content container to attach
async fn wait_for_content_selector(page: &Page, cap: Duration) {
    const PROBE: &str = "!!document.querySelector('article, main, [role=\"main\"], .post-content, .entry-content, #content')";
    let started = Instant::now();
    while started.elapsed() < cap {
        if eval_bool(page, PROBE).await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}

async fn eval_u64(page: &Page, script: &str) -> u64 {
    page.evaluate(script)
        .await
        .ok()
        .and_then(|v| v.into_value::<serde_json::Value>().ok())
        .and_then(|j| j.as_u64())
        .unwrap_or(0)
}

async fn eval_bool(page: &Page, script: &str) -> bool {
    page.evaluate(script)
        .await
        .ok()
        .and_then(|v| v.into_value::<serde_json::Value>().ok())
        .and_then(|j| j.as_bool())
        .unwrap_or(false)
}

const OVERLAY_DISMISS_SCRIPT: &str = r#"
(() => {
  try {
    const selectors = [
      '#onetrust-accept-btn-handler',
      '.fc-cta-consent',
      '#sp-cc-accept',
      'button#L2AGLb',
      '#didomi-notice-agree-button',
      '.cky-btn-accept',
      '#cookie-accept',
      'button[data-testid="cookie-policy-manage-dialog-accept-button"]',
      'button[aria-label="Accept all"]',
      'button[aria-label="Accept cookies"]',
      '[id*="accept-all"]',
      'button[class*="accept"]',
      '[class*="cookie"] button[class*="agree"]',
      'button[aria-label*="close"]',
      '[class*="modal"] [class*="close"]',
    ];
    for (const sel of selectors) {
      let el;
      try { el = document.querySelector(sel); } catch (e) { continue; }
      if (el && el.offsetParent !== null) {
        el.click();
        break;
      }
    }
    const residual = document.querySelectorAll(
      '[class*="cookie"], [class*="consent"], [class*="gdpr"], [id*="cookie"], [id*="consent"]'
    );
    residual.forEach((el) => {
      try {
        const style = window.getComputedStyle(el);
        if (style.position === 'fixed' || style.position === 'sticky') {
          el.style.setProperty('display', 'none', 'important');
        }
      } catch (e) {}
    });
  } catch (e) {}
})();
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blocked_resource_types() {
        for blocked in [
            ResourceType::Image,
            ResourceType::Font,
            ResourceType::Media,
            ResourceType::Stylesheet,
            ResourceType::TextTrack,
            ResourceType::EventSource,
            ResourceType::WebSocket,
            ResourceType::Manifest,
            ResourceType::Other,
        ] {
            assert!(is_blocked_resource(&blocked), "{blocked:?}");
        }
        for allowed in [
            ResourceType::Document,
            ResourceType::Script,
            ResourceType::Xhr,
            ResourceType::Fetch,
        ] {
            assert!(!is_blocked_resource(&allowed), "{allowed:?}");
        }
    }

    #[test]
    fn test_filter_blocks_private_sub_requests() {
        assert!(should_abort("http://127.0.0.1/x.png", &ResourceType::Document));
        assert!(should_abort("http://169.254.169.254/latest", &ResourceType::Xhr));
        assert!(!should_abort("https://example.com/app.js", &ResourceType::Script));
    }

    #[test]
    fn test_filter_blocks_trackers() {
        for url in [
            "https://www.google-analytics.com/collect",
            "https://www.googletagmanager.com/gtm.js",
            "https://static.doubleclick.net/ad.js",
            "https://connect.facebook.net/sdk.js",
            "https://cdn.example.com/analytics.js",
            "https://script.hotjar.com/h.js",
            "https://api.segment.io/v1/t",
            "https://o1.ingest.sentry.io/envelope",
            "https://js-agent.newrelic.com/nr.js",
            "https://static.cloudflareinsights.com/beacon.min.js",
        ] {
            assert!(should_abort(url, &ResourceType::Script), "{url}");
        }
        assert!(!should_abort("https://example.com/article.js", &ResourceType::Script));
    }

    #[test]
    fn test_overlay_script_is_self_contained() {
        // The whole script body is wrapped so evaluation can never throw
        assert!(OVERLAY_DISMISS_SCRIPT.contains("try"));
        assert!(OVERLAY_DISMISS_SCRIPT.contains("catch"));
        assert!(OVERLAY_DISMISS_SCRIPT.contains("offsetParent"));
    }
}
