//! Headless browser pool
//!
//! Owns exactly one browser process per worker. The browser is launched
//! lazily on first use, recycled after serving a configured number of
//! requests, and relaunched on demand after a disconnect. The pool state
//! sits behind an async mutex that is held across the launch, so
//! concurrent cold starts share a single launch and at most one launch is
//! ever in flight.

pub mod page;
pub mod stealth;

use std::path::Path;
use std::sync::Arc;

use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::Page;
use futures::StreamExt;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::ScrapeError;
use crate::metrics::ServiceMetrics;

/// Pool configuration
#[derive(Debug, Clone)]
pub struct BrowserPoolConfig {
    /// Requests a single browser process serves before being recycled
    pub max_requests: u64,
    /// Outbound proxies, rotated round-robin across launches
    pub proxy_list: Vec<String>,
    /// Explicit browser executable; discovered when unset
    pub executable: Option<String>,
}

impl Default for BrowserPoolConfig {
    fn default() -> Self {
        Self {
            max_requests: 100,
            proxy_list: Vec::new(),
            executable: None,
        }
    }
}

struct LiveBrowser {
    browser: Browser,
    generation: u64,
    requests_served: u64,
}

struct PoolState {
    current: Option<LiveBrowser>,
    next_generation: u64,
    proxy_cursor: usize,
}

/// A page checked out of the pool, tagged with the generation of the
/// browser that created it
pub struct PageLease {
    pub page: Page,
    pub generation: u64,
}

/// Single-process browser pool
pub struct BrowserPool {
    config: BrowserPoolConfig,
    state: Mutex<PoolState>,
    metrics: Arc<ServiceMetrics>,
}

impl BrowserPool {
    pub fn new(config: BrowserPoolConfig, metrics: Arc<ServiceMetrics>) -> Arc<Self> {
        Arc::new(Self {
            config,
            state: Mutex::new(PoolState {
                current: None,
                next_generation: 0,
                proxy_cursor: 0,
            }),
            metrics,
        })
    }

    /// Check a fresh page out of the current browser, recycling or
    /// launching first as the state machine requires.
    pub async fn acquire(self: &Arc<Self>) -> Result<PageLease, ScrapeError> {
        let mut state = self.state.lock().await;

        // Budget exhausted: retire the old process and fall through to launch
        let over_budget = state
            .current
            .as_ref()
            .is_some_and(|live| live.requests_served >= self.config.max_requests.max(1));
        if over_budget {
            if let Some(old) = state.current.take() {
                debug!(
                    "browser generation {} hit its request budget, recycling",
                    old.generation
                );
                self.metrics.browser_recycles_total.inc();
                spawn_close(old.browser);
            }
        }

        if state.current.is_none() {
            state.next_generation += 1;
            let generation = state.next_generation;
            let proxy = if self.config.proxy_list.is_empty() {
                None
            } else {
                let proxy = self.config.proxy_list[state.proxy_cursor % self.config.proxy_list.len()].clone();
                state.proxy_cursor = state.proxy_cursor.wrapping_add(1);
                Some(proxy)
            };
            // The state mutex stays held across the launch: concurrent
            // acquires queue here and observe the handle this launch stores.
            let browser = self.launch(generation, proxy.as_deref()).await?;
            state.current = Some(LiveBrowser {
                browser,
                generation,
                requests_served: 0,
            });
        }

        let Some(live) = state.current.as_mut() else {
            return Err(ScrapeError::NavigationFailed("browser unavailable".into()));
        };
        live.requests_served += 1;
        let generation = live.generation;

        match live.browser.new_page("about:blank").await {
            Ok(page) => Ok(PageLease { page, generation }),
            Err(e) => {
                // A dead process that has not yet reported its disconnect;
                // drop it so the next acquire relaunches.
                warn!("failed to open page, discarding browser: {}", e);
                if let Some(old) = state.current.take() {
                    spawn_close(old.browser);
                }
                Err(ScrapeError::NavigationFailed(format!(
                    "failed to open page: {e}"
                )))
            }
        }
    }

    async fn launch(
        self: &Arc<Self>,
        generation: u64,
        proxy: Option<&str>,
    ) -> Result<Browser, ScrapeError> {
        let executable = match &self.config.executable {
            Some(path) => path.clone(),
            None => find_browser_executable().ok_or_else(|| {
                ScrapeError::NavigationFailed(
                    "no chromium executable found; set CHROME_EXECUTABLE".into(),
                )
            })?,
        };

        let config = build_browser_config(&executable, proxy)
            .map_err(|e| ScrapeError::NavigationFailed(format!("browser config: {e}")))?;

        info!("launching browser generation {} ({})", generation, executable);
        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| ScrapeError::NavigationFailed(format!("browser launch failed: {e}")))?;
        self.metrics.browser_launches_total.inc();

        // Drive the CDP event loop; when the stream ends the process is
        // gone. The generation tag keeps a stale disconnect from clearing a
        // newer browser.
        let weak = Arc::downgrade(self);
        tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("cdp handler error: {}", e);
                }
            }
            if let Some(pool) = weak.upgrade() {
                pool.handle_disconnect(generation).await;
            }
        });

        Ok(browser)
    }

    /// React to a browser disconnect. Only clears pool state when the
    /// disconnected generation is still the current one.
    async fn handle_disconnect(&self, generation: u64) {
        let mut state = self.state.lock().await;
        match &state.current {
            Some(live) if live.generation == generation => {
                warn!("browser generation {} disconnected", generation);
                self.metrics.browser_disconnects_total.inc();
                state.current = None;
            }
            _ => {
                debug!("ignoring stale disconnect for generation {}", generation);
            }
        }
    }

    /// Gracefully shut the current browser down
    pub async fn close(&self) {
        let mut state = self.state.lock().await;
        if let Some(mut live) = state.current.take() {
            info!("shutting down browser generation {}", live.generation);
            if let Err(e) = live.browser.close().await {
                warn!("browser close error: {}", e);
            }
        }
    }

    /// Generation counter, usable as a launch count in tests
    pub async fn launches(&self) -> u64 {
        self.state.lock().await.next_generation
    }
}

fn spawn_close(mut browser: Browser) {
    tokio::spawn(async move {
        if let Err(e) = browser.close().await {
            debug!("browser close error (non-fatal): {}", e);
        }
    });
}

/// Launch flags: headless operation with automation banners, background
/// networking, GPU, sandbox and telemetry disabled.
fn build_browser_config(executable: &str, proxy: Option<&str>) -> Result<BrowserConfig, String> {
    let mut builder = BrowserConfig::builder()
        .chrome_executable(executable)
        .arg("--disable-blink-features=AutomationControlled")
        .arg("--disable-infobars")
        .arg("--disable-background-networking")
        .arg("--disable-background-timer-throttling")
        .arg("--disable-sync")
        .arg("--disable-translate")
        .arg("--disable-crash-reporter")
        .arg("--disable-breakpad")
        .arg("--disable-extensions")
        .arg("--disable-gpu")
        .arg("--no-sandbox")
        .arg("--disable-setuid-sandbox")
        .arg("--disable-dev-shm-usage")
        .arg("--no-first-run")
        .arg("--no-default-browser-check")
        .arg("--metrics-recording-only")
        .arg("--hide-scrollbars")
        .arg("--mute-audio");

    if let Some(proxy) = proxy {
        builder = builder.arg(format!("--proxy-server={}", proxy));
    }

    builder.build()
}

/// Find a usable chromium-family executable: explicit env override first,
/// then PATH, then well-known install locations.
pub fn find_browser_executable() -> Option<String> {
    if let Ok(path) = std::env::var("CHROME_EXECUTABLE") {
        if Path::new(&path).exists() {
            return Some(path);
        }
    }

    if let Ok(path_var) = std::env::var("PATH") {
        let candidates = [
            "chromium",
            "chromium-browser",
            "google-chrome",
            "google-chrome-stable",
            "chrome",
        ];
        for dir in std::env::split_paths(&path_var) {
            for exe in candidates {
                let full = dir.join(exe);
                if full.exists() {
                    return Some(full.to_string_lossy().to_string());
                }
            }
        }
    }

    let well_known = [
        "/usr/bin/chromium",
        "/usr/bin/chromium-browser",
        "/usr/bin/google-chrome",
        "/usr/bin/google-chrome-stable",
        "/opt/google/chrome/google-chrome",
        "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
        "/Applications/Chromium.app/Contents/MacOS/Chromium",
    ];
    well_known
        .iter()
        .find(|p| Path::new(p).exists())
        .map(|p| p.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_browser_config_includes_stealth_flags() {
        let config = build_browser_config("/usr/bin/chromium", None);
        // Flag errors would surface as Err from the builder
        assert!(config.is_ok());
    }

    #[test]
    fn test_browser_config_with_proxy() {
        let config = build_browser_config("/usr/bin/chromium", Some("http://proxy:8080"));
        assert!(config.is_ok());
    }

    #[tokio::test]
    async fn test_stale_disconnect_does_not_clear_newer_state() {
        let pool = BrowserPool::new(BrowserPoolConfig::default(), ServiceMetrics::shared());
        // No browser running: a disconnect for an old generation is a no-op
        pool.handle_disconnect(3).await;
        assert_eq!(pool.launches().await, 0);
        assert_eq!(pool.metrics.browser_disconnects_total.get(), 0);
    }
}
