//! HTTP API server
//!
//! Axum server assembling the scrape pipeline, the search service, auth,
//! tracing, and graceful shutdown.

pub mod auth;
pub mod handlers;
pub mod routes;
pub mod types;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::browser::{BrowserPool, BrowserPoolConfig};
use crate::config::Config;
use crate::metrics::ServiceMetrics;
use crate::scrape::{Scraper, ScraperConfig};
use crate::search::{SearchConfig, SearchService};

use auth::AuthState;
use handlers::AppState;
use routes::create_router;

/// HTTP API server
pub struct HttpServer {
    config: Config,
    state: AppState,
    pool: Arc<BrowserPool>,
}

impl HttpServer {
    /// Assemble the pipeline from configuration
    pub fn new(config: Config) -> Result<Self> {
        let metrics = ServiceMetrics::shared();

        let pool = BrowserPool::new(
            BrowserPoolConfig {
                max_requests: config.browser.max_requests,
                proxy_list: config.browser.proxy_list.clone(),
                executable: None,
            },
            metrics.clone(),
        );

        let scraper = Arc::new(
            Scraper::new(
                ScraperConfig {
                    max_concurrency: config.scrape.max_concurrency,
                    cache_max_items: config.cache.max_items,
                    cache_ttl: std::time::Duration::from_millis(config.cache.ttl_ms),
                },
                pool.clone(),
                metrics.clone(),
            )
            .context("failed to build scraper")?,
        );

        let search = match &config.search.searxng_url {
            Some(base_url) => Some(Arc::new(
                SearchService::new(
                    SearchConfig {
                        base_url: base_url.clone(),
                        timeout: std::time::Duration::from_millis(config.search.timeout_ms),
                    },
                    scraper.clone(),
                    metrics.clone(),
                )
                .context("failed to build search service")?,
            )),
            None => None,
        };

        let state = AppState {
            scraper,
            search,
            metrics,
            max_timeout_ms: config.scrape.max_timeout_ms,
            metrics_enabled: config.server.enable_metrics,
        };

        Ok(Self {
            config,
            state,
            pool,
        })
    }

    /// Run until the shutdown signal fires, then close the browser pool
    pub async fn run(&self, mut shutdown: broadcast::Receiver<()>) -> Result<()> {
        let auth_state = AuthState::new(self.config.server.api_keys.clone());
        let app = create_router(self.state.clone(), auth_state)
            .layer(TraceLayer::new_for_http());

        let addr = SocketAddr::from(([0, 0, 0, 0], self.config.server.port));
        let listener = TcpListener::bind(&addr)
            .await
            .context("failed to bind HTTP server")?;

        info!("listening on http://{}", addr);
        if self.config.server.workers > 1 {
            info!(
                "WORKERS={} is supervised externally; this process serves one worker",
                self.config.server.workers
            );
        }

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                info!("HTTP server shutting down");
            })
            .await
            .context("HTTP server error")?;

        self.pool.close().await;
        Ok(())
    }
}
