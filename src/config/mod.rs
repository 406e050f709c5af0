//! Service configuration
//!
//! Environment-driven: every setting has a default, `from_env` reads the
//! recognised variables, and `validate` collects all problems into one
//! report so the operator can fix everything in one pass.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Hard cap on the per-request timeout, whatever the environment says
pub const MAX_TIMEOUT_CEILING_MS: u64 = 60_000;

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen port
    pub port: u16,
    /// Cluster size; workers are supervised externally
    pub workers: usize,
    /// API keys (empty = no auth required)
    pub api_keys: Vec<String>,
    /// Trust reverse-proxy forwarding headers
    pub trust_proxy: bool,
    /// Expose the Prometheus /metrics endpoint
    pub enable_metrics: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 3002,
            workers: 1,
            api_keys: Vec::new(),
            trust_proxy: false,
            enable_metrics: false,
        }
    }
}

/// Scrape pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapeConfig {
    /// Maximum concurrent expensive operations
    pub max_concurrency: usize,
    /// Per-request timeout cap in milliseconds
    pub max_timeout_ms: u64,
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 5,
            max_timeout_ms: 30_000,
        }
    }
}

/// Browser pool configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserConfig {
    /// Requests one browser process serves before recycling
    pub max_requests: u64,
    /// Outbound proxies, rotated round-robin across launches
    pub proxy_list: Vec<String>,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            max_requests: 100,
            proxy_list: Vec::new(),
        }
    }
}

/// Result cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub max_items: usize,
    pub ttl_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_items: 1000,
            ttl_ms: 300_000,
        }
    }
}

/// Search upstream configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchUpstreamConfig {
    /// SearXNG base URL; search is disabled when unset
    pub searxng_url: Option<String>,
    pub timeout_ms: u64,
}

impl Default for SearchUpstreamConfig {
    fn default() -> Self {
        Self {
            searxng_url: None,
            timeout_ms: 10_000,
        }
    }
}

/// Full service configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub scrape: ScrapeConfig,
    #[serde(default)]
    pub browser: BrowserConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub search: SearchUpstreamConfig,
}

impl Config {
    /// Read configuration from the environment, validate, and clamp the
    /// timeout cap to the hard ceiling.
    pub fn from_env() -> Result<Self> {
        let mut config = Self {
            server: ServerConfig {
                port: env_parse("PORT", ServerConfig::default().port),
                workers: env_parse("WORKERS", ServerConfig::default().workers),
                api_keys: env_csv("API_KEYS"),
                trust_proxy: env_bool("TRUST_PROXY", false),
                enable_metrics: env_bool("ENABLE_METRICS", false),
            },
            scrape: ScrapeConfig {
                max_concurrency: env_parse("MAX_CONCURRENCY", ScrapeConfig::default().max_concurrency),
                max_timeout_ms: env_parse("MAX_TIMEOUT_MS", ScrapeConfig::default().max_timeout_ms),
            },
            browser: BrowserConfig {
                max_requests: env_parse("BROWSER_MAX_REQUESTS", BrowserConfig::default().max_requests),
                proxy_list: env_csv("PROXY_LIST"),
            },
            cache: CacheConfig {
                max_items: env_parse("CACHE_MAX_ITEMS", CacheConfig::default().max_items),
                ttl_ms: env_parse("CACHE_TTL_MS", CacheConfig::default().ttl_ms),
            },
            search: SearchUpstreamConfig {
                searxng_url: std::env::var("SEARXNG_URL").ok().filter(|s| !s.is_empty()),
                timeout_ms: env_parse("SEARXNG_TIMEOUT_MS", SearchUpstreamConfig::default().timeout_ms),
            },
        };
        config.scrape.max_timeout_ms = config.scrape.max_timeout_ms.min(MAX_TIMEOUT_CEILING_MS);
        config.validate()?;
        Ok(config)
    }

    /// Per-request timeout cap as a `Duration`
    pub fn max_timeout(&self) -> Duration {
        Duration::from_millis(self.scrape.max_timeout_ms)
    }

    /// Validate all fields, collecting every error into one report
    pub fn validate(&self) -> Result<()> {
        let mut errors: Vec<String> = Vec::new();

        if self.server.port == 0 {
            errors.push("PORT must be between 1 and 65535".to_string());
        }
        if self.server.workers == 0 {
            errors.push("WORKERS must be positive".to_string());
        }
        if self.scrape.max_concurrency == 0 {
            errors.push("MAX_CONCURRENCY must be positive".to_string());
        }
        if self.scrape.max_timeout_ms == 0 {
            errors.push("MAX_TIMEOUT_MS must be positive".to_string());
        }
        if self.scrape.max_timeout_ms > MAX_TIMEOUT_CEILING_MS {
            errors.push(format!(
                "MAX_TIMEOUT_MS must be <= {MAX_TIMEOUT_CEILING_MS}"
            ));
        }
        if self.browser.max_requests == 0 {
            errors.push("BROWSER_MAX_REQUESTS must be positive".to_string());
        }
        if self.cache.max_items == 0 {
            errors.push("CACHE_MAX_ITEMS must be positive".to_string());
        }
        if self.cache.ttl_ms == 0 {
            errors.push("CACHE_TTL_MS must be positive".to_string());
        }
        if self.search.timeout_ms == 0 {
            errors.push("SEARXNG_TIMEOUT_MS must be positive".to_string());
        }
        if let Some(url) = &self.search.searxng_url {
            if url::Url::parse(url).is_err() {
                errors.push(format!("SEARXNG_URL is not a valid URL: {url}"));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            anyhow::bail!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            );
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn env_csv(name: &str) -> Vec<String> {
    std::env::var(name)
        .ok()
        .map(|v| {
            v.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn env_bool(name: &str, default: bool) -> bool {
    std::env::var(name)
        .ok()
        .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> Config {
        Config::default()
    }

    #[test]
    fn test_default_config_passes_validation() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_port() {
        let mut cfg = valid_config();
        cfg.server.port = 0;
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("PORT"));
    }

    #[test]
    fn test_validate_rejects_zero_concurrency() {
        let mut cfg = valid_config();
        cfg.scrape.max_concurrency = 0;
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("MAX_CONCURRENCY"));
    }

    #[test]
    fn test_validate_rejects_timeout_over_ceiling() {
        let mut cfg = valid_config();
        cfg.scrape.max_timeout_ms = 120_000;
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("MAX_TIMEOUT_MS"));
    }

    #[test]
    fn test_validate_rejects_bad_searxng_url() {
        let mut cfg = valid_config();
        cfg.search.searxng_url = Some("not a url".to_string());
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("SEARXNG_URL"));
    }

    #[test]
    fn test_validate_collects_multiple_errors() {
        let mut cfg = valid_config();
        cfg.server.port = 0;
        cfg.cache.max_items = 0;
        cfg.cache.ttl_ms = 0;
        let msg = cfg.validate().unwrap_err().to_string();
        assert!(msg.contains("PORT"));
        assert!(msg.contains("CACHE_MAX_ITEMS"));
        assert!(msg.contains("CACHE_TTL_MS"));
    }

    #[test]
    fn test_default_values() {
        let cfg = valid_config();
        assert_eq!(cfg.server.port, 3002);
        assert_eq!(cfg.scrape.max_concurrency, 5);
        assert_eq!(cfg.scrape.max_timeout_ms, 30_000);
        assert_eq!(cfg.browser.max_requests, 100);
        assert_eq!(cfg.cache.max_items, 1000);
        assert!(cfg.server.api_keys.is_empty());
        assert!(cfg.search.searxng_url.is_none());
    }

    #[test]
    fn test_max_timeout_duration() {
        assert_eq!(valid_config().max_timeout(), Duration::from_millis(30_000));
    }
}
