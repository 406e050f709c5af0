//! webmark: self-hosted scrape & search API for LLM pipelines

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use webmark::browser::{BrowserPool, BrowserPoolConfig};
use webmark::config::Config;
use webmark::metrics::ServiceMetrics;
use webmark::scrape::{Format, ScrapeOptions, Scraper, ScraperConfig};
use webmark::server::HttpServer;

#[derive(Parser)]
#[command(name = "webmark")]
#[command(about = "Self-hosted scrape & search API that turns web pages into LLM-ready Markdown")]
#[command(version)]
struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP service
    Serve {
        /// Listen port (overrides PORT)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Scrape a single URL and print the result to stdout
    Scrape {
        /// Target URL
        url: String,

        /// Output format (markdown, html, links)
        #[arg(short, long, default_value = "markdown")]
        format: String,

        /// Convert the whole body instead of the detected main content
        #[arg(long)]
        full_page: bool,

        /// Request timeout in milliseconds
        #[arg(long, default_value = "30000")]
        timeout_ms: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let mut config = Config::from_env()?;

    match cli.command {
        Commands::Serve { port } => {
            if let Some(port) = port {
                config.server.port = port;
            }
            serve(config).await
        }
        Commands::Scrape {
            url,
            format,
            full_page,
            timeout_ms,
        } => scrape_once(config, url, format, full_page, timeout_ms).await,
    }
}

async fn serve(config: Config) -> Result<()> {
    info!("starting webmark v{}", env!("CARGO_PKG_VERSION"));

    let server = HttpServer::new(config)?;

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("received ctrl-c, shutting down");
            let _ = shutdown_tx.send(());
        }
    });

    server.run(shutdown_rx).await
}

/// One-shot scrape through the identical pipeline the service runs
async fn scrape_once(
    config: Config,
    url: String,
    format: String,
    full_page: bool,
    timeout_ms: u64,
) -> Result<()> {
    let requested = Format::parse(&format)
        .ok_or_else(|| anyhow::anyhow!("unknown format: {format}"))?;

    let metrics = ServiceMetrics::shared();
    let pool = BrowserPool::new(
        BrowserPoolConfig {
            max_requests: config.browser.max_requests,
            proxy_list: config.browser.proxy_list.clone(),
            executable: None,
        },
        metrics.clone(),
    );
    let scraper = Arc::new(Scraper::new(
        ScraperConfig {
            max_concurrency: config.scrape.max_concurrency,
            cache_max_items: config.cache.max_items,
            cache_ttl: Duration::from_millis(config.cache.ttl_ms),
        },
        pool.clone(),
        metrics,
    )?);

    let opts = ScrapeOptions {
        formats: vec![Format::Markdown, requested],
        only_main_content: !full_page,
        timeout: Duration::from_millis(timeout_ms.min(config.scrape.max_timeout_ms)),
    };

    let result = scraper.scrape(&url, &opts).await;
    pool.close().await;

    match result {
        Ok(data) => {
            match requested {
                Format::Html => println!("{}", data.html.unwrap_or_default()),
                Format::RawHtml => println!("{}", data.raw_html.unwrap_or_default()),
                Format::Links => {
                    for link in data.links.unwrap_or_default() {
                        println!("{link}");
                    }
                }
                Format::Markdown => println!("{}", data.markdown),
            }
            Ok(())
        }
        Err(e) => anyhow::bail!("{}: {}", e.kind(), e),
    }
}
