use anyhow::{bail, Context};
use chrono::{Duration, Utc};
use clap::{Args, Parser, Subcommand};
use listing_scraper::apis::EventListingsClient;
use listing_scraper::app::ports::PageRenderer;
use listing_scraper::config::Config;
use listing_scraper::infra::{CapturedPage, HtmlPageRenderer, SqliteEventStore};
use listing_scraper::logging;
use listing_scraper::pipeline::{Pipeline, RunRequest};
use listing_scraper::types::DateWindow;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "listing_scraper")]
#[command(about = "Event listing extractor: area discovery, bulk listings and detail pages")]
#[command(version = "0.1.0")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone)]
struct WindowArgs {
    /// First listing date (YYYY-MM-DD), defaults to today
    #[arg(long)]
    start: Option<String>,
    /// Last listing date (YYYY-MM-DD), defaults to start + 30 days
    #[arg(long)]
    end: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Find and verify the area id behind a listing page
    Discover {
        #[arg(long, required_unless_present = "capture")]
        page_url: Option<String>,
        /// Capture file written by an external browser
        #[arg(long)]
        capture: Option<PathBuf>,
        #[command(flatten)]
        window: WindowArgs,
    },
    /// Fetch bulk listings for a known area and print them as JSON
    Fetch {
        #[arg(long)]
        area: u32,
        #[command(flatten)]
        window: WindowArgs,
    },
    /// Discover, fetch, enrich from detail pages, version and write output
    Run {
        #[arg(long)]
        page_url: Option<String>,
        #[arg(long)]
        capture: Option<PathBuf>,
        /// Skip discovery and use this area id
        #[arg(long)]
        area: Option<u32>,
        #[command(flatten)]
        window: WindowArgs,
        /// Listing entries only, no detail pages
        #[arg(long)]
        skip_details: bool,
    },
}

impl WindowArgs {
    fn resolve(&self) -> anyhow::Result<DateWindow> {
        let start = match &self.start {
            Some(s) => s.clone(),
            None => Utc::now().date_naive().format("%Y-%m-%d").to_string(),
        };
        let window = match &self.end {
            Some(end) => DateWindow::parse(&start, end)?,
            None => {
                let first = DateWindow::parse(&start, &start)?.start;
                DateWindow::new(first, first + Duration::days(30))?
            }
        };
        Ok(window)
    }
}

fn build_renderer(config: &Config, capture: Option<&PathBuf>) -> anyhow::Result<(Arc<dyn PageRenderer>, Option<String>)> {
    let html: Arc<dyn PageRenderer> = Arc::new(HtmlPageRenderer::new(&config.source)?);
    match capture {
        Some(path) => {
            let captured = CapturedPage::from_file(path)
                .with_context(|| format!("reading capture {}", path.display()))?
                .with_fallback(html);
            let page_url = Some(captured.page_url().to_string()).filter(|u| !u.is_empty());
            Ok((Arc::new(captured), page_url))
        }
        None => Ok((html, None)),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _log_guard = logging::init_logging();
    let cli = Cli::parse();
    let mut config = Config::load()?;

    let client = Arc::new(EventListingsClient::new(&config.source)?);

    match cli.command {
        Commands::Discover { page_url, capture, window } => {
            let window = window.resolve()?;
            let (renderer, captured_url) = build_renderer(&config, capture.as_ref())?;
            let Some(page_url) = page_url.or(captured_url) else {
                bail!("--page-url is required when the capture has no url");
            };
            let pipeline = Pipeline::new(config, renderer, client);
            let selection = pipeline.discover_area(&page_url, window).await?;
            println!("Area {} for {}", selection.area_id, page_url);
            println!("   Verified: {}", selection.verified);
            println!("   Location match: {}", selection.location_match);
            println!("   Probe results: {}", selection.probe_results);
        }
        Commands::Fetch { area, window } => {
            let window = window.resolve()?;
            let (renderer, _) = build_renderer(&config, None)?;
            let pipeline = Pipeline::new(config, renderer, client);
            let report = pipeline.fetch_listings(area, window, None).await;
            if !report.failed_pages.is_empty() {
                warn!("Pages failed: {:?}", report.failed_pages);
            }
            println!("{}", serde_json::to_string_pretty(&report.entries)?);
        }
        Commands::Run { page_url, capture, area, window, skip_details } => {
            let window = window.resolve()?;
            config.pipeline.skip_details |= skip_details;
            let (renderer, captured_url) = build_renderer(&config, capture.as_ref())?;
            let page_url = page_url.or(captured_url);
            if page_url.is_none() && area.is_none() {
                bail!("run needs --page-url, --capture or --area");
            }

            let store_path = config.pipeline.store_path.clone();
            let mut pipeline = Pipeline::new(config, renderer, client);
            if let Some(path) = store_path {
                pipeline = pipeline.with_store(Arc::new(SqliteEventStore::open(&path)?));
            }

            let cancel = CancellationToken::new();
            let on_signal = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("Interrupted; remaining detail pages fall back to listing data");
                    on_signal.cancel();
                }
            });

            info!("Starting run");
            let result = pipeline
                .run(RunRequest { page_url, area_override: area, window }, cancel)
                .await?;

            println!("\nRun results for area {} ({}):", result.area.area_id, result.window);
            if result.area.supplied {
                println!("   Area supplied with --area, not probed");
            }
            println!("   Total events: {}", result.total_events);
            println!("   Detail merged: {}", result.detail_merged);
            println!("   Listing only: {}", result.bulk_only);
            println!("   Fallback after error: {}", result.error_fallback);
            if !result.failed_pages.is_empty() {
                println!("   Failed pages: {:?}", result.failed_pages);
            }
            println!(
                "   Versions: {} new, {} unchanged",
                result.versions_inserted, result.versions_unchanged
            );
            println!("   Output file: {}", result.output_file);
        }
    }

    Ok(())
}
