// Extraction pipeline: discovery, bulk listings, detail enrichment, versioning

pub mod ingestion;
pub mod processing;

use crate::app::ports::{ListingClient, PageRenderer};
use crate::config::Config;
use crate::discovery::{collect_candidates, AreaSelection, CandidateVerifier};
use crate::error::{Result, ScraperError};
use crate::metrics::ScraperMetrics;
use crate::parser::DetailPageExtractor;
use crate::rate_limiter::RateLimiter;
use crate::storage::EventStore;
use crate::types::{CanonicalEvent, DataSource, DateWindow, DetailOutcome, ListingRecord};
use chrono::{NaiveDate, Utc};
use ingestion::{BulkListingFetcher, FetchReport};
use processing::{DedupeVersioner, RecordReconciler, VersionOutcome};
use serde::Serialize;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// What to run: a listing page to discover the area from, or a known area.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub page_url: Option<String>,
    pub area_override: Option<u32>,
    pub window: DateWindow,
}

/// Result of a complete pipeline run
#[derive(Debug, Serialize)]
pub struct PipelineResult {
    pub area: AreaSelection,
    pub window: DateWindow,
    pub total_events: usize,
    pub detail_merged: usize,
    pub bulk_only: usize,
    pub error_fallback: usize,
    pub failed_pages: Vec<u32>,
    pub versions_inserted: usize,
    pub versions_unchanged: usize,
    pub output_file: String,
    #[serde(skip)]
    pub events: Vec<CanonicalEvent>,
}

pub struct Pipeline {
    config: Config,
    renderer: Arc<dyn PageRenderer>,
    client: Arc<dyn ListingClient>,
    store: Option<Arc<dyn EventStore>>,
    today: NaiveDate,
}

impl Pipeline {
    pub fn new(config: Config, renderer: Arc<dyn PageRenderer>, client: Arc<dyn ListingClient>) -> Self {
        Self {
            config,
            renderer,
            client,
            store: None,
            today: Utc::now().date_naive(),
        }
    }

    pub fn with_store(mut self, store: Arc<dyn EventStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Reference date for year-less detail dates
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = today;
        self
    }

    /// Renders the listing page, collects area candidates and probes them.
    #[instrument(skip(self, window))]
    pub async fn discover_area(&self, page_url: &str, window: DateWindow) -> Result<AreaSelection> {
        let page = self.renderer.render_listing(page_url).await?;
        let candidates = collect_candidates(&page);
        info!("Collected {} area candidates from {}", candidates.len(), page_url);
        if candidates.is_empty() {
            return Err(ScraperError::NoAreaCandidates {
                page_url: page_url.to_string(),
            });
        }

        let source = &self.config.source;
        let verifier = CandidateVerifier::new(self.client.clone(), source.probe_page_size, source.probe_delay())
            .with_region_keywords(source.region_keywords.clone());
        let selection = verifier
            .verify(&candidates, page_url, window)
            .await
            .ok_or_else(|| ScraperError::NoAreaCandidates {
                page_url: page_url.to_string(),
            })?;

        if !selection.verified && !self.config.pipeline.allow_unverified_area {
            return Err(ScraperError::AreaUnverified {
                area_id: selection.area_id,
            });
        }
        Ok(selection)
    }

    pub async fn fetch_listings(&self, area_id: u32, window: DateWindow, reference_url: Option<&str>) -> FetchReport {
        let mut fetcher = BulkListingFetcher::new(self.client.clone(), self.config.source.page_delay());
        if let Some(url) = reference_url {
            fetcher = fetcher.with_reference_url(url);
        }
        fetcher
            .fetch_report(area_id, window, self.config.source.page_size)
            .await
    }

    /// Fetches and extracts detail pages on a bounded worker pool and merges
    /// each with its listing entry. Output keeps listing order; no listing is
    /// ever dropped.
    #[instrument(skip(self, listings, cancel), fields(listings = listings.len()))]
    pub async fn enrich(&self, listings: &[ListingRecord], cancel: CancellationToken) -> Vec<CanonicalEvent> {
        let reconciler = Arc::new(RecordReconciler::new(self.today).with_base_url(self.config.source.base_url.clone()));
        let extractor = Arc::new(DetailPageExtractor::default());
        let limiter = RateLimiter::new(self.config.pipeline.requests_per_min);
        let semaphore = Arc::new(Semaphore::new(self.config.pipeline.workers.max(1)));
        let item_timeout = self.config.pipeline.item_timeout();
        let skip_details = self.config.pipeline.skip_details;

        let mut tasks = JoinSet::new();
        for (index, listing) in listings.iter().cloned().enumerate() {
            let detail_url = listing
                .content_url
                .as_deref()
                .filter(|_| !skip_details)
                .map(|u| self.config.source.absolute_url(u));
            let renderer = self.renderer.clone();
            let extractor = extractor.clone();
            let reconciler = reconciler.clone();
            let limiter = limiter.clone();
            let semaphore = semaphore.clone();
            let cancel = cancel.clone();

            tasks.spawn(async move {
                let outcome = match detail_url {
                    None => DetailOutcome::Skipped,
                    Some(url) => {
                        tokio::select! {
                            biased;
                            _ = cancel.cancelled() => DetailOutcome::Failed("cancelled".to_string()),
                            outcome = async {
                                let Ok(_permit) = semaphore.acquire_owned().await else {
                                    return DetailOutcome::Failed("worker pool closed".to_string());
                                };
                                fetch_detail(renderer.as_ref(), &extractor, &limiter, &url, item_timeout).await
                            } => outcome,
                        }
                    }
                };
                (index, reconciler.reconcile(&listing, outcome))
            });
        }

        let mut slots: Vec<Option<CanonicalEvent>> = vec![None; listings.len()];
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, event)) => slots[index] = Some(event),
                Err(e) => warn!("Detail worker task failed: {}", e),
            }
        }

        let events: Vec<CanonicalEvent> = slots
            .into_iter()
            .zip(listings)
            .map(|(slot, listing)| {
                slot.unwrap_or_else(|| {
                    reconciler.reconcile(listing, DetailOutcome::Failed("worker task failed".to_string()))
                })
            })
            .collect();
        for event in &events {
            ScraperMetrics::detail_result(event.data_source);
        }
        events
    }

    /// Discover (or take) the area, fetch listings, enrich, version, write output.
    #[instrument(skip(self, request, cancel), fields(window = %request.window))]
    pub async fn run(&self, request: RunRequest, cancel: CancellationToken) -> Result<PipelineResult> {
        let started = Instant::now();
        let window = request.window;

        let area = match (request.area_override, request.page_url.as_deref()) {
            (Some(area_id), _) => AreaSelection {
                area_id,
                verified: false,
                location_match: false,
                probe_results: 0,
                supplied: true,
            },
            (None, Some(page_url)) => self.discover_area(page_url, window).await?,
            (None, None) => {
                return Err(ScraperError::Config(
                    "either a listing page URL or an area id is required".to_string(),
                ))
            }
        };
        info!(area_id = area.area_id, verified = area.verified, supplied = area.supplied, "Using area");

        let report = self
            .fetch_listings(area.area_id, window, request.page_url.as_deref())
            .await;
        info!("Fetched {} listing entries", report.entries.len());

        let events = self.enrich(&report.entries, cancel).await;
        let count = |source: DataSource| events.iter().filter(|e| e.data_source == source).count();
        let (detail_merged, bulk_only, error_fallback) = (
            count(DataSource::DetailMerged),
            count(DataSource::BulkOnly),
            count(DataSource::ErrorFallback),
        );

        let (versions_inserted, versions_unchanged) = match &self.store {
            Some(store) => self.record_versions(store.clone(), &events).await,
            None => (0, 0),
        };

        let output_file = persist_to_json(&events, area.area_id, window, &self.config.pipeline.output_dir)?;
        info!("Saved {} events to {}", events.len(), output_file);

        ScraperMetrics::pipeline_duration(started.elapsed().as_secs_f64());
        Ok(PipelineResult {
            area,
            window,
            total_events: events.len(),
            detail_merged,
            bulk_only,
            error_fallback,
            failed_pages: report.failed_pages,
            versions_inserted,
            versions_unchanged,
            output_file,
            events,
        })
    }

    async fn record_versions(&self, store: Arc<dyn EventStore>, events: &[CanonicalEvent]) -> (usize, usize) {
        let versioner = DedupeVersioner::new(store);
        let (mut inserted, mut unchanged) = (0, 0);
        for event in events {
            match versioner.record(event).await {
                Ok(VersionOutcome::Inserted(_)) => inserted += 1,
                Ok(VersionOutcome::Unchanged(_)) => unchanged += 1,
                Err(e) => warn!(id = %event.id, "Failed to version event: {}", e),
            }
        }
        ScraperMetrics::versions_written(inserted, unchanged);
        info!(inserted, unchanged, "Recorded event versions");
        (inserted, unchanged)
    }
}

async fn fetch_detail(
    renderer: &dyn PageRenderer,
    extractor: &DetailPageExtractor,
    limiter: &RateLimiter,
    url: &str,
    item_timeout: Duration,
) -> DetailOutcome {
    limiter.acquire().await;
    match tokio::time::timeout(item_timeout, renderer.render_detail_lines(url)).await {
        Ok(Ok(lines)) => {
            debug!(url, lines = lines.len(), "Rendered detail page");
            DetailOutcome::Extracted(extractor.extract(&lines))
        }
        Ok(Err(e)) => {
            warn!(url, "Detail page failed: {}", e);
            DetailOutcome::Failed(e.to_string())
        }
        Err(_) => {
            warn!(url, "Detail page timed out");
            DetailOutcome::Failed(format!("detail page timed out after {}s", item_timeout.as_secs()))
        }
    }
}

/// Writes events as a pretty JSON array and returns the file path.
pub fn persist_to_json(events: &[CanonicalEvent], area_id: u32, window: DateWindow, output_dir: &str) -> Result<String> {
    fs::create_dir_all(output_dir)?;

    let timestamp = Utc::now().format("%Y%m%d_%H%M%S");
    let filename = format!(
        "events_{}_{}_{}_{}.json",
        area_id,
        window.start_iso(),
        window.end_iso(),
        timestamp
    );
    let filepath = Path::new(output_dir).join(&filename);

    let json_content = serde_json::to_string_pretty(events)?;
    fs::write(&filepath, json_content)?;

    Ok(filepath.to_string_lossy().to_string())
}
