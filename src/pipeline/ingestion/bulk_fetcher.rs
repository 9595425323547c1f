use crate::app::ports::{ListingClient, ListingQuery};
use crate::metrics::ScraperMetrics;
use crate::types::{DateWindow, ListingRecord};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Paginated retrieval of listing summaries for one area and date window.
///
/// The server's `totalResults` is the stopping bound; a short page also stops
/// the loop so a misreported total cannot make it spin.
pub struct BulkListingFetcher {
    client: Arc<dyn ListingClient>,
    page_delay: Duration,
    reference_url: Option<String>,
}

/// Listing entries plus how many requests it took to get them
#[derive(Debug, Default)]
pub struct FetchReport {
    pub entries: Vec<ListingRecord>,
    pub pages_requested: u32,
    pub failed_pages: Vec<u32>,
    pub total_results: Option<u32>,
}

impl BulkListingFetcher {
    pub fn new(client: Arc<dyn ListingClient>, page_delay: Duration) -> Self {
        Self {
            client,
            page_delay,
            reference_url: None,
        }
    }

    pub fn with_reference_url(mut self, url: impl Into<String>) -> Self {
        self.reference_url = Some(url.into());
        self
    }

    pub async fn fetch_all(&self, area_id: u32, window: DateWindow, page_size: u32) -> Vec<ListingRecord> {
        self.fetch_report(area_id, window, page_size).await.entries
    }

    #[instrument(skip(self, window), fields(window = %window))]
    pub async fn fetch_report(&self, area_id: u32, window: DateWindow, page_size: u32) -> FetchReport {
        let page_size = page_size.max(1);
        let mut report = FetchReport::default();
        let mut page = 1u32;

        loop {
            if page > 1 && !self.page_delay.is_zero() {
                tokio::time::sleep(self.page_delay).await;
            }

            let query = ListingQuery {
                area_id,
                window,
                page,
                page_size,
                reference_url: self.reference_url.clone(),
            };
            report.pages_requested += 1;

            match self.client.fetch_page(&query).await {
                Ok(Some(listing)) => {
                    let count = listing.entries.len();
                    ScraperMetrics::page_fetched(count);
                    report.total_results.get_or_insert(listing.total_results);
                    report.entries.extend(listing.entries);
                    debug!(
                        page,
                        count,
                        cumulative = report.entries.len(),
                        total = listing.total_results,
                        "Fetched listing page"
                    );

                    if count == 0
                        || count < page_size as usize
                        || report.entries.len() >= listing.total_results as usize
                    {
                        break;
                    }
                }
                Ok(None) => {
                    debug!(page, "Listing endpoint returned no page; stopping");
                    break;
                }
                Err(e) => {
                    ScraperMetrics::page_failed();
                    warn!(page, "Listing page failed: {}", e);
                    report.failed_pages.push(page);
                    if report.total_results.is_none() {
                        break;
                    }
                }
            }

            // Hard bound: never more than ceil(total / page_size) + 1 requests
            let max_pages = report
                .total_results
                .map(|total| total.div_ceil(page_size) + 1)
                .unwrap_or(1);
            if report.pages_requested >= max_pages {
                break;
            }
            page += 1;
        }

        info!(
            area_id,
            entries = report.entries.len(),
            pages = report.pages_requested,
            failed = report.failed_pages.len(),
            "Bulk listing fetch finished"
        );
        report
    }
}
