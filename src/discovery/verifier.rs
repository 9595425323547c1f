use crate::app::ports::{ListingClient, ListingQuery};
use crate::metrics::ScraperMetrics;
use crate::types::{AreaCodeCandidate, DateWindow, ListingPage};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// The area chosen for a run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AreaSelection {
    pub area_id: u32,
    /// false when no candidate produced listings and this is the first-candidate fallback
    pub verified: bool,
    /// Advisory: a returned venue or title mentioned one of the region keywords
    pub location_match: bool,
    pub probe_results: u32,
    /// Given by the operator instead of discovered; never probed
    pub supplied: bool,
}

pub struct CandidateVerifier {
    client: Arc<dyn ListingClient>,
    probe_page_size: u32,
    probe_delay: Duration,
    region_keywords: Vec<String>,
}

impl CandidateVerifier {
    pub fn new(client: Arc<dyn ListingClient>, probe_page_size: u32, probe_delay: Duration) -> Self {
        Self {
            client,
            probe_page_size,
            probe_delay,
            region_keywords: Vec::new(),
        }
    }

    pub fn with_region_keywords(mut self, keywords: Vec<String>) -> Self {
        self.region_keywords = keywords.into_iter().map(|k| k.to_lowercase()).collect();
        self
    }

    /// Probes candidates in collection order and returns the first one with listings.
    #[instrument(skip(self, candidates), fields(candidates = candidates.len()))]
    pub async fn verify(
        &self,
        candidates: &[AreaCodeCandidate],
        reference_url: &str,
        window: DateWindow,
    ) -> Option<AreaSelection> {
        let first = candidates.first()?;

        for (i, candidate) in candidates.iter().enumerate() {
            if i > 0 && !self.probe_delay.is_zero() {
                tokio::time::sleep(self.probe_delay).await;
            }

            let query = ListingQuery {
                area_id: candidate.area_id,
                window,
                page: 1,
                page_size: self.probe_page_size,
                reference_url: Some(reference_url.to_string()),
            };

            match self.client.fetch_page(&query).await {
                Ok(Some(page)) if !page.entries.is_empty() => {
                    let location_match = self.matches_region(&page);
                    ScraperMetrics::probe(true);
                    info!(
                        area_id = candidate.area_id,
                        source = ?candidate.source,
                        results = page.entries.len(),
                        location_match,
                        "Area candidate verified"
                    );
                    return Some(AreaSelection {
                        area_id: candidate.area_id,
                        verified: true,
                        location_match,
                        probe_results: page.entries.len() as u32,
                        supplied: false,
                    });
                }
                Ok(_) => {
                    ScraperMetrics::probe(false);
                    debug!(area_id = candidate.area_id, "Probe returned no listings");
                }
                Err(e) => {
                    ScraperMetrics::probe(false);
                    warn!(area_id = candidate.area_id, "Probe failed: {}", e);
                }
            }
        }

        warn!(
            area_id = first.area_id,
            "No candidate returned listings; falling back to the first candidate"
        );
        Some(AreaSelection {
            area_id: first.area_id,
            verified: false,
            location_match: false,
            probe_results: 0,
            supplied: false,
        })
    }

    fn matches_region(&self, page: &ListingPage) -> bool {
        if self.region_keywords.is_empty() {
            return false;
        }
        page.entries.iter().any(|entry| {
            let haystack = format!(
                "{} {}",
                entry.title.to_lowercase(),
                entry.venue_name.as_deref().unwrap_or_default().to_lowercase()
            );
            self.region_keywords.iter().any(|k| haystack.contains(k.as_str()))
        })
    }
}
