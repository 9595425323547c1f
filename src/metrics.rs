//! Pipeline metrics.
//!
//! Recorded through the `metrics` facade; without an installed recorder every
//! call is a no-op, so the embedding process decides whether they are exported.

use crate::types::DataSource;

pub struct ScraperMetrics;

impl ScraperMetrics {
    /// One area probe against the listing endpoint
    pub fn probe(accepted: bool) {
        let outcome = if accepted { "accepted" } else { "rejected" };
        ::metrics::counter!("listing_probes_total", "outcome" => outcome).increment(1);
    }

    pub fn page_fetched(entries: usize) {
        ::metrics::counter!("listing_pages_total").increment(1);
        ::metrics::histogram!("listing_page_entries").record(entries as f64);
    }

    pub fn page_failed() {
        ::metrics::counter!("listing_page_errors_total").increment(1);
    }

    pub fn detail_result(source: DataSource) {
        ::metrics::counter!("listing_detail_results_total", "source" => source.as_str()).increment(1);
    }

    pub fn versions_written(inserted: usize, unchanged: usize) {
        ::metrics::counter!("listing_versions_inserted_total").increment(inserted as u64);
        ::metrics::counter!("listing_versions_unchanged_total").increment(unchanged as u64);
    }

    pub fn pipeline_duration(duration_secs: f64) {
        ::metrics::histogram!("listing_pipeline_duration_seconds").record(duration_secs);
    }
}
