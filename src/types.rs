use crate::error::{Result, ScraperError};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Where an area candidate was spotted on the rendered listing page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateSource {
    InterceptedRequest,
    EmbeddedState,
    InlineScript,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AreaCodeCandidate {
    pub area_id: u32,
    pub source: CandidateSource,
}

/// Inclusive listing-date window, sent to the endpoint as ISO dates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateWindow {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self> {
        if end < start {
            return Err(ScraperError::Config(format!(
                "date window ends ({end}) before it starts ({start})"
            )));
        }
        Ok(Self { start, end })
    }

    pub fn parse(start: &str, end: &str) -> Result<Self> {
        let parse = |s: &str| {
            NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
                .map_err(|e| ScraperError::Config(format!("invalid ISO date '{s}': {e}")))
        };
        Self::new(parse(start)?, parse(end)?)
    }

    pub fn start_iso(&self) -> String {
        self.start.format("%Y-%m-%d").to_string()
    }

    pub fn end_iso(&self) -> String {
        self.end.format("%Y-%m-%d").to_string()
    }
}

impl fmt::Display for DateWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start_iso(), self.end_iso())
    }
}

/// One entry of the bulk listing endpoint
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ListingRecord {
    pub id: String,
    pub title: String,
    pub date: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub venue_name: Option<String>,
    pub venue_id: Option<String>,
    pub artists: Vec<String>,
    /// Raw attendance as the site renders it, e.g. "350" or "2K"
    pub attending: Option<String>,
    pub content_url: Option<String>,
    pub is_ticketed: bool,
    pub image_url: Option<String>,
    /// `totalResults` of the page this entry arrived on
    pub total_results: u32,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListingPage {
    pub entries: Vec<ListingRecord>,
    pub total_results: u32,
}

/// Fields recovered from a detail page's linear text. Any of them may be missing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DetailRecord {
    pub title: Option<String>,
    pub venue: Option<String>,
    pub address: Option<String>,
    pub date: Option<String>,
    pub time: Option<String>,
    pub promoter: Option<String>,
    pub interested: Option<u64>,
    pub artists: Vec<String>,
    pub genres: Vec<String>,
    pub description: Option<String>,
    pub cost: Option<String>,
    pub min_age: Option<String>,
    pub admin: Option<String>,
}

/// What happened when the detail page was requested
#[derive(Debug, Clone, PartialEq)]
pub enum DetailOutcome {
    Extracted(DetailRecord),
    Skipped,
    Failed(String),
}

/// Provenance of a canonical event's fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSource {
    BulkOnly,
    DetailMerged,
    ErrorFallback,
}

impl DataSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataSource::BulkOnly => "bulk_only",
            DataSource::DetailMerged => "detail_merged",
            DataSource::ErrorFallback => "error_fallback",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalEvent {
    pub id: String,
    pub title: String,
    pub date: Option<NaiveDate>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub venue_name: Option<String>,
    pub venue_id: Option<String>,
    pub address: Option<String>,
    pub promoter: Option<String>,
    pub artists: Vec<String>,
    pub genres: Vec<String>,
    pub attendance: Option<u64>,
    pub cost: Option<String>,
    pub min_age: Option<String>,
    pub admin: Option<String>,
    pub description: Option<String>,
    pub event_url: Option<String>,
    pub image_url: Option<String>,
    pub is_ticketed: bool,
    pub data_source: DataSource,
    pub error: Option<String>,
    pub scraped_at: DateTime<Utc>,
}

/// Canonical schema stored in the versioned event store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedPayload {
    pub title: String,
    pub date: Option<NaiveDate>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub venue_name: Option<String>,
    pub venue_address: Option<String>,
    pub organizer: Option<String>,
    pub artists: Vec<String>,
    pub genres: Vec<String>,
    pub price: Option<String>,
    pub min_age: Option<String>,
    pub attendance: Option<u64>,
    pub url: Option<String>,
    pub image_url: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedEvent {
    pub event_uid: String,
    pub version: u32,
    pub dedupe_key: String,
    pub source_raw_id: String,
    pub normalized: NormalizedPayload,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn date_window_rejects_reversed_range() {
        assert!(DateWindow::parse("2025-10-31", "2025-10-01").is_err());
        let window = DateWindow::parse("2025-10-01", "2025-10-31").unwrap();
        assert_eq!(window.to_string(), "2025-10-01..2025-10-31");
    }

    #[test]
    fn data_source_serializes_snake_case() {
        let json = serde_json::to_string(&DataSource::ErrorFallback).unwrap();
        assert_eq!(json, "\"error_fallback\"");
        assert_eq!(DataSource::DetailMerged.as_str(), "detail_merged");
    }
}
