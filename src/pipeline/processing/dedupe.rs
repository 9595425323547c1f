use crate::constants::EVENT_UID_NAMESPACE;
use crate::error::Result;
use crate::storage::EventStore;
use crate::types::{CanonicalEvent, NormalizedEvent, NormalizedPayload};
use chrono::NaiveDate;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{debug, instrument};
use uuid::Uuid;

/// Content key identifying "the same event" across sources and runs.
///
/// SHA-256 hex over `lower(title)|YYYY-MM-DD|lower(venue)|organizer`, each
/// part trimmed; missing parts contribute an empty segment.
pub fn dedupe_key(
    title: &str,
    date: Option<NaiveDate>,
    venue: Option<&str>,
    organizer: Option<&str>,
) -> String {
    let mut s = String::new();
    s.push_str(&title.trim().to_lowercase());
    s.push('|');
    if let Some(d) = date {
        s.push_str(&d.format("%Y-%m-%d").to_string());
    }
    s.push('|');
    if let Some(v) = venue {
        s.push_str(&v.trim().to_lowercase());
    }
    s.push('|');
    if let Some(o) = organizer {
        s.push_str(o.trim());
    }

    let mut hasher = Sha256::new();
    hasher.update(s.as_bytes());
    hex::encode(hasher.finalize())
}

/// Stable identity: the source listing id when there is one, else the content key.
pub fn event_uid(source_raw_id: Option<&str>, dedupe_key: &str) -> String {
    let name = match source_raw_id.map(str::trim).filter(|id| !id.is_empty()) {
        Some(id) => format!("listing:{id}"),
        None => format!("dedupe:{dedupe_key}"),
    };
    Uuid::new_v5(&EVENT_UID_NAMESPACE, name.as_bytes()).to_string()
}

/// Projects a canonical event onto the stored schema. Run-specific fields
/// (scrape time, data source, errors) are left out so re-scrapes compare equal.
pub fn normalize(event: &CanonicalEvent) -> NormalizedPayload {
    NormalizedPayload {
        title: event.title.trim().to_string(),
        date: event.date,
        start_time: event.start_time.clone(),
        end_time: event.end_time.clone(),
        venue_name: event.venue_name.clone(),
        venue_address: event.address.clone(),
        organizer: event.promoter.clone(),
        artists: event.artists.clone(),
        genres: event.genres.clone(),
        price: event.cost.clone(),
        min_age: event.min_age.clone(),
        attendance: event.attendance,
        url: event.event_url.clone(),
        image_url: event.image_url.clone(),
        description: event.description.clone(),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum VersionOutcome {
    Inserted(NormalizedEvent),
    /// Payload matched the latest stored version
    Unchanged(u32),
}

impl VersionOutcome {
    pub fn version(&self) -> u32 {
        match self {
            VersionOutcome::Inserted(row) => row.version,
            VersionOutcome::Unchanged(version) => *version,
        }
    }
}

pub struct DedupeVersioner {
    store: Arc<dyn EventStore>,
}

impl DedupeVersioner {
    pub fn new(store: Arc<dyn EventStore>) -> Self {
        Self { store }
    }

    #[instrument(skip(self, event), fields(id = %event.id))]
    pub async fn record(&self, event: &CanonicalEvent) -> Result<VersionOutcome> {
        let payload = normalize(event);
        let key = dedupe_key(
            &payload.title,
            payload.date,
            payload.venue_name.as_deref(),
            payload.organizer.as_deref(),
        );
        let source_id = Some(event.id.as_str()).filter(|id| !id.trim().is_empty());
        let uid = event_uid(source_id, &key);

        if let Some(latest) = self.store.latest(&uid).await? {
            if latest.normalized == payload {
                debug!(event_uid = %uid, version = latest.version, "Event unchanged");
                return Ok(VersionOutcome::Unchanged(latest.version));
            }
        }

        let row = self
            .store
            .append(&uid, &key, source_id.unwrap_or_default(), &payload)
            .await?;
        debug!(event_uid = %uid, version = row.version, "Event version written");
        Ok(VersionOutcome::Inserted(row))
    }
}
