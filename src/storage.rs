use crate::error::Result;
use crate::types::{NormalizedEvent, NormalizedPayload};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Append-only store of normalized event versions keyed by `event_uid`.
///
/// Versions for one uid start at 1 and strictly increase; rows are never
/// rewritten.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Highest stored version for the uid, if any
    async fn latest(&self, event_uid: &str) -> Result<Option<NormalizedEvent>>;

    /// Stores `payload` as the next version for `event_uid` and returns the row.
    async fn append(
        &self,
        event_uid: &str,
        dedupe_key: &str,
        source_raw_id: &str,
        payload: &NormalizedPayload,
    ) -> Result<NormalizedEvent>;

    /// All versions for the uid, oldest first
    async fn history(&self, event_uid: &str) -> Result<Vec<NormalizedEvent>>;
}

/// In-memory store for tests and runs without a database path
#[derive(Default, Clone)]
pub struct InMemoryEventStore {
    versions: Arc<Mutex<HashMap<String, Vec<NormalizedEvent>>>>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        let versions = self.versions.lock().unwrap_or_else(|e| e.into_inner());
        versions.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn latest(&self, event_uid: &str) -> Result<Option<NormalizedEvent>> {
        let versions = self.versions.lock().unwrap_or_else(|e| e.into_inner());
        Ok(versions.get(event_uid).and_then(|rows| rows.last()).cloned())
    }

    async fn append(
        &self,
        event_uid: &str,
        dedupe_key: &str,
        source_raw_id: &str,
        payload: &NormalizedPayload,
    ) -> Result<NormalizedEvent> {
        let mut versions = self.versions.lock().unwrap_or_else(|e| e.into_inner());
        let rows = versions.entry(event_uid.to_string()).or_default();
        let version = rows.last().map(|row| row.version).unwrap_or(0) + 1;
        let row = NormalizedEvent {
            event_uid: event_uid.to_string(),
            version,
            dedupe_key: dedupe_key.to_string(),
            source_raw_id: source_raw_id.to_string(),
            normalized: payload.clone(),
            created_at: Utc::now(),
        };
        rows.push(row.clone());
        debug!(event_uid, version, "Stored event version");
        Ok(row)
    }

    async fn history(&self, event_uid: &str) -> Result<Vec<NormalizedEvent>> {
        let versions = self.versions.lock().unwrap_or_else(|e| e.into_inner());
        Ok(versions.get(event_uid).cloned().unwrap_or_default())
    }
}
