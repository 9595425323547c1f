use crate::error::{Result, ScraperError};
use crate::storage::EventStore;
use crate::types::{NormalizedEvent, NormalizedPayload};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, info};

/// SQLite-backed `EventStore`.
///
/// Version assignment runs inside a transaction so `(event_uid, version)`
/// stays unique even with several writers sharing the file.
pub struct SqliteEventStore {
    conn: Mutex<Connection>,
}

type RawRow = (String, u32, String, String, String, String);

impl SqliteEventStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        let store = Self::init(conn)?;
        info!("Opened event store at {}", path.display());
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;
            CREATE TABLE IF NOT EXISTS event_versions (
                event_uid        TEXT NOT NULL,
                version          INTEGER NOT NULL,
                normalized_json  TEXT NOT NULL,
                dedupe_key       TEXT NOT NULL,
                source_raw_id    TEXT NOT NULL,
                created_at       TEXT NOT NULL,
                PRIMARY KEY (event_uid, version)
            );
            CREATE INDEX IF NOT EXISTS idx_event_versions_dedupe ON event_versions (dedupe_key);
            "#,
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn select(&self, sql: &str, event_uid: &str) -> Result<Vec<NormalizedEvent>> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt
            .query_map(params![event_uid], |row| {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                    row.get(5)?,
                ))
            })?
            .collect::<std::result::Result<Vec<RawRow>, _>>()?;
        rows.into_iter().map(decode_row).collect()
    }

    fn insert_next(
        &self,
        event_uid: &str,
        dedupe_key: &str,
        source_raw_id: &str,
        payload: &NormalizedPayload,
    ) -> Result<NormalizedEvent> {
        let normalized_json = serde_json::to_string(payload)?;
        let created_at = Utc::now();

        let mut conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        let tx = conn.transaction()?;
        let latest: u32 = tx.query_row(
            "SELECT COALESCE(MAX(version), 0) FROM event_versions WHERE event_uid = ?1",
            params![event_uid],
            |row| row.get(0),
        )?;
        let version = latest + 1;
        tx.execute(
            "INSERT INTO event_versions (event_uid, version, normalized_json, dedupe_key, source_raw_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                event_uid,
                version,
                normalized_json,
                dedupe_key,
                source_raw_id,
                created_at.to_rfc3339()
            ],
        )?;
        tx.commit()?;
        debug!(event_uid, version, "Stored event version");

        Ok(NormalizedEvent {
            event_uid: event_uid.to_string(),
            version,
            dedupe_key: dedupe_key.to_string(),
            source_raw_id: source_raw_id.to_string(),
            normalized: payload.clone(),
            created_at,
        })
    }
}

fn decode_row(row: RawRow) -> Result<NormalizedEvent> {
    let (event_uid, version, normalized_json, dedupe_key, source_raw_id, created_at) = row;
    let created_at = DateTime::parse_from_rfc3339(&created_at)
        .map_err(|e| ScraperError::Config(format!("bad created_at for {event_uid} v{version}: {e}")))?
        .with_timezone(&Utc);
    Ok(NormalizedEvent {
        normalized: serde_json::from_str(&normalized_json)?,
        event_uid,
        version,
        dedupe_key,
        source_raw_id,
        created_at,
    })
}

#[async_trait]
impl EventStore for SqliteEventStore {
    async fn latest(&self, event_uid: &str) -> Result<Option<NormalizedEvent>> {
        let mut rows = self.select(
            "SELECT event_uid, version, normalized_json, dedupe_key, source_raw_id, created_at
             FROM event_versions WHERE event_uid = ?1 ORDER BY version DESC LIMIT 1",
            event_uid,
        )?;
        Ok(rows.pop())
    }

    async fn append(
        &self,
        event_uid: &str,
        dedupe_key: &str,
        source_raw_id: &str,
        payload: &NormalizedPayload,
    ) -> Result<NormalizedEvent> {
        self.insert_next(event_uid, dedupe_key, source_raw_id, payload)
    }

    async fn history(&self, event_uid: &str) -> Result<Vec<NormalizedEvent>> {
        self.select(
            "SELECT event_uid, version, normalized_json, dedupe_key, source_raw_id, created_at
             FROM event_versions WHERE event_uid = ?1 ORDER BY version ASC",
            event_uid,
        )
    }
}
