//! SQLite-backed session history and companion catalog
//!
//! Queries run on tokio's blocking pool; the connection sits behind a std
//! `Mutex` that is only locked there.

use super::model::{Companion, NewSessionRecord, SessionRecord};
use super::store::{CompanionCatalog, SessionQuery, SessionStore, StoreError};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use rusqlite::{params, params_from_iter, types::Value, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS companions (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    subject TEXT NOT NULL,
    topic TEXT NOT NULL,
    duration_minutes INTEGER,
    author TEXT,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS session_history (
    id TEXT PRIMARY KEY,
    companion_id TEXT NOT NULL,
    user_id TEXT NOT NULL,
    vapi_call_id TEXT,
    score INTEGER,
    summary TEXT,
    duration INTEGER,
    engagement_score INTEGER,
    comprehension_score INTEGER,
    participation_score INTEGER,
    insights TEXT,
    evaluated_at TEXT,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_session_history_user_created
    ON session_history (user_id, created_at DESC);
";

const SESSION_COLUMNS: &str = "id, companion_id, user_id, vapi_call_id, score, summary, duration, \
     engagement_score, comprehension_score, participation_score, insights, evaluated_at, created_at";

/// Session store over a single SQLite connection
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        info!("Opened session store at {}", path.display());
        Ok(store)
    }

    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    /// Run `f` with the connection on the blocking thread pool
    async fn with_conn<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Connection) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().map_err(|_| StoreError::Poisoned)?;
            f(&conn)
        })
        .await
        .map_err(|e| StoreError::Unavailable(format!("store task failed: {}", e)))?
    }

    fn init_schema(&self) -> Result<(), StoreError> {
        self.lock()?.execute_batch(SCHEMA)?;
        Ok(())
    }

    /// Add or replace a catalog entry
    pub fn upsert_companion(&self, companion: &Companion) -> Result<(), StoreError> {
        self.lock()?.execute(
            "INSERT OR REPLACE INTO companions
                (id, name, subject, topic, duration_minutes, author, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                companion.id,
                companion.name,
                companion.subject,
                companion.topic,
                companion.duration_minutes,
                companion.author,
                timestamp(&Utc::now()),
            ],
        )?;
        Ok(())
    }
}

/// Fixed-width UTC timestamps so lexical order equals time order
fn timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|at| at.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt(format!("bad timestamp {:?}: {}", raw, e)))
}

fn narrow<T: TryFrom<i64>>(column: &str, value: Option<i64>) -> Result<Option<T>, StoreError> {
    value
        .map(|v| T::try_from(v).map_err(|_| StoreError::Corrupt(format!("{} out of range: {}", column, v))))
        .transpose()
}

/// Column values as stored, before domain conversion
struct RawSessionRow {
    id: String,
    companion_id: String,
    user_id: String,
    vapi_call_id: Option<String>,
    score: Option<i64>,
    summary: Option<String>,
    duration: Option<i64>,
    engagement: Option<i64>,
    comprehension: Option<i64>,
    participation: Option<i64>,
    insights: Option<String>,
    evaluated_at: Option<String>,
    created_at: String,
}

impl RawSessionRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            companion_id: row.get(1)?,
            user_id: row.get(2)?,
            vapi_call_id: row.get(3)?,
            score: row.get(4)?,
            summary: row.get(5)?,
            duration: row.get(6)?,
            engagement: row.get(7)?,
            comprehension: row.get(8)?,
            participation: row.get(9)?,
            insights: row.get(10)?,
            evaluated_at: row.get(11)?,
            created_at: row.get(12)?,
        })
    }

    fn into_record(self) -> Result<SessionRecord, StoreError> {
        let insights = match self.insights {
            Some(raw) => Some(serde_json::from_str(&raw)?),
            None => None,
        };
        let evaluated_at = match self.evaluated_at {
            Some(raw) => Some(parse_timestamp(&raw)?),
            None => None,
        };

        Ok(SessionRecord {
            id: self.id,
            companion_id: self.companion_id,
            user_id: self.user_id,
            vapi_call_id: self.vapi_call_id,
            score: narrow("score", self.score)?,
            summary: self.summary,
            duration_secs: narrow("duration", self.duration)?,
            engagement: narrow("engagement_score", self.engagement)?,
            comprehension: narrow("comprehension_score", self.comprehension)?,
            participation: narrow("participation_score", self.participation)?,
            insights,
            evaluated_at,
            created_at: parse_timestamp(&self.created_at)?,
        })
    }
}

#[async_trait]
impl SessionStore for SqliteStore {
    async fn insert_session(&self, mut row: NewSessionRecord) -> Result<SessionRecord, StoreError> {
        // Stored timestamps keep microseconds
        row.evaluated_at = row.evaluated_at.map(|at| at.trunc_subsecs(6));
        let created_at = Utc::now().trunc_subsecs(6);
        let record = SessionRecord::from_new(row, uuid::Uuid::new_v4().to_string(), created_at);
        let insights = record
            .insights
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        let stored = record.clone();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO session_history
                    (id, companion_id, user_id, vapi_call_id, score, summary, duration,
                     engagement_score, comprehension_score, participation_score, insights,
                     evaluated_at, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                params![
                    stored.id,
                    stored.companion_id,
                    stored.user_id,
                    stored.vapi_call_id,
                    stored.score,
                    stored.summary,
                    stored.duration_secs,
                    stored.engagement,
                    stored.comprehension,
                    stored.participation,
                    insights,
                    stored.evaluated_at.as_ref().map(timestamp),
                    timestamp(&stored.created_at),
                ],
            )?;
            Ok(())
        })
        .await?;

        debug!("Inserted session {} into session_history", record.id);
        Ok(record)
    }

    async fn select_sessions(&self, query: &SessionQuery) -> Result<Vec<SessionRecord>, StoreError> {
        let mut sql = format!("SELECT {} FROM session_history WHERE user_id = ?", SESSION_COLUMNS);
        let mut values = vec![Value::Text(query.user_id.clone())];

        if let Some(ids) = &query.companion_ids {
            if ids.is_empty() {
                return Ok(Vec::new());
            }
            let placeholders = vec!["?"; ids.len()].join(", ");
            sql.push_str(&format!(" AND companion_id IN ({})", placeholders));
            values.extend(ids.iter().cloned().map(Value::Text));
        }

        // rowid keeps storage order among equal timestamps
        sql.push_str(" ORDER BY created_at DESC, rowid ASC");

        if let Some(limit) = query.limit {
            sql.push_str(" LIMIT ?");
            values.push(Value::Integer(i64::try_from(limit).unwrap_or(i64::MAX)));
        }

        let raw_rows = self
            .with_conn(move |conn| {
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt
                    .query_map(params_from_iter(values), RawSessionRow::from_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .await?;

        raw_rows.into_iter().map(RawSessionRow::into_record).collect()
    }
}

fn companion_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Companion> {
    Ok(Companion {
        id: row.get(0)?,
        name: row.get(1)?,
        subject: row.get(2)?,
        topic: row.get(3)?,
        duration_minutes: row.get(4)?,
        author: row.get(5)?,
    })
}

#[async_trait]
impl CompanionCatalog for SqliteStore {
    async fn list_companions(&self, limit: usize) -> Result<Vec<Companion>, StoreError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, name, subject, topic, duration_minutes, author
                 FROM companions ORDER BY created_at, rowid LIMIT ?1",
            )?;
            let companions = stmt
                .query_map(params![limit], companion_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(companions)
        })
        .await
    }

    async fn get_companion(&self, id: &str) -> Result<Option<Companion>, StoreError> {
        let id = id.to_string();
        self.with_conn(move |conn| {
            let companion = conn
                .query_row(
                    "SELECT id, name, subject, topic, duration_minutes, author
                     FROM companions WHERE id = ?1",
                    params![id],
                    companion_from_row,
                )
                .optional()?;
            Ok(companion)
        })
        .await
    }
}
