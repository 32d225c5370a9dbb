use super::model::{Companion, NewSessionRecord, SessionRecord};
use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use tracing::debug;

/// Storage backend failure
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("corrupt row: {0}")]
    Corrupt(String),

    #[error("store connection lock poisoned")]
    Poisoned,

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Filter for session history reads. Results are ordered by `created_at`, newest first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionQuery {
    pub user_id: String,

    /// Restrict to these companions (`None` = all)
    pub companion_ids: Option<Vec<String>>,

    pub limit: Option<usize>,
}

impl SessionQuery {
    pub fn for_user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            companion_ids: None,
            limit: None,
        }
    }

    pub fn companions(mut self, ids: Vec<String>) -> Self {
        self.companion_ids = Some(ids);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, record: &SessionRecord) -> bool {
        record.user_id == self.user_id
            && self
                .companion_ids
                .as_ref()
                .map_or(true, |ids| ids.iter().any(|id| *id == record.companion_id))
    }
}

/// Session history table
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Insert a row, assigning its id and creation time
    async fn insert_session(&self, row: NewSessionRecord) -> Result<SessionRecord, StoreError>;

    /// Select rows matching `query`, newest first
    async fn select_sessions(&self, query: &SessionQuery) -> Result<Vec<SessionRecord>, StoreError>;
}

/// Companion catalog, read-only from the session core
#[async_trait]
pub trait CompanionCatalog: Send + Sync {
    async fn list_companions(&self, limit: usize) -> Result<Vec<Companion>, StoreError>;

    async fn get_companion(&self, id: &str) -> Result<Option<Companion>, StoreError>;
}

/// Process-local store used when no database is configured
#[derive(Default)]
pub struct MemoryStore {
    sessions: RwLock<Vec<SessionRecord>>,
    companions: RwLock<Vec<Companion>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_companion(&self, companion: Companion) {
        let mut companions = self.companions.write().await;
        companions.retain(|c| c.id != companion.id);
        companions.push(companion);
    }

    /// Insert an already-built record, keeping its timestamps
    pub async fn import_session(&self, record: SessionRecord) {
        self.sessions.write().await.push(record);
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn insert_session(&self, row: NewSessionRecord) -> Result<SessionRecord, StoreError> {
        let record = SessionRecord::from_new(row, uuid::Uuid::new_v4().to_string(), Utc::now());
        debug!(
            "Inserted session {} (companion={}, evaluated={})",
            record.id,
            record.companion_id,
            record.has_evaluation()
        );
        self.sessions.write().await.push(record.clone());
        Ok(record)
    }

    async fn select_sessions(&self, query: &SessionQuery) -> Result<Vec<SessionRecord>, StoreError> {
        let sessions = self.sessions.read().await;
        let mut rows: Vec<SessionRecord> = sessions
            .iter()
            .filter(|record| query.matches(record))
            .cloned()
            .collect();

        // Stable: equal timestamps keep insertion order
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        if let Some(limit) = query.limit {
            rows.truncate(limit);
        }

        Ok(rows)
    }
}

#[async_trait]
impl CompanionCatalog for MemoryStore {
    async fn list_companions(&self, limit: usize) -> Result<Vec<Companion>, StoreError> {
        let companions = self.companions.read().await;
        Ok(companions.iter().take(limit).cloned().collect())
    }

    async fn get_companion(&self, id: &str) -> Result<Option<Companion>, StoreError> {
        let companions = self.companions.read().await;
        Ok(companions.iter().find(|c| c.id == id).cloned())
    }
}
