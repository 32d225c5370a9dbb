use super::identity::IdentityProvider;
use super::model::{NewSessionRecord, SessionRecord};
use super::store::{SessionStore, StoreError};
use crate::evaluation::SessionEvaluation;
use chrono::Utc;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Both the full insert and its fallback failed; the session was not saved
#[derive(Debug, thiserror::Error)]
#[error("failed to save session for companion {companion_id}: {fallback} (first attempt: {primary})")]
pub struct PersistenceError {
    pub companion_id: String,
    pub primary: StoreError,
    #[source]
    pub fallback: StoreError,
}

/// One retry with a transformed payload after a failed insert
#[derive(Debug, Clone, Copy)]
pub struct InsertPolicy {
    fallback: fn(&NewSessionRecord) -> NewSessionRecord,
}

impl InsertPolicy {
    pub fn with_fallback(fallback: fn(&NewSessionRecord) -> NewSessionRecord) -> Self {
        Self { fallback }
    }

    /// Insert `row`; on failure insert the fallback payload exactly once
    pub async fn insert(
        &self,
        store: &dyn SessionStore,
        row: NewSessionRecord,
    ) -> Result<SessionRecord, PersistenceError> {
        let fallback_row = (self.fallback)(&row);
        let companion_id = row.companion_id.clone();

        let primary = match store.insert_session(row).await {
            Ok(record) => return Ok(record),
            Err(e) => e,
        };

        error!(
            "Error inserting session for companion {}: {}; retrying with minimal row",
            companion_id, primary
        );

        match store.insert_session(fallback_row).await {
            Ok(record) => {
                warn!(
                    "Saved minimal session {} for companion {} without evaluation",
                    record.id, companion_id
                );
                Ok(record)
            }
            Err(fallback) => {
                error!("Fallback insert also failed for companion {}: {}", companion_id, fallback);
                Err(PersistenceError {
                    companion_id,
                    primary,
                    fallback,
                })
            }
        }
    }
}

impl Default for InsertPolicy {
    fn default() -> Self {
        Self::with_fallback(NewSessionRecord::stripped)
    }
}

/// Writes finished sessions to the session history table
#[derive(Clone)]
pub struct SessionWriter {
    store: Arc<dyn SessionStore>,
    identity: Arc<dyn IdentityProvider>,
    policy: InsertPolicy,
}

impl SessionWriter {
    pub fn new(store: Arc<dyn SessionStore>, identity: Arc<dyn IdentityProvider>) -> Self {
        Self {
            store,
            identity,
            policy: InsertPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: InsertPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Persist a finished session.
    ///
    /// Returns `Ok(None)` without writing when no user is signed in.
    pub async fn persist(
        &self,
        companion_id: &str,
        call_id: Option<&str>,
        evaluation: Option<&SessionEvaluation>,
    ) -> Result<Option<SessionRecord>, PersistenceError> {
        let Some(user_id) = self.identity.current_user().await else {
            info!(
                "No user signed in, skipping session save (companion={}, call={:?}, evaluated={})",
                companion_id,
                call_id,
                evaluation.is_some()
            );
            return Ok(None);
        };

        let mut row = NewSessionRecord::minimal(companion_id, user_id).with_call_id(call_id);
        if let Some(evaluation) = evaluation {
            row = row.with_evaluation(evaluation, Utc::now());
        }

        let record = self.policy.insert(self.store.as_ref(), row).await?;
        info!(
            "Session history saved (id={}, companion={}, score={:?})",
            record.id, record.companion_id, record.score
        );

        Ok(Some(record))
    }
}
