//! Session persistence and enrichment
//!
//! This module provides:
//! - The session history and companion catalog seams (`SessionStore`, `CompanionCatalog`)
//! - In-memory and SQLite backends
//! - `SessionWriter`, which saves a finished session with one minimal-row fallback
//! - Enrichment of companions with the user's latest session outcome

mod enrich;
mod identity;
mod model;
mod sqlite;
mod store;
mod writer;

pub use enrich::{enrich, latest_by_companion, recent_sessions};
pub use identity::{FixedIdentity, IdentityProvider};
pub use model::{Companion, CompanionSessionSummary, NewSessionRecord, SessionRecord};
pub use sqlite::SqliteStore;
pub use store::{CompanionCatalog, MemoryStore, SessionQuery, SessionStore, StoreError};
pub use writer::{InsertPolicy, PersistenceError, SessionWriter};
