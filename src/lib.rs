pub mod config;
pub mod conversation;
pub mod evaluation;
pub mod http;
pub mod persistence;
pub mod session;
pub mod voice;

pub use config::Config;
pub use conversation::{analyze, ConversationAnalysis, ConversationMessage, Role};
pub use evaluation::{
    CompanionProfile, EvaluationMetrics, EvaluationSource, Evaluator, HttpMetricsSource,
    MetricsSource, NoMetrics, SessionEvaluation,
};
pub use http::{create_router, AppState};
pub use persistence::{
    enrich, recent_sessions, Companion, CompanionCatalog, CompanionSessionSummary, MemoryStore,
    SessionRecord, SessionStore, SessionWriter, SqliteStore,
};
pub use session::{CallStatus, SessionController, SessionSnapshot};
pub use voice::{NatsVoiceTransport, VoiceTransport};
