use crate::evaluation::{CompanionProfile, SessionEvaluation};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A configured tutor persona from the companion catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Companion {
    pub id: String,
    pub name: String,
    pub subject: String,
    pub topic: String,

    /// Intended session length in minutes
    pub duration_minutes: Option<u32>,

    /// User who created the companion
    pub author: Option<String>,
}

impl Companion {
    pub fn profile(&self) -> CompanionProfile {
        CompanionProfile {
            name: self.name.clone(),
            subject: self.subject.clone(),
            topic: self.topic.clone(),
        }
    }
}

/// A session row to be inserted.
///
/// Either *full* (carries evaluation fields) or *minimal* (companion and user only).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewSessionRecord {
    pub companion_id: String,
    pub user_id: String,
    pub vapi_call_id: Option<String>,
    pub score: Option<u8>,
    pub summary: Option<String>,
    pub duration_secs: Option<u32>,
    pub engagement: Option<u8>,
    pub comprehension: Option<u8>,
    pub participation: Option<u8>,
    pub insights: Option<Vec<String>>,
    pub evaluated_at: Option<DateTime<Utc>>,
}

impl NewSessionRecord {
    pub fn minimal(companion_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            companion_id: companion_id.into(),
            user_id: user_id.into(),
            vapi_call_id: None,
            score: None,
            summary: None,
            duration_secs: None,
            engagement: None,
            comprehension: None,
            participation: None,
            insights: None,
            evaluated_at: None,
        }
    }

    pub fn with_call_id(mut self, call_id: Option<&str>) -> Self {
        self.vapi_call_id = call_id.map(str::to_string);
        self
    }

    pub fn with_evaluation(mut self, evaluation: &SessionEvaluation, evaluated_at: DateTime<Utc>) -> Self {
        self.score = Some(evaluation.score);
        self.summary = Some(evaluation.summary.clone());
        self.duration_secs = Some(evaluation.metrics.duration_secs);
        self.engagement = Some(evaluation.metrics.engagement);
        self.comprehension = Some(evaluation.metrics.comprehension);
        self.participation = Some(evaluation.metrics.participation);
        self.insights = Some(evaluation.insights.clone());
        self.evaluated_at = Some(evaluated_at);
        self
    }

    /// The degraded payload: same companion and user, nothing else
    pub fn stripped(&self) -> Self {
        Self::minimal(self.companion_id.clone(), self.user_id.clone())
    }

    pub fn has_evaluation(&self) -> bool {
        self.score.is_some()
    }
}

/// A persisted session. Never updated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: String,
    pub companion_id: String,
    pub user_id: String,
    pub vapi_call_id: Option<String>,
    pub score: Option<u8>,
    pub summary: Option<String>,
    pub duration_secs: Option<u32>,
    pub engagement: Option<u8>,
    pub comprehension: Option<u8>,
    pub participation: Option<u8>,
    pub insights: Option<Vec<String>>,
    pub evaluated_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl SessionRecord {
    pub fn from_new(row: NewSessionRecord, id: String, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            companion_id: row.companion_id,
            user_id: row.user_id,
            vapi_call_id: row.vapi_call_id,
            score: row.score,
            summary: row.summary,
            duration_secs: row.duration_secs,
            engagement: row.engagement,
            comprehension: row.comprehension,
            participation: row.participation,
            insights: row.insights,
            evaluated_at: row.evaluated_at,
            created_at,
        }
    }

    pub fn has_evaluation(&self) -> bool {
        self.score.is_some()
    }
}

/// A companion together with the outcome of the user's most recent session with it.
///
/// All three session fields are `None` when no session exists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompanionSessionSummary {
    #[serde(flatten)]
    pub companion: Companion,
    pub last_session_date: Option<DateTime<Utc>>,
    pub last_session_score: Option<u8>,
    pub last_session_summary: Option<String>,
}

impl CompanionSessionSummary {
    pub fn empty(companion: Companion) -> Self {
        Self {
            companion,
            last_session_date: None,
            last_session_score: None,
            last_session_summary: None,
        }
    }

    pub fn from_latest(companion: Companion, latest: Option<&SessionRecord>) -> Self {
        match latest {
            Some(record) => Self {
                companion,
                last_session_date: Some(record.created_at),
                last_session_score: record.score,
                last_session_summary: record.summary.clone(),
            },
            None => Self::empty(companion),
        }
    }
}
