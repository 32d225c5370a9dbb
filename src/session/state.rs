use crate::conversation::ConversationMessage;
use crate::evaluation::SessionEvaluation;
use crate::persistence::SessionRecord;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of a call: Idle → Connecting → Active → Finished
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CallStatus {
    #[default]
    Idle,
    Connecting,
    Active,
    Finished,
}

impl CallStatus {
    /// A new call may start from Idle or Finished
    pub fn can_start(self) -> bool {
        matches!(self, CallStatus::Idle | CallStatus::Finished)
    }

    /// Only an active call can be muted or ended
    pub fn is_active(self) -> bool {
        self == CallStatus::Active
    }
}

impl fmt::Display for CallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CallStatus::Idle => "idle",
            CallStatus::Connecting => "connecting",
            CallStatus::Active => "active",
            CallStatus::Finished => "finished",
        };
        f.write_str(name)
    }
}

/// Observable controller state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct SessionSnapshot {
    pub companion_id: String,
    pub status: CallStatus,
    pub is_muted: bool,

    /// Teardown pipeline (evaluation + save) is running
    pub is_evaluating: bool,

    /// Set when teardown finishes, cleared after the notice window
    pub evaluation_complete: bool,

    /// Conversation id of the current call
    pub call_id: Option<String>,

    /// Transcript of the current (or just-ended) call, in arrival order
    #[serde(skip)]
    pub transcript: Vec<ConversationMessage>,

    pub last_evaluation: Option<SessionEvaluation>,
}

impl SessionSnapshot {
    pub fn new(companion_id: impl Into<String>) -> Self {
        Self {
            companion_id: companion_id.into(),
            ..Self::default()
        }
    }
}

/// Result of a start request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// The call connected; carries its conversation id
    Started { call_id: String },
    /// Not permitted from this state; nothing changed
    Ignored(CallStatus),
}

/// Result of an end request
#[derive(Debug, Clone, PartialEq)]
pub enum EndOutcome {
    /// No active call; nothing changed
    Ignored(CallStatus),
    /// The call ended and the teardown pipeline ran
    Ended {
        call_id: Option<String>,
        evaluation: Option<SessionEvaluation>,
        /// `None` when no user was signed in
        record: Option<SessionRecord>,
    },
}
