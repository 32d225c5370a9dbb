use super::transport::ConnectionType;
use crate::conversation::Role;
use serde::{Deserialize, Serialize};

/// Session request published to the voice bridge
#[derive(Debug, Serialize, Deserialize)]
pub struct StartSessionRequest {
    pub agent_id: String,
    pub connection_type: ConnectionType,
    pub companion_id: String,
    pub timestamp: String, // RFC3339 timestamp
}

/// Bridge reply to a session request
#[derive(Debug, Serialize, Deserialize)]
pub struct StartSessionReply {
    pub conversation_id: Option<String>,
    pub error: Option<String>,
}

/// Transcript message received from the voice bridge
#[derive(Debug, Serialize, Deserialize)]
pub struct TranscriptMessage {
    pub conversation_id: String,
    pub role: Role,
    pub text: String,
    #[serde(default)]
    pub partial: bool,
    pub timestamp: Option<String>,
}

/// Control message published for a live conversation
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlMessage {
    Mute { muted: bool },
    End,
}
