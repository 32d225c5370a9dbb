use crate::conversation::ConversationMessage;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tokio::sync::mpsc;

/// Agent used when none is configured
pub const DEFAULT_AGENT_ID: &str = "agent_1201k38p1ktse719v80971j3g4cm";

/// How the voice provider carries audio
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionType {
    #[default]
    Websocket,
    Webrtc,
}

impl fmt::Display for ConnectionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionType::Websocket => f.write_str("websocket"),
            ConnectionType::Webrtc => f.write_str("webrtc"),
        }
    }
}

/// Parameters for opening one conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceSessionConfig {
    pub agent_id: String,
    pub connection_type: ConnectionType,

    /// Companion the learner is talking to
    pub companion_id: String,
}

impl VoiceSessionConfig {
    pub fn new(companion_id: impl Into<String>) -> Self {
        Self {
            agent_id: DEFAULT_AGENT_ID.to_string(),
            connection_type: ConnectionType::default(),
            companion_id: companion_id.into(),
        }
    }
}

/// The voice session could not be established
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("voice provider rejected the session: {0}")]
    Rejected(String),

    #[error("voice session did not connect within {0:?}")]
    Timeout(Duration),

    #[error("voice transport error: {0}")]
    Transport(String),
}

/// Something the provider reported during a live conversation
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// A finished utterance
    Message(ConversationMessage),
    /// The provider closed the conversation
    Disconnected,
    /// A non-fatal provider error
    Error(String),
}

/// Control surface of one live conversation
#[async_trait::async_trait]
pub trait ConversationHandle: Send + Sync {
    /// Provider-assigned identifier of this conversation
    fn conversation_id(&self) -> &str;

    async fn set_muted(&self, muted: bool) -> Result<()>;

    async fn end_session(&self) -> Result<()>;
}

/// A live conversation: its control handle plus the event stream
pub struct VoiceSession {
    pub handle: Box<dyn ConversationHandle>,
    pub events: mpsc::Receiver<TransportEvent>,
}

/// Opens conversations with the voice provider
#[async_trait::async_trait]
pub trait VoiceTransport: Send + Sync {
    async fn start_session(&self, config: &VoiceSessionConfig) -> Result<VoiceSession, ConnectionError>;

    /// Transport name for logging
    fn name(&self) -> &str;
}
