//! Voice conversation transport
//!
//! The provider opens a bidirectional audio conversation, reports finished
//! utterances as events, and accepts mute and end commands. The session
//! controller only sees the `VoiceTransport` seam; `NatsVoiceTransport`
//! reaches the provider through a bridge on NATS.

pub mod messages;
mod nats;
mod transport;

pub use messages::{ControlMessage, StartSessionReply, StartSessionRequest, TranscriptMessage};
pub use nats::{control_subject, transcript_subject, NatsVoiceTransport, START_SUBJECT};
pub use transport::{
    ConnectionError, ConnectionType, ConversationHandle, TransportEvent, VoiceSession,
    VoiceSessionConfig, VoiceTransport, DEFAULT_AGENT_ID,
};
