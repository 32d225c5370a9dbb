use super::messages::{ControlMessage, StartSessionReply, StartSessionRequest, TranscriptMessage};
use super::transport::{
    ConnectionError, ConversationHandle, TransportEvent, VoiceSession, VoiceSessionConfig,
    VoiceTransport,
};
use crate::conversation::ConversationMessage;
use anyhow::{Context, Result};
use async_nats::Client;
use futures::stream::StreamExt;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Subject the voice bridge answers session requests on
pub const START_SUBJECT: &str = "voice.session.start";

pub fn transcript_subject(conversation_id: &str) -> String {
    format!("voice.transcript.{}", conversation_id)
}

pub fn control_subject(conversation_id: &str) -> String {
    format!("voice.control.{}", conversation_id)
}

/// Voice transport talking to a provider bridge over NATS
pub struct NatsVoiceTransport {
    client: Client,
    connect_timeout: Duration,
}

impl NatsVoiceTransport {
    /// Connect to NATS server
    pub async fn connect(url: &str, connect_timeout: Duration) -> Result<Self> {
        info!("Connecting to NATS at {}", url);

        let client = async_nats::connect(url)
            .await
            .context("Failed to connect to NATS")?;

        info!("Connected to NATS successfully");

        Ok(Self {
            client,
            connect_timeout,
        })
    }

    async fn request_session(&self, config: &VoiceSessionConfig) -> Result<String, ConnectionError> {
        let request = StartSessionRequest {
            agent_id: config.agent_id.clone(),
            connection_type: config.connection_type,
            companion_id: config.companion_id.clone(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        };
        let payload =
            serde_json::to_vec(&request).map_err(|e| ConnectionError::Transport(e.to_string()))?;

        let reply = tokio::time::timeout(
            self.connect_timeout,
            self.client.request(START_SUBJECT.to_string(), payload.into()),
        )
        .await
        .map_err(|_| ConnectionError::Timeout(self.connect_timeout))?
        .map_err(|e| ConnectionError::Transport(e.to_string()))?;

        let reply: StartSessionReply = serde_json::from_slice(&reply.payload)
            .map_err(|e| ConnectionError::Transport(format!("bad session reply: {}", e)))?;

        match (reply.conversation_id, reply.error) {
            (Some(id), None) => Ok(id),
            (_, Some(reason)) => Err(ConnectionError::Rejected(reason)),
            (None, None) => Err(ConnectionError::Rejected(
                "reply carried no conversation id".to_string(),
            )),
        }
    }
}

#[async_trait::async_trait]
impl VoiceTransport for NatsVoiceTransport {
    async fn start_session(&self, config: &VoiceSessionConfig) -> Result<VoiceSession, ConnectionError> {
        info!(
            "Requesting voice session (agent={}, connection={}, companion={})",
            config.agent_id, config.connection_type, config.companion_id
        );

        let conversation_id = self.request_session(config).await?;

        let subject = transcript_subject(&conversation_id);
        let mut subscriber = self
            .client
            .subscribe(subject.clone())
            .await
            .map_err(|e| ConnectionError::Transport(e.to_string()))?;

        info!("Subscribed to {}", subject);

        let (tx, rx) = mpsc::channel(256);
        let expected_id = conversation_id.clone();

        // Forward final transcript messages in arrival order
        let forward_task = tokio::spawn(async move {
            while let Some(msg) = subscriber.next().await {
                match serde_json::from_slice::<TranscriptMessage>(&msg.payload) {
                    Ok(transcript) => {
                        if transcript.conversation_id != expected_id || transcript.partial {
                            continue;
                        }

                        let message = ConversationMessage {
                            role: transcript.role,
                            content: transcript.text,
                        };
                        if tx.send(TransportEvent::Message(message)).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!("Failed to parse transcript message: {}", e);
                        let _ = tx.send(TransportEvent::Error(e.to_string())).await;
                    }
                }
            }

            let _ = tx.send(TransportEvent::Disconnected).await;
            info!("Transcript forwarding stopped for {}", expected_id);
        });

        Ok(VoiceSession {
            handle: Box::new(NatsConversation {
                client: self.client.clone(),
                conversation_id,
                forward_task,
            }),
            events: rx,
        })
    }

    fn name(&self) -> &str {
        "nats"
    }
}

/// A live conversation routed through NATS
struct NatsConversation {
    client: Client,
    conversation_id: String,
    forward_task: JoinHandle<()>,
}

impl NatsConversation {
    async fn publish_control(&self, message: &ControlMessage) -> Result<()> {
        let payload = serde_json::to_vec(message)?;
        self.client
            .publish(control_subject(&self.conversation_id), payload.into())
            .await
            .context("Failed to publish control message")?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl ConversationHandle for NatsConversation {
    fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    async fn set_muted(&self, muted: bool) -> Result<()> {
        self.publish_control(&ControlMessage::Mute { muted }).await
    }

    async fn end_session(&self) -> Result<()> {
        let result = self.publish_control(&ControlMessage::End).await;
        self.forward_task.abort();
        if let Err(e) = &result {
            error!("Failed to end conversation {}: {}", self.conversation_id, e);
        }
        result
    }
}

impl Drop for NatsConversation {
    fn drop(&mut self) {
        self.forward_task.abort();
    }
}
