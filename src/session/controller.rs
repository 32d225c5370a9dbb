use super::notice::DeferredTask;
use super::state::{CallStatus, EndOutcome, SessionSnapshot, Transition};
use crate::conversation::ConversationMessage;
use crate::evaluation::{CompanionProfile, Evaluator};
use crate::persistence::{Companion, PersistenceError, SessionWriter};
use crate::voice::{
    ConnectionError, ConversationHandle, TransportEvent, VoiceSessionConfig, VoiceTransport,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, error, info, warn};

/// How long the evaluation-complete notice stays visible
pub const DEFAULT_EVALUATION_NOTICE: Duration = Duration::from_secs(3);

/// Errors surfaced by controller operations
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error("session controller has shut down")]
    ControllerClosed,
}

/// Configuration for one controller (one companion)
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    pub companion_id: String,
    pub companion: CompanionProfile,
    pub voice: VoiceSessionConfig,
    pub evaluation_notice: Duration,
}

impl ControllerConfig {
    pub fn for_companion(companion: &Companion) -> Self {
        Self {
            companion_id: companion.id.clone(),
            companion: companion.profile(),
            voice: VoiceSessionConfig::new(companion.id.clone()),
            evaluation_notice: DEFAULT_EVALUATION_NOTICE,
        }
    }
}

/// Collaborators the controller drives
#[derive(Clone)]
pub struct ControllerDeps {
    pub transport: Arc<dyn VoiceTransport>,
    pub evaluator: Evaluator,
    pub writer: SessionWriter,
}

enum Step {
    Command(Option<Command>),
    Event(Option<TransportEvent>),
}

enum Command {
    Start(oneshot::Sender<Result<Transition, ConnectionError>>),
    ToggleMute(oneshot::Sender<Option<bool>>),
    End(oneshot::Sender<Result<EndOutcome, PersistenceError>>),
    ClearNotice { generation: u64 },
}

/// Drives one voice session at a time for a single companion.
///
/// Commands and transport events are handled by one task in arrival order, so
/// transitions never interleave. State is published through a watch channel
/// and can be read at any time without waiting on a running transition.
pub struct SessionController {
    commands: mpsc::Sender<Command>,
    state: watch::Receiver<SessionSnapshot>,
}

impl SessionController {
    /// Spawn the controller task. Must be called within a Tokio runtime.
    pub fn spawn(config: ControllerConfig, deps: ControllerDeps) -> Self {
        let (commands, command_rx) = mpsc::channel(32);
        let (state_tx, state) = watch::channel(SessionSnapshot::new(config.companion_id.clone()));

        info!(
            "Creating session controller for companion {} (transport={})",
            config.companion_id,
            deps.transport.name()
        );

        let actor = Actor {
            config,
            deps,
            state: state_tx,
            conversation: None,
            notice: DeferredTask::new(),
            commands: commands.downgrade(),
        };
        // The task ends once every strong command sender is dropped
        tokio::spawn(actor.run(command_rx));

        Self { commands, state }
    }

    /// Start a call. Ignored unless the controller is Idle or Finished.
    ///
    /// On connection failure the controller returns to Idle and the error is returned.
    pub async fn start_call(&self) -> Result<Transition, SessionError> {
        let status = self.status();
        if !status.can_start() {
            debug!("start_call ignored in state {}", status);
            return Ok(Transition::Ignored(status));
        }

        let (tx, rx) = oneshot::channel();
        self.send(Command::Start(tx)).await?;
        let transition = rx.await.map_err(|_| SessionError::ControllerClosed)??;
        Ok(transition)
    }

    /// Flip the mute flag of the active call; `None` when no call is active
    pub async fn toggle_mute(&self) -> Result<Option<bool>, SessionError> {
        if !self.status().is_active() {
            return Ok(None);
        }

        let (tx, rx) = oneshot::channel();
        self.send(Command::ToggleMute(tx)).await?;
        rx.await.map_err(|_| SessionError::ControllerClosed)
    }

    /// End the active call, then evaluate and save it. A no-op unless Active.
    pub async fn end_call(&self) -> Result<EndOutcome, SessionError> {
        let status = self.status();
        if !status.is_active() {
            debug!("end_call ignored in state {}", status);
            return Ok(EndOutcome::Ignored(status));
        }

        let (tx, rx) = oneshot::channel();
        self.send(Command::End(tx)).await?;
        let outcome = rx.await.map_err(|_| SessionError::ControllerClosed)??;
        Ok(outcome)
    }

    pub fn status(&self) -> CallStatus {
        self.state.borrow().status
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.state.borrow().clone()
    }

    /// Transcript of the current (or just-ended) call
    pub fn transcript(&self) -> Vec<ConversationMessage> {
        self.state.borrow().transcript.clone()
    }

    /// Watch state changes
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.state.clone()
    }

    async fn send(&self, command: Command) -> Result<(), SessionError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| SessionError::ControllerClosed)
    }
}

struct Actor {
    config: ControllerConfig,
    deps: ControllerDeps,
    state: watch::Sender<SessionSnapshot>,
    conversation: Option<Box<dyn ConversationHandle>>,
    notice: DeferredTask,
    commands: mpsc::WeakSender<Command>,
}

impl Actor {
    async fn run(mut self, mut commands: mpsc::Receiver<Command>) {
        let mut events: Option<mpsc::Receiver<TransportEvent>> = None;

        loop {
            let step = tokio::select! {
                command = commands.recv() => Step::Command(command),
                event = next_event(&mut events) => Step::Event(event),
            };

            match step {
                Step::Command(Some(command)) => self.handle(command, &mut events).await,
                Step::Command(None) => break,
                Step::Event(Some(event)) => self.on_transport_event(event, &mut events),
                Step::Event(None) => {
                    debug!("Transport event stream closed");
                    events = None;
                }
            }
        }

        self.shutdown().await;
    }

    async fn handle(&mut self, command: Command, events: &mut Option<mpsc::Receiver<TransportEvent>>) {
        match command {
            Command::Start(reply) => {
                let result = self.start(events).await;
                let _ = reply.send(result);
            }
            Command::ToggleMute(reply) => {
                let result = self.toggle_mute().await;
                let _ = reply.send(result);
            }
            Command::End(reply) => {
                let result = self.end(events).await;
                let _ = reply.send(result);
            }
            Command::ClearNotice { generation } => {
                if self.notice.is_current(generation) {
                    self.state.send_modify(|s| s.evaluation_complete = false);
                }
            }
        }
    }

    fn status(&self) -> CallStatus {
        self.state.borrow().status
    }

    async fn start(
        &mut self,
        events: &mut Option<mpsc::Receiver<TransportEvent>>,
    ) -> Result<Transition, ConnectionError> {
        let status = self.status();
        if !status.can_start() {
            return Ok(Transition::Ignored(status));
        }

        info!("Starting call for companion {}", self.config.companion_id);

        self.notice.cancel();
        self.state.send_modify(|s| {
            s.status = CallStatus::Connecting;
            s.transcript.clear();
            s.is_muted = false;
            s.is_evaluating = false;
            s.evaluation_complete = false;
            s.call_id = None;
            s.last_evaluation = None;
        });

        match self.deps.transport.start_session(&self.config.voice).await {
            Ok(session) => {
                let call_id = session.handle.conversation_id().to_string();
                self.conversation = Some(session.handle);
                *events = Some(session.events);

                self.state.send_modify(|s| {
                    s.status = CallStatus::Active;
                    s.call_id = Some(call_id.clone());
                });
                info!("Call {} active for companion {}", call_id, self.config.companion_id);

                Ok(Transition::Started { call_id })
            }
            Err(e) => {
                error!("Failed to start voice conversation: {}", e);
                self.state.send_modify(|s| s.status = CallStatus::Idle);
                Err(e)
            }
        }
    }

    async fn toggle_mute(&mut self) -> Option<bool> {
        if !self.status().is_active() {
            return None;
        }

        let muted = !self.state.borrow().is_muted;
        if let Some(conversation) = &self.conversation {
            if let Err(e) = conversation.set_muted(muted).await {
                warn!("Failed to forward mute={} to transport: {}", muted, e);
            }
        }

        self.state.send_modify(|s| s.is_muted = muted);
        debug!("Microphone muted={}", muted);
        Some(muted)
    }

    fn on_transport_event(
        &mut self,
        event: TransportEvent,
        events: &mut Option<mpsc::Receiver<TransportEvent>>,
    ) {
        match event {
            TransportEvent::Message(message) => self.append(message),
            TransportEvent::Disconnected => {
                info!("Voice provider closed the conversation");
                *events = None;
            }
            TransportEvent::Error(e) => warn!("Voice transport error: {}", e),
        }
    }

    fn append(&mut self, message: ConversationMessage) {
        if !self.status().is_active() {
            debug!("Dropping {} message outside an active call", message.role);
            return;
        }
        self.state.send_modify(|s| s.transcript.push(message));
    }

    async fn end(
        &mut self,
        events: &mut Option<mpsc::Receiver<TransportEvent>>,
    ) -> Result<EndOutcome, PersistenceError> {
        let status = self.status();
        if !status.is_active() {
            return Ok(EndOutcome::Ignored(status));
        }

        // Keep utterances that arrived before the end request
        if let Some(mut rx) = events.take() {
            while let Ok(event) = rx.try_recv() {
                if let TransportEvent::Message(message) = event {
                    self.append(message);
                }
            }
        }

        self.state.send_modify(|s| s.status = CallStatus::Finished);

        if let Some(conversation) = self.conversation.take() {
            if let Err(e) = conversation.end_session().await {
                warn!("Failed to end voice conversation cleanly: {}", e);
            }
        }

        self.state.send_modify(|s| s.is_evaluating = true);

        let (call_id, transcript) = {
            let snapshot = self.state.borrow();
            (snapshot.call_id.clone(), snapshot.transcript.clone())
        };

        info!(
            "Call {:?} finished with {} messages",
            call_id,
            transcript.len()
        );

        let evaluation = match &call_id {
            Some(id) if !transcript.is_empty() => Some(
                self.deps
                    .evaluator
                    .evaluate(id, &transcript, &self.config.companion)
                    .await,
            ),
            _ => None,
        };

        let saved = self
            .deps
            .writer
            .persist(&self.config.companion_id, call_id.as_deref(), evaluation.as_ref())
            .await;

        self.state.send_modify(|s| {
            s.is_evaluating = false;
            s.evaluation_complete = true;
            s.call_id = None;
            s.last_evaluation = evaluation.clone();
        });
        self.schedule_notice_clear();

        let record = saved?;
        Ok(EndOutcome::Ended {
            call_id,
            evaluation,
            record,
        })
    }

    fn schedule_notice_clear(&mut self) {
        let commands = self.commands.clone();
        self.notice
            .schedule(self.config.evaluation_notice, move |generation| async move {
                if let Some(commands) = commands.upgrade() {
                    let _ = commands.send(Command::ClearNotice { generation }).await;
                }
            });
    }

    async fn shutdown(&mut self) {
        self.notice.cancel();
        if let Some(conversation) = self.conversation.take() {
            info!(
                "Controller for companion {} shutting down, ending live call",
                self.config.companion_id
            );
            if let Err(e) = conversation.end_session().await {
                warn!("Failed to end voice conversation on shutdown: {}", e);
            }
        }
    }
}

async fn next_event(events: &mut Option<mpsc::Receiver<TransportEvent>>) -> Option<TransportEvent> {
    match events {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}
