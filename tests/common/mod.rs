// Shared fakes for integration tests
//
// In-process stand-ins for the voice provider, the session store and the
// provider metrics endpoint.

#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use companion_sessions::conversation::ConversationMessage;
use companion_sessions::evaluation::{MetricsError, MetricsSource, ProviderMetrics};
use companion_sessions::persistence::{
    Companion, MemoryStore, NewSessionRecord, SessionQuery, SessionRecord, SessionStore,
    StoreError,
};
use companion_sessions::session::SessionSnapshot;
use companion_sessions::voice::{
    ConnectionError, ConversationHandle, TransportEvent, VoiceSession, VoiceSessionConfig,
    VoiceTransport,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, watch, Notify};

pub fn companion(id: &str, topic: &str) -> Companion {
    Companion {
        id: id.to_string(),
        name: format!("{} tutor", topic),
        subject: "science".to_string(),
        topic: topic.to_string(),
        duration_minutes: Some(15),
        author: Some("author-1".to_string()),
    }
}

/// A short lesson with two user turns, in arrival order
pub fn lesson() -> Vec<ConversationMessage> {
    vec![
        ConversationMessage::assistant("Hello! Ready to explore photosynthesis?"),
        ConversationMessage::user("Yes, how do plants eat?"),
        ConversationMessage::assistant("They turn sunlight into sugar."),
        ConversationMessage::user("Really interesting, wow"),
    ]
}

/// Wait until the snapshot satisfies `predicate`, failing after two seconds
pub async fn wait_for_state(
    rx: &mut watch::Receiver<SessionSnapshot>,
    predicate: impl FnMut(&SessionSnapshot) -> bool,
) -> Result<SessionSnapshot> {
    let snapshot = tokio::time::timeout(Duration::from_secs(2), rx.wait_for(predicate)).await??;
    Ok(snapshot.clone())
}

// ============================================================================
// Voice transport
// ============================================================================

/// Test-side view of one conversation opened through `FakeTransport`
#[derive(Clone)]
pub struct ConversationProbe {
    pub id: String,
    pub events: mpsc::Sender<TransportEvent>,
    pub mute_calls: Arc<Mutex<Vec<bool>>>,
    pub ended: Arc<AtomicBool>,
}

impl ConversationProbe {
    pub async fn say(&self, message: ConversationMessage) -> Result<()> {
        self.events.send(TransportEvent::Message(message)).await?;
        Ok(())
    }

    pub fn mute_calls(&self) -> Vec<bool> {
        self.mute_calls.lock().unwrap().clone()
    }

    pub fn is_ended(&self) -> bool {
        self.ended.load(Ordering::SeqCst)
    }
}

struct FakeConversation {
    id: String,
    mute_calls: Arc<Mutex<Vec<bool>>>,
    ended: Arc<AtomicBool>,
}

#[async_trait]
impl ConversationHandle for FakeConversation {
    fn conversation_id(&self) -> &str {
        &self.id
    }

    async fn set_muted(&self, muted: bool) -> Result<()> {
        self.mute_calls.lock().unwrap().push(muted);
        Ok(())
    }

    async fn end_session(&self) -> Result<()> {
        self.ended.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Voice transport that opens conversations in-process
#[derive(Default)]
pub struct FakeTransport {
    reject_with: Mutex<Option<String>>,
    gate: Option<Arc<Notify>>,
    started: AtomicUsize,
    probes: Mutex<Vec<ConversationProbe>>,
    configs: Mutex<Vec<VoiceSessionConfig>>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every `start_session` waits for `gate` to be notified before connecting
    pub fn gated(gate: Arc<Notify>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::default()
        }
    }

    /// Reject the next session request
    pub fn reject_next(&self, reason: &str) {
        *self.reject_with.lock().unwrap() = Some(reason.to_string());
    }

    pub fn probe(&self, index: usize) -> ConversationProbe {
        self.probes.lock().unwrap()[index].clone()
    }

    pub fn last_probe(&self) -> ConversationProbe {
        self.probes
            .lock()
            .unwrap()
            .last()
            .cloned()
            .expect("no conversation was opened")
    }

    pub fn session_count(&self) -> usize {
        self.probes.lock().unwrap().len()
    }

    pub fn configs(&self) -> Vec<VoiceSessionConfig> {
        self.configs.lock().unwrap().clone()
    }
}

#[async_trait]
impl VoiceTransport for FakeTransport {
    async fn start_session(&self, config: &VoiceSessionConfig) -> Result<VoiceSession, ConnectionError> {
        self.configs.lock().unwrap().push(config.clone());

        if let Some(gate) = &self.gate {
            gate.notified().await;
        }

        if let Some(reason) = self.reject_with.lock().unwrap().take() {
            return Err(ConnectionError::Rejected(reason));
        }

        let n = self.started.fetch_add(1, Ordering::SeqCst) + 1;
        let (tx, rx) = mpsc::channel(64);
        let probe = ConversationProbe {
            id: format!("conv-{}", n),
            events: tx,
            mute_calls: Arc::new(Mutex::new(Vec::new())),
            ended: Arc::new(AtomicBool::new(false)),
        };
        self.probes.lock().unwrap().push(probe.clone());

        Ok(VoiceSession {
            handle: Box::new(FakeConversation {
                id: probe.id,
                mute_calls: probe.mute_calls,
                ended: probe.ended,
            }),
            events: rx,
        })
    }

    fn name(&self) -> &str {
        "fake"
    }
}

// ============================================================================
// Session store
// ============================================================================

/// Memory store with switchable insert and select failures
#[derive(Default)]
pub struct FlakyStore {
    pub inner: MemoryStore,
    pub fail_full_inserts: AtomicBool,
    pub fail_all_inserts: AtomicBool,
    pub fail_selects: AtomicBool,
    pub insert_attempts: Mutex<Vec<NewSessionRecord>>,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rejecting_evaluations() -> Self {
        let store = Self::default();
        store.fail_full_inserts.store(true, Ordering::SeqCst);
        store
    }

    pub fn rejecting_everything() -> Self {
        let store = Self::default();
        store.fail_all_inserts.store(true, Ordering::SeqCst);
        store
    }

    pub fn attempts(&self) -> Vec<NewSessionRecord> {
        self.insert_attempts.lock().unwrap().clone()
    }
}

#[async_trait]
impl SessionStore for FlakyStore {
    async fn insert_session(&self, row: NewSessionRecord) -> Result<SessionRecord, StoreError> {
        self.insert_attempts.lock().unwrap().push(row.clone());

        if self.fail_all_inserts.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("insert rejected".to_string()));
        }
        if self.fail_full_inserts.load(Ordering::SeqCst) && row.has_evaluation() {
            return Err(StoreError::Unavailable("unknown column score".to_string()));
        }
        self.inner.insert_session(row).await
    }

    async fn select_sessions(&self, query: &SessionQuery) -> Result<Vec<SessionRecord>, StoreError> {
        if self.fail_selects.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("select rejected".to_string()));
        }
        self.inner.select_sessions(query).await
    }
}

// ============================================================================
// Provider metrics
// ============================================================================

/// Metrics source that always fails
pub struct FailingMetrics;

#[async_trait]
impl MetricsSource for FailingMetrics {
    async fn fetch(&self, _call_id: &str) -> Result<ProviderMetrics, MetricsError> {
        Err(MetricsError::Status(503))
    }
}

/// Metrics source that never answers in time
pub struct StalledMetrics;

#[async_trait]
impl MetricsSource for StalledMetrics {
    async fn fetch(&self, _call_id: &str) -> Result<ProviderMetrics, MetricsError> {
        tokio::time::sleep(Duration::from_secs(60)).await;
        Err(MetricsError::NotConfigured)
    }
}

/// Metrics source that answers with a fixed payload
pub struct StaticMetrics(pub serde_json::Value);

#[async_trait]
impl MetricsSource for StaticMetrics {
    async fn fetch(&self, _call_id: &str) -> Result<ProviderMetrics, MetricsError> {
        Ok(ProviderMetrics::from_json(self.0.clone()))
    }
}
