use crate::config::VoiceConfig;
use crate::evaluation::Evaluator;
use crate::persistence::{
    CompanionCatalog, FixedIdentity, SessionStore, SessionWriter, StoreError,
};
use crate::session::{CallStatus, ControllerConfig, ControllerDeps, SessionController};
use crate::voice::VoiceTransport;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Who a controller belongs to
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CallOwner {
    /// Signed-in user from the auth proxy
    User(String),

    /// Unauthenticated caller, identified by the token minted on call start
    Guest(String),
}

impl CallOwner {
    /// Fresh guest owner with a random session token
    pub fn new_guest() -> Self {
        CallOwner::Guest(uuid::Uuid::new_v4().to_string())
    }

    /// User id for persistence; guests are never saved
    pub fn user_id(&self) -> Option<&str> {
        match self {
            CallOwner::User(id) => Some(id),
            CallOwner::Guest(_) => None,
        }
    }
}

// Guest tokens stay out of the logs
impl fmt::Display for CallOwner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallOwner::User(id) => write!(f, "user {}", id),
            CallOwner::Guest(_) => f.write_str("guest"),
        }
    }
}

/// Controllers are kept per (owner, companion)
pub type ControllerKey = (CallOwner, String);

/// Shared application state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub transport: Arc<dyn VoiceTransport>,
    pub evaluator: Evaluator,
    pub sessions: Arc<dyn SessionStore>,
    pub catalog: Arc<dyn CompanionCatalog>,
    pub voice: VoiceConfig,
    pub evaluation_notice: Duration,

    /// Live controllers
    pub controllers: Arc<RwLock<HashMap<ControllerKey, Arc<SessionController>>>>,
}

impl AppState {
    pub fn new(
        transport: Arc<dyn VoiceTransport>,
        evaluator: Evaluator,
        sessions: Arc<dyn SessionStore>,
        catalog: Arc<dyn CompanionCatalog>,
        voice: VoiceConfig,
        evaluation_notice: Duration,
    ) -> Self {
        Self {
            transport,
            evaluator,
            sessions,
            catalog,
            voice,
            evaluation_notice,
            controllers: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Existing controller for this owner and companion
    pub async fn controller(&self, owner: &CallOwner, companion_id: &str) -> Option<Arc<SessionController>> {
        let key = (owner.clone(), companion_id.to_string());
        self.controllers.read().await.get(&key).cloned()
    }

    /// Controller for this owner and companion, created on first use.
    ///
    /// `Ok(None)` when the companion is not in the catalog.
    pub async fn controller_or_create(
        &self,
        owner: &CallOwner,
        companion_id: &str,
    ) -> Result<Option<Arc<SessionController>>, StoreError> {
        if let Some(controller) = self.controller(owner, companion_id).await {
            return Ok(Some(controller));
        }

        let Some(companion) = self.catalog.get_companion(companion_id).await? else {
            return Ok(None);
        };

        let key = (owner.clone(), companion_id.to_string());
        let mut controllers = self.controllers.write().await;
        let controller = controllers
            .entry(key)
            .or_insert_with(|| {
                info!("Creating controller for companion {} ({})", companion.id, owner);

                let mut config = ControllerConfig::for_companion(&companion);
                config.voice = self.voice.session_config(&companion.id);
                config.evaluation_notice = self.evaluation_notice;

                let identity = Arc::new(FixedIdentity::from_option(owner.user_id().map(str::to_string)));
                let deps = ControllerDeps {
                    transport: Arc::clone(&self.transport),
                    evaluator: self.evaluator.clone(),
                    writer: SessionWriter::new(Arc::clone(&self.sessions), identity),
                };

                Arc::new(SessionController::spawn(config, deps))
            })
            .clone();

        Ok(Some(controller))
    }

    /// Drop controllers that hold no call and that no request is using.
    ///
    /// A controller stays while it is connecting, active, evaluating, or
    /// still showing the evaluation-complete notice. Returns how many were
    /// removed.
    pub async fn evict_idle(&self) -> usize {
        let mut controllers = self.controllers.write().await;
        let before = controllers.len();

        controllers.retain(|(owner, companion_id), controller| {
            if Arc::strong_count(controller) > 1 {
                return true;
            }

            let snapshot = controller.snapshot();
            let busy = matches!(snapshot.status, CallStatus::Connecting | CallStatus::Active)
                || snapshot.is_evaluating
                || snapshot.evaluation_complete;
            if !busy {
                debug!("Evicting controller for companion {} ({})", companion_id, owner);
            }
            busy
        });

        let evicted = before - controllers.len();
        if evicted > 0 {
            info!("Evicted {} idle controllers, {} remaining", evicted, controllers.len());
        }
        evicted
    }
}
