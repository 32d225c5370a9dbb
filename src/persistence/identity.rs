use async_trait::async_trait;

/// Resolves the user on whose behalf sessions are saved and read.
///
/// `None` means unauthenticated, which is a normal state: callers skip or
/// null out session data instead of failing.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn current_user(&self) -> Option<String>;
}

/// Identity known up front (per request or per process)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FixedIdentity {
    user_id: Option<String>,
}

impl FixedIdentity {
    pub fn authenticated(user_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
        }
    }

    pub fn anonymous() -> Self {
        Self { user_id: None }
    }

    pub fn from_option(user_id: Option<String>) -> Self {
        Self { user_id }
    }
}

#[async_trait]
impl IdentityProvider for FixedIdentity {
    async fn current_user(&self) -> Option<String> {
        self.user_id.clone()
    }
}
