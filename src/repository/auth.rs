use async_trait::async_trait;
use tokio::sync::watch;
use tracing::info;

use crate::domain::user::{AuthState, AuthUser};
use crate::error::AuthError;

/// Source of the signed-in identity. Changes are observed through
/// [`AuthProvider::watch`].
#[async_trait]
pub trait AuthProvider: Send + Sync {
    fn current(&self) -> AuthState;

    fn watch(&self) -> watch::Receiver<AuthState>;

    async fn sign_in_with_google(&self) -> Result<AuthUser, AuthError>;

    async fn sign_out(&self) -> Result<(), AuthError>;
}

/// Auth provider for offline use and tests: signing in always yields the
/// configured profile.
pub struct LocalAuthProvider {
    state: watch::Sender<AuthState>,
    profile: AuthUser,
}

impl LocalAuthProvider {
    /// Starts in the resolving state, like a provider still restoring a
    /// persisted session.
    pub fn new(profile: AuthUser) -> Self {
        let (state, _) = watch::channel(AuthState {
            user: None,
            loading: true,
        });
        Self { state, profile }
    }

    /// Ends initial resolution with the restored session, if any.
    pub fn resolve(&self, restored: Option<AuthUser>) {
        self.state.send_replace(AuthState {
            user: restored,
            loading: false,
        });
    }
}

#[async_trait]
impl AuthProvider for LocalAuthProvider {
    fn current(&self) -> AuthState {
        self.state.borrow().clone()
    }

    fn watch(&self) -> watch::Receiver<AuthState> {
        self.state.subscribe()
    }

    async fn sign_in_with_google(&self) -> Result<AuthUser, AuthError> {
        info!(uid = %self.profile.uid, "Signed in");
        self.state.send_replace(AuthState {
            user: Some(self.profile.clone()),
            loading: false,
        });
        Ok(self.profile.clone())
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        if let Some(user) = self.state.borrow().user.as_ref() {
            info!(uid = %user.uid, "Signed out");
        }
        self.state.send_replace(AuthState {
            user: None,
            loading: false,
        });
        Ok(())
    }
}
