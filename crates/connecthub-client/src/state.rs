//! Process-wide application state.
//!
//! The [`AppState`] struct is wrapped in `Arc<Mutex<>>` and shared across
//! controllers. It holds only the authenticated-session cache and the
//! realtime command handle; per-surface view state belongs to the
//! controllers that render it.

use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

use connecthub_gateway::realtime::RealtimeCommand;
use connecthub_gateway::{Gateway, QueryBuilder, Session};
use connecthub_shared::{Profile, UserId};

use crate::error::Result;

/// Central application state.
pub struct AppState {
    /// The current auth session. `None` until sign-in completes.
    pub session: Option<Session>,

    /// The signed-in user's profile, hydrated from the gateway on demand.
    pub profile: Option<Profile>,

    /// Sender half of the channel used to dispatch commands to the
    /// realtime task (subscribe, shutdown).
    pub realtime_cmd_tx: Option<mpsc::Sender<RealtimeCommand>>,
}

impl AppState {
    /// Create a new, signed-out application state.
    pub fn new() -> Self {
        Self {
            session: None,
            profile: None,
            realtime_cmd_tx: None,
        }
    }

    pub fn current_user_id(&self) -> Option<UserId> {
        self.session.as_ref().map(|s| s.user.id)
    }

    /// Clear everything tied to the session. Called on sign-out.
    pub fn clear_session(&mut self) {
        self.session = None;
        self.profile = None;
        self.realtime_cmd_tx = None;
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

pub type SharedState = Arc<Mutex<AppState>>;

/// Fetch the signed-in user's profile and store it in the session cache.
///
/// Call after sign-in and after settings saves that change the profile.
pub async fn hydrate_current_user(gateway: &Gateway, state: &SharedState) -> Result<Profile> {
    let session = gateway.session().ok_or(crate::ClientError::Unauthenticated)?;

    let profile: Profile = gateway
        .select_single(
            "profiles",
            QueryBuilder::new().select("*").eq("id", session.user.id),
        )
        .await?;

    {
        let mut guard = state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        guard.session = Some(session);
        guard.profile = Some(profile.clone());
    }

    tracing::info!(user = %profile.id, "current user hydrated");
    Ok(profile)
}

/// Sign out remotely and tear down the session cache. Local state is
/// cleared even when the remote call fails.
pub async fn sign_out(gateway: &Gateway, state: &SharedState) -> Result<()> {
    let result = gateway.sign_out().await;

    let mut guard = state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    guard.clear_session();

    result.map_err(Into::into)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clear_session_resets_everything() {
        let mut state = AppState::new();
        let (tx, _rx) = mpsc::channel(1);
        state.realtime_cmd_tx = Some(tx);
        state.clear_session();
        assert!(state.session.is_none());
        assert!(state.profile.is_none());
        assert!(state.realtime_cmd_tx.is_none());
        assert!(state.current_user_id().is_none());
    }
}
