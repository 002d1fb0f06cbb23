//! Session management: sign-up, sign-in, sign-out, and the process-wide
//! session cache.
//!
//! The session is the only mutable state on the [`Gateway`]; it is
//! written here and read everywhere. Session changes are pushed to
//! listeners through a watch channel so the application layer can react
//! to sign-in/sign-out without polling.

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use connecthub_shared::UserId;

use crate::client::Gateway;
use crate::error::{GatewayError, Result};

/// The authenticated user as reported by the auth service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuthUser {
    pub id: UserId,
    pub email: Option<String>,
}

/// An issued session. Token refresh is handled by the backend collaborator;
/// this client only stores what it is given.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub user: AuthUser,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    user: AuthUser,
}

impl Gateway {
    fn auth_url(&self, path: &str) -> String {
        format!("{}/auth/v1/{path}", self.config.base_url)
    }

    /// Register a new account. The backend issues a session immediately.
    pub async fn sign_up(&self, email: &str, password: &str) -> Result<Session> {
        let resp = self
            .authorize(self.http.post(self.auth_url("signup")))
            .json(&serde_json::json!({ "email": email, "password": password }))
            .send()
            .await?;
        let resp = self.expect_ok(resp).await?;
        let token: TokenResponse = resp.json().await?;
        Ok(self.store_session(token))
    }

    /// Password sign-in.
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Session> {
        let resp = self
            .authorize(
                self.http
                    .post(self.auth_url("token"))
                    .query(&[("grant_type", "password")]),
            )
            .json(&serde_json::json!({ "email": email, "password": password }))
            .send()
            .await?;
        let resp = self.expect_ok(resp).await?;
        let token: TokenResponse = resp.json().await?;
        Ok(self.store_session(token))
    }

    /// Invalidate the session remotely and clear the local cache. The
    /// local cache is cleared even if the remote call fails.
    pub async fn sign_out(&self) -> Result<()> {
        let result = async {
            let resp = self
                .authorize(self.http.post(self.auth_url("logout")))
                .send()
                .await?;
            self.expect_ok(resp).await?;
            Ok(())
        }
        .await;

        self.session_tx.send_replace(None);
        tracing::info!("signed out");
        result
    }

    /// Install a previously issued session (e.g. restored from the host
    /// platform's secure storage at startup).
    pub fn restore_session(&self, session: Session) {
        self.session_tx.send_replace(Some(session));
    }

    /// The current session, if any.
    pub fn session(&self) -> Option<Session> {
        self.session_tx.borrow().clone()
    }

    /// Id of the signed-in user, or [`GatewayError::NoSession`].
    pub fn current_user_id(&self) -> Result<UserId> {
        self.session_tx
            .borrow()
            .as_ref()
            .map(|s| s.user.id)
            .ok_or(GatewayError::NoSession)
    }

    /// Subscribe to session changes (sign-in and sign-out).
    pub fn session_changes(&self) -> watch::Receiver<Option<Session>> {
        self.session_tx.subscribe()
    }

    fn store_session(&self, token: TokenResponse) -> Session {
        let session = Session {
            access_token: token.access_token,
            refresh_token: token.refresh_token,
            user: token.user,
        };
        tracing::info!(user = %session.user.id, "session established");
        self.session_tx.send_replace(Some(session.clone()));
        session
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GatewayConfig;

    fn gateway_for(server: &mockito::ServerGuard) -> Gateway {
        Gateway::new(GatewayConfig {
            base_url: server.url(),
            anon_key: "anon".into(),
            ..GatewayConfig::default()
        })
        .unwrap()
    }

    fn token_body(user_id: uuid::Uuid) -> String {
        format!(
            r#"{{"access_token":"at","refresh_token":"rt","user":{{"id":"{user_id}","email":"a@b.c"}}}}"#
        )
    }

    #[tokio::test]
    async fn sign_in_stores_session_and_notifies() {
        let mut server = mockito::Server::new_async().await;
        let user_id = uuid::Uuid::new_v4();
        server
            .mock("POST", "/auth/v1/token")
            .match_query(mockito::Matcher::UrlEncoded(
                "grant_type".into(),
                "password".into(),
            ))
            .with_status(200)
            .with_body(token_body(user_id))
            .create_async()
            .await;

        let gateway = gateway_for(&server);
        let mut changes = gateway.session_changes();
        assert!(gateway.session().is_none());

        let session = gateway.sign_in("a@b.c", "password123").await.unwrap();
        assert_eq!(session.user.id.0, user_id);
        assert_eq!(gateway.current_user_id().unwrap().0, user_id);

        changes.changed().await.unwrap();
        assert!(changes.borrow().is_some());
    }

    #[tokio::test]
    async fn sign_out_clears_session_even_on_remote_failure() {
        let mut server = mockito::Server::new_async().await;
        let user_id = uuid::Uuid::new_v4();
        server
            .mock("POST", "/auth/v1/token")
            .match_query(mockito::Matcher::Any)
            .with_status(200)
            .with_body(token_body(user_id))
            .create_async()
            .await;
        server
            .mock("POST", "/auth/v1/logout")
            .with_status(500)
            .with_body(r#"{"msg":"boom"}"#)
            .create_async()
            .await;

        let gateway = gateway_for(&server);
        gateway.sign_in("a@b.c", "password123").await.unwrap();

        assert!(gateway.sign_out().await.is_err());
        assert!(gateway.session().is_none());
        assert!(matches!(
            gateway.current_user_id(),
            Err(GatewayError::NoSession)
        ));
    }
}
