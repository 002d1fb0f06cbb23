//! The [`Gateway`] handle: a reqwest client plus configuration and the
//! current session slot.
//!
//! The gateway is process-wide and read-shared (wrap it in an `Arc`);
//! the only mutable piece is the session, which lives behind a watch
//! channel and is written exclusively by the auth flow.

use std::time::Duration;

use tokio::sync::watch;

use crate::auth::Session;
use crate::config::GatewayConfig;
use crate::error::{GatewayError, Result};

pub struct Gateway {
    pub(crate) http: reqwest::Client,
    pub(crate) config: GatewayConfig,
    pub(crate) session_tx: watch::Sender<Option<Session>>,
}

impl Gateway {
    pub fn new(config: GatewayConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        let (session_tx, _session_rx) = watch::channel(None);

        Ok(Self {
            http,
            config,
            session_tx,
        })
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub(crate) fn rest_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{table}", self.config.base_url)
    }

    /// Bearer token for the next request: the session's access token if
    /// signed in, the anonymous key otherwise.
    pub(crate) fn bearer(&self) -> String {
        self.session_tx
            .borrow()
            .as_ref()
            .map(|s| s.access_token.clone())
            .unwrap_or_else(|| self.config.anon_key.clone())
    }

    /// Attach the headers every backend call carries.
    pub(crate) fn authorize(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        req.header("apikey", &self.config.anon_key)
            .bearer_auth(self.bearer())
    }

    /// Map a non-success response into [`GatewayError::Api`], extracting
    /// the backend's message when the body carries one.
    pub(crate) async fn expect_ok(&self, resp: reqwest::Response) -> Result<reqwest::Response> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }

        let message = match resp.json::<serde_json::Value>().await {
            Ok(body) => body
                .get("message")
                .or_else(|| body.get("error_description"))
                .or_else(|| body.get("msg"))
                .or_else(|| body.get("error"))
                .and_then(|v| v.as_str())
                .unwrap_or("request failed")
                .to_string(),
            Err(_) => "request failed".to_string(),
        };

        tracing::debug!(status = status.as_u16(), message = %message, "backend rejected request");

        Err(GatewayError::Api {
            status: status.as_u16(),
            message,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bearer_falls_back_to_anon_key() {
        let gateway = Gateway::new(GatewayConfig {
            anon_key: "anon".into(),
            ..GatewayConfig::default()
        })
        .unwrap();
        assert_eq!(gateway.bearer(), "anon");
    }

    #[test]
    fn bearer_prefers_session_token() {
        use crate::auth::AuthUser;
        use connecthub_shared::UserId;

        let gateway = Gateway::new(GatewayConfig::default()).unwrap();
        gateway
            .session_tx
            .send_replace(Some(Session {
                access_token: "token".into(),
                refresh_token: None,
                user: AuthUser {
                    id: UserId::new(),
                    email: None,
                },
            }));
        assert_eq!(gateway.bearer(), "token");
    }
}
