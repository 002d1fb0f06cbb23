//! Gateway configuration loaded from environment variables.
//!
//! All settings have sensible defaults so the client can start against a
//! local backend with zero configuration.

/// Gateway configuration.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Base URL of the hosted backend, without a trailing slash.
    /// Env: `CONNECTHUB_API_URL`
    /// Default: `http://localhost:54321`
    pub base_url: String,

    /// Public (anonymous) API key sent with every request and used as the
    /// bearer token until a session exists.
    /// Env: `CONNECTHUB_ANON_KEY`
    /// Default: empty (local development backends accept it).
    pub anon_key: String,

    /// Database schema the row operations address.
    /// Env: `CONNECTHUB_SCHEMA`
    /// Default: `public`
    pub schema: String,

    /// Per-request timeout in seconds.
    /// Env: `CONNECTHUB_TIMEOUT_SECS`
    /// Default: `30`
    pub request_timeout_secs: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:54321".to_string(),
            anon_key: String::new(),
            schema: "public".to_string(),
            request_timeout_secs: 30,
        }
    }
}

impl GatewayConfig {
    /// Load configuration from environment variables, falling back to
    /// defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(url) = std::env::var("CONNECTHUB_API_URL") {
            config.base_url = url.trim_end_matches('/').to_string();
        }

        if let Ok(key) = std::env::var("CONNECTHUB_ANON_KEY") {
            config.anon_key = key;
        }

        if let Ok(schema) = std::env::var("CONNECTHUB_SCHEMA") {
            if !schema.is_empty() {
                config.schema = schema;
            }
        }

        if let Ok(val) = std::env::var("CONNECTHUB_TIMEOUT_SECS") {
            match val.parse::<u64>() {
                Ok(secs) if secs > 0 => config.request_timeout_secs = secs,
                _ => {
                    tracing::warn!(value = %val, "Invalid CONNECTHUB_TIMEOUT_SECS, using default");
                }
            }
        }

        config
    }

    /// Websocket endpoint of the realtime change feed, derived from the
    /// HTTP base URL.
    pub fn realtime_url(&self) -> String {
        let ws_base = if let Some(rest) = self.base_url.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = self.base_url.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            self.base_url.clone()
        };
        format!("{ws_base}/realtime/v1/websocket?apikey={}", self.anon_key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = GatewayConfig::default();
        assert_eq!(config.base_url, "http://localhost:54321");
        assert_eq!(config.schema, "public");
        assert_eq!(config.request_timeout_secs, 30);
    }

    #[test]
    fn test_realtime_url_scheme_swap() {
        let mut config = GatewayConfig {
            base_url: "https://hub.example.com".into(),
            anon_key: "key123".into(),
            ..GatewayConfig::default()
        };
        assert_eq!(
            config.realtime_url(),
            "wss://hub.example.com/realtime/v1/websocket?apikey=key123"
        );

        config.base_url = "http://localhost:54321".into();
        assert!(config.realtime_url().starts_with("ws://localhost:54321/"));
    }
}
