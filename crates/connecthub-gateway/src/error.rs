use thiserror::Error;

/// Errors produced by the gateway layer.
#[derive(Error, Debug)]
pub enum GatewayError {
    /// Transport-level failure (connect, timeout, TLS).
    #[error("HTTP transport error: {0}")]
    Http(#[from] reqwest::Error),

    /// The backend rejected the request.
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// An operation that needs a session ran without one.
    #[error("Not signed in")]
    NoSession,

    /// A single-row query matched nothing.
    #[error("Record not found")]
    NotFound,

    /// Response body did not decode into the expected shape.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The realtime task is gone and cannot take commands.
    #[error("Realtime channel closed")]
    ChannelClosed,
}

impl GatewayError {
    /// Whether this error is a permission/auth rejection (401/403 or a
    /// missing session).
    pub fn is_permission(&self) -> bool {
        match self {
            GatewayError::NoSession => true,
            GatewayError::Api { status, .. } => *status == 401 || *status == 403,
            _ => false,
        }
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, GatewayError>;
