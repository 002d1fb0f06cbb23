use thiserror::Error;

use connecthub_gateway::GatewayError;
use connecthub_shared::ValidationError;

/// Errors surfaced by the application core.
///
/// These are handled at the boundary where the remote call is issued;
/// controllers log them and emit a toast event rather than letting them
/// reach the rendering layer.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Not signed in")]
    Unauthenticated,

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("{0}")]
    Validation(#[from] ValidationError),

    #[error("Remote call failed: {0}")]
    Gateway(GatewayError),
}

impl From<GatewayError> for ClientError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::NoSession => ClientError::Unauthenticated,
            other => ClientError::Gateway(other),
        }
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ClientError>;
