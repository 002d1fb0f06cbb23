//! # connecthub-client
//!
//! The ConnectHub application core: the session cache, the UI event bus,
//! and the controllers the presentational layer renders from. Connection
//! reconciliation, recommendation building, realtime message/connection
//! sync, and optimistic mutations with rollback all live here.
//!
//! Controllers own their view state exclusively. Cross-surface consistency
//! happens by refetching through the gateway, never by sharing mutable
//! references; the only process-wide state is the [`state::AppState`]
//! session cache.

pub mod admin;
pub mod communities;
pub mod connections;
pub mod discover;
pub mod events;
pub mod feed;
pub mod messaging;
pub mod optimistic;
pub mod profile;
pub mod settings;
pub mod state;
pub mod sync_bridge;

mod error;

pub use error::{ClientError, Result};

use tracing_subscriber::{fmt, EnvFilter};

/// Initialise the tracing subscriber for the application process.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("connecthub_client=debug,connecthub_gateway=debug,warn")
    });

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    tracing::info!("Starting ConnectHub client core");
}
