//! # connecthub-gateway
//!
//! Thin client over the hosted backend: row-level query and mutation
//! operations, remote procedure calls, auth/session management, object
//! storage, and the realtime change-feed channel.
//!
//! The backend is an opaque collaborator. This crate only shapes requests
//! and decodes responses; row-level security, uniqueness constraints, and
//! the scoring procedures all live on the other side of the wire.

pub mod auth;
pub mod client;
pub mod config;
pub mod query;
pub mod realtime;
pub mod rows;
pub mod rpc;
pub mod storage;

mod error;

pub use auth::{AuthUser, Session};
pub use client::Gateway;
pub use config::GatewayConfig;
pub use error::{GatewayError, Result};
pub use query::{cond_and, cond_eq, cond_in, Order, QueryBuilder};
pub use realtime::{
    spawn_realtime, ChangeEvent, ChangeKind, RealtimeCommand, RealtimeEvent, TableSubscription,
};
