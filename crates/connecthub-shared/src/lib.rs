//! # connecthub-shared
//!
//! Domain types shared by every ConnectHub crate: typed ids, the row
//! shapes of the remote store, client-side validation, and the constants
//! that drive the recommendation and settings surfaces.
//!
//! The authoritative schema lives in the hosted backend; the structs here
//! mirror it field-for-field and are never persisted locally.

pub mod constants;
pub mod models;
pub mod types;
pub mod validate;

mod error;

pub use error::ValidationError;
pub use models::*;
pub use types::*;
