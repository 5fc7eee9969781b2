//! Blocking GraphQL client for the fastcharge Data API.
//!
//! Requests carry the caller identity as `authorization`, `x-user-email`, and
//! `x-user-pk` headers. GraphQL errors are classified by their
//! `extensions.code` into [`DataApiErrorKind`] so callers can match on them.

mod client;
mod errors;

pub use client::{DataApiClient, DataApiIdentity, DEFAULT_DATA_API_TIMEOUT_MS};
pub use errors::{DataApiError, DataApiErrorKind};
