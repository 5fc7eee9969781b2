//! Low-level utilities shared across fastcharge crates.
//!
//! Provides atomic private-file writes and time helpers used by credential
//! persistence and secret expiry calculations.

pub mod atomic_io;
pub mod time_utils;

pub use atomic_io::write_private_text_atomic;
pub use time_utils::{current_unix_timestamp, current_unix_timestamp_ms};
