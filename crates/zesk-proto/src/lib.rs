//! Zesk storage value types.
//!
//! Values in this crate are the *storage representation* of model columns:
//! flat scalars that every storage backend can persist. Rich in-memory forms
//! (structured data, IP addresses, timestamps with time zones) live in
//! `zesk-core` and are coerced to and from [`Value`] per column type.
//!
//! # Modules
//!
//! - [`value`] - Flat storage values
//! - [`key`] - Row key encoding
//! - [`error`] - Protocol error types

pub mod error;
pub mod key;
pub mod value;

pub use error::Error;
pub use key::RowKey;
pub use value::Value;

/// Storage format version written alongside encoded rows.
///
/// Incremented whenever the archived layout of [`Value`] changes.
pub const FORMAT_VERSION: u32 = 1;
