//! Cached credential storage.
//!
//! This module provides:
//! - `AuthKey`: the fixed set of keys written into the host application's item table
//! - `AuthStore`: SQLite-backed upsert of those keys, one transaction per update
//!
//! Values are stored as plain text. Nothing here validates, refreshes or
//! encrypts the tokens.

pub mod keys;
pub mod store;

pub use keys::{AuthKey, DEFAULT_SIGNUP_TYPE};
pub use store::{AuthStore, AuthUpdate, CachedAuth};
