//! authcache-core - set and read an editor's cached login state.
//!
//! The editor keeps its session in a SQLite key-value table (`itemTable`).
//! [`AuthStore`] writes the email, access token, refresh token and signup
//! marker into that table so the editor picks them up on its next start.
//!
//! ```no_run
//! use authcache_core::{AuthStore, AuthUpdate, StoreConfig};
//!
//! # fn main() -> Result<(), authcache_core::StoreError> {
//! let store = AuthStore::open(&StoreConfig::new("state.vscdb"))?;
//! let ok = store.update_auth(&AuthUpdate::new().with_email("me@example.com"));
//! assert!(ok);
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod config;
pub mod error;

pub use auth::{AuthKey, AuthStore, AuthUpdate, CachedAuth, DEFAULT_SIGNUP_TYPE};
pub use config::StoreConfig;
pub use error::StoreError;
