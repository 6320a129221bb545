use std::fmt;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use rusqlite::types::ValueRef;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension, TransactionBehavior};
use serde::Serialize;
use tracing::{debug, info, warn};

use super::keys::{AuthKey, DEFAULT_SIGNUP_TYPE};
use crate::config::StoreConfig;
use crate::error::StoreError;

const CREATE_TABLE_SQL: &str =
    "CREATE TABLE IF NOT EXISTS itemTable (key TEXT PRIMARY KEY, value TEXT)";

const UPSERT_SQL: &str = "INSERT INTO itemTable (key, value) VALUES (?1, ?2)
     ON CONFLICT(key) DO UPDATE SET value = excluded.value";

/// A partial update of the cached credentials.
///
/// Every field is optional. Fields left as `None` are not written, so
/// existing values under those keys stay as they are.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct AuthUpdate {
    pub email: Option<String>,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub signup_type: Option<String>,
}

impl AuthUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    pub fn with_refresh_token(mut self, token: impl Into<String>) -> Self {
        self.refresh_token = Some(token.into());
        self
    }

    pub fn with_signup_type(mut self, signup_type: impl Into<String>) -> Self {
        self.signup_type = Some(signup_type.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.email.is_none()
            && self.access_token.is_none()
            && self.refresh_token.is_none()
            && self.signup_type.is_none()
    }

    /// Resolve the update into the rows it will write, in key order.
    /// The signup marker falls back to [`DEFAULT_SIGNUP_TYPE`] whenever
    /// any other field is present.
    pub fn entries(&self) -> Vec<(AuthKey, &str)> {
        let mut entries = Vec::with_capacity(AuthKey::ALL.len());

        if let Some(ref email) = self.email {
            entries.push((AuthKey::CachedEmail, email.as_str()));
        }
        if let Some(ref token) = self.access_token {
            entries.push((AuthKey::AccessToken, token.as_str()));
        }
        if let Some(ref token) = self.refresh_token {
            entries.push((AuthKey::RefreshToken, token.as_str()));
        }

        match self.signup_type {
            Some(ref signup_type) => {
                entries.push((AuthKey::CachedSignUpType, signup_type.as_str()))
            }
            None if !entries.is_empty() => {
                entries.push((AuthKey::CachedSignUpType, DEFAULT_SIGNUP_TYPE))
            }
            None => {}
        }

        entries
    }
}

// Tokens stay out of debug output
impl fmt::Debug for AuthUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |v: &Option<String>| v.as_ref().map(|_| "<redacted>");
        f.debug_struct("AuthUpdate")
            .field("email", &self.email)
            .field("access_token", &redact(&self.access_token))
            .field("refresh_token", &redact(&self.refresh_token))
            .field("signup_type", &self.signup_type)
            .finish()
    }
}

/// The cached credential fields as currently stored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CachedAuth {
    pub email: Option<String>,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub signup_type: Option<String>,
}

impl CachedAuth {
    pub fn get(&self, key: AuthKey) -> Option<&str> {
        match key {
            AuthKey::CachedEmail => self.email.as_deref(),
            AuthKey::AccessToken => self.access_token.as_deref(),
            AuthKey::RefreshToken => self.refresh_token.as_deref(),
            AuthKey::CachedSignUpType => self.signup_type.as_deref(),
        }
    }

    fn set(&mut self, key: AuthKey, value: Option<String>) {
        match key {
            AuthKey::CachedEmail => self.email = value,
            AuthKey::AccessToken => self.access_token = value,
            AuthKey::RefreshToken => self.refresh_token = value,
            AuthKey::CachedSignUpType => self.signup_type = value,
        }
    }

    pub fn is_empty(&self) -> bool {
        AuthKey::ALL.iter().all(|&key| self.get(key).is_none())
    }
}

/// SQLite-backed store for the cached credential keys.
pub struct AuthStore {
    conn: Mutex<Connection>,
    path: PathBuf,
}

impl AuthStore {
    /// Open the database named by `config` and make sure the item table exists.
    pub fn open(config: &StoreConfig) -> Result<Self, StoreError> {
        let open_err = |source: rusqlite::Error| StoreError::Open {
            path: config.db_path.clone(),
            source,
        };

        let mut flags = OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        if config.create_if_missing {
            flags |= OpenFlags::SQLITE_OPEN_CREATE;
        }

        let conn = Connection::open_with_flags(plain_path(&config.db_path), flags).map_err(open_err)?;
        conn.busy_timeout(config.busy_timeout()).map_err(open_err)?;
        conn.execute_batch(CREATE_TABLE_SQL).map_err(open_err)?;

        debug!(path = %config.db_path.display(), "Opened auth store");

        Ok(Self {
            conn: Mutex::new(conn),
            path: config.db_path.clone(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the provided fields.
    ///
    /// Returns `false` when nothing was provided or the write failed; in
    /// the latter case none of the fields are written. Use
    /// [`AuthStore::try_update_auth`] to get at the reason.
    pub fn update_auth(&self, update: &AuthUpdate) -> bool {
        match self.try_update_auth(update) {
            Ok(_) => true,
            Err(StoreError::NoFields) => {
                warn!("Auth update called without any fields");
                false
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Failed to update cached auth");
                false
            }
        }
    }

    /// Write the provided fields in a single transaction, returning how many
    /// keys were written.
    pub fn try_update_auth(&self, update: &AuthUpdate) -> Result<usize, StoreError> {
        let entries = update.entries();
        if entries.is_empty() {
            return Err(StoreError::NoFields);
        }

        let mut conn = self.conn.lock();
        // IMMEDIATE takes the write lock up front so concurrent writers
        // queue on the busy timeout instead of failing at commit
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        {
            let mut stmt = tx.prepare(UPSERT_SQL)?;
            for &(key, value) in &entries {
                stmt.execute(params![key.as_str(), value])?;
            }
        }
        tx.commit()?;

        let keys: Vec<&str> = entries.iter().map(|(key, _)| key.as_str()).collect();
        info!(count = entries.len(), ?keys, "Updated cached auth");

        Ok(entries.len())
    }

    /// Read a single cached value
    pub fn get(&self, key: AuthKey) -> Result<Option<String>, StoreError> {
        let conn = self.conn.lock();
        let value = conn
            .query_row(
                "SELECT value FROM itemTable WHERE key = ?1",
                params![key.as_str()],
                |row| Ok(value_to_string(row.get_ref(0)?)),
            )
            .optional()?;
        Ok(value.flatten())
    }

    /// Read all cached credential fields at once
    pub fn cached_auth(&self) -> Result<CachedAuth, StoreError> {
        let conn = self.conn.lock();
        let mut stmt =
            conn.prepare("SELECT key, value FROM itemTable WHERE key IN (?1, ?2, ?3, ?4)")?;
        let rows = stmt.query_map(
            params![
                AuthKey::CachedEmail.as_str(),
                AuthKey::AccessToken.as_str(),
                AuthKey::RefreshToken.as_str(),
                AuthKey::CachedSignUpType.as_str(),
            ],
            |row| Ok((row.get::<_, String>(0)?, value_to_string(row.get_ref(1)?))),
        )?;

        let mut cached = CachedAuth::default();
        for row in rows {
            let (key, value) = row?;
            if let Ok(key) = key.parse::<AuthKey>() {
                cached.set(key, value);
            }
        }
        Ok(cached)
    }
}

/// SQLite reads a name starting with `file:` as a URI even without the URI
/// open flag when built with `SQLITE_USE_URI`; anchor relative names so they
/// always mean a file on disk.
fn plain_path(path: &Path) -> PathBuf {
    let is_uri_like = path
        .to_str()
        .map(|s| s.starts_with("file:"))
        .unwrap_or(false);
    if is_uri_like {
        Path::new(".").join(path)
    } else {
        path.to_path_buf()
    }
}

/// The host application declares `value` loosely and may have stored blobs,
/// so accept anything that reads as text.
fn value_to_string(value: ValueRef<'_>) -> Option<String> {
    match value {
        ValueRef::Null => None,
        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
            Some(String::from_utf8_lossy(bytes).into_owned())
        }
        ValueRef::Integer(i) => Some(i.to_string()),
        ValueRef::Real(f) => Some(f.to_string()),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_store() -> (TempDir, AuthStore) {
        let tmp = TempDir::new().unwrap();
        let config = StoreConfig::new(tmp.path().join("state.vscdb")).with_create_if_missing(true);
        let store = AuthStore::open(&config).unwrap();
        (tmp, store)
    }

    /// Read a value through a separate connection, the way the host application would
    fn read_value(store: &AuthStore, key: &str) -> Option<String> {
        let conn = Connection::open(store.path()).unwrap();
        conn.query_row(
            "SELECT value FROM itemTable WHERE key = ?1",
            params![key],
            |row| row.get(0),
        )
        .optional()
        .unwrap()
    }

    fn row_count(store: &AuthStore) -> i64 {
        let conn = Connection::open(store.path()).unwrap();
        conn.query_row("SELECT COUNT(*) FROM itemTable", [], |row| row.get(0))
            .unwrap()
    }

    #[test]
    fn test_update_auth_new_values() {
        let (_tmp, store) = test_store();

        let update = AuthUpdate::new()
            .with_email("test@example.com")
            .with_access_token("test_access_token")
            .with_refresh_token("test_refresh_token");
        assert!(store.update_auth(&update));

        assert_eq!(read_value(&store, "cursorAuth/cachedEmail").as_deref(), Some("test@example.com"));
        assert_eq!(read_value(&store, "cursorAuth/accessToken").as_deref(), Some("test_access_token"));
        assert_eq!(read_value(&store, "cursorAuth/refreshToken").as_deref(), Some("test_refresh_token"));
        assert_eq!(read_value(&store, "cursorAuth/cachedSignUpType").as_deref(), Some("Auth_0"));
    }

    #[test]
    fn test_update_auth_partial_update() {
        let (_tmp, store) = test_store();

        assert!(store.update_auth(&AuthUpdate::new().with_email("test@example.com")));

        assert_eq!(read_value(&store, "cursorAuth/cachedEmail").as_deref(), Some("test@example.com"));
        assert_eq!(read_value(&store, "cursorAuth/cachedSignUpType").as_deref(), Some("Auth_0"));
        assert_eq!(read_value(&store, "cursorAuth/accessToken"), None);
        assert_eq!(read_value(&store, "cursorAuth/refreshToken"), None);
    }

    #[test]
    fn test_update_auth_no_values() {
        let (_tmp, store) = test_store();

        assert!(!store.update_auth(&AuthUpdate::new()));
        assert_eq!(row_count(&store), 0);
        assert!(matches!(
            store.try_update_auth(&AuthUpdate::new()),
            Err(StoreError::NoFields)
        ));
    }

    #[test]
    fn test_every_subset_writes_exactly_its_keys() {
        let fields = [
            (AuthKey::CachedEmail, "a@x.com"),
            (AuthKey::AccessToken, "access"),
            (AuthKey::RefreshToken, "refresh"),
        ];

        for mask in 1u8..8 {
            let (_tmp, store) = test_store();
            let mut update = AuthUpdate::new();
            if mask & 1 != 0 {
                update = update.with_email(fields[0].1);
            }
            if mask & 2 != 0 {
                update = update.with_access_token(fields[1].1);
            }
            if mask & 4 != 0 {
                update = update.with_refresh_token(fields[2].1);
            }

            assert!(store.update_auth(&update), "mask {}", mask);

            for (i, (key, value)) in fields.iter().enumerate() {
                let expected = (mask & (1 << i) != 0).then_some(*value);
                assert_eq!(store.get(*key).unwrap().as_deref(), expected, "mask {}", mask);
            }
            assert_eq!(
                store.get(AuthKey::CachedSignUpType).unwrap().as_deref(),
                Some(DEFAULT_SIGNUP_TYPE)
            );
            assert_eq!(row_count(&store), i64::from(mask.count_ones()) + 1);
        }
    }

    #[test]
    fn test_last_write_wins() {
        let (_tmp, store) = test_store();

        assert!(store.update_auth(&AuthUpdate::new().with_email("a@x.com")));
        assert!(store.update_auth(&AuthUpdate::new().with_email("b@x.com")));

        let conn = Connection::open(store.path()).unwrap();
        let rows: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM itemTable WHERE key = 'cursorAuth/cachedEmail'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(rows, 1);
        assert_eq!(read_value(&store, "cursorAuth/cachedEmail").as_deref(), Some("b@x.com"));
    }

    #[test]
    fn test_partial_update_keeps_prior_values() {
        let (_tmp, store) = test_store();

        let first = AuthUpdate::new()
            .with_email("old@example.com")
            .with_access_token("old_access")
            .with_refresh_token("old_refresh")
            .with_signup_type("Auth_1");
        assert!(store.update_auth(&first));

        assert!(store.update_auth(&AuthUpdate::new().with_email("new@example.com")));

        let cached = store.cached_auth().unwrap();
        assert_eq!(cached.email.as_deref(), Some("new@example.com"));
        assert_eq!(cached.access_token.as_deref(), Some("old_access"));
        assert_eq!(cached.refresh_token.as_deref(), Some("old_refresh"));
        // Defaulted again because the second call didn't name one
        assert_eq!(cached.signup_type.as_deref(), Some("Auth_0"));
    }

    #[test]
    fn test_explicit_signup_type() {
        let (_tmp, store) = test_store();

        let update = AuthUpdate::new()
            .with_access_token("token")
            .with_signup_type("Auth_1");
        assert_eq!(store.try_update_auth(&update).unwrap(), 2);
        assert_eq!(read_value(&store, "cursorAuth/cachedSignUpType").as_deref(), Some("Auth_1"));
    }

    #[test]
    fn test_signup_type_alone() {
        let (_tmp, store) = test_store();

        assert!(store.update_auth(&AuthUpdate::new().with_signup_type("Auth_1")));
        assert_eq!(row_count(&store), 1);
        assert_eq!(read_value(&store, "cursorAuth/cachedSignUpType").as_deref(), Some("Auth_1"));
    }

    #[test]
    fn test_empty_string_counts_as_provided() {
        let (_tmp, store) = test_store();

        assert!(store.update_auth(&AuthUpdate::new().with_email("")));
        assert_eq!(read_value(&store, "cursorAuth/cachedEmail").as_deref(), Some(""));
    }

    #[test]
    fn test_failed_write_leaves_nothing_behind() {
        let (_tmp, store) = test_store();

        let conn = Connection::open(store.path()).unwrap();
        conn.execute_batch(
            "CREATE TRIGGER block_refresh BEFORE INSERT ON itemTable
             WHEN NEW.key = 'cursorAuth/refreshToken'
             BEGIN SELECT RAISE(ABORT, 'refresh token blocked'); END;",
        )
        .unwrap();

        let update = AuthUpdate::new()
            .with_email("test@example.com")
            .with_refresh_token("test_refresh_token");
        assert!(!store.update_auth(&update));

        // The email was upserted before the failing row; it must be rolled back
        assert_eq!(row_count(&store), 0);
        assert!(matches!(store.try_update_auth(&update), Err(StoreError::Sqlite(_))));
    }

    #[test]
    fn test_missing_table_reports_failure() {
        let (_tmp, store) = test_store();

        let conn = Connection::open(store.path()).unwrap();
        conn.execute_batch("DROP TABLE itemTable").unwrap();

        assert!(!store.update_auth(&AuthUpdate::new().with_email("test@example.com")));
    }

    #[test]
    fn test_unrelated_rows_untouched() {
        let (_tmp, store) = test_store();

        let conn = Connection::open(store.path()).unwrap();
        conn.execute(
            "INSERT INTO itemTable (key, value) VALUES ('telemetry.machineId', 'abc123')",
            [],
        )
        .unwrap();

        assert!(store.update_auth(&AuthUpdate::new().with_access_token("token")));
        assert_eq!(read_value(&store, "telemetry.machineId").as_deref(), Some("abc123"));
        assert_eq!(row_count(&store), 3);
    }

    #[test]
    fn test_open_missing_file_without_create_fails() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("missing.vscdb");

        let result = AuthStore::open(&StoreConfig::new(&path));
        assert!(matches!(result, Err(StoreError::Open { .. })));
        assert!(!path.exists());
    }

    #[test]
    fn test_open_existing_database_creates_table() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("state.vscdb");
        {
            let conn = Connection::open(&path).unwrap();
            conn.execute_batch("CREATE TABLE other (id INTEGER)").unwrap();
        }

        let store = AuthStore::open(&StoreConfig::new(&path)).unwrap();
        assert!(store.update_auth(&AuthUpdate::new().with_email("test@example.com")));
        assert_eq!(store.get(AuthKey::CachedEmail).unwrap().as_deref(), Some("test@example.com"));
    }

    #[test]
    fn test_reopen_keeps_values() {
        let (tmp, store) = test_store();
        assert!(store.update_auth(&AuthUpdate::new().with_email("test@example.com")));
        drop(store);

        let store = AuthStore::open(&StoreConfig::new(tmp.path().join("state.vscdb"))).unwrap();
        assert_eq!(store.get(AuthKey::CachedEmail).unwrap().as_deref(), Some("test@example.com"));
    }

    #[test]
    fn test_cached_auth_reads_blob_values() {
        let (_tmp, store) = test_store();

        let conn = Connection::open(store.path()).unwrap();
        conn.execute(
            "INSERT INTO itemTable (key, value) VALUES ('cursorAuth/accessToken', ?1)",
            params![b"blob_token".to_vec()],
        )
        .unwrap();

        let cached = store.cached_auth().unwrap();
        assert_eq!(cached.access_token.as_deref(), Some("blob_token"));
        assert_eq!(cached.email, None);
    }

    #[test]
    fn test_cached_auth_empty() {
        let (_tmp, store) = test_store();
        let cached = store.cached_auth().unwrap();
        assert!(cached.is_empty());
        assert_eq!(store.get(AuthKey::AccessToken).unwrap(), None);
    }

    #[test]
    fn test_file_prefixed_path_is_not_a_uri() {
        assert_eq!(
            plain_path(Path::new("file:state.vscdb?mode=ro")),
            PathBuf::from("./file:state.vscdb?mode=ro")
        );
        assert_eq!(
            plain_path(Path::new("/tmp/file:state.vscdb")),
            PathBuf::from("/tmp/file:state.vscdb")
        );
        assert_eq!(plain_path(Path::new("state.vscdb")), PathBuf::from("state.vscdb"));
    }

    #[test]
    fn test_entries_default_signup_type() {
        assert!(AuthUpdate::new().entries().is_empty());

        let update = AuthUpdate::new().with_refresh_token("r");
        let entries = update.entries();
        assert_eq!(
            entries,
            vec![
                (AuthKey::RefreshToken, "r"),
                (AuthKey::CachedSignUpType, DEFAULT_SIGNUP_TYPE),
            ]
        );
    }

    #[test]
    fn test_debug_redacts_tokens() {
        let update = AuthUpdate::new()
            .with_email("test@example.com")
            .with_access_token("secret_access");
        let debug = format!("{:?}", update);
        assert!(debug.contains("test@example.com"));
        assert!(!debug.contains("secret_access"));
    }
}
