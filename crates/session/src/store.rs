//! Durable key-value storage for the session record.
//!
//! The session occupies three keys: the opaque token, the user record as JSON
//! and the expiry as decimal epoch milliseconds. Reads that precede a
//! decision always go back to the store; nothing here caches.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use thiserror::Error;

use sitedesk_auth::UserRecord;
use sitedesk_core::{from_epoch_millis, to_epoch_millis};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage backend failed: {0}")]
    Backend(String),

    #[error("stored value for '{key}' is unreadable: {reason}")]
    Corrupt { key: String, reason: String },
}

/// Synchronous string key-value store.
pub trait KeyValueStore: Send + Sync + core::fmt::Debug {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

/// Process-local store (tests, previews).
#[derive(Debug, Default)]
pub struct InMemoryStore {
    entries: RwLock<HashMap<String, String>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl KeyValueStore for InMemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.entries.read().unwrap_or_else(PoisonError::into_inner).get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner).remove(key);
        Ok(())
    }
}

/// Store backed by a single JSON object file, rewritten on every mutation.
///
/// The file is re-read on every `get` so external edits are observed.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                StorageError::Backend(format!("failed to create {}: {e}", parent.display()))
            })?;
        }
        Ok(Self {
            path,
            write_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> Result<BTreeMap<String, String>, StorageError> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(e) => {
                return Err(StorageError::Backend(format!(
                    "failed to read {}: {e}",
                    self.path.display()
                )));
            }
        };
        if raw.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        serde_json::from_str(&raw).map_err(|e| StorageError::Corrupt {
            key: self.path.display().to_string(),
            reason: e.to_string(),
        })
    }

    fn write_all(&self, entries: &BTreeMap<String, String>) -> Result<(), StorageError> {
        let json = serde_json::to_string_pretty(entries)
            .map_err(|e| StorageError::Backend(format!("failed to encode store: {e}")))?;
        // Write-then-rename so a crash never leaves a half-written file.
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, json)
            .and_then(|_| std::fs::rename(&tmp, &self.path))
            .map_err(|e| {
                StorageError::Backend(format!("failed to write {}: {e}", self.path.display()))
            })
    }

    fn mutate(&self, f: impl FnOnce(&mut BTreeMap<String, String>)) -> Result<(), StorageError> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut entries = self.read_all()?;
        f(&mut entries);
        self.write_all(&entries)
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.read_all()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.mutate(|entries| {
            entries.insert(key.to_string(), value.to_string());
        })
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.mutate(|entries| {
            entries.remove(key);
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Session record on top of the key-value store
// ─────────────────────────────────────────────────────────────────────────────

/// The durable part of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedSession {
    pub token: String,
    pub user: UserRecord,
    pub expires_at: DateTime<Utc>,
}

/// What a cold-boot read found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoredSession {
    Absent,
    Present(PersistedSession),
    /// Some keys present, or a value that does not parse.
    Unreadable(String),
}

/// Typed access to the three session keys.
#[derive(Debug, Clone)]
pub struct SessionStorage {
    store: Arc<dyn KeyValueStore>,
    token_key: String,
    user_key: String,
    expiry_key: String,
}

impl SessionStorage {
    pub fn new(store: Arc<dyn KeyValueStore>, namespace: &str) -> Self {
        Self {
            store,
            token_key: format!("{namespace}.token"),
            user_key: format!("{namespace}.user"),
            expiry_key: format!("{namespace}.expiry"),
        }
    }

    pub fn keys(&self) -> [&str; 3] {
        [self.token_key.as_str(), self.user_key.as_str(), self.expiry_key.as_str()]
    }

    pub fn load(&self) -> Result<StoredSession, StorageError> {
        let token = self.store.get(&self.token_key)?;
        let user = self.store.get(&self.user_key)?;
        let expiry = self.store.get(&self.expiry_key)?;

        let (token, user, expiry) = match (token, user, expiry) {
            (None, None, None) => return Ok(StoredSession::Absent),
            (Some(t), Some(u), Some(e)) => (t, u, e),
            _ => return Ok(StoredSession::Unreadable("session record is incomplete".to_string())),
        };
        if token.trim().is_empty() {
            return Ok(StoredSession::Unreadable("session token is empty".to_string()));
        }

        let user: UserRecord = match serde_json::from_str(&user) {
            Ok(user) => user,
            Err(e) => return Ok(StoredSession::Unreadable(format!("user record: {e}"))),
        };
        let Some(expires_at) = parse_expiry(&expiry) else {
            return Ok(StoredSession::Unreadable(format!(
                "expiry '{expiry}' is not epoch milliseconds"
            )));
        };

        Ok(StoredSession::Present(PersistedSession { token, user, expires_at }))
    }

    /// Persisted expiry, re-read from the store.
    pub fn read_expiry(&self) -> Result<Option<DateTime<Utc>>, StorageError> {
        match self.store.get(&self.expiry_key)? {
            None => Ok(None),
            Some(raw) => parse_expiry(&raw).map(Some).ok_or_else(|| StorageError::Corrupt {
                key: self.expiry_key.clone(),
                reason: format!("'{raw}' is not epoch milliseconds"),
            }),
        }
    }

    pub fn save(&self, session: &PersistedSession) -> Result<(), StorageError> {
        self.store.set(&self.token_key, &session.token)?;
        self.save_user(&session.user)?;
        self.save_expiry(session.expires_at)
    }

    pub fn save_user(&self, user: &UserRecord) -> Result<(), StorageError> {
        let json = serde_json::to_string(user)
            .map_err(|e| StorageError::Backend(format!("failed to encode user record: {e}")))?;
        self.store.set(&self.user_key, &json)
    }

    pub fn save_expiry(&self, expires_at: DateTime<Utc>) -> Result<(), StorageError> {
        self.store.set(&self.expiry_key, &to_epoch_millis(expires_at).to_string())
    }

    /// Remove every session key. Attempts all three even if one fails.
    pub fn clear(&self) -> Result<(), StorageError> {
        let mut first_error = None;
        for key in self.keys() {
            if let Err(e) = self.store.remove(key) {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

fn parse_expiry(raw: &str) -> Option<DateTime<Utc>> {
    raw.trim().parse::<i64>().ok().and_then(from_epoch_millis)
}
