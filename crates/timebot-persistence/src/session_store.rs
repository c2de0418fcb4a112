//! Key-value storage for conversation blobs with expiry.
//!
//! The store knows nothing about what a session contains: callers hand it an
//! opaque serialized string. Writes for one key are atomic; concurrent writes
//! for the same key are last-write-wins.
//!
//! The file-backed store keeps one JSON envelope per key:
//! ```text
//! sessions/
//! ├── timebot_42_1001.json
//! └── timebot_-10077_1002.json
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::atomic::{atomic_write_json, read_optional, remove_if_exists};
use crate::error::{PersistenceError, Result};

/// Storage for serialized sessions.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Returns the live blob for `key`. Missing, expired and unreadable
    /// entries all come back as `None`.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Stores `blob` under `key`, replacing any previous value.
    async fn put(&self, key: &str, blob: String, ttl: Duration) -> Result<()>;

    /// Removes `key`. Removing a missing key succeeds.
    async fn delete(&self, key: &str) -> Result<()>;
}

/// On-disk and in-memory envelope around a blob.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredBlob {
    value: String,
    expires_at: DateTime<Utc>,
}

impl StoredBlob {
    fn new(value: String, ttl: Duration) -> Self {
        let ttl = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX);
        let expires_at = Utc::now()
            .checked_add_signed(ttl)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        Self { value, expires_at }
    }

    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Process-local session store.
#[derive(Default)]
pub struct MemorySessionStore {
    entries: RwLock<HashMap<String, StoredBlob>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored (possibly expired) entries.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Drops expired entries, returning how many were removed.
    pub async fn purge_expired(&self) -> usize {
        let now = Utc::now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, blob| !blob.is_expired(now));
        before - entries.len()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let now = Utc::now();
        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                None => return Ok(None),
                Some(blob) if !blob.is_expired(now) => return Ok(Some(blob.value.clone())),
                Some(_) => {}
            }
        }
        self.entries.write().await.remove(key);
        debug!(key = %key, "Session expired");
        Ok(None)
    }

    async fn put(&self, key: &str, blob: String, ttl: Duration) -> Result<()> {
        self.entries
            .write()
            .await
            .insert(key.to_string(), StoredBlob::new(blob, ttl));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }
}

/// Session store writing one file per key under a directory.
pub struct FileSessionStore {
    dir: PathBuf,
}

impl FileSessionStore {
    /// Creates a store rooted at `dir`. The directory is created lazily.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let name: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
            .collect();
        self.dir.join(format!("{}.json", name))
    }

    /// Removes expired and unreadable files, returning how many were removed.
    pub fn purge_expired(&self) -> Result<usize> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(source) => {
                return Err(PersistenceError::ReadError {
                    path: self.dir.clone(),
                    source,
                })
            }
        };

        let now = Utc::now();
        let mut removed = 0;
        for entry in entries.flatten() {
            let path = entry.path();
            if !path.extension().is_some_and(|ext| ext == "json") {
                continue;
            }
            let live = read_optional(&path)
                .ok()
                .flatten()
                .and_then(|data| serde_json::from_str::<StoredBlob>(&data).ok())
                .is_some_and(|blob| !blob.is_expired(now));
            if !live {
                remove_if_exists(&path)?;
                removed += 1;
            }
        }
        Ok(removed)
    }
}

#[async_trait]
impl SessionStore for FileSessionStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_for(key);
        let data = match read_optional(&path) {
            Ok(Some(data)) => data,
            Ok(None) => return Ok(None),
            Err(e) => {
                warn!(key = %key, error = %e, "Unreadable session file, treating as absent");
                return Ok(None);
            }
        };

        let blob: StoredBlob = match serde_json::from_str(&data) {
            Ok(blob) => blob,
            Err(e) => {
                warn!(key = %key, error = %e, "Corrupt session envelope, discarding");
                remove_if_exists(&path)?;
                return Ok(None);
            }
        };

        if blob.is_expired(Utc::now()) {
            debug!(key = %key, "Session expired");
            remove_if_exists(&path)?;
            return Ok(None);
        }

        Ok(Some(blob.value))
    }

    async fn put(&self, key: &str, blob: String, ttl: Duration) -> Result<()> {
        atomic_write_json(&self.path_for(key), &StoredBlob::new(blob, ttl))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        remove_if_exists(&self.path_for(key))
    }
}
