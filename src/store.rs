//! Key/value settings store
//!
//! The engine reads two settings from the app's store: the active account
//! (`uid`) and the comment poll interval (`biliUpload.checkInterval`, in
//! seconds). Keys are dotted paths into a JSON document.

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::RwLock;

use crate::error::{Error, PlatformError, Result};

/// Key of the logged-in account id
pub const UID_KEY: &str = "uid";
/// Key of the comment poll interval in seconds
pub const CHECK_INTERVAL_KEY: &str = "biliUpload.checkInterval";

/// Settings get/set contract
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Value at `key`, if set
    async fn get(&self, key: &str) -> Result<Option<Value>>;

    /// Store `value` at `key`, creating intermediate objects
    async fn set(&self, key: &str, value: Value) -> Result<()>;
}

fn lookup<'a>(root: &'a Value, key: &str) -> Option<&'a Value> {
    key.split('.').try_fold(root, |node, segment| node.get(segment))
}

fn insert(root: &mut Value, key: &str, value: Value) {
    let mut node = root;
    let mut segments = key.split('.').peekable();
    while let Some(segment) = segments.next() {
        if !node.is_object() {
            *node = Value::Object(Map::new());
        }
        let Value::Object(map) = node else {
            return;
        };
        if segments.peek().is_none() {
            map.insert(segment.to_string(), value);
            return;
        }
        node = map
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
    }
}

/// In-memory store
#[derive(Debug)]
pub struct MemoryStore {
    data: RwLock<Value>,
}

impl MemoryStore {
    /// Empty store
    pub fn new() -> Self {
        Self::from_value(Value::Object(Map::new()))
    }

    /// Store seeded with a document
    pub fn from_value(data: Value) -> Self {
        Self {
            data: RwLock::new(data),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ConfigStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(lookup(&*self.data.read().await, key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<()> {
        insert(&mut *self.data.write().await, key, value);
        Ok(())
    }
}

/// JSON document on disk, loaded on open and rewritten on every `set`
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    data: RwLock<Value>,
}

impl JsonFileStore {
    /// Open `path`, starting empty if it does not exist
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let data = match tokio::fs::read(&path).await {
            Ok(bytes) if bytes.is_empty() => Value::Object(Map::new()),
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Value::Object(Map::new()),
            Err(e) => return Err(Error::Io(e)),
        };
        if !data.is_object() {
            return Err(Error::Config {
                message: format!("{} does not hold a JSON object", path.display()),
                key: None,
            });
        }
        tracing::debug!(path = %path.display(), "settings store opened");
        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    /// File backing this store
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self, data: &Value) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }
        let bytes = serde_json::to_vec_pretty(data)?;
        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl ConfigStore for JsonFileStore {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(lookup(&*self.data.read().await, key).cloned())
    }

    /// Memory only changes once the file write succeeded
    async fn set(&self, key: &str, value: Value) -> Result<()> {
        let mut data = self.data.write().await;
        let mut updated = data.clone();
        insert(&mut updated, key, value);
        self.persist(&updated).await?;
        *data = updated;
        Ok(())
    }
}

/// Account to act as: `explicit` when given, otherwise the stored `uid`
///
/// # Errors
///
/// [`PlatformError::NotLoggedIn`] when neither is set.
pub async fn resolve_uid(store: &dyn ConfigStore, explicit: Option<u64>) -> Result<u64> {
    if let Some(uid) = explicit.filter(|uid| *uid > 0) {
        return Ok(uid);
    }
    store
        .get(UID_KEY)
        .await?
        .and_then(|value| value.as_u64())
        .filter(|uid| *uid > 0)
        .ok_or_else(|| PlatformError::NotLoggedIn.into())
}

/// Comment poll interval from the store, or `fallback` when unset or invalid
pub async fn check_interval(store: &dyn ConfigStore, fallback: Duration) -> Duration {
    match store.get(CHECK_INTERVAL_KEY).await {
        Ok(Some(value)) => match value.as_u64().filter(|secs| *secs > 0) {
            Some(secs) => Duration::from_secs(secs),
            None => {
                tracing::warn!(%value, "ignoring invalid check interval");
                fallback
            }
        },
        Ok(None) => fallback,
        Err(e) => {
            tracing::warn!(error = %e, "failed to read check interval");
            fallback
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn dotted_keys_address_nested_values() {
        let store = MemoryStore::new();
        store.set(CHECK_INTERVAL_KEY, json!(120)).await.unwrap();

        assert_eq!(store.get("biliUpload").await.unwrap(), Some(json!({"checkInterval": 120})));
        assert_eq!(store.get(CHECK_INTERVAL_KEY).await.unwrap(), Some(json!(120)));
        assert_eq!(store.get("biliUpload.missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn set_replaces_scalar_on_the_path() {
        let store = MemoryStore::from_value(json!({"a": 1}));
        store.set("a.b", json!(true)).await.unwrap();
        assert_eq!(store.get("a").await.unwrap(), Some(json!({"b": true})));
    }

    #[tokio::test]
    async fn file_store_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.json");

        let store = JsonFileStore::open(&path).await.unwrap();
        store.set(UID_KEY, json!(10086)).await.unwrap();
        drop(store);

        let reopened = JsonFileStore::open(&path).await.unwrap();
        assert_eq!(reopened.get(UID_KEY).await.unwrap(), Some(json!(10086)));
    }

    #[tokio::test]
    async fn failed_write_leaves_previous_value() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let store = JsonFileStore::open(&path).await.unwrap();
        store.set(UID_KEY, json!(1)).await.unwrap();

        // A directory where the temp file goes makes the next write fail
        tokio::fs::create_dir(path.with_extension("tmp")).await.unwrap();
        let err = store.set(UID_KEY, json!(2)).await.unwrap_err();
        assert!(matches!(err, Error::Io(_)));

        assert_eq!(store.get(UID_KEY).await.unwrap(), Some(json!(1)));
        let reopened = JsonFileStore::open(&path).await.unwrap();
        assert_eq!(reopened.get(UID_KEY).await.unwrap(), Some(json!(1)));
    }

    #[tokio::test]
    async fn file_store_rejects_non_object_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        tokio::fs::write(&path, b"[1, 2]").await.unwrap();

        let err = JsonFileStore::open(&path).await.unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }

    #[tokio::test]
    async fn explicit_uid_wins_over_stored() {
        let store = MemoryStore::from_value(json!({"uid": 1}));
        assert_eq!(resolve_uid(&store, Some(2)).await.unwrap(), 2);
        assert_eq!(resolve_uid(&store, None).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn missing_uid_is_not_logged_in() {
        let store = MemoryStore::new();
        let err = resolve_uid(&store, None).await.unwrap_err();
        assert!(matches!(err, Error::Platform(PlatformError::NotLoggedIn)));
    }

    #[tokio::test]
    async fn check_interval_falls_back_when_unset_or_invalid() {
        let fallback = Duration::from_secs(600);
        let store = MemoryStore::new();
        assert_eq!(check_interval(&store, fallback).await, fallback);

        store.set(CHECK_INTERVAL_KEY, json!("soon")).await.unwrap();
        assert_eq!(check_interval(&store, fallback).await, fallback);

        store.set(CHECK_INTERVAL_KEY, json!(30)).await.unwrap();
        assert_eq!(check_interval(&store, fallback).await, Duration::from_secs(30));
    }
}
