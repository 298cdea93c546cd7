use chrono::NaiveDate;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::config::{Preferences, SyncConfig};
use crate::core::task::Task;

pub const TASKS_KEY: &str = "tasks";
pub const PREFERENCES_KEY: &str = "preferences";
pub const SYNC_CONFIG_KEY: &str = "syncConfig";
pub const LAST_ROLLOVER_KEY: &str = "lastRollover";
pub const SYNC_PENDING_KEY: &str = "syncPending";

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("storage I/O failed on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid stored value for {key}: {source}")]
    Decode {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to encode store: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Asynchronous key/value storage. Missing keys are simply absent from the
/// result of `get`.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, keys: &[&str]) -> impl Future<Output = Result<HashMap<String, Value>, StorageError>> + Send;

    fn set(&self, entries: HashMap<String, Value>) -> impl Future<Output = Result<(), StorageError>> + Send;
}

impl<T: KeyValueStore> KeyValueStore for &T {
    fn get(&self, keys: &[&str]) -> impl Future<Output = Result<HashMap<String, Value>, StorageError>> + Send {
        (**self).get(keys)
    }

    fn set(&self, entries: HashMap<String, Value>) -> impl Future<Output = Result<(), StorageError>> + Send {
        (**self).set(entries)
    }
}

/// All keys in one JSON object on disk, rewritten atomically on every `set`.
pub struct JsonFileStore {
    path: PathBuf,
    // serializes read-modify-write cycles within this process
    lock: tokio::sync::Mutex<()>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_all(&self) -> Result<Map<String, Value>, StorageError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) if content.trim().is_empty() => Ok(Map::new()),
            Ok(content) => serde_json::from_str(&content).map_err(|source| StorageError::Decode {
                key: self.path.display().to_string(),
                source,
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Map::new()),
            Err(source) => Err(StorageError::Io {
                path: self.path.clone(),
                source,
            }),
        }
    }

    async fn write_all(&self, map: &Map<String, Value>) -> Result<(), StorageError> {
        let io_err = |source| StorageError::Io {
            path: self.path.clone(),
            source,
        };
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
        }
        let json = serde_json::to_string_pretty(map)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await.map_err(io_err)?;
        tokio::fs::rename(&tmp, &self.path).await.map_err(io_err)?;
        Ok(())
    }
}

impl KeyValueStore for JsonFileStore {
    async fn get(&self, keys: &[&str]) -> Result<HashMap<String, Value>, StorageError> {
        let _guard = self.lock.lock().await;
        let mut all = self.read_all().await?;
        Ok(keys
            .iter()
            .filter_map(|k| all.remove(*k).map(|v| (k.to_string(), v)))
            .collect())
    }

    async fn set(&self, entries: HashMap<String, Value>) -> Result<(), StorageError> {
        let _guard = self.lock.lock().await;
        let mut all = self.read_all().await?;
        all.extend(entries);
        self.write_all(&all).await
    }
}

/// In-process store, used by tests and when no data directory is wanted.
#[derive(Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    async fn get(&self, keys: &[&str]) -> Result<HashMap<String, Value>, StorageError> {
        let values = self.values.lock().unwrap_or_else(|e| e.into_inner());
        Ok(keys
            .iter()
            .filter_map(|k| values.get(*k).map(|v| (k.to_string(), v.clone())))
            .collect())
    }

    async fn set(&self, entries: HashMap<String, Value>) -> Result<(), StorageError> {
        let mut values = self.values.lock().unwrap_or_else(|e| e.into_inner());
        values.extend(entries);
        Ok(())
    }
}

/// Typed access to the keys this application stores.
pub struct Storage<S> {
    store: S,
}

impl<S: KeyValueStore> Storage<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn inner(&self) -> &S {
        &self.store
    }

    async fn load<T: DeserializeOwned + Default>(&self, key: &str) -> Result<T, StorageError> {
        let mut values = self.store.get(&[key]).await?;
        match values.remove(key) {
            None | Some(Value::Null) => Ok(T::default()),
            Some(value) => serde_json::from_value(value).map_err(|source| StorageError::Decode {
                key: key.to_string(),
                source,
            }),
        }
    }

    async fn save<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<(), StorageError> {
        let value = serde_json::to_value(value)?;
        self.store.set(HashMap::from([(key.to_string(), value)])).await
    }

    pub async fn load_tasks(&self) -> Result<Vec<Task>, StorageError> {
        self.load(TASKS_KEY).await
    }

    pub async fn save_tasks(&self, tasks: &[Task]) -> Result<(), StorageError> {
        self.save(TASKS_KEY, tasks).await
    }

    pub async fn load_preferences(&self) -> Result<Preferences, StorageError> {
        self.load(PREFERENCES_KEY).await
    }

    pub async fn save_preferences(&self, preferences: &Preferences) -> Result<(), StorageError> {
        self.save(PREFERENCES_KEY, preferences).await
    }

    pub async fn load_sync_config(&self) -> Result<SyncConfig, StorageError> {
        self.load(SYNC_CONFIG_KEY).await
    }

    pub async fn save_sync_config(&self, config: &SyncConfig) -> Result<(), StorageError> {
        self.save(SYNC_CONFIG_KEY, config).await
    }

    pub async fn load_last_rollover(&self) -> Result<Option<NaiveDate>, StorageError> {
        self.load(LAST_ROLLOVER_KEY).await
    }

    pub async fn save_last_rollover(&self, day: NaiveDate) -> Result<(), StorageError> {
        self.save(LAST_ROLLOVER_KEY, &day).await
    }

    /// Whether local edits have not reached the vault yet.
    pub async fn load_sync_pending(&self) -> Result<bool, StorageError> {
        self.load(SYNC_PENDING_KEY).await
    }

    pub async fn save_sync_pending(&self, pending: bool) -> Result<(), StorageError> {
        self.save(SYNC_PENDING_KEY, &pending).await
    }
}
