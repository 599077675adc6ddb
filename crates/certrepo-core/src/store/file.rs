// # File Store
//
// File-based implementation of KvStore with crash recovery.
//
// ## Crash Recovery
//
// - Atomic writes: Uses write-then-rename for atomicity
// - Corruption detection: Validates JSON on load
// - Automatic backup: Keeps .backup of last known good document
// - Recovery: Falls back to backup if corruption detected
// - Rollback: A mutation whose write fails is undone in memory
//
// ## File Format
//
// ```json
// {
//   "version": "1.0",
//   "entries": {
//     "cert:zone:example.com": { "zone": "example.com", ... }
//   }
// }
// ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, trace, warn};

use crate::error::{Error, Result};
use crate::store::scan_map;
use crate::traits::KvStore;

/// Store file format version
const STORE_FILE_VERSION: &str = "1.0";

/// File-based store with crash recovery
///
/// All entries are held in memory and the whole document is rewritten on
/// every mutation.
///
/// # Example
///
/// ```rust,no_run
/// use certrepo_core::{FileStore, KvStore};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = FileStore::new("/var/lib/certd/store.json").await?;
///     store.set("cert:self:root", serde_json::json!({"name": "root"})).await?;
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    state: RwLock<FileState>,
    /// Serializes writers so concurrent mutations never share the temp file
    write_lock: Mutex<()>,
}

#[derive(Debug)]
struct FileState {
    entries: BTreeMap<String, Value>,
    dirty: bool,
}

/// Serializable store file format
#[derive(Debug, serde::Serialize, serde::Deserialize)]
struct StoreFileFormat {
    version: String,
    entries: BTreeMap<String, Value>,
}

impl FileStore {
    /// Create or load a file store
    ///
    /// This will:
    /// 1. Try to load the existing store file
    /// 2. If corruption detected, try to load from backup
    /// 3. If both fail, start with an empty store
    /// 4. Create parent directories if needed
    pub async fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            fs::create_dir_all(parent).await.map_err(|e| {
                Error::config(format!(
                    "Failed to create store directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let entries = Self::load_with_recovery(&path).await?;

        Ok(Self {
            path,
            state: RwLock::new(FileState {
                entries,
                dirty: false,
            }),
            write_lock: Mutex::new(()),
        })
    }

    /// Path of the store document
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the document, falling back to the backup on corruption
    async fn load_with_recovery(path: &Path) -> Result<BTreeMap<String, Value>> {
        let err = match Self::load(path).await {
            Ok(entries) => {
                debug!("Loaded store from file: {} entries", entries.len());
                return Ok(entries);
            }
            Err(err @ Error::Codec(_)) => err,
            Err(other) => return Err(other),
        };

        warn!("Store file appears corrupted: {}. Attempting recovery from backup.", err);

        let backup_path = Self::backup_path(path);
        if !backup_path.exists() {
            warn!("No backup file found. Starting with empty store.");
            return Ok(BTreeMap::new());
        }

        match Self::load(&backup_path).await {
            Ok(entries) => {
                info!("Recovered store from backup: {} entries", entries.len());
                if let Err(restore_err) = fs::copy(&backup_path, path).await {
                    error!("Failed to restore store file from backup: {}", restore_err);
                }
                Ok(entries)
            }
            Err(backup_err) => {
                error!("Backup also corrupted: {}. Starting with empty store.", backup_err);
                Ok(BTreeMap::new())
            }
        }
    }

    async fn load(path: &Path) -> Result<BTreeMap<String, Value>> {
        if !path.exists() {
            debug!("Store file does not exist: {}", path.display());
            return Ok(BTreeMap::new());
        }

        let content = fs::read_to_string(path).await.map_err(|e| {
            Error::store(format!("Failed to read store file {}: {}", path.display(), e))
        })?;

        let document: StoreFileFormat = serde_json::from_str(&content)?;

        if document.version != STORE_FILE_VERSION {
            warn!(
                "Store file version mismatch: expected {}, got {}. Attempting to load anyway.",
                STORE_FILE_VERSION, document.version
            );
        }

        Ok(document.entries)
    }

    /// Write the document atomically
    async fn write(&self) -> Result<()> {
        let _writer = self.write_lock.lock().await;

        let json = {
            let state = self.state.read().await;
            let document = StoreFileFormat {
                version: STORE_FILE_VERSION.to_string(),
                entries: state.entries.clone(),
            };
            serde_json::to_string_pretty(&document)?
        };

        let temp_path = self.temp_path();
        {
            let mut file = fs::File::create(&temp_path).await.map_err(|e| {
                Error::store(format!(
                    "Failed to create temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;
            file.write_all(json.as_bytes()).await.map_err(|e| {
                Error::store(format!(
                    "Failed to write temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;
            file.flush().await.map_err(|e| {
                Error::store(format!(
                    "Failed to flush temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;
        }

        if self.path.exists()
            && let Err(e) = fs::copy(&self.path, Self::backup_path(&self.path)).await
        {
            warn!("Failed to create backup: {}", e);
        }

        fs::rename(&temp_path, &self.path).await.map_err(|e| {
            Error::store(format!(
                "Failed to rename {} to {}: {}",
                temp_path.display(),
                self.path.display(),
                e
            ))
        })?;

        self.state.write().await.dirty = false;

        trace!("Store written to file: {}", self.path.display());
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let mut temp = self.path.clone();
        temp.set_extension("tmp");
        temp
    }

    /// Undo a mutation whose write failed
    ///
    /// `applied` is the entry the mutation left behind (`None` for a
    /// removal). The entry is restored only while it is still that value, so
    /// a later mutation of the same key is never clobbered.
    async fn rollback(&self, key: &str, applied: Option<&Value>, previous: Option<Value>) {
        let mut state = self.state.write().await;
        if state.entries.get(key) != applied {
            return;
        }
        match previous {
            Some(previous) => state.entries.insert(key.to_string(), previous),
            None => state.entries.remove(key),
        };
        warn!("Store write failed, mutation of {} rolled back", key);
    }

    fn backup_path(path: &Path) -> PathBuf {
        let mut backup = path.to_path_buf();
        backup.set_extension("backup");
        backup
    }
}

#[async_trait]
impl KvStore for FileStore {
    async fn get(&self, key: &str) -> Result<Value> {
        let state = self.state.read().await;
        state.entries.get(key).cloned().ok_or_else(|| Error::not_found(key))
    }

    async fn set(&self, key: &str, value: Value) -> Result<()> {
        let previous = {
            let mut state = self.state.write().await;
            state.dirty = true;
            state.entries.insert(key.to_string(), value.clone())
        };

        // Immediate write for durability
        if let Err(err) = self.write().await {
            self.rollback(key, Some(&value), previous).await;
            return Err(err);
        }
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let removed = {
            let mut state = self.state.write().await;
            let Some(removed) = state.entries.remove(key) else {
                return Ok(());
            };
            state.dirty = true;
            removed
        };

        if let Err(err) = self.write().await {
            self.rollback(key, None, Some(removed)).await;
            return Err(err);
        }
        Ok(())
    }

    async fn scan(
        &self,
        prefix: &str,
        start_after: Option<&str>,
        limit: usize,
    ) -> Result<Vec<(String, Value)>> {
        let state = self.state.read().await;
        Ok(scan_map(&state.entries, prefix, start_after, limit))
    }

    async fn flush(&self) -> Result<()> {
        let dirty = self.state.read().await.dirty;
        if dirty { self.write().await } else { Ok(()) }
    }

    fn backend_name(&self) -> &'static str {
        "file"
    }
}
