// # Memory Store
//
// In-memory implementation of KvStore.
//
// ## Purpose
//
// Fast store that doesn't persist across restarts. Useful for tests,
// development, and as the target of a backend swap before data is migrated.
//
// ## Crash Behavior
//
// - All entries are lost on restart/crash

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use crate::error::{Error, Result};
use crate::store::scan_map;
use crate::traits::KvStore;

/// In-memory store implementation
///
/// Entries are kept in a `BTreeMap` behind a `RwLock`, so prefix scans
/// come back in key order. Clones share the same entries.
///
/// # Example
///
/// ```rust,no_run
/// use certrepo_core::{KvStore, MemoryStore};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = MemoryStore::new();
///
///     store.set("cert:zone:example.com", serde_json::json!({"zone": "example.com"})).await?;
///     let value = store.get("cert:zone:example.com").await?;
///     assert_eq!(value["zone"], "example.com");
///
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<BTreeMap<String, Value>>>,
}

impl MemoryStore {
    /// Create a new empty memory store
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the number of entries in the store
    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    /// Check if the store is empty
    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }

    /// Clear all entries from the store
    pub async fn clear(&self) {
        self.inner.write().await.clear();
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Value> {
        let guard = self.inner.read().await;
        guard.get(key).cloned().ok_or_else(|| Error::not_found(key))
    }

    async fn set(&self, key: &str, value: Value) -> Result<()> {
        let mut guard = self.inner.write().await;
        guard.insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let mut guard = self.inner.write().await;
        guard.remove(key);
        Ok(())
    }

    async fn scan(
        &self,
        prefix: &str,
        start_after: Option<&str>,
        limit: usize,
    ) -> Result<Vec<(String, Value)>> {
        let guard = self.inner.read().await;
        Ok(scan_map(&guard, prefix, start_after, limit))
    }

    async fn flush(&self) -> Result<()> {
        // Nothing buffered
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
