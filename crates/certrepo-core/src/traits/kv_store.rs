// # Key-Value Store Trait
//
// The repository consumes a store through this narrow contract only. The
// store may be local or remote; the repository assumes nothing beyond
// per-call atomicity at the backend's discretion, and adds no transactions,
// locking or retries of its own.
//
// ## Namespaces
//
// The namespace of a call is the `<bucket>` segment of its key (see
// `crate::keys`). Stores see fully qualified keys and need no separate
// namespace argument.
//
// ## Implementations
//
// - `MemoryStore`: in-process, not persistent
// - `FileStore`: JSON document with atomic writes and backup recovery
// - Future: remote key-value services

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;

/// Trait for key-value store implementations
///
/// # Thread Safety
///
/// All methods must be safe to call concurrently from multiple tasks.
///
/// # Not Found
///
/// [`get`](KvStore::get) signals an absent key with
/// [`Error::NotFound`](crate::Error::NotFound). The repository passes that
/// error to its callers untouched, so implementations must not report
/// absence as any other variant.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Read the value stored under `key`
    ///
    /// # Returns
    ///
    /// - `Ok(Value)`: The stored value
    /// - `Err(Error::NotFound)`: No such key
    /// - `Err(Error)`: Backend failure
    async fn get(&self, key: &str) -> Result<Value>;

    /// Create or overwrite the value under `key`
    async fn set(&self, key: &str, value: Value) -> Result<()>;

    /// Remove `key`
    ///
    /// Removing a key that does not exist is not an error.
    async fn remove(&self, key: &str) -> Result<()>;

    /// Read up to `limit` entries whose key starts with `prefix`
    ///
    /// Entries are returned in ascending key order. When `start_after` is
    /// set, only keys strictly greater than it are returned, which lets
    /// callers resume a scan from the last key of the previous page.
    async fn scan(
        &self,
        prefix: &str,
        start_after: Option<&str>,
        limit: usize,
    ) -> Result<Vec<(String, Value)>>;

    /// Persist any pending changes
    async fn flush(&self) -> Result<()>;

    /// Backend name (for logging/debugging)
    fn backend_name(&self) -> &'static str;
}

/// Enumerate every entry under `prefix` in batches of `batch_size`
///
/// Each value is decoded with `decode` and handed to `visit`. Enumeration
/// stops as soon as `visit` returns `false`, and otherwise resumes with the
/// next batch until the prefix range is exhausted. A decode failure aborts
/// the enumeration with that error.
///
/// At most one batch is held in memory at a time.
pub async fn enumerate<T, D, V>(
    store: &dyn KvStore,
    prefix: &str,
    batch_size: usize,
    mut decode: D,
    mut visit: V,
) -> Result<()>
where
    D: FnMut(Value) -> Result<T>,
    V: FnMut(T) -> bool,
{
    let batch_size = batch_size.max(1);
    let mut cursor: Option<String> = None;

    loop {
        let batch = store.scan(prefix, cursor.as_deref(), batch_size).await?;
        let exhausted = batch.len() < batch_size;

        for (key, value) in batch {
            if !visit(decode(value)?) {
                return Ok(());
            }
            cursor = Some(key);
        }

        if exhausted {
            return Ok(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use serde_json::json;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Counts scan round trips
    struct CountingStore {
        inner: MemoryStore,
        scans: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl KvStore for CountingStore {
        async fn get(&self, key: &str) -> Result<Value> {
            self.inner.get(key).await
        }

        async fn set(&self, key: &str, value: Value) -> Result<()> {
            self.inner.set(key, value).await
        }

        async fn remove(&self, key: &str) -> Result<()> {
            self.inner.remove(key).await
        }

        async fn scan(
            &self,
            prefix: &str,
            start_after: Option<&str>,
            limit: usize,
        ) -> Result<Vec<(String, Value)>> {
            self.scans.fetch_add(1, Ordering::SeqCst);
            self.inner.scan(prefix, start_after, limit).await
        }

        async fn flush(&self) -> Result<()> {
            Ok(())
        }

        fn backend_name(&self) -> &'static str {
            "counting"
        }
    }

    #[tokio::test]
    async fn test_enumerate_stops_early() {
        let store = MemoryStore::new();
        for i in 0..5 {
            store.set(&format!("p:{i}"), json!(i)).await.unwrap();
        }

        let mut seen = Vec::new();
        enumerate(&store, "p:", 2, Ok, |value| {
            seen.push(value);
            seen.len() < 3
        })
        .await
        .unwrap();

        assert_eq!(seen, vec![json!(0), json!(1), json!(2)]);
    }

    #[tokio::test]
    async fn test_enumerate_fetches_in_batches() {
        let scans = Arc::new(AtomicUsize::new(0));
        let store = CountingStore {
            inner: MemoryStore::new(),
            scans: scans.clone(),
        };
        for i in 0..25 {
            store.set(&format!("p:{i:03}"), json!(i)).await.unwrap();
        }

        let mut count = 0;
        enumerate(&store, "p:", 10, Ok, |_| {
            count += 1;
            true
        })
        .await
        .unwrap();

        assert_eq!(count, 25);
        // 10 + 10 + 5, the short page ends the scan
        assert_eq!(scans.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_enumerate_propagates_decode_failure() {
        let store = MemoryStore::new();
        store.set("p:1", json!("not a number")).await.unwrap();

        let result = enumerate(
            &store,
            "p:",
            10,
            |value| Ok(serde_json::from_value::<u32>(value)?),
            |_| true,
        )
        .await;

        assert!(matches!(result, Err(crate::Error::Codec(_))));
    }
}
