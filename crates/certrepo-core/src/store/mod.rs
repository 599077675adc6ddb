// # Store Implementations
//
// This module provides implementations of the KvStore trait for
// different persistence strategies.
//
// - [`MemoryStore`]: in-process, not persistent
// - [`FileStore`]: JSON document with atomic writes and backup recovery

pub mod file;
pub mod memory;

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Arc;

use serde_json::Value;

use crate::config::StoreConfig;
use crate::error::Result;
use crate::traits::KvStore;

pub use file::FileStore;
pub use memory::MemoryStore;

/// Build a store from configuration
pub async fn open_store(config: &StoreConfig) -> Result<Arc<dyn KvStore>> {
    config.validate()?;
    match config {
        StoreConfig::Memory => Ok(Arc::new(MemoryStore::new())),
        StoreConfig::File { path } => Ok(Arc::new(FileStore::new(path).await?)),
    }
}

/// Page through an ordered map the way [`KvStore::scan`] describes
pub(crate) fn scan_map(
    map: &BTreeMap<String, Value>,
    prefix: &str,
    start_after: Option<&str>,
    limit: usize,
) -> Vec<(String, Value)> {
    let lower = match start_after {
        Some(after) if after >= prefix => Bound::Excluded(after),
        _ => Bound::Included(prefix),
    };

    map.range::<str, _>((lower, Bound::Unbounded))
        .take_while(|(key, _)| key.starts_with(prefix))
        .take(limit)
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}
