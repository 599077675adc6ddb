//! Test doubles and common utilities for repository contract tests

#![allow(dead_code)]

use async_trait::async_trait;
use certrepo_core::error::{Error, Result};
use certrepo_core::{
    CertificateRepository, KvStore, MemoryStore, WatchHandle, ZoneEventKind,
};
use serde_json::Value;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// How long a test waits for something that should happen
pub const EVENT_TIMEOUT: Duration = Duration::from_secs(5);

/// How long a test waits before concluding something did not happen
pub const QUIET_PERIOD: Duration = Duration::from_millis(100);

/// A store whose operations can be made to fail on demand
///
/// Wraps a [`MemoryStore`]; while failing, every call returns
/// `Error::Store` without touching the inner store.
#[derive(Clone, Default)]
pub struct FailingStore {
    inner: MemoryStore,
    failing: Arc<AtomicBool>,
    set_calls: Arc<AtomicUsize>,
}

impl FailingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn set_calls(&self) -> usize {
        self.set_calls.load(Ordering::SeqCst)
    }

    pub fn inner(&self) -> &MemoryStore {
        &self.inner
    }

    fn check(&self) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            Err(Error::store("backend unreachable"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl KvStore for FailingStore {
    async fn get(&self, key: &str) -> Result<Value> {
        self.check()?;
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: Value) -> Result<()> {
        self.set_calls.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        self.inner.set(key, value).await
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.check()?;
        self.inner.remove(key).await
    }

    async fn scan(
        &self,
        prefix: &str,
        start_after: Option<&str>,
        limit: usize,
    ) -> Result<Vec<(String, Value)>> {
        self.check()?;
        self.inner.scan(prefix, start_after, limit).await
    }

    async fn flush(&self) -> Result<()> {
        self.check()
    }

    fn backend_name(&self) -> &'static str {
        "failing"
    }
}

/// Repository over a fresh in-memory store
pub fn memory_repository() -> (Arc<CertificateRepository>, MemoryStore) {
    let store = MemoryStore::new();
    let repo = CertificateRepository::new(Arc::new(store.clone()));
    (Arc::new(repo), store)
}

/// Events observed by a recording watch
pub type Recorded = mpsc::UnboundedReceiver<(String, ZoneEventKind)>;

/// Register a watch that forwards every event into a channel
pub fn recording_watch(
    repo: &CertificateRepository,
    parent: &CancellationToken,
) -> (WatchHandle, Recorded) {
    let (tx, rx) = mpsc::unbounded_channel();
    let handle = repo
        .watch(parent, move |zone, kind| {
            tx.send((zone.to_string(), kind)).is_ok()
        })
        .expect("watch registration succeeds");
    (handle, rx)
}

/// Wait for the next recorded event
pub async fn next_event(rx: &mut Recorded) -> (String, ZoneEventKind) {
    tokio::time::timeout(EVENT_TIMEOUT, rx.recv())
        .await
        .expect("event delivered in time")
        .expect("watch still running")
}

/// Assert nothing is delivered for a short while
pub async fn assert_quiet(rx: &mut Recorded) {
    if let Ok(Some(event)) = tokio::time::timeout(QUIET_PERIOD, rx.recv()).await {
        panic!("unexpected event delivered: {:?}", event);
    }
}

/// Wait for a watch's delivery task to finish its cleanup
pub async fn wait_closed(handle: WatchHandle) {
    tokio::time::timeout(EVENT_TIMEOUT, handle.closed())
        .await
        .expect("watch terminates in time");
}
