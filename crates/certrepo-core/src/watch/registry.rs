use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use super::watcher::spawn_watcher;
use super::{StateCell, WatchHandle, ZoneEvent, ZoneEventKind};
use crate::config::{OverflowPolicy, WatchConfig};
use crate::error::{Error, Result};

/// Registry entry for one watch
#[derive(Debug)]
pub(crate) struct WatchContext {
    token: CancellationToken,
    tx: mpsc::Sender<ZoneEvent>,
}

/// Active watches of one repository
///
/// Handles come from a monotonically increasing counter starting at 1 and
/// are never reused. The map lock is only held for the map operation
/// itself, never across a send, so registration, removal and dispatch can
/// all run concurrently.
#[derive(Debug)]
pub struct WatchRegistry {
    next_handle: AtomicU64,
    watches: RwLock<HashMap<u64, WatchContext>>,
    shutting_down: AtomicBool,
    dropped_events: AtomicU64,
    tasks: TaskTracker,
    config: WatchConfig,
}

impl WatchRegistry {
    /// Create an empty registry
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `config` is invalid.
    pub fn new(config: WatchConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::from_validated(config))
    }

    /// Create an empty registry from a configuration already validated by
    /// the caller
    pub(crate) fn from_validated(config: WatchConfig) -> Self {
        Self {
            next_handle: AtomicU64::new(0),
            watches: RwLock::new(HashMap::new()),
            shutting_down: AtomicBool::new(false),
            dropped_events: AtomicU64::new(0),
            tasks: TaskTracker::new(),
            config,
        }
    }

    pub fn config(&self) -> &WatchConfig {
        &self.config
    }

    /// Register a watch and start its delivery task
    ///
    /// The watch stops when `parent` is cancelled, when the returned handle
    /// is cancelled, or when `callback` returns `false`.
    ///
    /// # Errors
    ///
    /// [`Error::ShuttingDown`] once [`shutdown`](Self::shutdown) has run.
    pub fn watch<F>(self: &Arc<Self>, parent: &CancellationToken, callback: F) -> Result<WatchHandle>
    where
        F: FnMut(&str, ZoneEventKind) -> bool + Send + 'static,
    {
        let token = parent.child_token();
        let (tx, rx) = mpsc::channel(self.config.channel_capacity);

        let id = self.register(WatchContext {
            token: token.clone(),
            tx,
        })?;

        let state = StateCell::new();
        let task = spawn_watcher(
            &self.tasks,
            Arc::clone(self),
            id,
            token.clone(),
            rx,
            state.clone(),
            callback,
        );

        debug!("Zone watch {} registered", id);
        Ok(WatchHandle::new(id, token, state, task))
    }

    /// Insert a context under the next handle
    fn register(&self, context: WatchContext) -> Result<u64> {
        if self.is_shutting_down() {
            return Err(Error::ShuttingDown);
        }

        let handle = self.next_handle.fetch_add(1, Ordering::SeqCst) + 1;
        let token = context.token.clone();
        self.write_watches().insert(handle, context);

        // Shutdown may have swept the map between the check above and the
        // insert; make sure this watch drains too.
        if self.is_shutting_down() {
            token.cancel();
        }

        Ok(handle)
    }

    /// Remove a watch; returns whether it was registered
    pub fn unregister(&self, handle: u64) -> bool {
        let removed = self.write_watches().remove(&handle).is_some();
        if removed {
            debug!("Zone watch {} unregistered", handle);
        }
        removed
    }

    pub fn contains(&self, handle: u64) -> bool {
        self.read_watches().contains_key(&handle)
    }

    /// Number of registered watches
    pub fn len(&self) -> usize {
        self.read_watches().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read_watches().is_empty()
    }

    /// Events dropped under [`OverflowPolicy::DropEvent`]
    pub fn dropped_events(&self) -> u64 {
        self.dropped_events.load(Ordering::Relaxed)
    }

    /// Offer an event to every registered watch
    ///
    /// Works on a snapshot of the registry, so a watch registered or removed
    /// concurrently may or may not see this event. Under
    /// [`OverflowPolicy::Block`] this waits until each watcher's queue
    /// accepts the event or the watcher goes away.
    ///
    /// Returns the number of watches the event was queued for.
    pub async fn dispatch(&self, event: ZoneEvent) -> usize {
        let targets: Vec<(u64, mpsc::Sender<ZoneEvent>)> = self
            .read_watches()
            .iter()
            .map(|(handle, context)| (*handle, context.tx.clone()))
            .collect();

        let mut delivered = 0;
        for (handle, tx) in targets {
            let accepted = match self.config.overflow {
                OverflowPolicy::Block => tx.send(event.clone()).await.is_ok(),
                OverflowPolicy::DropEvent => match tx.try_send(event.clone()) {
                    Ok(()) => true,
                    Err(TrySendError::Full(_)) => {
                        self.dropped_events.fetch_add(1, Ordering::Relaxed);
                        warn!(
                            "Zone watch {} queue full, dropping {} event for {}",
                            handle, event.kind, event.zone
                        );
                        continue;
                    }
                    Err(TrySendError::Closed(_)) => false,
                },
            };

            if accepted {
                delivered += 1;
            } else {
                debug!("Zone watch {} closed before delivery", handle);
            }
        }

        delivered
    }

    /// Refuse new watches and cancel every registered one
    ///
    /// Does not wait for delivery tasks to finish; see
    /// [`wait_idle`](Self::wait_idle). Returns the number of watches
    /// cancelled.
    pub fn shutdown(&self) -> usize {
        self.shutting_down.store(true, Ordering::SeqCst);

        let tokens: Vec<CancellationToken> = self
            .read_watches()
            .values()
            .map(|context| context.token.clone())
            .collect();

        for token in &tokens {
            token.cancel();
        }
        self.tasks.close();

        if !tokens.is_empty() {
            info!("Cancelled {} zone watch(es) on shutdown", tokens.len());
        }
        tokens.len()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    /// Wait until every delivery task has exited
    ///
    /// Only returns once all watches have stopped, so call it after
    /// [`shutdown`](Self::shutdown) or after cancelling each watch.
    pub async fn wait_idle(&self) {
        self.tasks.close();
        self.tasks.wait().await;
    }

    fn read_watches(&self) -> RwLockReadGuard<'_, HashMap<u64, WatchContext>> {
        self.watches.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_watches(&self) -> RwLockWriteGuard<'_, HashMap<u64, WatchContext>> {
        self.watches.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn registry(capacity: usize, overflow: OverflowPolicy) -> Arc<WatchRegistry> {
        Arc::new(WatchRegistry::new(WatchConfig::new(capacity, overflow)).unwrap())
    }

    #[test]
    fn test_zero_capacity_is_rejected() {
        let result = WatchRegistry::new(WatchConfig::new(0, OverflowPolicy::Block));
        assert!(matches!(result, Err(Error::Config(_))));

        let result = WatchRegistry::new(WatchConfig::new(0, OverflowPolicy::DropEvent));
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn test_handles_start_above_zero_and_increase() {
        let registry = registry(1, OverflowPolicy::Block);
        let root = CancellationToken::new();

        let first = registry.watch(&root, |_, _| true).unwrap();
        let second = registry.watch(&root, |_, _| true).unwrap();

        assert_eq!(first.id(), 1);
        assert_eq!(second.id(), 2);
        assert_eq!(registry.len(), 2);

        first.cancel();
        first.closed().await;
        let third = registry.watch(&root, |_, _| true).unwrap();
        assert_eq!(third.id(), 3, "handles are never reused");

        root.cancel();
        registry.wait_idle().await;
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_dispatch_reaches_every_watch() {
        let registry = registry(4, OverflowPolicy::Block);
        let root = CancellationToken::new();
        let (seen_tx, mut seen_rx) = mpsc::unbounded_channel();

        for _ in 0..3 {
            let seen_tx = seen_tx.clone();
            registry
                .watch(&root, move |zone, kind| {
                    seen_tx.send(format!("{kind} {zone}")).is_ok()
                })
                .unwrap();
        }

        let delivered = registry
            .dispatch(ZoneEvent::new("example.com", ZoneEventKind::Update))
            .await;
        assert_eq!(delivered, 3);

        for _ in 0..3 {
            let seen = tokio::time::timeout(Duration::from_secs(5), seen_rx.recv())
                .await
                .expect("every watcher observes the event")
                .unwrap();
            assert_eq!(seen, "UPDATE example.com");
        }

        registry.shutdown();
        registry.wait_idle().await;
        assert!(registry.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_drop_event_policy_counts_overflow() {
        let registry = registry(1, OverflowPolicy::DropEvent);
        let root = CancellationToken::new();
        let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();

        // The callback blocks on the first event until released
        let handle = registry
            .watch(&root, move |_, _| {
                let _ = release_rx.recv_timeout(Duration::from_secs(5));
                true
            })
            .unwrap();

        registry
            .dispatch(ZoneEvent::new("a", ZoneEventKind::Update))
            .await;
        // Let the watcher pick up the first event and block in the callback
        tokio::time::sleep(Duration::from_millis(50)).await;
        // Fills the queue
        registry
            .dispatch(ZoneEvent::new("b", ZoneEventKind::Update))
            .await;
        // Overflows
        let delivered = registry
            .dispatch(ZoneEvent::new("c", ZoneEventKind::Update))
            .await;

        assert_eq!(delivered, 0);
        assert_eq!(registry.dropped_events(), 1);

        let _ = release_tx.send(());
        let _ = release_tx.send(());
        handle.cancel();
        registry.wait_idle().await;
    }

    #[tokio::test]
    async fn test_watch_after_shutdown_is_refused() {
        let registry = registry(1, OverflowPolicy::Block);
        assert_eq!(registry.shutdown(), 0);
        assert!(registry.is_shutting_down());

        let result = registry.watch(&CancellationToken::new(), |_, _| true);
        assert!(matches!(result, Err(Error::ShuttingDown)));
    }
}
