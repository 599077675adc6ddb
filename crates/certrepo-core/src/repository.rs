//! Certificate repository
//!
//! CRUD over self-signers, ACME accounts and zones, persisted through a
//! [`KvStore`]. Every operation is a single independent store call; there
//! are no transactions spanning calls and no in-memory cache.
//!
//! Store results are passed through untouched, so a missing entity surfaces
//! as the store's [`Error::NotFound`] and a backend failure as whatever the
//! store reported.
//!
//! Successful zone saves and deletes are offered to the registered zone
//! watches (see [`crate::watch`]).

use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::codec;
use crate::config::RepositoryConfig;
use crate::error::{Error, Result};
use crate::fqdn::canonical_zone;
use crate::keys::{prefix_key, storage_key};
use crate::model::{AcmeAccount, Entity, SelfSigner, Zone};
use crate::traits::{KvStore, enumerate};
use crate::watch::{
    WatchHandle, WatchRegistry, ZoneEvent, ZoneEventKind, ZoneEventStream,
};

/// Repository of certificate related entities
///
/// ## Backend
///
/// The store handle can be swapped at runtime with
/// [`set_backend`](Self::set_backend). Operations already running against
/// the previous store are not drained; they complete against it.
///
/// ## Teardown
///
/// [`destroy`](Self::destroy) cancels every zone watch without waiting.
/// Await [`wait_for_watchers`](Self::wait_for_watchers) afterwards when all
/// delivery tasks must have exited.
pub struct CertificateRepository {
    backend: Mutex<Arc<dyn KvStore>>,
    watches: Arc<WatchRegistry>,
    config: RepositoryConfig,
}

impl CertificateRepository {
    /// Create a repository with the default configuration
    pub fn new(backend: Arc<dyn KvStore>) -> Self {
        let config = RepositoryConfig::default();
        Self {
            backend: Mutex::new(backend),
            watches: Arc::new(WatchRegistry::from_validated(config.watch.clone())),
            config,
        }
    }

    /// Create a repository with a custom configuration
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the configuration is invalid.
    pub fn with_config(backend: Arc<dyn KvStore>, config: RepositoryConfig) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            backend: Mutex::new(backend),
            watches: Arc::new(WatchRegistry::from_validated(config.watch.clone())),
            config,
        })
    }

    pub fn config(&self) -> &RepositoryConfig {
        &self.config
    }

    /// The store currently in use
    pub fn backend(&self) -> Arc<dyn KvStore> {
        Arc::clone(&self.backend.lock().unwrap_or_else(PoisonError::into_inner))
    }

    /// Replace the store
    ///
    /// Returns the previous store so the caller can flush or migrate it.
    pub fn set_backend(&self, backend: Arc<dyn KvStore>) -> Arc<dyn KvStore> {
        let name = backend.backend_name();
        let previous = std::mem::replace(
            &mut *self.backend.lock().unwrap_or_else(PoisonError::into_inner),
            backend,
        );
        info!(
            "Repository backend swapped: {} -> {}",
            previous.backend_name(),
            name
        );
        previous
    }

    // ------------------------------------------------------------------
    // Self-signers
    // ------------------------------------------------------------------

    pub async fn save_self_signer(&self, signer: &SelfSigner) -> Result<()> {
        self.save(signer).await
    }

    pub async fn find_self_signer(&self, name: &str) -> Result<SelfSigner> {
        self.find(name).await
    }

    /// Visit every self-signer whose name starts with `prefix`
    ///
    /// Stops as soon as `visit` returns `false`.
    pub async fn list_self_signers<V>(&self, prefix: &str, visit: V) -> Result<()>
    where
        V: FnMut(SelfSigner) -> bool + Send,
    {
        self.list(prefix, visit).await
    }

    pub async fn delete_self_signer(&self, name: &str) -> Result<()> {
        self.delete::<SelfSigner>(name).await
    }

    // ------------------------------------------------------------------
    // ACME accounts
    // ------------------------------------------------------------------

    pub async fn save_account(&self, account: &AcmeAccount) -> Result<()> {
        self.save(account).await
    }

    pub async fn find_account(&self, email: &str) -> Result<AcmeAccount> {
        self.find(email).await
    }

    /// Visit every account whose email starts with `prefix`
    pub async fn list_accounts<V>(&self, prefix: &str, visit: V) -> Result<()>
    where
        V: FnMut(AcmeAccount) -> bool + Send,
    {
        self.list(prefix, visit).await
    }

    pub async fn delete_account(&self, email: &str) -> Result<()> {
        self.delete::<AcmeAccount>(email).await
    }

    // ------------------------------------------------------------------
    // Zones
    // ------------------------------------------------------------------

    /// Save a zone and notify zone watches with an `UPDATE` event
    ///
    /// A zone name given with surrounding whitespace or a trailing dot is
    /// stored in canonical form. No event is dispatched if the store write
    /// fails.
    pub async fn save_zone(&self, zone: &Zone) -> Result<()> {
        if zone.is_canonical() {
            self.save(zone).await?;
        } else {
            let mut canonical = zone.clone();
            canonical.zone = canonical_zone(&zone.zone).to_string();
            self.save(&canonical).await?;
        }

        self.notify(canonical_zone(&zone.zone), ZoneEventKind::Update).await;
        Ok(())
    }

    pub async fn find_zone(&self, zone: &str) -> Result<Zone> {
        self.find(canonical_zone(zone)).await
    }

    /// Visit every zone whose name starts with `prefix`
    ///
    /// The prefix is matched as given; it is not a zone name and is not
    /// canonicalized.
    pub async fn list_zones<V>(&self, prefix: &str, visit: V) -> Result<()>
    where
        V: FnMut(Zone) -> bool + Send,
    {
        self.list(prefix, visit).await
    }

    /// Delete a zone and notify zone watches with a `DELETE` event
    ///
    /// Deleting an absent zone is not an error and is still notified.
    pub async fn delete_zone(&self, zone: &str) -> Result<()> {
        let zone = canonical_zone(zone);
        self.delete::<Zone>(zone).await?;
        self.notify(zone, ZoneEventKind::Delete).await;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Zone watches
    // ------------------------------------------------------------------

    /// Register a zone watch
    ///
    /// `callback` receives the canonical zone name and the event kind, on
    /// the watch's own task, never concurrently with itself. Returning
    /// `false` ends the watch. The watch also ends when `parent` or the
    /// returned handle is cancelled, or when the repository is destroyed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ShuttingDown`] after [`destroy`](Self::destroy).
    pub fn watch<F>(&self, parent: &CancellationToken, callback: F) -> Result<WatchHandle>
    where
        F: FnMut(&str, ZoneEventKind) -> bool + Send + 'static,
    {
        self.watches.watch(parent, callback)
    }

    /// Register a zone watch that forwards events into a stream
    ///
    /// The stream ends once the watch stops.
    pub fn watch_stream(
        &self,
        parent: &CancellationToken,
    ) -> Result<(WatchHandle, ZoneEventStream)> {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = self.watches.watch(parent, move |zone, kind| {
            tx.send(ZoneEvent::new(zone, kind)).is_ok()
        })?;
        Ok((handle, UnboundedReceiverStream::new(rx)))
    }

    /// Number of registered zone watches
    pub fn active_watches(&self) -> usize {
        self.watches.len()
    }

    /// Events dropped because a watcher's queue was full
    pub fn dropped_events(&self) -> u64 {
        self.watches.dropped_events()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.watches.is_shutting_down()
    }

    /// Tear the repository down
    ///
    /// Refuses new watches and cancels every registered one. Delivery tasks
    /// finish on their own; this does not wait for them. Always succeeds.
    pub fn destroy(&self) -> Result<()> {
        let cancelled = self.watches.shutdown();
        info!(
            "Certificate repository destroyed ({} zone watch(es) cancelled)",
            cancelled
        );
        Ok(())
    }

    /// Wait until every zone watch delivery task has exited
    pub async fn wait_for_watchers(&self) {
        self.watches.wait_idle().await;
    }

    // ------------------------------------------------------------------
    // Generic entity operations
    // ------------------------------------------------------------------

    async fn save<E: Entity>(&self, entity: &E) -> Result<()> {
        let id = entity.id();
        if id.is_empty() {
            return Err(Error::invalid_input(format!(
                "{} identifier cannot be empty",
                E::KIND
            )));
        }

        let key = storage_key(&self.config.bucket, E::KIND, id);
        let value = codec::encode(entity)?;
        self.backend().set(&key, value).await?;

        debug!("Saved {}", key);
        Ok(())
    }

    async fn find<E: Entity>(&self, id: &str) -> Result<E> {
        let key = storage_key(&self.config.bucket, E::KIND, id);
        let value = self.backend().get(&key).await?;
        codec::decode(value)
    }

    async fn list<E, V>(&self, prefix: &str, visit: V) -> Result<()>
    where
        E: Entity,
        V: FnMut(E) -> bool + Send,
    {
        let prefix = prefix_key(&self.config.bucket, E::KIND, prefix);
        let backend = self.backend();

        enumerate(
            backend.as_ref(),
            &prefix,
            self.config.list_batch_size,
            codec::decode::<E>,
            visit,
        )
        .await
    }

    async fn delete<E: Entity>(&self, id: &str) -> Result<()> {
        let key = storage_key(&self.config.bucket, E::KIND, id);
        self.backend().remove(&key).await?;

        debug!("Deleted {}", key);
        Ok(())
    }

    async fn notify(&self, zone: &str, kind: ZoneEventKind) {
        let delivered = self.watches.dispatch(ZoneEvent::new(zone, kind)).await;
        if delivered > 0 {
            debug!("{} {} offered to {} zone watch(es)", kind, zone, delivered);
        }
    }
}

impl std::fmt::Debug for CertificateRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CertificateRepository")
            .field("backend", &self.backend().backend_name())
            .field("watches", &self.watches.len())
            .field("config", &self.config)
            .finish()
    }
}
