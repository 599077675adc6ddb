//! Zone change notifications
//!
//! Every successful zone save or delete is offered to each registered
//! watch. Each watch runs its own delivery task, which invokes the
//! observer callback once per event until the watch is cancelled, the
//! callback declines further events, or the repository is destroyed.
//!
//! ## Architecture
//!
//! ```text
//!  save_zone / delete_zone
//!            │
//!            ▼
//!   ┌──────────────────┐  snapshot   ┌──────────────────┐
//!   │  WatchRegistry   │────────────▶│  mpsc queue  (1) │──▶ delivery task ──▶ callback
//!   │  handle → ctx    │             ├──────────────────┤
//!   │                  │────────────▶│  mpsc queue  (2) │──▶ delivery task ──▶ callback
//!   └──────────────────┘             └──────────────────┘
//! ```
//!
//! ## Lifecycle
//!
//! A watch is [`WatchState::Active`] from registration until its task
//! observes cancellation, a declined event, a closed queue, or a panic in
//! the callback. It then moves to [`WatchState::Draining`] while it removes
//! its handle and closes its queue, and ends in [`WatchState::Terminated`].
//!
//! ## Ordering
//!
//! Dispatch runs inside the mutating call and each queue is FIFO, so one
//! watcher sees a zone's events in mutation order. Nothing is guaranteed
//! across watchers.

mod registry;
mod watcher;

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use tokio::task::JoinHandle;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_util::sync::CancellationToken;

pub use registry::WatchRegistry;

/// Kind of zone mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ZoneEventKind {
    /// Zone was created or overwritten
    Update,
    /// Zone was removed
    Delete,
}

impl ZoneEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ZoneEventKind::Update => "UPDATE",
            ZoneEventKind::Delete => "DELETE",
        }
    }
}

impl fmt::Display for ZoneEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A zone mutation offered to watchers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZoneEvent {
    /// Canonical zone name
    pub zone: String,
    /// What happened to it
    pub kind: ZoneEventKind,
}

impl ZoneEvent {
    pub fn new(zone: impl Into<String>, kind: ZoneEventKind) -> Self {
        Self {
            zone: zone.into(),
            kind,
        }
    }
}

/// Stream of zone events produced by
/// [`CertificateRepository::watch_stream`](crate::CertificateRepository::watch_stream)
pub type ZoneEventStream = UnboundedReceiverStream<ZoneEvent>;

/// Delivery task state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WatchState {
    /// Waiting for events or cancellation
    Active = 0,
    /// Stopped; removing the handle and closing the queue
    Draining = 1,
    /// Cleanup finished, the task has exited
    Terminated = 2,
}

impl WatchState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => WatchState::Active,
            1 => WatchState::Draining,
            _ => WatchState::Terminated,
        }
    }
}

/// Shared cell holding a watch's [`WatchState`]
#[derive(Debug, Clone)]
pub(crate) struct StateCell(Arc<AtomicU8>);

impl StateCell {
    pub(crate) fn new() -> Self {
        Self(Arc::new(AtomicU8::new(WatchState::Active as u8)))
    }

    pub(crate) fn set(&self, state: WatchState) {
        self.0.store(state as u8, Ordering::SeqCst);
    }

    pub(crate) fn get(&self) -> WatchState {
        WatchState::from_u8(self.0.load(Ordering::SeqCst))
    }
}

/// Caller side of a registered watch
///
/// Dropping the handle does not stop the watch; call [`cancel`](Self::cancel)
/// or cancel the parent token passed to `watch`.
#[derive(Debug)]
pub struct WatchHandle {
    id: u64,
    token: CancellationToken,
    state: StateCell,
    task: JoinHandle<()>,
}

impl WatchHandle {
    pub(crate) fn new(id: u64, token: CancellationToken, state: StateCell, task: JoinHandle<()>) -> Self {
        Self {
            id,
            token,
            state,
            task,
        }
    }

    /// Registry handle of this watch
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Stop the watch
    ///
    /// The delivery task stops observing new events; cleanup completes
    /// asynchronously. Await [`closed`](Self::closed) to wait for it.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Token cancelled when this watch stops, for tying other work to it
    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn state(&self) -> WatchState {
        self.state.get()
    }

    /// Whether the delivery task has exited
    pub fn is_terminated(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the delivery task to finish its cleanup
    pub async fn closed(self) {
        // Callback panics are caught inside the task; a join error here can
        // only mean the runtime is shutting down.
        let _ = self.task.await;
    }
}
