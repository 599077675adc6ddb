use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error};

use super::{StateCell, WatchRegistry, WatchState, ZoneEvent, ZoneEventKind};

/// Why a delivery loop stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StopReason {
    Cancelled,
    Declined,
    Closed,
}

/// Cleanup run when a delivery task ends, however it ends
///
/// Lives inside the task future, so it also runs when the runtime drops the
/// task before completion.
struct DeliveryGuard {
    registry: Arc<WatchRegistry>,
    handle: u64,
    rx: mpsc::Receiver<ZoneEvent>,
    token: CancellationToken,
    state: StateCell,
}

impl Drop for DeliveryGuard {
    fn drop(&mut self) {
        self.state.set(WatchState::Draining);
        self.registry.unregister(self.handle);
        // Wakes any dispatcher blocked on this queue
        self.rx.close();
        self.token.cancel();
        self.state.set(WatchState::Terminated);
    }
}

pub(super) fn spawn_watcher<F>(
    tasks: &TaskTracker,
    registry: Arc<WatchRegistry>,
    handle: u64,
    token: CancellationToken,
    rx: mpsc::Receiver<ZoneEvent>,
    state: StateCell,
    callback: F,
) -> JoinHandle<()>
where
    F: FnMut(&str, ZoneEventKind) -> bool + Send + 'static,
{
    tasks.spawn(async move {
        let mut guard = DeliveryGuard {
            registry,
            handle,
            rx,
            token,
            state,
        };

        let outcome = AssertUnwindSafe(deliver(&mut guard, callback))
            .catch_unwind()
            .await;

        match outcome {
            Ok(reason) => debug!("Zone watch {} stopped: {:?}", handle, reason),
            Err(panic) => error!(
                "Zone watch {} callback panicked: {}",
                handle,
                panic_message(panic.as_ref())
            ),
        }
    })
}

async fn deliver<F>(guard: &mut DeliveryGuard, mut callback: F) -> StopReason
where
    F: FnMut(&str, ZoneEventKind) -> bool,
{
    loop {
        tokio::select! {
            biased;

            _ = guard.token.cancelled() => return StopReason::Cancelled,

            event = guard.rx.recv() => match event {
                Some(event) => {
                    if !callback(&event.zone, event.kind) {
                        return StopReason::Declined;
                    }
                }
                None => return StopReason::Closed,
            },
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message
    } else {
        "non-string panic payload"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WatchConfig;
    use std::time::Duration;

    #[tokio::test]
    async fn test_declining_callback_ends_watch() {
        let registry = Arc::new(WatchRegistry::new(WatchConfig::default()).unwrap());
        let handle = registry
            .watch(&CancellationToken::new(), |_, _| false)
            .unwrap();
        let id = handle.id();

        registry
            .dispatch(ZoneEvent::new("example.com", ZoneEventKind::Update))
            .await;
        tokio::time::timeout(Duration::from_secs(5), handle.closed())
            .await
            .unwrap();

        assert!(!registry.contains(id));
    }

    #[tokio::test]
    async fn test_panicking_callback_is_contained() {
        let registry = Arc::new(WatchRegistry::new(WatchConfig::default()).unwrap());
        let handle = registry
            .watch(&CancellationToken::new(), |zone, _| panic!("boom on {zone}"))
            .unwrap();
        let token = handle.cancellation_token();

        registry
            .dispatch(ZoneEvent::new("example.com", ZoneEventKind::Delete))
            .await;
        tokio::time::timeout(Duration::from_secs(5), handle.closed())
            .await
            .unwrap();

        assert!(registry.is_empty());
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_panic_message() {
        let static_payload: Box<dyn Any + Send> = Box::new("static");
        let owned_payload: Box<dyn Any + Send> = Box::new(String::from("owned"));
        let other_payload: Box<dyn Any + Send> = Box::new(7u32);

        assert_eq!(panic_message(static_payload.as_ref()), "static");
        assert_eq!(panic_message(owned_payload.as_ref()), "owned");
        assert_eq!(panic_message(other_payload.as_ref()), "non-string panic payload");
    }
}
