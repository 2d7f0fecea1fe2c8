//! Change notification fan-out.
//!
//! Listeners are invoked synchronously, in registration order, on the thread
//! that publishes. A failing or panicking listener is logged and skipped so the
//! rest of the dispatch still runs.

use parking_lot::RwLock;
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::error;

use crate::dev::ChangeEvent;
use crate::error::ListenerError;

/// A registered change listener.
pub type Listener = Arc<dyn Fn(&ChangeEvent) -> anyhow::Result<()> + Send + Sync>;

type ListenerList = RwLock<Vec<(u64, Listener)>>;

/// Subscription point for file change events.
///
/// Cloning is cheap and every clone shares the same listener list.
#[derive(Clone, Default)]
pub struct ChangeNotifier {
    listeners: Arc<ListenerList>,
    next_id: Arc<AtomicU64>,
}

impl ChangeNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `listener`; it stays registered until the returned
    /// subscription is explicitly unsubscribed.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&ChangeEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.listeners.write().push((id, Arc::new(listener)));

        Subscription {
            id,
            listeners: Arc::downgrade(&self.listeners),
        }
    }

    /// Dispatch `event` to every listener registered at the time of the call.
    ///
    /// Returns the failures, which have already been logged.
    pub fn publish(&self, event: &ChangeEvent) -> Vec<ListenerError> {
        // Listeners may subscribe or unsubscribe while being called.
        let snapshot: Vec<(u64, Listener)> = self.listeners.read().clone();
        let mut failures = Vec::new();

        for (id, listener) in snapshot {
            let failure = match catch_unwind(AssertUnwindSafe(|| listener(event))) {
                Ok(Ok(())) => continue,
                Ok(Err(err)) => ListenerError::Failed {
                    id,
                    message: format!("{:#}", err),
                },
                Err(payload) => ListenerError::Panicked {
                    id,
                    message: panic_message(payload.as_ref()),
                },
            };

            error!(
                file = %event.file_path.display(),
                "{}", failure
            );
            failures.push(failure);
        }

        failures
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Handle returned by [`ChangeNotifier::subscribe`].
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    listeners: Weak<ListenerList>,
}

impl Subscription {
    /// Remove the listener. Calling this more than once is a no-op.
    ///
    /// Returns whether this call removed it.
    pub fn unsubscribe(&self) -> bool {
        let Some(listeners) = self.listeners.upgrade() else {
            return false;
        };
        let mut listeners = listeners.write();
        let before = listeners.len();
        listeners.retain(|(id, _)| *id != self.id);
        listeners.len() != before
    }
}
