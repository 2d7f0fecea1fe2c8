//! Shared state for the development server.
//!
//! Provides thread-safe access to the server status, HMR client connections
//! and the change generation using parking_lot locks. No lock is held across
//! an `.await`.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::dev::ChangeEvent;

/// Lifecycle of a dev server instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerStatus {
    /// Bundler and listener are being started
    Starting,
    /// Accepting and proxying requests
    Running,
    /// Listener closed, draining in-flight requests
    ShuttingDown,
    /// Bundler stopped, nothing left running
    Stopped,
}

impl ServerStatus {
    /// Check if requests should be served.
    pub fn is_running(&self) -> bool {
        matches!(self, ServerStatus::Running)
    }

    pub fn is_stopped(&self) -> bool {
        matches!(self, ServerStatus::Stopped)
    }
}

/// Client connection tracker for Server-Sent Events.
///
/// Tracks connected clients to broadcast change events.
pub type ClientRegistry = Arc<RwLock<HashMap<usize, mpsc::Sender<String>>>>;

/// Per-client buffer; a client this far behind is dropped.
const CLIENT_BUFFER: usize = 100;

/// Shared development server state.
pub struct DevServerState {
    /// Current lifecycle status
    status: RwLock<ServerStatus>,

    /// Connected SSE clients
    pub clients: ClientRegistry,

    next_client_id: AtomicUsize,

    /// Bumped on every announced change; resolutions compare against it
    changes: Arc<AtomicU64>,
}

impl DevServerState {
    pub fn new() -> Self {
        Self {
            status: RwLock::new(ServerStatus::Starting),
            clients: Arc::new(RwLock::new(HashMap::new())),
            next_client_id: AtomicUsize::new(0),
            changes: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Get current status.
    pub fn status(&self) -> ServerStatus {
        *self.status.read()
    }

    pub fn set_status(&self, status: ServerStatus) {
        *self.status.write() = status;
    }

    /// Move from `from` to `to` atomically.
    ///
    /// Returns `false` (and changes nothing) if the current status is not `from`.
    pub fn transition(&self, from: ServerStatus, to: ServerStatus) -> bool {
        let mut status = self.status.write();
        if *status != from {
            return false;
        }
        *status = to;
        true
    }

    /// Shared change generation.
    pub fn changes(&self) -> Arc<AtomicU64> {
        self.changes.clone()
    }

    pub fn generation(&self) -> u64 {
        self.changes.load(Ordering::Acquire)
    }

    /// Record a change; returns the new generation.
    pub fn bump_generation(&self) -> u64 {
        self.changes.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Register a new SSE client.
    ///
    /// # Returns
    ///
    /// Client ID and receiver for events
    pub fn register_client(&self) -> (usize, mpsc::Receiver<String>) {
        let id = self.next_client_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(CLIENT_BUFFER);
        self.clients.write().insert(id, tx);
        (id, rx)
    }

    /// Unregister an SSE client.
    pub fn unregister_client(&self, id: usize) {
        self.clients.write().remove(&id);
    }

    /// Push a change event to every connected client.
    ///
    /// Never blocks: clients that disconnected or fell too far behind are
    /// dropped from the registry. Returns the number of clients reached.
    pub fn broadcast(&self, event: &ChangeEvent) -> usize {
        let json = match serde_json::to_string(event) {
            Ok(json) => json,
            Err(err) => {
                tracing::warn!("failed to serialize change event: {}", err);
                return 0;
            }
        };

        let clients = self.clients.read().clone();

        let mut failed_ids = Vec::new();
        let mut delivered = 0;
        for (id, tx) in clients {
            match tx.try_send(json.clone()) {
                Ok(()) => delivered += 1,
                Err(_) => failed_ids.push(id),
            }
        }

        for id in failed_ids {
            self.unregister_client(id);
        }

        delivered
    }

    /// Get number of connected clients.
    pub fn client_count(&self) -> usize {
        self.clients.read().len()
    }

    /// Drop every client; their event streams end.
    pub fn disconnect_all(&self) {
        self.clients.write().clear();
    }
}

impl Default for DevServerState {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared state handle for passing around the application.
pub type SharedState = Arc<DevServerState>;
