//! Observer set — joint fan-out with per-observer failure isolation.
//!
//! Each observer is a bounded mpsc sender draining into that connection's
//! writer task. A broadcast dispatches to every observer concurrently and
//! awaits them jointly; an observer whose channel is gone is dropped from
//! the set without disturbing the others.

use std::collections::HashMap;
use std::future::Future;

use futures::future::join_all;
use tokio::sync::{RwLock, mpsc};
use tracing::debug;
use uuid::Uuid;

/// How many frames may queue per observer before its deliveries lag.
pub const OBSERVER_QUEUE_DEPTH: usize = 256;

/// The set of connected observers.
#[derive(Debug, Default)]
pub struct ObserverSet {
    observers: RwLock<HashMap<Uuid, mpsc::Sender<String>>>,
}

impl ObserverSet {
    pub fn new() -> Self {
        Self {
            observers: RwLock::new(HashMap::new()),
        }
    }

    /// Register an observer, queueing the frame produced by `init` before
    /// anything else can reach it.
    ///
    /// The set stays locked while `init` runs, so a concurrent broadcast
    /// cannot slip a frame ahead of the snapshot, and the snapshot cannot
    /// miss an event that existing observers already saw. Returns `false`
    /// (and registers nothing) when `init` yields no frame or the
    /// observer's channel is already closed.
    pub async fn join_with_init<F, Fut>(&self, id: Uuid, tx: mpsc::Sender<String>, init: F) -> bool
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Option<String>>,
    {
        let mut observers = self.observers.write().await;
        let Some(frame) = init().await else {
            return false;
        };
        if tx.send(frame).await.is_err() {
            debug!("Observer {id} closed before init could be queued");
            return false;
        }
        observers.insert(id, tx);
        debug!("Observer {id} joined ({} connected)", observers.len());
        true
    }

    /// Remove an observer. Returns whether it was present.
    pub async fn leave(&self, id: &Uuid) -> bool {
        let removed = self.observers.write().await.remove(id).is_some();
        if removed {
            debug!("Observer {id} left");
        }
        removed
    }

    /// Number of currently connected observers.
    pub async fn count(&self) -> usize {
        self.observers.read().await.len()
    }

    /// Deliver one frame to every observer, jointly awaited.
    ///
    /// Observers whose channel is gone are removed from the set. Returns
    /// how many deliveries succeeded.
    pub async fn broadcast(&self, frame: &str) -> usize {
        let targets: Vec<(Uuid, mpsc::Sender<String>)> = {
            self.observers
                .read()
                .await
                .iter()
                .map(|(id, tx)| (*id, tx.clone()))
                .collect()
        };
        if targets.is_empty() {
            return 0;
        }

        let sends = targets.into_iter().map(|(id, tx)| async move {
            let delivered = tx.send(frame.to_string()).await.is_ok();
            (id, delivered)
        });
        let results = join_all(sends).await;

        let mut delivered = 0;
        let mut failed = Vec::new();
        for (id, ok) in results {
            if ok {
                delivered += 1;
            } else {
                failed.push(id);
            }
        }

        if !failed.is_empty() {
            let mut observers = self.observers.write().await;
            for id in &failed {
                observers.remove(id);
                debug!("Dropped unreachable observer {id}");
            }
        }
        delivered
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
