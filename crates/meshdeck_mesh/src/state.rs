//! Shared mesh state — one structure, one exclusion discipline.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::messages::{MessageLog, TextMessage};
use crate::node::{NodeId, NodeRecord};
use crate::registry::NodeRegistry;

/// Aggregate statistics, recomputed on demand from the live state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeshStats {
    pub total_messages: usize,
    pub total_nodes: usize,
    /// When this process started observing the mesh.
    pub start_time: DateTime<Utc>,
}

/// One-shot export of everything the deck knows, for the requesting
/// observer or an on-disk dump. Never read back by the running process.
#[derive(Debug, Clone, Serialize)]
pub struct ExportDump {
    pub nodes: Vec<NodeRecord>,
    pub messages: Vec<TextMessage>,
    pub stats: MeshStats,
    pub timestamp: DateTime<Utc>,
}

/// All mutable mesh state.
///
/// The classifier and the discovery controller only touch this through the
/// shared lock, so one inbound packet's transition is indivisible relative
/// to every other reader and writer.
#[derive(Debug)]
pub struct MeshState {
    pub registry: NodeRegistry,
    pub log: MessageLog,
    pending_pings: HashSet<NodeId>,
    started_at: DateTime<Utc>,
}

/// Handle shared by the classifier, discovery controller, and hub.
pub type SharedState = Arc<RwLock<MeshState>>;

impl MeshState {
    /// Create empty state stamped with the current start time.
    pub fn new() -> Self {
        Self {
            registry: NodeRegistry::new(),
            log: MessageLog::new(),
            pending_pings: HashSet::new(),
            started_at: Utc::now(),
        }
    }

    /// Create empty state behind the shared lock.
    pub fn shared() -> SharedState {
        Arc::new(RwLock::new(Self::new()))
    }

    /// Mark a targeted ping as outstanding for a node.
    ///
    /// Returns `false` when one is already outstanding; a node never holds
    /// more than one entry.
    pub fn mark_pinged(&mut self, id: &NodeId) -> bool {
        self.pending_pings.insert(id.clone())
    }

    /// Clear an outstanding ping on acknowledgment.
    ///
    /// Returns whether one was actually outstanding; an acknowledgment from
    /// a node that was never pinged is a no-op.
    pub fn ack_ping(&mut self, id: &NodeId) -> bool {
        self.pending_pings.remove(id)
    }

    /// Whether a targeted ping is outstanding for a node.
    pub fn has_pending_ping(&self, id: &NodeId) -> bool {
        self.pending_pings.contains(id)
    }

    /// Number of outstanding targeted pings.
    pub fn pending_ping_count(&self) -> usize {
        self.pending_pings.len()
    }

    /// Current aggregate statistics.
    pub fn stats(&self) -> MeshStats {
        MeshStats {
            total_messages: self.log.len(),
            total_nodes: self.registry.total_count(),
            start_time: self.started_at,
        }
    }

    /// Full export dump, timestamped now.
    pub fn export(&self) -> ExportDump {
        ExportDump {
            nodes: self.registry.snapshot(),
            messages: self.log.snapshot(),
            stats: self.stats(),
            timestamp: Utc::now(),
        }
    }
}

impl Default for MeshState {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
