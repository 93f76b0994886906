//! Wire records exchanged with observers — JSON both ways.
//!
//! Outbound events carry a `type` tag, inbound commands a `command` tag.
//! Everything on the wire is `snake_case`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use meshdeck_mesh::events::MeshEvent;
use meshdeck_mesh::messages::TextMessage;
use meshdeck_mesh::node::NodeRecord;
use meshdeck_mesh::state::{ExportDump, MeshState, MeshStats};

/// An event frame sent to observers.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WireEvent {
    /// A node record changed; carries the full current snapshot.
    NodeUpdate { node: NodeRecord },
    /// A text message observed on the mesh.
    Message {
        #[serde(flatten)]
        message: TextMessage,
    },
    /// Operator-readable status line.
    SystemMessage {
        text: String,
        timestamp: DateTime<Utc>,
    },
    /// Aggregate counts changed.
    StatsUpdate { stats: MeshStats },
    /// First frame for a newly joined observer: full node set, recent
    /// message window, current stats.
    Init {
        nodes: Vec<NodeRecord>,
        messages: Vec<TextMessage>,
        stats: MeshStats,
    },
    /// Full dump, sent only to the observer that asked for it.
    ExportData { data: ExportDump },
}

impl WireEvent {
    /// Map a mesh event to its wire form. Events with no observer-facing
    /// representation map to `None`.
    pub fn from_mesh_event(event: MeshEvent) -> Option<Self> {
        match event {
            MeshEvent::NodeUpdated(node) => Some(Self::NodeUpdate { node }),
            MeshEvent::MessageReceived(message) => Some(Self::Message { message }),
            MeshEvent::SystemMessage(text) => Some(Self::SystemMessage {
                text,
                timestamp: Utc::now(),
            }),
            MeshEvent::StatsUpdated(stats) => Some(Self::StatsUpdate { stats }),
            // Observers learn about acknowledgments through the refreshed
            // node record and about completion through the system message.
            MeshEvent::PingAcknowledged(_) => None,
            MeshEvent::DiscoveryComplete { .. } => None,
        }
    }

    /// Build the joining snapshot for a new observer.
    pub fn init(state: &MeshState, history_window: usize) -> Self {
        Self::Init {
            nodes: state.registry.snapshot(),
            messages: state.log.recent(history_window),
            stats: state.stats(),
        }
    }

    /// Serialize to a JSON string for the socket.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// A command frame received from an observer.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum ObserverCommand {
    /// Start a cascade discovery run.
    StartDiscovery,
    /// Ping every known node once, paced.
    PingAll,
    /// Send a text; `target` is `"broadcast"` or a node id.
    SendMessage {
        text: String,
        #[serde(default = "default_target")]
        target: String,
    },
    /// Broadcast a text, then deliver it to each known node directly.
    SendBroadcast { text: String },
    /// Attach a radio at the given address, replacing any current link.
    ConnectDevice {
        address: String,
        #[serde(default = "default_region")]
        region: String,
    },
    /// Request a full data dump, delivered to this observer only.
    ExportData,
}

fn default_target() -> String {
    "broadcast".to_string()
}

fn default_region() -> String {
    "US".to_string()
}

impl ObserverCommand {
    /// Parse a command frame from a JSON string.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
