//! Typed event bus — state changes fanned out to whoever subscribes.

use tokio::sync::broadcast;

use crate::messages::TextMessage;
use crate::node::{NodeId, NodeRecord};
use crate::state::MeshStats;

/// A state change worth telling observers about.
#[derive(Debug, Clone)]
pub enum MeshEvent {
    /// A node record changed; carries the full current snapshot.
    NodeUpdated(NodeRecord),
    /// A text message was observed on the mesh.
    MessageReceived(TextMessage),
    /// Operator-readable status line (connection results, send failures,
    /// discovery progress).
    SystemMessage(String),
    /// Aggregate counts changed.
    StatsUpdated(MeshStats),
    /// A targeted ping was acknowledged by its node.
    PingAcknowledged(NodeId),
    /// A discovery run finished.
    DiscoveryComplete {
        node_count: usize,
        elapsed_secs: u64,
    },
}

/// Broadcast channel for [`MeshEvent`]s.
///
/// Emitting never blocks and never fails; events emitted with no subscriber
/// are simply dropped.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<MeshEvent>,
}

impl EventBus {
    /// Create a bus with the given buffered capacity per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to all future events.
    pub fn subscribe(&self) -> broadcast::Receiver<MeshEvent> {
        self.tx.subscribe()
    }

    /// Emit one event to every current subscriber.
    pub fn emit(&self, event: MeshEvent) {
        let _ = self.tx.send(event);
    }

    /// Emit an operator-readable system message.
    pub fn system_message(&self, text: impl Into<String>) {
        self.emit(MeshEvent::SystemMessage(text.into()));
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_emit_reaches_subscriber() {
        let bus = EventBus::new(8);
        let mut rx = bus.subscribe();

        bus.system_message("🔍 Starting cascade discovery...");

        match rx.recv().await.unwrap() {
            MeshEvent::SystemMessage(text) => {
                assert_eq!(text, "🔍 Starting cascade discovery...");
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_emit_without_subscribers_is_fine() {
        let bus = EventBus::new(8);
        bus.emit(MeshEvent::DiscoveryComplete {
            node_count: 0,
            elapsed_secs: 0,
        });
    }

    #[tokio::test]
    async fn test_each_subscriber_sees_every_event() {
        let bus = EventBus::new(8);
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();

        bus.emit(MeshEvent::PingAcknowledged(NodeId::from_string("!01020304")));

        assert!(matches!(a.recv().await.unwrap(), MeshEvent::PingAcknowledged(_)));
        assert!(matches!(b.recv().await.unwrap(), MeshEvent::PingAcknowledged(_)));
    }
}
