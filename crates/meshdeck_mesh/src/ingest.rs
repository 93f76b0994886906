//! Packet classifier — turning inbound envelopes into state updates.

use chrono::Utc;
use tracing::{debug, info};

use crate::events::{EventBus, MeshEvent};
use crate::messages::TextMessage;
use crate::node::Position;
use crate::packet::{PacketPayload, RadioEnvelope};
use crate::state::SharedState;

/// Classifies inbound packets and applies them to the shared state.
///
/// One `ingest` call is one atomic state transition: the write lock is held
/// across every step, and events go out only after it is released.
pub struct Classifier {
    state: SharedState,
    bus: EventBus,
}

impl Classifier {
    /// Create a classifier over the shared state and event bus.
    pub fn new(state: SharedState, bus: EventBus) -> Self {
        Self { state, bus }
    }

    /// Ingest one inbound envelope.
    ///
    /// Envelopes without a decodable payload are dropped without touching
    /// any state. Every decodable envelope attributes exactly one packet to
    /// its sender before payload dispatch, whatever the payload kind.
    pub async fn ingest(&self, envelope: RadioEnvelope) {
        let Some(payload) = envelope.payload else {
            debug!("Dropping undecoded packet from {}", envelope.from);
            return;
        };

        let mut events = Vec::new();
        {
            let mut state = self.state.write().await;
            let created = state.registry.observe_packet(&envelope.from);
            state
                .registry
                .record_signal(&envelope.from, envelope.snr, envelope.rssi);
            if let (Some(hop_start), Some(hop_limit)) = (envelope.hop_start, envelope.hop_limit) {
                state.registry.record_hops(&envelope.from, hop_start, hop_limit);
            }

            let mut logged_message = false;
            match payload {
                PacketPayload::Text { text } => {
                    let from = state
                        .registry
                        .get(&envelope.from)
                        .map(|n| n.name.clone())
                        .unwrap_or_else(|| envelope.from.as_str().to_string());
                    let message = TextMessage {
                        from,
                        from_id: envelope.from.clone(),
                        text,
                        timestamp: Utc::now(),
                    };
                    state.log.push(message.clone());
                    events.push(MeshEvent::MessageReceived(message));
                    logged_message = true;
                }
                PacketPayload::Position {
                    latitude,
                    longitude,
                    altitude,
                } => {
                    state.registry.apply_position(
                        &envelope.from,
                        Position {
                            latitude,
                            longitude,
                            altitude,
                        },
                    );
                }
                PacketPayload::NodeInfo {
                    long_name,
                    short_name,
                    hw_model,
                } => {
                    state
                        .registry
                        .apply_node_info(&envelope.from, long_name, short_name, hw_model);
                }
                PacketPayload::Telemetry {
                    battery_level,
                    voltage,
                    channel_utilization,
                    air_util_tx,
                } => {
                    state.registry.apply_telemetry(
                        &envelope.from,
                        battery_level,
                        voltage,
                        channel_utilization,
                        air_util_tx,
                    );
                }
                PacketPayload::RoutingResponse => {
                    if state.ack_ping(&envelope.from) {
                        info!("Ping acknowledged by {}", envelope.from);
                        events.push(MeshEvent::PingAcknowledged(envelope.from.clone()));
                    }
                }
                PacketPayload::Other { port } => {
                    debug!("Unhandled payload kind '{port}' from {}", envelope.from);
                }
            }

            if let Some(record) = state.registry.get(&envelope.from) {
                events.push(MeshEvent::NodeUpdated(record.clone()));
            }
            if created || logged_message {
                events.push(MeshEvent::StatsUpdated(state.stats()));
            }
        }

        for event in events {
            self.bus.emit(event);
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
