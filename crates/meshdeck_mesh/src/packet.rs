//! Inbound packet model — the envelope the radio boundary delivers.

use serde::{Deserialize, Serialize};

use crate::node::NodeId;

/// Decoded application payload of an inbound mesh packet.
///
/// The transport maps its port numbers onto these kinds before handing the
/// packet over; anything it does not recognize arrives as [`PacketPayload::Other`]
/// with the raw port tag preserved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PacketPayload {
    /// Plain text message seen on the mesh.
    Text {
        /// The message body.
        text: String,
    },
    /// GPS position report.
    Position {
        latitude: f64,
        longitude: f64,
        /// Altitude in meters, when the fix carried one.
        altitude: Option<i32>,
    },
    /// Node identity broadcast.
    NodeInfo {
        /// Full display name.
        long_name: String,
        /// Four-character short name, when advertised.
        short_name: Option<String>,
        /// Hardware model string, when advertised.
        hw_model: Option<String>,
    },
    /// Device telemetry. Absent fields were not reported in this packet.
    Telemetry {
        battery_level: Option<u32>,
        voltage: Option<f32>,
        channel_utilization: Option<f32>,
        air_util_tx: Option<f32>,
    },
    /// Acknowledgment correlated to an earlier targeted ping.
    RoutingResponse,
    /// Unrecognized application payload; the port tag is kept for logging.
    Other {
        port: String,
    },
}

impl PacketPayload {
    /// Return a string label for logging and dispatch tracing.
    pub fn label(&self) -> &str {
        match self {
            Self::Text { .. } => "text",
            Self::Position { .. } => "position",
            Self::NodeInfo { .. } => "node_info",
            Self::Telemetry { .. } => "telemetry",
            Self::RoutingResponse => "routing_response",
            Self::Other { port } => port,
        }
    }
}

/// One inbound packet as delivered by the radio boundary.
///
/// `payload` is `None` when the transport could not decode the packet; such
/// envelopes never mutate any state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RadioEnvelope {
    /// Transport-assigned sender id.
    pub from: NodeId,
    /// Decoded payload, if any.
    pub payload: Option<PacketPayload>,
    /// Signal-to-noise ratio of the received packet, in dB.
    pub snr: Option<f32>,
    /// Received signal strength, in dBm.
    pub rssi: Option<i32>,
    /// Hop budget the packet started with.
    pub hop_start: Option<u32>,
    /// Hop budget remaining at receipt.
    pub hop_limit: Option<u32>,
}

impl RadioEnvelope {
    /// Create an envelope with no radio-quality metadata.
    pub fn new(from: NodeId, payload: Option<PacketPayload>) -> Self {
        Self {
            from,
            payload,
            snr: None,
            rssi: None,
            hop_start: None,
            hop_limit: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
