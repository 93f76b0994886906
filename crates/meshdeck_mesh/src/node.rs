//! Node records — per-peer state and rolling link metrics.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Default short name until a node-info payload advertises one.
pub const DEFAULT_SHORT_NAME: &str = "????";
/// Default hardware model until a node-info payload advertises one.
pub const DEFAULT_HW_MODEL: &str = "unknown";

/// A stable node identifier assigned by the radio transport
/// (e.g. `!a1b2c3d4`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId(pub String);

impl NodeId {
    /// Create a NodeId from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Return the inner string representation.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Where a node record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeOrigin {
    /// Observed on the live radio link.
    Radio,
    /// Synthesized by the offline demo path.
    Simulated,
}

/// GPS position of a node.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub latitude: f64,
    pub longitude: f64,
    /// Altitude in meters, when the fix carried one.
    pub altitude: Option<i32>,
}

/// Rolling link-quality metrics for one node.
///
/// Sample histories cover the whole run; the means always equal the
/// arithmetic mean over the full history.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LinkMetrics {
    /// Every SNR sample observed, in arrival order.
    pub snr_samples: Vec<f32>,
    /// Every RSSI sample observed, in arrival order.
    pub rssi_samples: Vec<i32>,
    pub avg_snr: f32,
    pub avg_rssi: f32,
    /// Hop budget of the most recent packet.
    pub max_hops: u32,
    /// Hops actually traveled by the most recent packet.
    pub current_hop: u32,
}

impl LinkMetrics {
    /// Fold in one SNR sample and refresh the mean.
    pub fn record_snr(&mut self, snr: f32) {
        self.snr_samples.push(snr);
        self.avg_snr = self.snr_samples.iter().sum::<f32>() / self.snr_samples.len() as f32;
    }

    /// Fold in one RSSI sample and refresh the mean.
    pub fn record_rssi(&mut self, rssi: i32) {
        self.rssi_samples.push(rssi);
        self.avg_rssi =
            self.rssi_samples.iter().map(|r| *r as f32).sum::<f32>() / self.rssi_samples.len() as f32;
    }

    /// Update hop fields from a packet's hop budget pair.
    ///
    /// A packet whose remaining budget exceeds its starting budget is
    /// malformed; the traveled count clamps to zero instead of wrapping.
    pub fn record_hops(&mut self, hop_start: u32, hop_limit: u32) {
        self.max_hops = hop_start;
        self.current_hop = hop_start.saturating_sub(hop_limit);
    }
}

/// Everything known about one mesh node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeRecord {
    pub id: NodeId,
    /// Display name; the raw id text until a node-info payload names it.
    pub name: String,
    pub short_name: String,
    pub hw_model: String,
    /// Live radio data or synthesized demo data.
    pub origin: NodeOrigin,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    /// Number of decodable packets attributed to this node.
    pub packet_count: u64,
    /// Most recent SNR reading, in dB.
    pub snr: Option<f32>,
    /// Most recent RSSI reading, in dBm.
    pub rssi: Option<i32>,
    /// Hops the most recent packet traveled to reach us.
    pub hops_away: u32,
    pub position: Option<Position>,
    pub battery_level: Option<u32>,
    pub voltage: Option<f32>,
    pub channel_utilization: Option<f32>,
    pub air_util_tx: Option<f32>,
}

impl NodeRecord {
    /// Fresh record for a node seen for the first time.
    pub fn new(id: NodeId) -> Self {
        let now = Utc::now();
        Self {
            name: id.as_str().to_string(),
            id,
            short_name: DEFAULT_SHORT_NAME.to_string(),
            hw_model: DEFAULT_HW_MODEL.to_string(),
            origin: NodeOrigin::Radio,
            first_seen: now,
            last_seen: now,
            packet_count: 0,
            snr: None,
            rssi: None,
            hops_away: 0,
            position: None,
            battery_level: None,
            voltage: None,
            channel_utilization: None,
            air_util_tx: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_record_defaults() {
        let record = NodeRecord::new(NodeId::from_string("!a1b2c3d4"));
        assert_eq!(record.name, "!a1b2c3d4");
        assert_eq!(record.short_name, DEFAULT_SHORT_NAME);
        assert_eq!(record.hw_model, DEFAULT_HW_MODEL);
        assert_eq!(record.origin, NodeOrigin::Radio);
        assert_eq!(record.packet_count, 0);
        assert_eq!(record.first_seen, record.last_seen);
    }

    #[test]
    fn test_metrics_mean_over_full_history() {
        let mut metrics = LinkMetrics::default();
        metrics.record_snr(8.0);
        metrics.record_snr(4.0);
        metrics.record_snr(6.0);
        assert!((metrics.avg_snr - 6.0).abs() < f32::EPSILON);
        assert_eq!(metrics.snr_samples.len(), 3);

        metrics.record_rssi(-80);
        metrics.record_rssi(-100);
        assert!((metrics.avg_rssi + 90.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_hop_budget_clamps_to_zero() {
        let mut metrics = LinkMetrics::default();
        metrics.record_hops(3, 7);
        assert_eq!(metrics.current_hop, 0);
        assert_eq!(metrics.max_hops, 3);

        metrics.record_hops(7, 3);
        assert_eq!(metrics.current_hop, 4);
        assert_eq!(metrics.max_hops, 7);
    }

    #[test]
    fn test_origin_wire_tag() {
        let json = serde_json::to_string(&NodeOrigin::Simulated).unwrap();
        assert_eq!(json, "\"simulated\"");
    }
}
