//! Node registry — tracking every peer discovered on the mesh.

use std::collections::HashMap;

use chrono::Utc;

use crate::node::{LinkMetrics, NodeId, NodeRecord, Position};

/// Registry of all nodes discovered during this run.
///
/// Nodes are created on first observed packet and never removed; metrics
/// accumulate alongside each record for the lifetime of the process.
#[derive(Debug, Default)]
pub struct NodeRegistry {
    nodes: HashMap<String, NodeRecord>,
    metrics: HashMap<String, LinkMetrics>,
}

impl NodeRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            nodes: HashMap::new(),
            metrics: HashMap::new(),
        }
    }

    /// Attribute one decodable packet to a node, creating the record on
    /// first contact. Stamps `last_seen` and bumps `packet_count`.
    ///
    /// Returns `true` when the node was newly created.
    pub fn observe_packet(&mut self, id: &NodeId) -> bool {
        let created = !self.nodes.contains_key(id.as_str());
        let record = self
            .nodes
            .entry(id.as_str().to_string())
            .or_insert_with(|| NodeRecord::new(id.clone()));
        record.last_seen = Utc::now();
        record.packet_count += 1;
        self.metrics.entry(id.as_str().to_string()).or_default();
        created
    }

    /// Insert a fully-formed record with its metrics (demo synthesis path).
    pub fn add_node(&mut self, record: NodeRecord, metrics: LinkMetrics) {
        let key = record.id.as_str().to_string();
        self.nodes.insert(key.clone(), record);
        self.metrics.insert(key, metrics);
    }

    /// Get a node by id.
    pub fn get(&self, id: &NodeId) -> Option<&NodeRecord> {
        self.nodes.get(id.as_str())
    }

    /// Get the metrics accumulator for a node.
    pub fn metrics(&self, id: &NodeId) -> Option<&LinkMetrics> {
        self.metrics.get(id.as_str())
    }

    /// Fold radio-quality readings into a node's record and metrics.
    pub fn record_signal(&mut self, id: &NodeId, snr: Option<f32>, rssi: Option<i32>) {
        let Some(record) = self.nodes.get_mut(id.as_str()) else {
            return;
        };
        let metrics = self.metrics.entry(id.as_str().to_string()).or_default();
        if let Some(snr) = snr {
            record.snr = Some(snr);
            metrics.record_snr(snr);
        }
        if let Some(rssi) = rssi {
            record.rssi = Some(rssi);
            metrics.record_rssi(rssi);
        }
    }

    /// Recompute hop fields from a packet's hop budget pair.
    pub fn record_hops(&mut self, id: &NodeId, hop_start: u32, hop_limit: u32) {
        let Some(record) = self.nodes.get_mut(id.as_str()) else {
            return;
        };
        let metrics = self.metrics.entry(id.as_str().to_string()).or_default();
        metrics.record_hops(hop_start, hop_limit);
        record.hops_away = metrics.current_hop;
    }

    /// Overwrite a node's position (last-write-wins).
    pub fn apply_position(&mut self, id: &NodeId, position: Position) {
        if let Some(record) = self.nodes.get_mut(id.as_str()) {
            record.position = Some(position);
        }
    }

    /// Overwrite a node's identity fields (last-write-wins).
    pub fn apply_node_info(
        &mut self,
        id: &NodeId,
        long_name: String,
        short_name: Option<String>,
        hw_model: Option<String>,
    ) {
        if let Some(record) = self.nodes.get_mut(id.as_str()) {
            record.name = long_name;
            if let Some(short_name) = short_name {
                record.short_name = short_name;
            }
            if let Some(hw_model) = hw_model {
                record.hw_model = hw_model;
            }
        }
    }

    /// Apply a telemetry report. Only the fields present in the payload are
    /// overwritten; absent fields keep their prior values.
    pub fn apply_telemetry(
        &mut self,
        id: &NodeId,
        battery_level: Option<u32>,
        voltage: Option<f32>,
        channel_utilization: Option<f32>,
        air_util_tx: Option<f32>,
    ) {
        let Some(record) = self.nodes.get_mut(id.as_str()) else {
            return;
        };
        if battery_level.is_some() {
            record.battery_level = battery_level;
        }
        if voltage.is_some() {
            record.voltage = voltage;
        }
        if channel_utilization.is_some() {
            record.channel_utilization = channel_utilization;
        }
        if air_util_tx.is_some() {
            record.air_util_tx = air_util_tx;
        }
    }

    /// List every known node.
    pub fn list_all(&self) -> Vec<&NodeRecord> {
        self.nodes.values().collect()
    }

    /// Ids of every known node.
    pub fn node_ids(&self) -> Vec<NodeId> {
        self.nodes.values().map(|n| n.id.clone()).collect()
    }

    /// Total number of known nodes.
    pub fn total_count(&self) -> usize {
        self.nodes.len()
    }

    /// Cloned records for snapshots and export.
    pub fn snapshot(&self) -> Vec<NodeRecord> {
        let mut nodes: Vec<NodeRecord> = self.nodes.values().cloned().collect();
        nodes.sort_by(|a, b| a.first_seen.cmp(&b.first_seen));
        nodes
    }

    /// Cloned metrics keyed by node id, for the discovery report.
    pub fn metrics_snapshot(&self) -> HashMap<String, LinkMetrics> {
        self.metrics.clone()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
