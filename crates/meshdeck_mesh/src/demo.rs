//! Offline demo synthesis — fixture nodes for running without hardware.
//!
//! When no radio link is attached, discovery feeds these three nodes into
//! the registry so observers can be exercised end to end. Every record is
//! marked [`NodeOrigin::Simulated`], which travels on the wire, so a
//! dashboard can always tell synthetic rows from live traffic.

use std::time::Duration;

use tracing::info;

use crate::events::{EventBus, MeshEvent};
use crate::node::{LinkMetrics, NodeId, NodeOrigin, NodeRecord, Position};
use crate::state::SharedState;

/// (id, name, snr, rssi, hops, battery, latitude, longitude)
const FIXTURES: [(&str, &str, f32, i32, u32, u32, f64, f64); 3] = [
    ("!a1b2c3d4", "Base Station", 8.5, -85, 0, 95, 45.4981, -122.4404),
    ("!e5f6g7h8", "Node Alpha", 4.2, -105, 1, 78, 45.5081, -122.4504),
    ("!i9j0k1l2", "Node Beta", 6.8, -92, 1, 88, 45.4881, -122.4304),
];

/// Build the demo node set.
pub fn demo_nodes() -> Vec<(NodeRecord, LinkMetrics)> {
    FIXTURES
        .iter()
        .map(|&(id, name, snr, rssi, hops, battery, latitude, longitude)| {
            let mut record = NodeRecord::new(NodeId::from_string(id));
            record.name = name.to_string();
            record.origin = NodeOrigin::Simulated;
            record.packet_count = 1;
            record.snr = Some(snr);
            record.rssi = Some(rssi);
            record.hops_away = hops;
            record.battery_level = Some(battery);
            record.position = Some(Position {
                latitude,
                longitude,
                altitude: None,
            });

            let mut metrics = LinkMetrics::default();
            metrics.record_snr(snr);
            metrics.record_rssi(rssi);
            metrics.max_hops = hops;
            metrics.current_hop = hops;
            (record, metrics)
        })
        .collect()
}

/// Feed the fixtures into the shared state one at a time, paced like a real
/// discovery run, emitting the same events live ingest would.
pub async fn synthesize(state: &SharedState, bus: &EventBus, pace: Duration) {
    info!("Synthesizing demo nodes (no radio attached)");
    for (record, metrics) in demo_nodes() {
        tokio::time::sleep(pace).await;
        let stats = {
            let mut state = state.write().await;
            state.registry.add_node(record.clone(), metrics);
            state.stats()
        };
        bus.emit(MeshEvent::NodeUpdated(record));
        bus.emit(MeshEvent::StatsUpdated(stats));
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
