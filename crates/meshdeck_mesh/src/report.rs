//! Discovery report — one-shot JSON dump written when a live run completes.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use crate::error::MeshError;
use crate::node::{LinkMetrics, NodeRecord};
use crate::state::MeshState;

/// Shape of the report file. Written once, never read back.
#[derive(Debug, Serialize)]
pub struct DiscoveryReport {
    /// How long the run took, in seconds.
    pub discovery_time_secs: u64,
    pub total_nodes: usize,
    pub timestamp: DateTime<Utc>,
    pub nodes: Vec<NodeRecord>,
    /// Full per-node sample histories, keyed by node id.
    pub metrics: HashMap<String, LinkMetrics>,
}

/// Build a report from the current state.
pub fn build_report(state: &MeshState, elapsed_secs: u64) -> DiscoveryReport {
    DiscoveryReport {
        discovery_time_secs: elapsed_secs,
        total_nodes: state.registry.total_count(),
        timestamp: Utc::now(),
        nodes: state.registry.snapshot(),
        metrics: state.registry.metrics_snapshot(),
    }
}

/// Write a report under `dir` as `discovery_report_<unix_ts>.json`.
///
/// Returns the path written.
pub fn write_report(dir: &Path, state: &MeshState, elapsed_secs: u64) -> Result<PathBuf, MeshError> {
    let report = build_report(state, elapsed_secs);
    std::fs::create_dir_all(dir)?;
    let path = dir.join(format!(
        "discovery_report_{}.json",
        report.timestamp.timestamp()
    ));
    let json = serde_json::to_string_pretty(&report)?;
    std::fs::write(&path, json)?;
    info!("Discovery report written to {}", path.display());
    Ok(path)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
