//! Mesh error types.

use std::time::Duration;

/// Errors that can occur in the meshdeck_mesh crate.
#[derive(Debug, thiserror::Error)]
pub enum MeshError {
    /// A radio-level error (connect/send through the link).
    #[error("Radio error: {0}")]
    Radio(String),

    /// No radio link is currently attached.
    #[error("No radio link attached")]
    LinkUnavailable,

    /// The requested node was not found in the registry.
    #[error("Node not found: {0}")]
    NodeNotFound(String),

    /// JSON serialization / deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Discovery subsystem error.
    #[error("Discovery error: {0}")]
    Discovery(String),

    /// A discovery run is already in progress.
    #[error("Discovery already active")]
    DiscoveryActive,

    /// An operation timed out.
    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
