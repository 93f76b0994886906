//! Mesh Deck Mesh — node registry, packet ingestion, and cascade discovery.
//!
//! This crate provides the mesh-side core of Mesh Deck: a registry of every
//! node heard on the radio together with its link metrics, a classifier that
//! turns decoded radio packets into state changes and typed events, and a
//! discovery controller that actively probes the mesh until the picture
//! stabilizes.
//!
//! # Architecture
//!
//! - **State**: one [`MeshState`] behind an async `RwLock`, holding the node
//!   registry, message log, and outstanding-ping set.
//! - **Events**: a broadcast [`EventBus`] carrying typed [`MeshEvent`]s to
//!   any number of observers.
//! - **Radio**: the [`radio::RadioLink`] trait abstracts the attached
//!   device; a [`radio::LinkSlot`] holds whichever link is current.
//! - **Discovery**: [`CascadeDiscovery`] drives broadcast probes and
//!   targeted pings on a paced loop with a hard time cap.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use meshdeck_mesh::{CascadeDiscovery, DiscoveryConfig, EventBus, MeshState};
//! use meshdeck_mesh::radio::LinkSlot;
//! use std::sync::Arc;
//!
//! # async fn example() {
//! let state = MeshState::shared();
//! let bus = EventBus::default();
//! let slot = Arc::new(LinkSlot::new());
//!
//! let discovery = Arc::new(CascadeDiscovery::new(
//!     state.clone(),
//!     bus.clone(),
//!     slot,
//!     DiscoveryConfig::default(),
//! ));
//! discovery.start().unwrap();
//! # }
//! ```

pub mod demo;
pub mod discovery;
pub mod error;
pub mod events;
pub mod ingest;
pub mod messages;
pub mod node;
pub mod packet;
pub mod radio;
pub mod registry;
pub mod report;
pub mod state;

// ── Re-exports for convenience ──────────────────────────────────────────

pub use discovery::{CascadeDiscovery, DiscoveryConfig, DiscoveryState, DISCOVERY_PROBE};
pub use error::MeshError;
pub use events::{EventBus, MeshEvent};
pub use ingest::Classifier;
pub use messages::{MessageLog, TextMessage};
pub use node::{NodeId, NodeOrigin, NodeRecord, Position};
pub use packet::{PacketPayload, RadioEnvelope};
pub use registry::NodeRegistry;
pub use state::{MeshState, MeshStats, SharedState};
