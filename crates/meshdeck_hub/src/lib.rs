//! Mesh Deck Hub — observer fan-out and command relay.
//!
//! This crate provides the observer-facing side of Mesh Deck: a WebSocket
//! server that streams mesh events to any number of connected dashboards
//! and relays their commands back to the discovery controller and radio
//! link.
//!
//! # Architecture
//!
//! - **Wire**: `type`-tagged JSON event frames out, `command`-tagged JSON
//!   frames in.
//! - **Fan-out**: one bounded frame queue per observer; broadcasts are
//!   dispatched concurrently and awaited jointly, with failed observers
//!   dropped in isolation.
//! - **Init-first**: a joining observer has the full state snapshot queued
//!   before any live frame can reach it.
//! - **Commands**: executed against the shared mesh state; outcomes are
//!   narrated as system messages on the event bus.

pub mod commands;
pub mod fanout;
pub mod server;
pub mod wire;

// ── Re-exports for convenience ──────────────────────────────────────────

pub use commands::CommandExecutor;
pub use fanout::ObserverSet;
pub use server::DeckServer;
pub use wire::{ObserverCommand, WireEvent};
