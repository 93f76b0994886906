//! Observer command execution.
//!
//! Every command resolves to state reads, radio sends, or a discovery
//! start; outcomes surface as system messages on the event bus. Nothing
//! here returns an error to the observer: failures are logged and narrated.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use meshdeck_mesh::discovery::CascadeDiscovery;
use meshdeck_mesh::error::MeshError;
use meshdeck_mesh::events::EventBus;
use meshdeck_mesh::node::NodeId;
use meshdeck_mesh::packet::RadioEnvelope;
use meshdeck_mesh::radio::{LinkSlot, RadioConnector};
use meshdeck_mesh::state::SharedState;

use crate::wire::{ObserverCommand, WireEvent};

/// Executes observer commands against the mesh state and radio link.
pub struct CommandExecutor {
    state: SharedState,
    bus: EventBus,
    slot: Arc<LinkSlot>,
    connector: Arc<dyn RadioConnector>,
    discovery: Arc<CascadeDiscovery>,
    /// Classifier feed handed to freshly connected links.
    inbound: mpsc::Sender<RadioEnvelope>,
    /// Pause between sequential outbound sends.
    send_pacing: Duration,
}

impl CommandExecutor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        state: SharedState,
        bus: EventBus,
        slot: Arc<LinkSlot>,
        connector: Arc<dyn RadioConnector>,
        discovery: Arc<CascadeDiscovery>,
        inbound: mpsc::Sender<RadioEnvelope>,
        send_pacing: Duration,
    ) -> Self {
        Self {
            state,
            bus,
            slot,
            connector,
            discovery,
            inbound,
            send_pacing,
        }
    }

    /// Run one command. `reply` is the requesting observer's own frame
    /// queue, used for responses that must not be broadcast.
    pub async fn execute(&self, command: ObserverCommand, reply: &mpsc::Sender<String>) {
        debug!("Executing observer command: {command:?}");
        match command {
            ObserverCommand::StartDiscovery => self.start_discovery(),
            ObserverCommand::PingAll => self.ping_all().await,
            ObserverCommand::SendMessage { text, target } => {
                self.send_message(&text, &target).await
            }
            ObserverCommand::SendBroadcast { text } => self.send_broadcast(&text).await,
            ObserverCommand::ConnectDevice { address, region } => {
                self.connect_device(&address, &region).await
            }
            ObserverCommand::ExportData => self.export_data(reply).await,
        }
    }

    fn start_discovery(&self) {
        match self.discovery.start() {
            Ok(()) => {}
            Err(MeshError::DiscoveryActive) => {
                warn!("Discovery start rejected: a run is already active");
                self.bus.system_message("⚠️ Discovery already running");
            }
            Err(e) => {
                warn!("Discovery start failed: {e}");
                self.bus.system_message(format!("❌ Discovery error: {e}"));
            }
        }
    }

    async fn ping_all(&self) {
        let Some(link) = self.slot.current().await else {
            self.bus.system_message("❌ No device connected");
            return;
        };

        let targets = self.state.read().await.registry.node_ids();
        self.bus
            .system_message(format!("📡 Pinging {} nodes...", targets.len()));

        for id in targets {
            match link.send_ping(&id).await {
                Ok(()) => {
                    self.state.write().await.mark_pinged(&id);
                    debug!("Ping sent to {id}");
                }
                Err(e) => {
                    warn!("Ping to {id} failed: {e}");
                }
            }
            sleep(self.send_pacing).await;
        }

        self.bus.system_message("✅ Ping complete");
    }

    async fn send_message(&self, text: &str, target: &str) {
        let Some(link) = self.slot.current().await else {
            self.bus.system_message("❌ No device connected");
            return;
        };

        let result = if target == "broadcast" {
            link.send_broadcast(text).await
        } else {
            link.send_text(&NodeId::from_string(target), text, true).await
        };
        if let Err(e) = result {
            warn!("Send to {target} failed: {e}");
        }
    }

    async fn send_broadcast(&self, text: &str) {
        let Some(link) = self.slot.current().await else {
            self.bus.system_message("❌ No device connected");
            return;
        };

        self.bus.system_message(format!("📢 Broadcasting: {text}"));
        if let Err(e) = link.send_broadcast(text).await {
            warn!("Channel broadcast failed: {e}");
        }

        // Direct copy to each known node so nodes outside the shared
        // channel's reach still get the text, acknowledged.
        let targets = self.state.read().await.registry.node_ids();
        for id in targets {
            if let Err(e) = link.send_text(&id, text, true).await {
                warn!("Direct send to {id} failed: {e}");
                self.bus
                    .system_message(format!("⚠️ Send to {id} failed: {e}"));
            }
            sleep(self.send_pacing).await;
        }

        self.bus.system_message("✅ Broadcast complete");
    }

    async fn connect_device(&self, address: &str, region: &str) {
        if let Some(old) = self.slot.take().await {
            info!("Closing previous link to {}", old.address());
            old.close().await;
        }

        match self
            .connector
            .connect(address, region, self.inbound.clone())
            .await
        {
            Ok(link) => {
                self.slot.attach(link).await;
                info!("Radio link attached at {address}");
                self.bus.system_message(format!("✅ Connected to {address}"));
            }
            Err(e) => {
                warn!("Connection to {address} failed: {e}");
                self.bus.system_message(format!("❌ Connection failed: {e}"));
            }
        }
    }

    async fn export_data(&self, reply: &mpsc::Sender<String>) {
        let frame = {
            let state = self.state.read().await;
            WireEvent::ExportData {
                data: state.export(),
            }
            .to_json()
        };
        match frame {
            Ok(json) => {
                if reply.send(json).await.is_err() {
                    debug!("Export requester disconnected before delivery");
                }
            }
            Err(e) => warn!("Export serialization failed: {e}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
