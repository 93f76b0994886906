//! Mesh Deck — radio-mesh command center.
//!
//! Wires the mesh state, classifier, discovery controller, and observer
//! server together, attaches the configured radio if one is reachable,
//! and runs until SIGINT.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use meshdeck_core::config::DeckConfig;
use meshdeck_core::logging;
use meshdeck_hub::{CommandExecutor, DeckServer};
use meshdeck_mesh::discovery::{CascadeDiscovery, DiscoveryConfig};
use meshdeck_mesh::events::EventBus;
use meshdeck_mesh::ingest::Classifier;
use meshdeck_mesh::radio::{LinkSlot, OfflineConnector, RadioConnector};
use meshdeck_mesh::state::MeshState;

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    let _log_guard = logging::init_logging(&logging::default_filter())
        .expect("Failed to initialize logging");
    info!("Starting Mesh Deck v{VERSION}");

    let config = DeckConfig::load().context("Failed to load configuration")?;

    let state = MeshState::shared();
    let bus = EventBus::default();
    let slot = Arc::new(LinkSlot::new());

    // Inbound envelopes from whichever link is attached feed the classifier.
    let (inbound_tx, mut inbound_rx) = mpsc::channel(256);
    let classifier = Classifier::new(state.clone(), bus.clone());
    tokio::spawn(async move {
        while let Some(envelope) = inbound_rx.recv().await {
            classifier.ingest(envelope).await;
        }
        debug!("Inbound envelope channel closed");
    });

    let report_dir = if config.write_reports {
        Some(
            config
                .report_dir()
                .context("Failed to resolve report directory")?,
        )
    } else {
        None
    };
    let discovery = Arc::new(CascadeDiscovery::new(
        state.clone(),
        bus.clone(),
        slot.clone(),
        DiscoveryConfig {
            ping_interval: config.ping_interval,
            max_duration: config.max_discovery_duration,
            settle_delay: config.settle_delay,
            ping_pacing: config.ping_pacing(),
            demo_pacing: config.send_pacing(),
            report_dir,
        },
    ));

    let connector: Arc<dyn RadioConnector> = Arc::new(OfflineConnector);

    // Attach the configured radio, if any; failure leaves us in demo mode.
    if let Some(address) = &config.radio_address {
        match connector
            .connect(address, &config.radio_region, inbound_tx.clone())
            .await
        {
            Ok(link) => {
                slot.attach(link).await;
                info!("Radio link attached at {address}");
            }
            Err(e) => {
                warn!("Radio at {address} unavailable, running offline: {e}");
            }
        }
    }

    let executor = CommandExecutor::new(
        state.clone(),
        bus.clone(),
        slot.clone(),
        connector,
        discovery,
        inbound_tx,
        config.send_pacing(),
    );
    let server = DeckServer::new(
        config.listen_addr,
        state,
        bus,
        executor,
        config.history_window,
    );

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let ctrl_c_shutdown = shutdown_tx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown signal received");
            let _ = ctrl_c_shutdown.send(());
        }
    });

    server.run(shutdown_rx).await.context("Observer server failed")?;

    if let Some(link) = slot.take().await {
        link.close().await;
        info!("Radio link closed");
    }

    info!("Mesh Deck stopped");
    Ok(())
}
