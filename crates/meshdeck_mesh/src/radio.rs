//! Radio boundary — outbound send capability and link lifecycle.
//!
//! The physical transport lives outside this crate. It implements
//! [`RadioLink`] for outbound sends and pushes decoded inbound packets into
//! the mpsc channel handed to its [`RadioConnector`].

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{RwLock, mpsc};
use tracing::debug;

use crate::error::MeshError;
use crate::node::NodeId;
use crate::packet::RadioEnvelope;

/// Outbound capability of an attached radio device.
#[async_trait]
pub trait RadioLink: Send + Sync {
    /// Send text on the shared primary channel. No acknowledgment expected.
    async fn send_broadcast(&self, text: &str) -> Result<(), MeshError>;

    /// Send text to one node, optionally requesting an acknowledgment.
    async fn send_text(&self, to: &NodeId, text: &str, want_ack: bool) -> Result<(), MeshError>;

    /// Send an empty routing probe to one node, requesting an acknowledgment
    /// and a response. The reply comes back as a routing-response packet.
    async fn send_ping(&self, to: &NodeId) -> Result<(), MeshError>;

    /// Address of the attached device, for operator messages.
    fn address(&self) -> String;

    /// Close the link and release the device.
    async fn close(&self);
}

/// Opens radio links on demand (`connect_device`).
#[async_trait]
pub trait RadioConnector: Send + Sync {
    /// Open a link to the device at `address`, configured for `region`.
    /// Decoded inbound packets flow into `inbound` for the classifier.
    async fn connect(
        &self,
        address: &str,
        region: &str,
        inbound: mpsc::Sender<RadioEnvelope>,
    ) -> Result<Arc<dyn RadioLink>, MeshError>;
}

/// Holder for the currently attached link, if any.
///
/// Empty means offline: discovery falls back to the demo path and send
/// commands report the missing device instead of erroring.
#[derive(Default)]
pub struct LinkSlot {
    current: RwLock<Option<Arc<dyn RadioLink>>>,
}

impl LinkSlot {
    /// Create an empty slot.
    pub fn new() -> Self {
        Self {
            current: RwLock::new(None),
        }
    }

    /// The attached link, if any.
    pub async fn current(&self) -> Option<Arc<dyn RadioLink>> {
        self.current.read().await.clone()
    }

    /// Whether a link is attached.
    pub async fn is_attached(&self) -> bool {
        self.current.read().await.is_some()
    }

    /// Attach a link, returning the one it replaced.
    pub async fn attach(&self, link: Arc<dyn RadioLink>) -> Option<Arc<dyn RadioLink>> {
        self.current.write().await.replace(link)
    }

    /// Detach and return the current link.
    pub async fn take(&self) -> Option<Arc<dyn RadioLink>> {
        self.current.write().await.take()
    }
}

/// Connector for builds without a radio backend; every attempt fails and
/// the deck keeps running offline.
pub struct OfflineConnector;

#[async_trait]
impl RadioConnector for OfflineConnector {
    async fn connect(
        &self,
        address: &str,
        region: &str,
        _inbound: mpsc::Sender<RadioEnvelope>,
    ) -> Result<Arc<dyn RadioLink>, MeshError> {
        debug!("No radio backend available (requested {address}, region {region})");
        Err(MeshError::Radio("no radio backend available".to_string()))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    struct NullLink;

    #[async_trait]
    impl RadioLink for NullLink {
        async fn send_broadcast(&self, _text: &str) -> Result<(), MeshError> {
            Ok(())
        }

        async fn send_text(
            &self,
            _to: &NodeId,
            _text: &str,
            _want_ack: bool,
        ) -> Result<(), MeshError> {
            Ok(())
        }

        async fn send_ping(&self, _to: &NodeId) -> Result<(), MeshError> {
            Ok(())
        }

        fn address(&self) -> String {
            "null0".to_string()
        }

        async fn close(&self) {}
    }

    #[tokio::test]
    async fn test_slot_attach_and_take() {
        let slot = LinkSlot::new();
        assert!(!slot.is_attached().await);
        assert!(slot.current().await.is_none());

        let replaced = slot.attach(Arc::new(NullLink)).await;
        assert!(replaced.is_none());
        assert!(slot.is_attached().await);

        let taken = slot.take().await;
        assert!(taken.is_some());
        assert!(!slot.is_attached().await);
    }

    #[tokio::test]
    async fn test_attach_returns_previous_link() {
        let slot = LinkSlot::new();
        slot.attach(Arc::new(NullLink)).await;

        let replaced = slot.attach(Arc::new(NullLink)).await;
        assert!(replaced.is_some());
    }

    #[tokio::test]
    async fn test_offline_connector_always_fails() {
        let (tx, _rx) = mpsc::channel(1);
        let result = OfflineConnector.connect("/dev/ttyUSB0", "US", tx).await;
        assert!(matches!(result, Err(MeshError::Radio(_))));
    }
}
