//! Cascade discovery — actively probing the mesh until it stabilizes.
//!
//! A run alternates broadcast probes (provoking unknown nodes into
//! transmitting) with targeted acknowledgment-requesting pings to every
//! known node, iterating until no new nodes appear across a stabilization
//! window or the hard time budget runs out. Without an attached radio the
//! run synthesizes the demo fixture set instead.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{Instant, sleep, timeout};
use tracing::{debug, info, warn};

use crate::demo;
use crate::error::MeshError;
use crate::events::{EventBus, MeshEvent};
use crate::node::NodeId;
use crate::radio::{LinkSlot, RadioLink};
use crate::report;
use crate::state::SharedState;

/// Text sent as the broadcast probe on the shared channel.
pub const DISCOVERY_PROBE: &str = "DISCOVERY_PING";

/// Tuning for a discovery run.
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    /// Pause between cascade iterations.
    pub ping_interval: Duration,
    /// Hard cap on a whole run. The run completes at this point no matter
    /// what keeps arriving.
    pub max_duration: Duration,
    /// Wait after the opening broadcast before the first iteration.
    pub settle_delay: Duration,
    /// Pause between successive targeted pings.
    pub ping_pacing: Duration,
    /// Pause between demo synthesis steps.
    pub demo_pacing: Duration,
    /// Where to write the completion report; `None` disables it.
    pub report_dir: Option<std::path::PathBuf>,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            ping_interval: Duration::from_secs(30),
            max_duration: Duration::from_secs(300),
            settle_delay: Duration::from_secs(5),
            ping_pacing: Duration::from_secs(2),
            demo_pacing: Duration::from_secs(1),
            report_dir: None,
        }
    }
}

/// Phase of the discovery state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryState {
    /// No run yet, or the last run was abandoned on a radio error.
    Idle,
    /// Cascade iterations in progress.
    Running,
    /// No new nodes for a full iteration; waiting one extra interval to
    /// confirm the mesh has been fully mapped.
    Stabilizing,
    /// Terminal. A new run starts a fresh session.
    Complete,
}

/// The cascade discovery controller. At most one run is active at a time.
pub struct CascadeDiscovery {
    state: SharedState,
    bus: EventBus,
    slot: Arc<LinkSlot>,
    config: DiscoveryConfig,
    active: AtomicBool,
    phase: watch::Sender<DiscoveryState>,
}

impl CascadeDiscovery {
    /// Create a controller over the shared state, event bus, and link slot.
    pub fn new(
        state: SharedState,
        bus: EventBus,
        slot: Arc<LinkSlot>,
        config: DiscoveryConfig,
    ) -> Self {
        let (phase, _) = watch::channel(DiscoveryState::Idle);
        Self {
            state,
            bus,
            slot,
            config,
            active: AtomicBool::new(false),
            phase,
        }
    }

    /// Whether a run is currently in flight.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Current phase of the state machine.
    pub fn phase(&self) -> DiscoveryState {
        *self.phase.borrow()
    }

    /// Watch phase transitions as they happen.
    pub fn watch_phase(&self) -> watch::Receiver<DiscoveryState> {
        self.phase.subscribe()
    }

    /// Start a discovery run in the background.
    ///
    /// Returns [`MeshError::DiscoveryActive`] while one is already in
    /// flight; the running session is never disturbed.
    pub fn start(self: &Arc<Self>) -> Result<(), MeshError> {
        if self
            .active
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(MeshError::DiscoveryActive);
        }
        let this = Arc::clone(self);
        tokio::spawn(async move {
            this.execute().await;
            this.active.store(false, Ordering::SeqCst);
        });
        Ok(())
    }

    /// Run one full discovery cycle, then report completion.
    async fn execute(&self) {
        self.bus.system_message("🔍 Starting cascade discovery...");
        self.set_phase(DiscoveryState::Running);
        let started = Instant::now();

        match self.slot.current().await {
            Some(link) => {
                match timeout(self.config.max_duration, self.cascade(link.as_ref())).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        warn!("Discovery run failed: {e}");
                        self.bus.system_message(format!("❌ Discovery error: {e}"));
                        self.set_phase(DiscoveryState::Idle);
                        return;
                    }
                    Err(_) => {
                        info!(
                            "Discovery hit the hard time cap after {:?}",
                            self.config.max_duration
                        );
                    }
                }
                self.finish(started, true).await;
            }
            None => {
                demo::synthesize(&self.state, &self.bus, self.config.demo_pacing).await;
                self.finish(started, false).await;
            }
        }
    }

    /// Cascade iterations: opening broadcast, then paced probe rounds until
    /// the node count stabilizes. The hard time cap is enforced by the
    /// caller's timeout, so this loop only ever exits via stabilization.
    async fn cascade(&self, link: &dyn RadioLink) -> Result<(), MeshError> {
        // A dead link on the opening probe aborts the run.
        link.send_broadcast(DISCOVERY_PROBE).await?;
        sleep(self.config.settle_delay).await;

        let mut iteration: u32 = 0;
        let mut last_node_count: usize = 0;
        loop {
            let node_count = self.state.read().await.registry.total_count();
            let new_nodes = node_count.saturating_sub(last_node_count);
            if new_nodes > 0 {
                last_node_count = node_count;
            }
            debug!("Cascade iteration {iteration}: {node_count} nodes, {new_nodes} new");

            self.ping_unconfirmed(link).await;

            if let Err(e) = link.send_broadcast(DISCOVERY_PROBE).await {
                debug!("Broadcast probe failed: {e}");
            }
            iteration += 1;

            if iteration > 3 && new_nodes == 0 {
                self.set_phase(DiscoveryState::Stabilizing);
                info!("No new nodes this iteration; stabilizing");
                sleep(self.config.ping_interval).await;
                if self.state.read().await.registry.total_count() == node_count {
                    return Ok(());
                }
                // The mesh moved during the quiet window; keep cascading.
                // That wait already covered this iteration's pacing.
                self.set_phase(DiscoveryState::Running);
                continue;
            }

            sleep(self.config.ping_interval).await;
        }
    }

    /// Send a targeted ping to every node without an outstanding one.
    /// Individual failures are logged and skipped, never retried.
    async fn ping_unconfirmed(&self, link: &dyn RadioLink) {
        let targets: Vec<NodeId> = {
            let state = self.state.read().await;
            state
                .registry
                .node_ids()
                .into_iter()
                .filter(|id| !state.has_pending_ping(id))
                .collect()
        };

        for id in targets {
            match link.send_ping(&id).await {
                Ok(()) => {
                    self.state.write().await.mark_pinged(&id);
                    debug!("Targeted ping sent to {id}");
                }
                Err(e) => {
                    debug!("Targeted ping to {id} failed: {e}");
                }
            }
            sleep(self.config.ping_pacing).await;
        }
    }

    /// Emit the completion summary; live runs also write the report.
    async fn finish(&self, started: Instant, live: bool) {
        let elapsed_secs = started.elapsed().as_secs();
        let state = self.state.read().await;
        let node_count = state.registry.total_count();

        self.set_phase(DiscoveryState::Complete);
        info!("Discovery complete: {node_count} nodes in {elapsed_secs}s");
        self.bus.emit(MeshEvent::DiscoveryComplete {
            node_count,
            elapsed_secs,
        });
        self.bus
            .system_message(format!("✅ Discovery complete! Found {node_count} nodes."));

        if live {
            if let Some(dir) = &self.config.report_dir {
                if let Err(e) = report::write_report(dir, &state, elapsed_secs) {
                    warn!("Could not write discovery report: {e}");
                }
            }
        }
    }

    fn set_phase(&self, phase: DiscoveryState) {
        debug!("Discovery phase: {phase:?}");
        self.phase.send_replace(phase);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::NodeOrigin;
    use crate::state::MeshState;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Records every outbound call; optionally fails all sends.
    struct MockLink {
        calls: Mutex<Vec<String>>,
        fail: bool,
    }

    impl MockLink {
        fn new() -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                fail: false,
            }
        }

        fn failing() -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                fail: true,
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl RadioLink for MockLink {
        async fn send_broadcast(&self, text: &str) -> Result<(), MeshError> {
            self.calls.lock().unwrap().push(format!("broadcast:{text}"));
            if self.fail {
                return Err(MeshError::Radio("mock send failure".to_string()));
            }
            Ok(())
        }

        async fn send_text(
            &self,
            to: &NodeId,
            text: &str,
            _want_ack: bool,
        ) -> Result<(), MeshError> {
            self.calls.lock().unwrap().push(format!("text:{to}:{text}"));
            if self.fail {
                return Err(MeshError::Radio("mock send failure".to_string()));
            }
            Ok(())
        }

        async fn send_ping(&self, to: &NodeId) -> Result<(), MeshError> {
            self.calls.lock().unwrap().push(format!("ping:{to}"));
            if self.fail {
                return Err(MeshError::Radio("mock send failure".to_string()));
            }
            Ok(())
        }

        fn address(&self) -> String {
            "mock0".to_string()
        }

        async fn close(&self) {}
    }

    fn quick_config() -> DiscoveryConfig {
        DiscoveryConfig {
            ping_interval: Duration::from_secs(1),
            max_duration: Duration::from_secs(60),
            settle_delay: Duration::ZERO,
            ping_pacing: Duration::ZERO,
            demo_pacing: Duration::from_millis(10),
            report_dir: None,
        }
    }

    fn controller(
        config: DiscoveryConfig,
        slot: Arc<LinkSlot>,
    ) -> (Arc<CascadeDiscovery>, SharedState, EventBus) {
        let state = MeshState::shared();
        let bus = EventBus::new(256);
        let discovery = Arc::new(CascadeDiscovery::new(
            state.clone(),
            bus.clone(),
            slot,
            config,
        ));
        (discovery, state, bus)
    }

    /// Drain the receiver until the completion event arrives. Subscribe
    /// before calling [`CascadeDiscovery::start`] or the event is missed.
    async fn wait_complete(
        rx: &mut tokio::sync::broadcast::Receiver<MeshEvent>,
    ) -> (usize, u64) {
        loop {
            if let MeshEvent::DiscoveryComplete {
                node_count,
                elapsed_secs,
            } = rx.recv().await.unwrap()
            {
                return (node_count, elapsed_secs);
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_offline_run_synthesizes_demo_nodes() {
        let (discovery, state, bus) = controller(quick_config(), Arc::new(LinkSlot::new()));
        let mut rx = bus.subscribe();
        let mut events = bus.subscribe();

        discovery.start().unwrap();
        let (node_count, _) = wait_complete(&mut events).await;

        assert_eq!(node_count, 3);
        assert_eq!(discovery.phase(), DiscoveryState::Complete);
        let state = state.read().await;
        assert_eq!(state.registry.total_count(), 3);
        assert!(
            state
                .registry
                .snapshot()
                .iter()
                .all(|n| n.origin == NodeOrigin::Simulated)
        );

        let mut saw_start = false;
        while let Ok(event) = rx.try_recv() {
            if let MeshEvent::SystemMessage(text) = event {
                if text.contains("Starting cascade discovery") {
                    saw_start = true;
                }
            }
        }
        assert!(saw_start);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hard_cutoff_under_continuous_arrival() {
        let mut config = quick_config();
        config.max_duration = Duration::from_secs(5);
        let slot = Arc::new(LinkSlot::new());
        slot.attach(Arc::new(MockLink::new())).await;
        let (discovery, state, bus) = controller(config, slot);

        // A feeder that introduces a brand-new node every half second,
        // forever. Only the hard cap can terminate this run.
        let feeder_state = state.clone();
        let feeder = tokio::spawn(async move {
            let mut n = 0u32;
            loop {
                sleep(Duration::from_millis(500)).await;
                n += 1;
                feeder_state
                    .write()
                    .await
                    .registry
                    .observe_packet(&NodeId::from_string(format!("!{n:08x}")));
            }
        });

        let mut events = bus.subscribe();
        let begin = Instant::now();
        discovery.start().unwrap();
        wait_complete(&mut events).await;
        feeder.abort();

        assert!(begin.elapsed() <= Duration::from_secs(5) + Duration::from_millis(50));
        assert_eq!(discovery.phase(), DiscoveryState::Complete);
        assert!(!discovery.is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stabilization_after_quiet_window() {
        let slot = Arc::new(LinkSlot::new());
        slot.attach(Arc::new(MockLink::new())).await;
        let (discovery, state, bus) = controller(quick_config(), slot);

        state
            .write()
            .await
            .registry
            .observe_packet(&NodeId::from_string("!0000aaaa"));

        let mut events = bus.subscribe();
        let mut phases = discovery.watch_phase();
        discovery.start().unwrap();

        phases
            .wait_for(|p| *p == DiscoveryState::Stabilizing)
            .await
            .unwrap();
        let stabilizing_at = Instant::now();
        phases
            .wait_for(|p| *p == DiscoveryState::Complete)
            .await
            .unwrap();

        // One extra interval plus the recheck, never more than two.
        assert!(stabilizing_at.elapsed() <= Duration::from_secs(2));
        let (node_count, _) = wait_complete(&mut events).await;
        assert_eq!(node_count, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stabilization_retreats_when_mesh_moves() {
        let slot = Arc::new(LinkSlot::new());
        slot.attach(Arc::new(MockLink::new())).await;
        let (discovery, state, _bus) = controller(quick_config(), slot);

        let mut phases = discovery.watch_phase();
        discovery.start().unwrap();

        phases
            .wait_for(|p| *p == DiscoveryState::Stabilizing)
            .await
            .unwrap();
        // A node arrives inside the quiet window; the run must resume.
        state
            .write()
            .await
            .registry
            .observe_packet(&NodeId::from_string("!0000bbbb"));
        phases
            .wait_for(|p| *p == DiscoveryState::Running)
            .await
            .unwrap();

        phases
            .wait_for(|p| *p == DiscoveryState::Complete)
            .await
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_targeted_pings_skip_outstanding() {
        let mut config = quick_config();
        config.ping_interval = Duration::from_secs(10);
        config.max_duration = Duration::from_secs(1);
        let slot = Arc::new(LinkSlot::new());
        let link = Arc::new(MockLink::new());
        slot.attach(link.clone()).await;
        let (discovery, state, bus) = controller(config, slot);

        {
            let mut state = state.write().await;
            state.registry.observe_packet(&NodeId::from_string("!000000aa"));
            state.registry.observe_packet(&NodeId::from_string("!000000bb"));
            state.mark_pinged(&NodeId::from_string("!000000bb"));
        }

        let mut events = bus.subscribe();
        discovery.start().unwrap();
        wait_complete(&mut events).await;

        let calls = link.calls();
        assert!(calls.contains(&"ping:!000000aa".to_string()));
        assert!(!calls.contains(&"ping:!000000bb".to_string()));
        assert!(state.read().await.has_pending_ping(&NodeId::from_string("!000000aa")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_dead_link_reports_discovery_error() {
        let slot = Arc::new(LinkSlot::new());
        slot.attach(Arc::new(MockLink::failing())).await;
        let (discovery, _state, bus) = controller(quick_config(), slot);
        let mut rx = bus.subscribe();

        discovery.start().unwrap();

        let mut saw_error = false;
        for _ in 0..4 {
            match rx.recv().await {
                Ok(MeshEvent::SystemMessage(text)) if text.starts_with("❌ Discovery error") => {
                    saw_error = true;
                    break;
                }
                Ok(_) => {}
                Err(_) => break,
            }
        }
        assert!(saw_error);

        // The session is released and the machine returns to idle.
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!discovery.is_active());
        assert_eq!(discovery.phase(), DiscoveryState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_start_rejected_while_active() {
        let (discovery, _state, bus) = controller(quick_config(), Arc::new(LinkSlot::new()));
        let mut events = bus.subscribe();

        discovery.start().unwrap();
        assert!(matches!(
            discovery.start(),
            Err(MeshError::DiscoveryActive)
        ));

        wait_complete(&mut events).await;
        // After completion a fresh session may begin.
        discovery.start().unwrap();
        wait_complete(&mut events).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_live_run_writes_report() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = quick_config();
        config.report_dir = Some(dir.path().to_path_buf());
        let slot = Arc::new(LinkSlot::new());
        slot.attach(Arc::new(MockLink::new())).await;
        let (discovery, state, bus) = controller(config, slot);

        state
            .write()
            .await
            .registry
            .observe_packet(&NodeId::from_string("!0000cccc"));

        let mut events = bus.subscribe();
        discovery.start().unwrap();
        wait_complete(&mut events).await;

        let reports: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| {
                e.file_name()
                    .to_string_lossy()
                    .starts_with("discovery_report_")
            })
            .collect();
        assert_eq!(reports.len(), 1);
    }
}
