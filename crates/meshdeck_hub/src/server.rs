//! Observer WebSocket server.
//!
//! Accepts observer connections, queues each one an `init` snapshot before
//! any live traffic, pumps mesh events to every observer, and feeds
//! observer commands to the executor. One writer task per connection
//! drains that observer's frame queue into the socket.

use std::net::SocketAddr;
use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use meshdeck_mesh::error::MeshError;
use meshdeck_mesh::events::EventBus;
use meshdeck_mesh::state::SharedState;

use crate::commands::CommandExecutor;
use crate::fanout::{OBSERVER_QUEUE_DEPTH, ObserverSet};
use crate::wire::{ObserverCommand, WireEvent};

/// The observer-facing WebSocket server.
pub struct DeckServer {
    listen_addr: SocketAddr,
    state: SharedState,
    bus: EventBus,
    executor: Arc<CommandExecutor>,
    observers: Arc<ObserverSet>,
    history_window: usize,
}

impl DeckServer {
    pub fn new(
        listen_addr: SocketAddr,
        state: SharedState,
        bus: EventBus,
        executor: CommandExecutor,
        history_window: usize,
    ) -> Self {
        Self {
            listen_addr,
            state,
            bus,
            executor: Arc::new(executor),
            observers: Arc::new(ObserverSet::new()),
            history_window,
        }
    }

    /// Accept observers until the shutdown signal fires.
    ///
    /// Also runs the event pump that turns [`meshdeck_mesh::MeshEvent`]s
    /// into wire frames fanned out to every observer.
    pub async fn run(&self, mut shutdown: broadcast::Receiver<()>) -> Result<(), MeshError> {
        let listener = TcpListener::bind(self.listen_addr)
            .await
            .map_err(MeshError::Io)?;
        info!("Observer server listening on {}", self.listen_addr);

        self.spawn_event_pump(shutdown.resubscribe());

        loop {
            tokio::select! {
                accept_result = listener.accept() => {
                    match accept_result {
                        Ok((stream, peer_addr)) => {
                            let state = self.state.clone();
                            let executor = self.executor.clone();
                            let observers = self.observers.clone();
                            let history_window = self.history_window;
                            tokio::spawn(async move {
                                handle_connection(
                                    stream,
                                    peer_addr,
                                    state,
                                    executor,
                                    observers,
                                    history_window,
                                )
                                .await;
                            });
                        }
                        Err(e) => {
                            error!("TCP accept failed: {e}");
                        }
                    }
                }
                _ = shutdown.recv() => {
                    info!("Observer server shutting down");
                    break;
                }
            }
        }

        Ok(())
    }

    /// Forward mesh events to every observer as serialized wire frames.
    fn spawn_event_pump(&self, mut shutdown: broadcast::Receiver<()>) {
        let mut events = self.bus.subscribe();
        let observers = self.observers.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    event = events.recv() => match event {
                        Ok(event) => {
                            let Some(wire) = WireEvent::from_mesh_event(event) else {
                                continue;
                            };
                            match wire.to_json() {
                                Ok(frame) => {
                                    observers.broadcast(&frame).await;
                                }
                                Err(e) => warn!("Event serialization failed: {e}"),
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            warn!("Event pump lagged, {n} events dropped");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                    _ = shutdown.recv() => break,
                }
            }
            debug!("Event pump stopped");
        });
    }
}

/// One observer connection from accept to disconnect.
async fn handle_connection(
    stream: TcpStream,
    peer_addr: SocketAddr,
    state: SharedState,
    executor: Arc<CommandExecutor>,
    observers: Arc<ObserverSet>,
    history_window: usize,
) {
    let ws_stream = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            error!("WebSocket accept failed for {peer_addr}: {e}");
            return;
        }
    };
    let (mut sink, mut stream) = ws_stream.split();

    let id = Uuid::new_v4();
    let (frame_tx, mut frame_rx) = mpsc::channel::<String>(OBSERVER_QUEUE_DEPTH);

    // Writer: drain this observer's frame queue into the socket.
    let writer = tokio::spawn(async move {
        while let Some(frame) = frame_rx.recv().await {
            if let Err(e) = sink.send(Message::Text(frame.into())).await {
                debug!("Write to observer {peer_addr} failed: {e}");
                return;
            }
        }
        let _ = sink.send(Message::Close(None)).await;
    });

    // Register with the snapshot queued ahead of any live frame.
    let init_state = state.clone();
    let joined = observers
        .join_with_init(id, frame_tx.clone(), || async move {
            let state = init_state.read().await;
            match WireEvent::init(&state, history_window).to_json() {
                Ok(frame) => Some(frame),
                Err(e) => {
                    warn!("Init snapshot serialization failed: {e}");
                    None
                }
            }
        })
        .await;
    if !joined {
        warn!("Observer {peer_addr} could not join");
        writer.abort();
        return;
    }
    info!("Observer connected from {peer_addr}");

    // Read loop: observer commands.
    while let Some(msg) = stream.next().await {
        match msg {
            Ok(Message::Text(text)) => match ObserverCommand::from_json(&text) {
                Ok(command) => executor.execute(command, &frame_tx).await,
                Err(e) => {
                    warn!("Bad command from {peer_addr}: {e}");
                }
            },
            Ok(Message::Close(_)) => {
                debug!("Observer {peer_addr} sent close");
                break;
            }
            Ok(_) => {} // Ignore binary/ping/pong
            Err(e) => {
                debug!("Read error from {peer_addr}: {e}");
                break;
            }
        }
    }

    observers.leave(&id).await;
    drop(frame_tx);
    let _ = writer.await;
    info!("Observer disconnected from {peer_addr}");
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use meshdeck_mesh::discovery::{CascadeDiscovery, DiscoveryConfig};
    use meshdeck_mesh::messages::TextMessage;
    use meshdeck_mesh::node::NodeId;
    use meshdeck_mesh::radio::{LinkSlot, OfflineConnector};
    use meshdeck_mesh::state::MeshState;
    use std::time::Duration;
    use tokio_tungstenite::connect_async;

    struct TestDeck {
        addr: SocketAddr,
        state: SharedState,
        bus: EventBus,
        shutdown: broadcast::Sender<()>,
        server_handle: tokio::task::JoinHandle<()>,
    }

    /// Spin up a full server on an ephemeral port with an offline radio.
    async fn start_deck() -> TestDeck {
        let state = MeshState::shared();
        let bus = EventBus::new(256);
        let slot = Arc::new(LinkSlot::new());
        let discovery = Arc::new(CascadeDiscovery::new(
            state.clone(),
            bus.clone(),
            slot.clone(),
            DiscoveryConfig {
                demo_pacing: Duration::from_millis(10),
                ..Default::default()
            },
        ));
        let (inbound, _inbound_rx) = mpsc::channel(16);
        let executor = CommandExecutor::new(
            state.clone(),
            bus.clone(),
            slot,
            Arc::new(OfflineConnector),
            discovery,
            inbound,
            Duration::ZERO,
        );

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let server = DeckServer::new(addr, state.clone(), bus.clone(), executor, 50);
        let (shutdown, shutdown_rx) = broadcast::channel(1);
        let server_handle = tokio::spawn(async move {
            let _ = server.run(shutdown_rx).await;
        });

        // Give the server time to start.
        tokio::time::sleep(Duration::from_millis(100)).await;

        TestDeck {
            addr,
            state,
            bus,
            shutdown,
            server_handle,
        }
    }

    async fn next_json(
        ws: &mut (impl StreamExt<Item = Result<Message, tokio_tungstenite::tungstenite::Error>>
              + Unpin),
    ) -> serde_json::Value {
        loop {
            let msg = tokio::time::timeout(Duration::from_secs(2), ws.next())
                .await
                .expect("timed out waiting for frame")
                .expect("stream ended")
                .expect("read error");
            if let Message::Text(text) = msg {
                return serde_json::from_str(&text).unwrap();
            }
        }
    }

    #[tokio::test]
    async fn test_new_observer_receives_init_first() {
        let deck = start_deck().await;
        {
            let mut state = deck.state.write().await;
            state.registry.observe_packet(&NodeId::from_string("!00000001"));
            state.log.push(TextMessage {
                from: "!00000001".to_string(),
                from_id: NodeId::from_string("!00000001"),
                text: "hi".to_string(),
                timestamp: Utc::now(),
            });
        }

        let (mut ws, _) = connect_async(format!("ws://{}", deck.addr)).await.unwrap();
        let first = next_json(&mut ws).await;

        assert_eq!(first["type"], "init");
        assert_eq!(first["nodes"].as_array().unwrap().len(), 1);
        assert_eq!(first["messages"].as_array().unwrap().len(), 1);
        assert_eq!(first["stats"]["total_nodes"], 1);

        let _ = deck.shutdown.send(());
        let _ = deck.server_handle.await;
    }

    #[tokio::test]
    async fn test_offline_discovery_round_trip() {
        let deck = start_deck().await;
        let (mut ws, _) = connect_async(format!("ws://{}", deck.addr)).await.unwrap();

        let init = next_json(&mut ws).await;
        assert_eq!(init["type"], "init");

        ws.send(Message::Text(r#"{"command": "start_discovery"}"#.into()))
            .await
            .unwrap();

        let mut node_updates = 0;
        loop {
            let frame = next_json(&mut ws).await;
            match frame["type"].as_str().unwrap() {
                "node_update" => {
                    assert_eq!(frame["node"]["origin"], "simulated");
                    node_updates += 1;
                }
                "system_message" => {
                    let text = frame["text"].as_str().unwrap();
                    if text.starts_with("✅ Discovery complete!") {
                        break;
                    }
                }
                _ => {}
            }
        }
        assert_eq!(node_updates, 3);

        let _ = deck.shutdown.send(());
        let _ = deck.server_handle.await;
    }

    #[tokio::test]
    async fn test_bad_command_is_dropped_and_connection_survives() {
        let deck = start_deck().await;
        let (mut ws, _) = connect_async(format!("ws://{}", deck.addr)).await.unwrap();
        let _init = next_json(&mut ws).await;

        ws.send(Message::Text("this is not json".into()))
            .await
            .unwrap();
        ws.send(Message::Text(r#"{"command": "export_data"}"#.into()))
            .await
            .unwrap();

        let frame = next_json(&mut ws).await;
        assert_eq!(frame["type"], "export_data");

        let _ = deck.shutdown.send(());
        let _ = deck.server_handle.await;
    }

    #[tokio::test]
    async fn test_events_reach_every_observer() {
        let deck = start_deck().await;
        let (mut ws_a, _) = connect_async(format!("ws://{}", deck.addr)).await.unwrap();
        let (mut ws_b, _) = connect_async(format!("ws://{}", deck.addr)).await.unwrap();
        let _ = next_json(&mut ws_a).await;
        let _ = next_json(&mut ws_b).await;

        deck.bus.system_message("✅ Connected to /dev/ttyUSB0");

        for ws in [&mut ws_a, &mut ws_b] {
            let frame = next_json(ws).await;
            assert_eq!(frame["type"], "system_message");
            assert_eq!(frame["text"], "✅ Connected to /dev/ttyUSB0");
        }

        let _ = deck.shutdown.send(());
        let _ = deck.server_handle.await;
    }

    #[tokio::test]
    async fn test_shutdown_stops_the_server() {
        let deck = start_deck().await;

        let _ = deck.shutdown.send(());
        let stopped =
            tokio::time::timeout(Duration::from_secs(2), deck.server_handle).await;
        assert!(stopped.is_ok());
    }
}
