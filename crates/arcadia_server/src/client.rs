//! Per-connection I/O and lifecycle (§4.4): exactly two tasks per
//! connection — this function (the read pump, which also hosts dispatch and
//! the per-client 5 Hz processing-queue drain) and a spawned write pump —
//! plus, while in the Game state, a third movement-ticker task owned by
//! [`crate::states::game::GameState`].

use std::net::SocketAddr;
use std::time::Duration;

use arcadia_schema::payload::{Message, Payload};
use arcadia_schema::FrameCodec;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_util::codec::Framed;

use crate::hub::Hub;
use crate::prelude::*;
use crate::region::{ClientHandle, RegionHandle};
use crate::states::{self, ClientState};

/// Capacity of both the send and processing queues (§4.4, §8's boundary
/// behavior #10: ">256 unread payloads... drops extras without blocking").
const QUEUE_CAPACITY: usize = 256;
/// Cadence at which a connection drains one item from its own processing
/// queue — the per-client rate limit described in §4.5's 5 Hz ticker,
/// implemented locally rather than from a central Hub-owned drain (see
/// DESIGN.md's Open Question resolution).
const PROCESSING_DRAIN_PERIOD: Duration = Duration::from_millis(200);

/// Shared, mutable per-connection state visible to every state handler.
///
/// Deliberately thin: anything that's only relevant to one state (the
/// inactivity deadline, the in-memory player, the movement ticker) lives in
/// that state's own struct instead, per §9's "capability sets, not base
/// classes" guidance.
pub struct Connection {
    /// This connection's hub-assigned id, process-unique for its lifetime.
    pub id: u64,
    /// The process-wide coordinator.
    pub hub: Arc<Hub>,
    /// This connection's own relay handle, as registered with the Hub and
    /// handed to whichever region it joins.
    pub handle: ClientHandle,
    /// The outbound send queue's sending half; the write pump owns the
    /// receiving half.
    send_tx: BoundedSender<Message>,
    /// The logged-in account's username, once authenticated.
    pub account_username: Option<String>,
    /// The logged-in account's character row id.
    pub character_id: i64,
    /// The region this connection is currently placed in, if any.
    pub region: Option<RegionHandle>,
}

impl Connection {
    /// A clone of this connection's own send-queue sender, for tasks (the
    /// movement ticker) that need to self-enqueue outside the read pump.
    pub fn clone_send_tx(&self) -> BoundedSender<Message> {
        self.send_tx.clone()
    }

    /// Enqueues `payload` as if sent by this connection's own id.
    pub fn send_packet(&self, payload: Payload) {
        self.send_packet_as(self.id, payload);
    }

    /// Enqueues `payload` attributed to `sender_id`. Drops it with a warning
    /// if the send queue is already full — the sole back-pressure mechanism
    /// (§4.4).
    pub fn send_packet_as(&self, sender_id: u64, payload: Payload) {
        if self.send_tx.try_send(Message { sender_id, payload }).is_err() {
            warn!(client_id = self.id, "send queue full, dropping packet");
        }
    }

    /// Forwards `payload` to a specific peer's processing queue, if this
    /// connection is currently in a region (§4.4's `relayPacket`).
    pub fn relay_packet(&self, peer_id: u64, payload: Payload) {
        if self.region.is_none() {
            return;
        }
        if let Some(peer) = self.hub.get_client(peer_id) {
            peer.enqueue_for_processing(self.id, payload);
        }
    }

    /// Enqueues `payload` on this connection's region's broadcast path, or
    /// no-ops if not currently in a region (§4.4's `broadcast`).
    pub fn broadcast(&self, payload: Payload) {
        if let Some(region) = &self.region {
            region.broadcast(self.id, payload);
        }
    }
}

/// Accepts one freshly connected socket: registers it with the Hub, then
/// runs its read pump (this task) and write pump (spawned) until either
/// exits, at which point [`close`] runs exactly once.
pub async fn handle_connection(socket: TcpStream, addr: SocketAddr, hub: Arc<Hub>) {
    let (send_tx, send_rx) = tokio::sync::mpsc::channel(QUEUE_CAPACITY);
    let (processing_tx, mut processing_rx) = tokio::sync::mpsc::channel(QUEUE_CAPACITY);
    let (id, handle) = hub.register_client(send_tx.clone(), processing_tx);

    info!(client_id = id, %addr, "client connected");

    let mut conn = Connection {
        id,
        hub: hub.clone(),
        handle,
        send_tx: send_tx.clone(),
        account_username: None,
        character_id: 0,
        region: None,
    };

    let framed = Framed::new(socket, FrameCodec::new().into_inner());
    let (sink, mut stream) = framed.split();
    let mut state = ClientState::Connected;
    states::connected::enter(&conn);

    let mut write_handle = tokio::spawn(run_write_pump(sink, send_rx));

    let reason = run_read_pump(&mut stream, &mut conn, &mut state, &mut processing_rx, &mut write_handle).await;

    close(&mut conn, &mut state, &reason).await;
    write_handle.abort();
    info!(client_id = conn.id, reason = %reason, "client connection closed");
}

async fn run_read_pump(
    stream: &mut futures::stream::SplitStream<Framed<TcpStream, tokio_util::codec::LengthDelimitedCodec>>,
    conn: &mut Connection,
    state: &mut ClientState,
    processing_rx: &mut BoundedReceiver<Message>,
    write_handle: &mut tokio::task::JoinHandle<()>,
) -> String {
    let mut processing_interval = tokio::time::interval(PROCESSING_DRAIN_PERIOD);
    processing_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        let auth_deadline = match state {
            ClientState::Authentication(s) => Some(s.deadline),
            _ => None,
        };
        let sleep = match auth_deadline {
            Some(deadline) => tokio::time::sleep_until(deadline),
            None => tokio::time::sleep(Duration::from_secs(u64::MAX / 2)),
        };
        tokio::pin!(sleep);

        tokio::select! {
            frame = stream.next() => {
                match frame {
                    Some(Ok(bytes)) => {
                        match FrameCodec::decode_message(bytes) {
                            Ok(mut message) => {
                                if message.sender_id == 0 {
                                    message.sender_id = conn.id;
                                }
                                states::dispatch(conn, state, message.sender_id, message.payload).await;
                            }
                            Err(err) => {
                                warn!(client_id = conn.id, error = %err, "dropping undecodable frame");
                            }
                        }
                    }
                    Some(Err(err)) => return format!("read error: {err}"),
                    None => return "connection closed by peer".to_owned(),
                }
            }
            _ = processing_interval.tick() => {
                if let Ok(message) = processing_rx.try_recv() {
                    states::dispatch(conn, state, message.sender_id, message.payload).await;
                }
            }
            _ = &mut sleep, if auth_deadline.is_some() => {
                return "authentication timeout".to_owned();
            }
            _ = &mut *write_handle => {
                return "write pump exited".to_owned();
            }
        }
    }
}

async fn run_write_pump(mut sink: futures::stream::SplitSink<Framed<TcpStream, tokio_util::codec::LengthDelimitedCodec>, bytes::Bytes>, mut send_rx: BoundedReceiver<Message>) {
    while let Some(message) = send_rx.recv().await {
        let encoded = match FrameCodec::encode_message(&message) {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!(error = %err, "dropping undeliverable packet, serialization failed");
                continue;
            }
        };
        if let Err(err) = sink.send(encoded).await {
            warn!(error = %err, "write pump exiting after write failure");
            return;
        }
    }
}

/// The idempotent close path (§4.4, §8's invariant #9): broadcasts the
/// player's departure and persists their character if logged in, removes
/// them from their region, and unregisters them from the Hub.
async fn close(conn: &mut Connection, state: &mut ClientState, reason: &str) {
    info!(client_id = conn.id, reason, "closing client connection");

    if let ClientState::Game(game_state) = state {
        let player_snapshot = game_state.snapshot().await;
        conn.broadcast(Payload::ClientLeft { nickname: player_snapshot.name.clone() });
        if let Err(err) = conn.hub.save_character(&player_snapshot).await {
            warn!(client_id = conn.id, error = %err, "failed to persist character on close");
        }
        states::game::exit(conn, game_state);
    }

    if let Some(region) = conn.region.take() {
        let _ = region.remove(conn.id).await;
    }

    if let Some(username) = conn.account_username.take() {
        conn.hub.unregister_username(&username);
    }

    conn.hub.remove_client(conn.id);
}
