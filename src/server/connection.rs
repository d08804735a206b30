//! Per-connection driver
//!
//! One task per WebSocket. The driver upgrades the socket, admits the peer
//! into the roster, then multiplexes three inputs in a single loop: inbound
//! request frames, push events queued by other sessions, and transport
//! events reported by the media engine. Requests are answered strictly in
//! arrival order; nothing else touches this session's state.

use std::net::SocketAddr;
use std::sync::Arc;

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use serde_json::json;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::handshake::server::{Request, Response};
use tokio_tungstenite::tungstenite::http::Uri;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_hdr_async, WebSocketStream};

use crate::engine::{MediaEngine, TransportEvent};
use crate::error::{Error, Result, SignalError};
use crate::notify::NotificationBus;
use crate::registry::Roster;
use crate::server::config::ServerConfig;
use crate::session::Session;
use crate::signaling::message::{PeerInfo, PushEvent, RequestFrame};
use crate::signaling::Dispatcher;

/// Transport events are rare; a small queue is plenty.
const ENGINE_EVENT_QUEUE: usize = 16;

/// A freshly accepted socket, not yet upgraded or admitted.
pub struct Connection<E: MediaEngine> {
    conn_id: u64,
    socket: TcpStream,
    peer_addr: SocketAddr,
    config: ServerConfig,
    dispatcher: Dispatcher<E>,
    roster: Arc<Roster>,
    bus: NotificationBus,
}

impl<E: MediaEngine> Connection<E> {
    pub fn new(
        conn_id: u64,
        socket: TcpStream,
        peer_addr: SocketAddr,
        config: ServerConfig,
        dispatcher: Dispatcher<E>,
        roster: Arc<Roster>,
        bus: NotificationBus,
    ) -> Self {
        Self {
            conn_id,
            socket,
            peer_addr,
            config,
            dispatcher,
            roster,
            bus,
        }
    }

    /// Drive the connection to completion.
    ///
    /// Once the peer is registered, every exit path runs the departure
    /// cascade, so a dropped socket can never leave roster or index
    /// entries behind.
    pub async fn run(self) -> Result<()> {
        let Connection {
            conn_id,
            socket,
            peer_addr,
            config,
            dispatcher,
            roster,
            bus,
        } = self;

        let mut upgrade_uri: Option<Uri> = None;
        let handshake = accept_hdr_async(socket, |req: &Request, response: Response| {
            upgrade_uri = Some(req.uri().clone());
            Ok(response)
        });
        let ws = match tokio::time::timeout(config.handshake_timeout, handshake).await {
            Ok(Ok(ws)) => ws,
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => return Err(Error::HandshakeTimeout),
        };

        let (requested_id, requested_name) = identity_params(upgrade_uri.as_ref());
        let mut session = Session::new(requested_id, requested_name);
        let identity = PeerInfo {
            id: session.id().to_string(),
            name: session.display_name().to_string(),
        };

        let (mut ws_tx, ws_rx) = ws.split();
        let (event_tx, event_rx) = mpsc::channel(config.event_queue);

        if let Err(err) = roster.register(&identity.id, &identity.name, event_tx).await {
            let refusal = SignalError::from(err);
            tracing::warn!(
                conn = conn_id,
                peer = %peer_addr,
                error = %refusal,
                "connection refused"
            );
            let payload = serde_json::to_string(&json!({ "error": refusal.to_string() }))?;
            let _ = ws_tx.send(Message::Text(payload)).await;
            let _ = ws_tx.close().await;
            return Ok(());
        }

        tracing::info!(
            conn = conn_id,
            client = %identity.id,
            name = %identity.name,
            peer = %peer_addr,
            "client admitted"
        );

        let (engine_tx, engine_rx) = mpsc::channel(ENGINE_EVENT_QUEUE);
        let mut driver = SessionDriver {
            conn_id,
            dispatcher: dispatcher.clone(),
            ws_tx,
            ws_rx,
            event_rx,
            engine_tx,
            engine_rx,
        };

        let result = match driver.admit(&bus, &identity).await {
            Ok(()) => driver.serve(&mut session).await,
            Err(e) => Err(e),
        };

        dispatcher.disconnect(&mut session).await;
        let _ = driver.ws_tx.close().await;
        result
    }
}

/// Post-admission event loop state.
struct SessionDriver<E: MediaEngine> {
    conn_id: u64,
    dispatcher: Dispatcher<E>,
    ws_tx: SplitSink<WebSocketStream<TcpStream>, Message>,
    ws_rx: SplitStream<WebSocketStream<TcpStream>>,
    event_rx: mpsc::Receiver<PushEvent>,
    engine_tx: mpsc::Sender<TransportEvent>,
    engine_rx: mpsc::Receiver<TransportEvent>,
}

impl<E: MediaEngine> SessionDriver<E> {
    /// Tell the peer who it is, then tell everyone else it arrived.
    ///
    /// The admit frame is written directly, before the event queue is
    /// polled, so it is always the first frame a client reads.
    async fn admit(&mut self, bus: &NotificationBus, identity: &PeerInfo) -> Result<()> {
        let frame = serde_json::to_string(&PushEvent::Admit(identity.clone()))?;
        self.ws_tx.send(Message::Text(frame)).await?;
        bus.publish(PushEvent::NewClient(identity.clone()), &identity.id)
            .await;
        Ok(())
    }

    async fn serve(&mut self, session: &mut Session) -> Result<()> {
        loop {
            tokio::select! {
                frame = self.ws_rx.next() => {
                    match frame {
                        Some(Ok(Message::Text(text))) => {
                            self.handle_request(session, &text).await?;
                        }
                        Some(Ok(Message::Ping(payload))) => {
                            self.ws_tx.send(Message::Pong(payload)).await?;
                        }
                        Some(Ok(Message::Close(_))) => {
                            tracing::debug!(
                                conn = self.conn_id,
                                client = %session.id(),
                                "close frame received"
                            );
                            return Ok(());
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            tracing::debug!(
                                conn = self.conn_id,
                                client = %session.id(),
                                error = %e,
                                "websocket read failed"
                            );
                            return Ok(());
                        }
                        None => return Ok(()),
                    }
                }
                Some(event) = self.event_rx.recv() => {
                    let frame = serde_json::to_string(&event)?;
                    self.ws_tx.send(Message::Text(frame)).await?;
                }
                Some(event) = self.engine_rx.recv() => {
                    self.dispatcher.handle_transport_event(session, event).await;
                }
            }
        }
    }

    async fn handle_request(&mut self, session: &mut Session, text: &str) -> Result<()> {
        let frame: RequestFrame = match serde_json::from_str(text) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!(
                    conn = self.conn_id,
                    client = %session.id(),
                    error = %e,
                    "ignoring malformed frame"
                );
                return Ok(());
            }
        };

        let response = self
            .dispatcher
            .dispatch(session, &self.engine_tx, frame)
            .await;
        let payload = serde_json::to_string(&response)?;
        self.ws_tx.send(Message::Text(payload)).await?;
        Ok(())
    }
}

/// Pull the optional `id` and `name` query parameters off the upgrade URI.
fn identity_params(uri: Option<&Uri>) -> (Option<String>, Option<String>) {
    let mut id = None;
    let mut name = None;

    if let Some(query) = uri.and_then(|uri| uri.query()) {
        for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
            match key.as_ref() {
                "id" => id = Some(value.into_owned()),
                "name" => name = Some(value.into_owned()),
                _ => {}
            }
        }
    }

    (id, name)
}
