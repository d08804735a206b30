//! Signaling client
//!
//! Connects to a coordinator, performs admission, and then offers a typed
//! request API plus a stream of server push events. Responses are matched
//! to requests by id, so callers can issue requests from multiple tasks.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::client::config::ClientConfig;
use crate::engine::{
    ConsumerDescriptor, DtlsParameters, MediaKind, RtpCapabilities, RtpParameters,
    TransportDescriptor,
};
use crate::error::{Error, Result};
use crate::registry::{StreamDescriptor, StreamInfo};
use crate::signaling::message::{
    methods, ConnectConsumerTransportRequest, ConnectProducerTransportRequest, ConsumeRequest,
    CreateTransportRequest, PeerInfo, ProduceRequest, ProduceResponse, PushEvent, RequestFrame,
    ResumeRequest,
};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<serde_json::Value>>>>;

/// Client handle for one signaling session
///
/// # Example
/// ```no_run
/// use sfu_signal::client::{ClientConfig, SignalClient};
///
/// # async fn example() -> sfu_signal::error::Result<()> {
/// let config = ClientConfig::new("ws://127.0.0.1:4000").display_name("observer");
/// let (client, mut events) = SignalClient::connect(config).await?;
///
/// tokio::spawn(async move {
///     while let Some(event) = events.recv().await {
///         println!("event: {:?}", event);
///     }
/// });
///
/// let caps = client.router_rtp_capabilities().await?;
/// println!("router capabilities: {:?}", caps);
/// # Ok(())
/// # }
/// ```
pub struct SignalClient {
    identity: PeerInfo,
    next_request_id: AtomicU64,
    pending: PendingMap,
    out_tx: mpsc::Sender<Message>,
    request_timeout: Duration,
}

impl SignalClient {
    /// Connect and wait for admission.
    ///
    /// The first frame the server sends is either the admit event carrying
    /// the assigned identity or a bare error payload refusing the
    /// connection; anything else fails the connect.
    pub async fn connect(config: ClientConfig) -> Result<(Self, mpsc::Receiver<PushEvent>)> {
        let url = config.connect_url()?;
        let (ws, _) = connect_async(url.as_str()).await?;
        let (ws_tx, mut ws_rx) = ws.split();

        let first = ws_rx.next().await.ok_or(Error::ConnectionClosed)??;
        let text = match first {
            Message::Text(text) => text,
            _ => return Err(Error::Server("expected a text frame during admission".into())),
        };
        let value: serde_json::Value = serde_json::from_str(&text)?;
        if let Some(reason) = value.get("error").and_then(|e| e.as_str()) {
            return Err(Error::Server(reason.to_string()));
        }
        let identity = match serde_json::from_value::<PushEvent>(value)? {
            PushEvent::Admit(identity) => identity,
            other => {
                return Err(Error::Server(format!(
                    "expected admit during admission, got {other:?}"
                )))
            }
        };

        tracing::debug!(
            client = %identity.id,
            name = %identity.name,
            "admitted by coordinator"
        );

        let (out_tx, out_rx) = mpsc::channel(64);
        let (event_tx, event_rx) = mpsc::channel(config.event_buffer);
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));

        tokio::spawn(writer_task(ws_tx, out_rx));
        tokio::spawn(reader_task(ws_rx, Arc::clone(&pending), event_tx));

        let client = Self {
            identity,
            next_request_id: AtomicU64::new(1),
            pending,
            out_tx,
            request_timeout: config.request_timeout,
        };
        Ok((client, event_rx))
    }

    /// Identity assigned at admission
    pub fn id(&self) -> &str {
        &self.identity.id
    }

    /// Display name assigned at admission
    pub fn display_name(&self) -> &str {
        &self.identity.name
    }

    /// Send one request and wait for its response payload.
    ///
    /// An `{"error": ...}` payload is surfaced as [`Error::Server`].
    pub async fn request(
        &self,
        method: &str,
        data: serde_json::Value,
    ) -> Result<serde_json::Value> {
        let id = self.next_request_id.fetch_add(1, Ordering::Relaxed);
        let frame = RequestFrame {
            id,
            method: method.to_string(),
            data,
        };
        let payload = serde_json::to_string(&frame)?;

        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);

        if self.out_tx.send(Message::Text(payload)).await.is_err() {
            self.pending.lock().await.remove(&id);
            return Err(Error::ConnectionClosed);
        }

        let data = match tokio::time::timeout(self.request_timeout, rx).await {
            Ok(Ok(data)) => data,
            Ok(Err(_)) => return Err(Error::ConnectionClosed),
            Err(_) => {
                self.pending.lock().await.remove(&id);
                return Err(Error::RequestTimeout);
            }
        };

        if let Some(reason) = data.get("error").and_then(|e| e.as_str()) {
            return Err(Error::Server(reason.to_string()));
        }
        Ok(data)
    }

    /// Fetch the router's capability descriptor
    pub async fn router_rtp_capabilities(&self) -> Result<RtpCapabilities> {
        let data = self
            .request(methods::GET_ROUTER_RTP_CAPABILITIES, serde_json::Value::Null)
            .await?;
        Ok(serde_json::from_value(data)?)
    }

    /// Allocate the outbound transport
    pub async fn create_producer_transport(
        &self,
        force_tcp: bool,
        rtp_capabilities: Option<RtpCapabilities>,
    ) -> Result<TransportDescriptor> {
        let payload = serde_json::to_value(CreateTransportRequest {
            force_tcp,
            rtp_capabilities,
        })?;
        let data = self
            .request(methods::CREATE_PRODUCER_TRANSPORT, payload)
            .await?;
        Ok(serde_json::from_value(data)?)
    }

    /// Allocate the inbound transport
    pub async fn create_consumer_transport(&self, force_tcp: bool) -> Result<TransportDescriptor> {
        let payload = serde_json::to_value(CreateTransportRequest {
            force_tcp,
            rtp_capabilities: None,
        })?;
        let data = self
            .request(methods::CREATE_CONSUMER_TRANSPORT, payload)
            .await?;
        Ok(serde_json::from_value(data)?)
    }

    /// Finish DTLS setup for the outbound transport
    pub async fn connect_producer_transport(&self, dtls_parameters: DtlsParameters) -> Result<()> {
        let payload = serde_json::to_value(ConnectProducerTransportRequest { dtls_parameters })?;
        self.request(methods::CONNECT_PRODUCER_TRANSPORT, payload)
            .await?;
        Ok(())
    }

    /// Finish DTLS setup for the inbound transport
    pub async fn connect_consumer_transport(
        &self,
        transport_id: &str,
        dtls_parameters: DtlsParameters,
    ) -> Result<()> {
        let payload = serde_json::to_value(ConnectConsumerTransportRequest {
            transport_id: transport_id.to_string(),
            dtls_parameters,
        })?;
        self.request(methods::CONNECT_CONSUMER_TRANSPORT, payload)
            .await?;
        Ok(())
    }

    /// Publish a stream; returns the assigned producer id
    pub async fn produce(
        &self,
        transport_id: &str,
        kind: MediaKind,
        rtp_parameters: RtpParameters,
    ) -> Result<String> {
        let payload = serde_json::to_value(ProduceRequest {
            transport_id: transport_id.to_string(),
            kind,
            rtp_parameters,
        })?;
        let data = self.request(methods::PRODUCE, payload).await?;
        let response: ProduceResponse = serde_json::from_value(data)?;
        Ok(response.id)
    }

    /// Subscribe to a published stream; the consumer starts paused
    pub async fn consume(
        &self,
        rtp_capabilities: RtpCapabilities,
        stream_id: &str,
    ) -> Result<ConsumerDescriptor> {
        let payload = serde_json::to_value(ConsumeRequest {
            rtp_capabilities,
            stream_id: stream_id.to_string(),
        })?;
        let data = self.request(methods::CONSUME, payload).await?;
        Ok(serde_json::from_value(data)?)
    }

    /// Resume one paused consumer
    pub async fn resume(&self, consumer_id: &str) -> Result<()> {
        let payload = serde_json::to_value(ResumeRequest {
            consumer_id: Some(consumer_id.to_string()),
        })?;
        self.request(methods::RESUME, payload).await?;
        Ok(())
    }

    /// Resume every consumer this session owns
    pub async fn resume_all(&self) -> Result<()> {
        self.request(methods::RESUME, serde_json::Value::Null)
            .await?;
        Ok(())
    }

    /// Directory query: which streams do these participants publish
    pub async fn client_streams(
        &self,
        client_ids: &[&str],
    ) -> Result<HashMap<String, Vec<StreamDescriptor>>> {
        let payload = serde_json::json!({
            "clientIds": client_ids,
        });
        let data = self.request(methods::GET_CLIENT_STREAMS, payload).await?;
        Ok(serde_json::from_value(data)?)
    }

    /// Reverse lookup: who owns these stream ids
    pub async fn stream_info(&self, stream_ids: &[&str]) -> Result<Vec<StreamInfo>> {
        let payload = serde_json::json!({
            "streamIds": stream_ids,
        });
        let data = self.request(methods::GET_STREAM_INFO, payload).await?;
        Ok(serde_json::from_value(data)?)
    }

    /// Ask the server to close the session
    pub async fn close(&self) {
        let _ = self.out_tx.send(Message::Close(None)).await;
    }
}

async fn writer_task(mut ws_tx: SplitSink<WsStream, Message>, mut out_rx: mpsc::Receiver<Message>) {
    while let Some(msg) = out_rx.recv().await {
        if ws_tx.send(msg).await.is_err() {
            break;
        }
    }
    let _ = ws_tx.close().await;
    tracing::debug!("client writer stopped");
}

async fn reader_task(
    mut ws_rx: SplitStream<WsStream>,
    pending: PendingMap,
    event_tx: mpsc::Sender<PushEvent>,
) {
    while let Some(frame) = ws_rx.next().await {
        match frame {
            Ok(Message::Text(text)) => route_frame(&text, &pending, &event_tx).await,
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(error = %e, "client read failed");
                break;
            }
        }
    }

    // Abandon in-flight requests so their callers see the channel close
    pending.lock().await.clear();
    tracing::debug!("client reader stopped");
}

/// Responses carry an `id`; everything else is a push event.
async fn route_frame(text: &str, pending: &PendingMap, event_tx: &mpsc::Sender<PushEvent>) {
    let value: serde_json::Value = match serde_json::from_str(text) {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!(error = %e, "discarding unparseable frame");
            return;
        }
    };

    if let Some(id) = value.get("id").and_then(|id| id.as_u64()) {
        let data = value
            .get("data")
            .cloned()
            .unwrap_or(serde_json::Value::Null);
        match pending.lock().await.remove(&id) {
            Some(tx) => {
                let _ = tx.send(data);
            }
            None => tracing::debug!(request_id = id, "response for unknown request"),
        }
        return;
    }

    match serde_json::from_value::<PushEvent>(value) {
        Ok(event) => {
            let _ = event_tx.send(event).await;
        }
        Err(e) => tracing::warn!(error = %e, "discarding unrecognized frame"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn route_frame_resolves_pending_request() {
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let (event_tx, _event_rx) = mpsc::channel(4);
        let (tx, rx) = oneshot::channel();
        pending.lock().await.insert(7, tx);

        route_frame(r#"{"id":7,"data":{"ok":true}}"#, &pending, &event_tx).await;

        let data = rx.await.unwrap();
        assert_eq!(data["ok"], serde_json::json!(true));
        assert!(pending.lock().await.is_empty());
    }

    #[tokio::test]
    async fn route_frame_forwards_push_events() {
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let (event_tx, mut event_rx) = mpsc::channel(4);

        route_frame(
            r#"{"event":"clientDisconnected","data":"peer-9"}"#,
            &pending,
            &event_tx,
        )
        .await;

        match event_rx.recv().await.unwrap() {
            PushEvent::ClientDisconnected(id) => assert_eq!(id, "peer-9"),
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn route_frame_tolerates_garbage() {
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let (event_tx, mut event_rx) = mpsc::channel(4);

        route_frame("not json", &pending, &event_tx).await;
        route_frame(r#"{"event":"noSuchEvent","data":1}"#, &pending, &event_tx).await;

        assert!(event_rx.try_recv().is_err());
    }
}
