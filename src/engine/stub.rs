//! In-process stub engine
//!
//! Implements [`MediaEngine`] entirely in memory: transports, producers and
//! consumers are bookkeeping records with fabricated ICE/DTLS parameters,
//! and no media flows. The tests and demos run the full coordinator against
//! it, and it doubles as a reference for the lifecycle contract a real
//! engine binding must honor.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use rand::RngExt;
use serde_json::json;
use tokio::sync::{mpsc, watch};
use uuid::Uuid;

use super::types::{
    ConsumerDescriptor, ConsumerType, DtlsParameters, MediaKind, RtpCapabilities, RtpParameters,
    TransportDescriptor, TransportEvent, TransportOptions,
};
use super::{EngineError, MediaEngine};

struct StubTransport {
    events: mpsc::Sender<TransportEvent>,
    connected: bool,
    max_incoming_bitrate: Option<u32>,
}

struct StubProducer {
    transport_id: String,
    kind: MediaKind,
    /// More than one encoding in the publish parameters marks the
    /// producer as simulcast
    simulcast: bool,
}

struct StubConsumer {
    transport_id: String,
    producer_id: String,
    paused: bool,
    preferred_layers: Option<(u8, u8)>,
}

#[derive(Default)]
struct StubState {
    transports: HashMap<String, StubTransport>,
    producers: HashMap<String, StubProducer>,
    consumers: HashMap<String, StubConsumer>,
    refuse_transports: bool,
}

/// In-memory [`MediaEngine`] for tests and demos
pub struct StubEngine {
    state: Mutex<StubState>,
    worker_down_tx: watch::Sender<bool>,
    worker_down_rx: watch::Receiver<bool>,
}

impl StubEngine {
    pub fn new() -> Self {
        let (worker_down_tx, worker_down_rx) = watch::channel(false);
        Self {
            state: Mutex::new(StubState::default()),
            worker_down_tx,
            worker_down_rx,
        }
    }

    fn state(&self) -> MutexGuard<'_, StubState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Make subsequent transport allocations fail
    pub fn refuse_transports(&self, refuse: bool) {
        self.state().refuse_transports = refuse;
    }

    /// Simulate the worker process dying
    pub fn kill_worker(&self) {
        self.worker_down_tx.send_replace(true);
    }

    /// Inject an asynchronous failure event for a transport
    pub async fn fail_transport(&self, transport_id: &str, reason: &str) {
        let events = {
            let state = self.state();
            state.transports.get(transport_id).map(|t| t.events.clone())
        };

        if let Some(events) = events {
            let _ = events
                .send(TransportEvent::Failed {
                    transport_id: transport_id.to_string(),
                    reason: reason.to_string(),
                })
                .await;
        }
    }

    /// Whether a transport is currently allocated
    pub fn has_transport(&self, transport_id: &str) -> bool {
        self.state().transports.contains_key(transport_id)
    }

    /// Whether a producer is currently allocated
    pub fn has_producer(&self, producer_id: &str) -> bool {
        self.state().producers.contains_key(producer_id)
    }

    /// Paused flag of a consumer, if it exists
    pub fn consumer_paused(&self, consumer_id: &str) -> Option<bool> {
        self.state().consumers.get(consumer_id).map(|c| c.paused)
    }

    /// Preferred layers recorded for a consumer, if any
    pub fn preferred_layers(&self, consumer_id: &str) -> Option<(u8, u8)> {
        self.state()
            .consumers
            .get(consumer_id)
            .and_then(|c| c.preferred_layers)
    }

    /// Incoming bitrate cap recorded for a transport
    pub fn transport_bitrate_cap(&self, transport_id: &str) -> Option<u32> {
        self.state()
            .transports
            .get(transport_id)
            .and_then(|t| t.max_incoming_bitrate)
    }

    fn fabricate_descriptor(id: &str, options: &TransportOptions) -> TransportDescriptor {
        let mut rng = rand::rng();
        let protocol = if options.force_tcp { "tcp" } else { "udp" };
        let fingerprint: String = (0..32)
            .map(|_| format!("{:02X}", rng.random::<u8>()))
            .collect::<Vec<_>>()
            .join(":");

        TransportDescriptor {
            id: id.to_string(),
            ice_parameters: json!({
                "usernameFragment": Uuid::new_v4().simple().to_string(),
                "password": Uuid::new_v4().simple().to_string(),
                "iceLite": true,
            }),
            ice_candidates: json!([{
                "foundation": format!("{}candidate", protocol),
                "ip": "127.0.0.1",
                "port": rng.random_range(40000u16..49999),
                "priority": 1_076_302_079u32,
                "protocol": protocol,
                "type": "host",
            }]),
            dtls_parameters: json!({
                "role": "auto",
                "fingerprints": [{"algorithm": "sha-256", "value": fingerprint}],
            }),
        }
    }

    fn fabricate_rtp_parameters(kind: MediaKind) -> RtpParameters {
        let mut rng = rand::rng();
        let (mime, payload_type, clock_rate) = match kind {
            MediaKind::Audio => ("audio/opus", 100, 48_000),
            MediaKind::Video => ("video/VP8", 101, 90_000),
        };

        RtpParameters(json!({
            "codecs": [{
                "mimeType": mime,
                "payloadType": payload_type,
                "clockRate": clock_rate,
            }],
            "encodings": [{"ssrc": rng.random::<u32>()}],
        }))
    }

    /// A capability blob is usable when it carries at least one codec
    fn capabilities_usable(rtp_capabilities: &RtpCapabilities) -> bool {
        rtp_capabilities
            .0
            .get("codecs")
            .and_then(|c| c.as_array())
            .map(|codecs| !codecs.is_empty())
            .unwrap_or(false)
    }
}

impl Default for StubEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MediaEngine for StubEngine {
    async fn router_capabilities(&self) -> Result<RtpCapabilities, EngineError> {
        Ok(RtpCapabilities(json!({
            "codecs": [
                {"kind": "audio", "mimeType": "audio/opus", "clockRate": 48_000, "channels": 2},
                {"kind": "video", "mimeType": "video/VP8", "clockRate": 90_000},
            ],
            "headerExtensions": [],
        })))
    }

    async fn create_transport(
        &self,
        options: &TransportOptions,
        events: mpsc::Sender<TransportEvent>,
    ) -> Result<TransportDescriptor, EngineError> {
        let id = Uuid::new_v4().to_string();
        let descriptor = Self::fabricate_descriptor(&id, options);

        let mut state = self.state();
        if state.refuse_transports {
            return Err(EngineError::TransportAllocation("engine refused".into()));
        }

        state.transports.insert(
            id,
            StubTransport {
                events,
                connected: false,
                max_incoming_bitrate: options.max_incoming_bitrate,
            },
        );

        Ok(descriptor)
    }

    async fn connect_transport(
        &self,
        transport_id: &str,
        _dtls_parameters: DtlsParameters,
    ) -> Result<(), EngineError> {
        let events = {
            let mut state = self.state();
            let transport = state
                .transports
                .get_mut(transport_id)
                .ok_or_else(|| EngineError::UnknownTransport(transport_id.to_string()))?;
            transport.connected = true;
            transport.events.clone()
        };

        // The connected transition is observed through the event channel,
        // not through this ack.
        let _ = events
            .send(TransportEvent::Connected {
                transport_id: transport_id.to_string(),
            })
            .await;

        Ok(())
    }

    async fn produce(
        &self,
        transport_id: &str,
        kind: MediaKind,
        rtp_parameters: RtpParameters,
    ) -> Result<String, EngineError> {
        let mut state = self.state();
        if !state.transports.contains_key(transport_id) {
            return Err(EngineError::UnknownTransport(transport_id.to_string()));
        }

        let simulcast = rtp_parameters
            .0
            .get("encodings")
            .and_then(|e| e.as_array())
            .map(|encodings| encodings.len() > 1)
            .unwrap_or(false);

        let id = Uuid::new_v4().to_string();
        state.producers.insert(
            id.clone(),
            StubProducer {
                transport_id: transport_id.to_string(),
                kind,
                simulcast,
            },
        );

        Ok(id)
    }

    async fn can_consume(&self, producer_id: &str, rtp_capabilities: &RtpCapabilities) -> bool {
        self.state().producers.contains_key(producer_id)
            && Self::capabilities_usable(rtp_capabilities)
    }

    async fn consume(
        &self,
        transport_id: &str,
        producer_id: &str,
        rtp_capabilities: RtpCapabilities,
    ) -> Result<ConsumerDescriptor, EngineError> {
        let mut state = self.state();
        if !state.transports.contains_key(transport_id) {
            return Err(EngineError::UnknownTransport(transport_id.to_string()));
        }

        let producer = state
            .producers
            .get(producer_id)
            .ok_or_else(|| EngineError::UnknownProducer(producer_id.to_string()))?;

        if !Self::capabilities_usable(&rtp_capabilities) {
            return Err(EngineError::ConsumeFailed(format!(
                "capabilities cannot consume producer {}",
                producer_id
            )));
        }

        let kind = producer.kind;
        let consumer_type = if producer.simulcast {
            ConsumerType::Simulcast
        } else {
            ConsumerType::Simple
        };

        let id = Uuid::new_v4().to_string();
        state.consumers.insert(
            id.clone(),
            StubConsumer {
                transport_id: transport_id.to_string(),
                producer_id: producer_id.to_string(),
                paused: true,
                preferred_layers: None,
            },
        );

        Ok(ConsumerDescriptor {
            producer_id: producer_id.to_string(),
            id,
            kind,
            rtp_parameters: Self::fabricate_rtp_parameters(kind),
            consumer_type,
            producer_paused: false,
        })
    }

    async fn resume_consumer(&self, consumer_id: &str) -> Result<(), EngineError> {
        let mut state = self.state();
        let consumer = state
            .consumers
            .get_mut(consumer_id)
            .ok_or_else(|| EngineError::UnknownConsumer(consumer_id.to_string()))?;
        consumer.paused = false;
        Ok(())
    }

    async fn set_preferred_layers(
        &self,
        consumer_id: &str,
        spatial_layer: u8,
        temporal_layer: u8,
    ) -> Result<(), EngineError> {
        let mut state = self.state();
        let consumer = state
            .consumers
            .get_mut(consumer_id)
            .ok_or_else(|| EngineError::UnknownConsumer(consumer_id.to_string()))?;
        consumer.preferred_layers = Some((spatial_layer, temporal_layer));
        Ok(())
    }

    async fn close_transport(&self, transport_id: &str) {
        let mut state = self.state();
        if state.transports.remove(transport_id).is_none() {
            return;
        }

        state
            .producers
            .retain(|_, p| p.transport_id != transport_id);
        state
            .consumers
            .retain(|_, c| c.transport_id != transport_id);
    }

    async fn close_producer(&self, producer_id: &str) {
        self.state().producers.remove(producer_id);
    }

    async fn close_consumer(&self, consumer_id: &str) {
        self.state().consumers.remove(consumer_id);
    }

    async fn worker_died(&self) {
        let mut rx = self.worker_down_rx.clone();
        if rx.wait_for(|dead| *dead).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
