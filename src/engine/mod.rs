//! Media engine facade
//!
//! The coordinator never touches packets. Everything media-plane — codec
//! negotiation, ICE/DTLS setup, RTP forwarding — is delegated to an engine
//! implementing [`MediaEngine`]. The coordinator calls it to allocate and
//! connect transports and to build producers/consumers on them, and listens
//! on a per-session event channel for transport state changes the engine
//! reports asynchronously.
//!
//! ```text
//!   SignalingStateMachine ──calls──► MediaEngine
//!            ▲                           │
//!            └── mpsc::Sender<TransportEvent> (per session)
//! ```
//!
//! [`StubEngine`] is an in-process implementation used by the tests and
//! demos. It fabricates ICE/DTLS parameters and honors the full lifecycle
//! contract without moving any media.

pub mod stub;
pub mod types;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

pub use stub::StubEngine;
pub use types::{
    ConsumerDescriptor, ConsumerType, DtlsParameters, MediaKind, RtpCapabilities, RtpParameters,
    TransportDescriptor, TransportEvent, TransportOptions,
};

/// Errors reported by a media engine implementation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("transport allocation failed: {0}")]
    TransportAllocation(String),

    #[error("unknown transport {0}")]
    UnknownTransport(String),

    #[error("transport {0} is closed")]
    TransportClosed(String),

    #[error("dtls connect failed: {0}")]
    ConnectFailed(String),

    #[error("unknown producer {0}")]
    UnknownProducer(String),

    #[error("unknown consumer {0}")]
    UnknownConsumer(String),

    #[error("produce failed: {0}")]
    ProduceFailed(String),

    #[error("consume failed: {0}")]
    ConsumeFailed(String),
}

/// Interface to the external media engine
///
/// All operations are async and must not block the caller beyond their own
/// completion; the coordinator issues them from per-session tasks. Closing
/// operations are idempotent, and closing a transport implicitly closes
/// every producer and consumer carried on it inside the engine. The
/// coordinator mirrors that cascade in its own bookkeeping.
#[async_trait]
pub trait MediaEngine: Send + Sync + 'static {
    /// Router-level RTP capabilities for capability negotiation
    async fn router_capabilities(&self) -> Result<RtpCapabilities, EngineError>;

    /// Allocate a transport
    ///
    /// `events` receives [`TransportEvent`]s for this transport for as long
    /// as it lives. Implementations apply `max_incoming_bitrate` from the
    /// options after allocation and ignore a failure to apply it.
    async fn create_transport(
        &self,
        options: &TransportOptions,
        events: mpsc::Sender<TransportEvent>,
    ) -> Result<TransportDescriptor, EngineError>;

    /// Complete the DTLS handshake for a transport
    ///
    /// A successful return acknowledges the request only; the transition to
    /// a connected transport is reported through the event channel.
    async fn connect_transport(
        &self,
        transport_id: &str,
        dtls_parameters: DtlsParameters,
    ) -> Result<(), EngineError>;

    /// Create a producer on a transport, returning its engine-assigned id
    async fn produce(
        &self,
        transport_id: &str,
        kind: MediaKind,
        rtp_parameters: RtpParameters,
    ) -> Result<String, EngineError>;

    /// Whether `rtp_capabilities` suffice to consume the given producer
    async fn can_consume(&self, producer_id: &str, rtp_capabilities: &RtpCapabilities) -> bool;

    /// Create a consumer for a producer on a transport
    ///
    /// The consumer starts paused; the caller resumes it explicitly via
    /// [`MediaEngine::resume_consumer`].
    async fn consume(
        &self,
        transport_id: &str,
        producer_id: &str,
        rtp_capabilities: RtpCapabilities,
    ) -> Result<ConsumerDescriptor, EngineError>;

    /// Resume a paused consumer; resuming an active consumer is a no-op
    async fn resume_consumer(&self, consumer_id: &str) -> Result<(), EngineError>;

    /// Ask a layered consumer to prefer the given spatial/temporal layers
    async fn set_preferred_layers(
        &self,
        consumer_id: &str,
        spatial_layer: u8,
        temporal_layer: u8,
    ) -> Result<(), EngineError>;

    /// Close a transport and everything carried on it; idempotent
    async fn close_transport(&self, transport_id: &str);

    /// Close a producer; idempotent
    async fn close_producer(&self, producer_id: &str);

    /// Close a consumer; idempotent
    async fn close_consumer(&self, consumer_id: &str);

    /// Resolve when the engine worker process dies
    ///
    /// Worker death is unrecoverable; the server loop treats it as fatal
    /// and shuts the whole coordinator down.
    async fn worker_died(&self);
}
