//! Engine-facing data types
//!
//! The coordinator treats codec and transport parameters as opaque JSON
//! blobs produced and consumed by the media engine; only the identifiers
//! and lifecycle flags around them are interpreted here.

use serde::{Deserialize, Serialize};

/// Media kind of a produced or consumed stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Audio,
    Video,
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MediaKind::Audio => write!(f, "audio"),
            MediaKind::Video => write!(f, "video"),
        }
    }
}

/// Router-level RTP capability descriptor, passed through verbatim
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RtpCapabilities(pub serde_json::Value);

/// Per-stream RTP parameter descriptor, passed through verbatim
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RtpParameters(pub serde_json::Value);

/// DTLS handshake parameters, passed through verbatim
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DtlsParameters(pub serde_json::Value);

/// Knobs applied when the engine allocates a transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportOptions {
    /// Restrict the transport to TCP candidates
    pub force_tcp: bool,

    /// Starting estimate for outgoing bandwidth, in bps
    pub initial_available_outgoing_bitrate: u32,

    /// Cap on incoming bitrate, in bps; applied after allocation and
    /// ignored if the engine rejects it
    pub max_incoming_bitrate: Option<u32>,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self {
            force_tcp: false,
            initial_available_outgoing_bitrate: 1_000_000,
            max_incoming_bitrate: Some(1_500_000),
        }
    }
}

impl TransportOptions {
    /// Copy of these options with a different TCP preference
    pub fn with_force_tcp(&self, force_tcp: bool) -> Self {
        Self {
            force_tcp,
            ..self.clone()
        }
    }
}

/// Everything a client needs to connect to a freshly allocated transport
///
/// Serializes to the exact shape returned by the transport creation
/// operations: `{id, iceParameters, iceCandidates, dtlsParameters}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransportDescriptor {
    pub id: String,
    pub ice_parameters: serde_json::Value,
    pub ice_candidates: serde_json::Value,
    pub dtls_parameters: serde_json::Value,
}

/// How the engine built a consumer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsumerType {
    Simple,
    Simulcast,
    Svc,
    Pipe,
}

/// Description of a consumer created by the engine
///
/// Consumers are always created paused; the owning session resumes them
/// once its receive path is wired up. Serializes to the consume response
/// shape: `{producerId, id, kind, rtpParameters, type, producerPaused}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumerDescriptor {
    pub producer_id: String,
    pub id: String,
    pub kind: MediaKind,
    pub rtp_parameters: RtpParameters,
    #[serde(rename = "type")]
    pub consumer_type: ConsumerType,
    pub producer_paused: bool,
}

/// Transport-level event delivered asynchronously by the engine
///
/// These drive the per-session transport state machine; they are never
/// surfaced as responses to pending requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// ICE/DTLS completed; the transport can carry media
    Connected { transport_id: String },

    /// The transport failed and will never recover; the coordinator must
    /// force-close it and everything built on it
    Failed { transport_id: String, reason: String },
}

impl TransportEvent {
    /// Transport the event refers to
    pub fn transport_id(&self) -> &str {
        match self {
            TransportEvent::Connected { transport_id } => transport_id,
            TransportEvent::Failed { transport_id, .. } => transport_id,
        }
    }
}
