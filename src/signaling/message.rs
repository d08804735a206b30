//! Wire message types
//!
//! Frames are JSON text messages. Client requests carry a client-chosen
//! numeric id echoed in the response; server push events carry an event
//! name and payload, no id:
//!
//! ```text
//!   request   {"id": 7, "method": "produce", "data": {...}}
//!   response  {"id": 7, "data": {...}}
//!   error     {"id": 7, "data": {"error": "..."}}
//!   event     {"event": "newProducer", "data": {...}}
//! ```

use serde::{Deserialize, Serialize};

use crate::engine::{DtlsParameters, MediaKind, RtpCapabilities, RtpParameters};
use crate::error::Error;

/// Request method names as they appear on the wire
pub mod methods {
    pub const GET_ROUTER_RTP_CAPABILITIES: &str = "getRouterRtpCapabilities";
    pub const CREATE_PRODUCER_TRANSPORT: &str = "createProducerTransport";
    pub const CREATE_CONSUMER_TRANSPORT: &str = "createConsumerTransport";
    pub const CONNECT_PRODUCER_TRANSPORT: &str = "connectProducerTransport";
    pub const CONNECT_CONSUMER_TRANSPORT: &str = "connectConsumerTransport";
    pub const PRODUCE: &str = "produce";
    pub const CONSUME: &str = "consume";
    pub const RESUME: &str = "resume";
    pub const GET_CLIENT_STREAMS: &str = "getClientStreams";
    pub const GET_STREAM_INFO: &str = "getStreamInfo";
}

/// One client request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestFrame {
    pub id: u64,
    pub method: String,
    /// Absent payloads deserialize as `Null`
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub data: serde_json::Value,
}

/// One server response, success or error
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseFrame {
    pub id: u64,
    pub data: serde_json::Value,
}

impl ResponseFrame {
    /// Build the response for a finished request; failures become the
    /// `{"error": "..."}` payload
    pub fn from_result(id: u64, result: Result<serde_json::Value, Error>) -> Self {
        match result {
            Ok(data) => Self { id, data },
            Err(err) => Self {
                id,
                data: serde_json::json!({ "error": err.wire_message() }),
            },
        }
    }

    /// Error string, if this response carries one
    pub fn error(&self) -> Option<&str> {
        self.data.get("error").and_then(|e| e.as_str())
    }
}

/// Identity payload used by `admit` and `newClient`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerInfo {
    pub id: String,
    pub name: String,
}

/// Payload of the `newProducer` broadcast
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewProducerNotice {
    pub client_id: String,
    pub producer_id: String,
}

/// Server-initiated push events
///
/// `clientDisconnected` carries the bare id string as its payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum PushEvent {
    /// Sent once to the new connection itself, with its assigned identity
    Admit(PeerInfo),
    /// Broadcast when a participant joins
    NewClient(PeerInfo),
    /// Broadcast when a participant departs
    ClientDisconnected(String),
    /// Broadcast when a participant publishes a stream
    NewProducer(NewProducerNotice),
}

/// Payload of `createProducerTransport` and `createConsumerTransport`
///
/// The caller capabilities accompany the producer-side request; the
/// coordinator accepts them for engine bindings that negotiate eagerly.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTransportRequest {
    #[serde(default)]
    pub force_tcp: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rtp_capabilities: Option<RtpCapabilities>,
}

/// Payload of `connectProducerTransport`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectProducerTransportRequest {
    pub dtls_parameters: DtlsParameters,
}

/// Payload of `connectConsumerTransport`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectConsumerTransportRequest {
    pub transport_id: String,
    pub dtls_parameters: DtlsParameters,
}

/// Payload of `produce`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProduceRequest {
    pub transport_id: String,
    pub kind: MediaKind,
    pub rtp_parameters: RtpParameters,
}

/// Response payload of `produce`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProduceResponse {
    pub id: String,
}

/// Payload of `consume`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumeRequest {
    pub rtp_capabilities: RtpCapabilities,
    pub stream_id: String,
}

/// Payload of `resume`; no consumer id means "resume everything I own"
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResumeRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consumer_id: Option<String>,
}

/// Payload of `getClientStreams`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientStreamsRequest {
    pub client_ids: Vec<String>,
}

/// Payload of `getStreamInfo`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamInfoRequest {
    pub stream_ids: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SignalError;
    use serde_json::json;

    #[test]
    fn request_frame_payload_defaults_to_null() {
        let frame: RequestFrame =
            serde_json::from_str(r#"{"id": 3, "method": "resume"}"#).unwrap();
        assert_eq!(frame.id, 3);
        assert_eq!(frame.method, methods::RESUME);
        assert!(frame.data.is_null());
    }

    #[test]
    fn response_frame_carries_error_payload() {
        let frame = ResponseFrame::from_result(
            9,
            Err(Error::Signal(SignalError::ProducerNotFound("p-1".into()))),
        );
        assert_eq!(frame.id, 9);
        assert_eq!(frame.error(), Some("producer p-1 not found"));

        let ok = ResponseFrame::from_result(9, Ok(json!({"id": "p-1"})));
        assert!(ok.error().is_none());
    }

    #[test]
    fn push_events_wire_shape() {
        let admit = PushEvent::Admit(PeerInfo {
            id: "u-1".into(),
            name: "Ada".into(),
        });
        let value = serde_json::to_value(&admit).unwrap();
        assert_eq!(value["event"], "admit");
        assert_eq!(value["data"]["id"], "u-1");
        assert_eq!(value["data"]["name"], "Ada");

        let gone = PushEvent::ClientDisconnected("u-1".into());
        let value = serde_json::to_value(&gone).unwrap();
        assert_eq!(value["event"], "clientDisconnected");
        assert_eq!(value["data"], "u-1");

        let published = PushEvent::NewProducer(NewProducerNotice {
            client_id: "u-1".into(),
            producer_id: "p-1".into(),
        });
        let value = serde_json::to_value(&published).unwrap();
        assert_eq!(value["event"], "newProducer");
        assert_eq!(value["data"]["clientId"], "u-1");
        assert_eq!(value["data"]["producerId"], "p-1");

        let joined = PushEvent::NewClient(PeerInfo {
            id: "u-2".into(),
            name: "Grace".into(),
        });
        let value = serde_json::to_value(&joined).unwrap();
        assert_eq!(value["event"], "newClient");
    }

    #[test]
    fn produce_request_wire_names() {
        let req: ProduceRequest = serde_json::from_value(json!({
            "transportId": "t-1",
            "kind": "video",
            "rtpParameters": {"codecs": []},
        }))
        .unwrap();
        assert_eq!(req.transport_id, "t-1");
        assert_eq!(req.kind, MediaKind::Video);
    }

    #[test]
    fn consume_request_wire_names() {
        let req: ConsumeRequest = serde_json::from_value(json!({
            "rtpCapabilities": {"codecs": [{}]},
            "streamId": "p-7",
        }))
        .unwrap();
        assert_eq!(req.stream_id, "p-7");
    }

    #[test]
    fn resume_request_accepts_both_forms() {
        let all: ResumeRequest = serde_json::from_value(json!({})).unwrap();
        assert!(all.consumer_id.is_none());

        let one: ResumeRequest =
            serde_json::from_value(json!({"consumerId": "c-1"})).unwrap();
        assert_eq!(one.consumer_id.as_deref(), Some("c-1"));
    }
}
