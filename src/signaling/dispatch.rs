//! Request dispatch for a single signaling session.
//!
//! Every peer connection owns one [`Session`] and drives it through a
//! shared [`Dispatcher`]. Requests arrive as [`RequestFrame`]s, are parsed
//! into their typed payloads, applied against the engine and the roster,
//! and answered with a [`ResponseFrame`] carrying either the result or the
//! error payload. The dispatcher also folds engine transport events back
//! into the session and runs the departure cascade when a peer leaves.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::json;
use tokio::sync::mpsc;

use crate::engine::{
    ConsumerType, EngineError, MediaEngine, TransportEvent, TransportOptions,
};
use crate::error::{Error, Result, SignalError};
use crate::notify::NotificationBus;
use crate::registry::Roster;
use crate::session::{
    ConsumerRecord, ProducerRecord, Session, TransportRole, TransportSlot, TransportTeardown,
};
use crate::signaling::message::{
    methods, ClientStreamsRequest, ConnectConsumerTransportRequest,
    ConnectProducerTransportRequest, ConsumeRequest, CreateTransportRequest, NewProducerNotice,
    ProduceRequest, ProduceResponse, PushEvent, RequestFrame, ResponseFrame, ResumeRequest,
    StreamInfoRequest,
};

/// Layer preference applied to freshly created simulcast consumers.
const PREFERRED_SPATIAL_LAYER: u8 = 2;
const PREFERRED_TEMPORAL_LAYER: u8 = 2;

/// Shared request handler, cloned into every connection task.
///
/// Holds the engine, the roster and the notification bus. All per-peer
/// state lives in the [`Session`] owned by the connection task, so the
/// dispatcher itself never locks anything beyond what the roster does
/// internally.
pub struct Dispatcher<E> {
    engine: Arc<E>,
    roster: Arc<Roster>,
    bus: NotificationBus,
    transport_options: TransportOptions,
}

impl<E> Clone for Dispatcher<E> {
    fn clone(&self) -> Self {
        Self {
            engine: Arc::clone(&self.engine),
            roster: Arc::clone(&self.roster),
            bus: self.bus.clone(),
            transport_options: self.transport_options.clone(),
        }
    }
}

impl<E: MediaEngine> Dispatcher<E> {
    pub fn new(
        engine: Arc<E>,
        roster: Arc<Roster>,
        bus: NotificationBus,
        transport_options: TransportOptions,
    ) -> Self {
        Self {
            engine,
            roster,
            bus,
            transport_options,
        }
    }

    /// Handle one request frame and produce the matching response frame.
    ///
    /// `engine_events` is the session's transport event channel; transports
    /// allocated here report their connection state through it.
    pub async fn dispatch(
        &self,
        session: &mut Session,
        engine_events: &mpsc::Sender<TransportEvent>,
        frame: RequestFrame,
    ) -> ResponseFrame {
        tracing::debug!(
            client = %session.id(),
            request_id = frame.id,
            method = %frame.method,
            "dispatching request"
        );

        let result = self
            .handle(session, engine_events, &frame.method, frame.data)
            .await;

        if let Err(ref err) = result {
            tracing::warn!(
                client = %session.id(),
                request_id = frame.id,
                method = %frame.method,
                error = %err,
                "request failed"
            );
        }

        ResponseFrame::from_result(frame.id, result)
    }

    async fn handle(
        &self,
        session: &mut Session,
        engine_events: &mpsc::Sender<TransportEvent>,
        method: &str,
        data: serde_json::Value,
    ) -> Result<serde_json::Value> {
        match method {
            methods::GET_ROUTER_RTP_CAPABILITIES => {
                let caps = self.engine.router_capabilities().await?;
                Ok(serde_json::to_value(caps)?)
            }
            methods::CREATE_PRODUCER_TRANSPORT => {
                self.create_transport(session, engine_events, TransportRole::Producer, data)
                    .await
            }
            methods::CREATE_CONSUMER_TRANSPORT => {
                self.create_transport(session, engine_events, TransportRole::Consumer, data)
                    .await
            }
            methods::CONNECT_PRODUCER_TRANSPORT => {
                let req: ConnectProducerTransportRequest = parse(data)?;
                let transport_id = self.usable_transport_id(session, TransportRole::Producer)?;
                self.engine
                    .connect_transport(&transport_id, req.dtls_parameters)
                    .await
                    .map_err(|e| SignalError::TransportConnectFailed(e.to_string()))?;
                Ok(json!({}))
            }
            methods::CONNECT_CONSUMER_TRANSPORT => {
                let req: ConnectConsumerTransportRequest = parse(data)?;
                let transport_id = self.usable_transport_id(session, TransportRole::Consumer)?;
                if transport_id != req.transport_id {
                    return Err(SignalError::NoActiveTransport.into());
                }
                self.engine
                    .connect_transport(&transport_id, req.dtls_parameters)
                    .await
                    .map_err(|e| SignalError::TransportConnectFailed(e.to_string()))?;
                Ok(json!({}))
            }
            methods::PRODUCE => self.produce(session, data).await,
            methods::CONSUME => self.consume(session, data).await,
            methods::RESUME => self.resume(session, data).await,
            methods::GET_CLIENT_STREAMS => {
                let req: ClientStreamsRequest = parse(data)?;
                let streams = self.roster.client_streams(&req.client_ids).await;
                Ok(serde_json::to_value(streams)?)
            }
            methods::GET_STREAM_INFO => {
                let req: StreamInfoRequest = parse(data)?;
                let infos = self.roster.resolve_streams(&req.stream_ids).await;
                Ok(serde_json::to_value(infos)?)
            }
            other => Err(SignalError::BadRequest(format!("unknown method {other}")).into()),
        }
    }

    /// Allocate a transport for a role, replacing any prior one.
    ///
    /// A peer that publishes again tears its old transport down first:
    /// the engine closes it, the streams it carried leave the index, and
    /// only then is the new transport created. A failed allocation thus
    /// leaves the session with no transport of that role at all.
    async fn create_transport(
        &self,
        session: &mut Session,
        engine_events: &mpsc::Sender<TransportEvent>,
        role: TransportRole,
        data: serde_json::Value,
    ) -> Result<serde_json::Value> {
        let req: CreateTransportRequest = if data.is_null() {
            CreateTransportRequest::default()
        } else {
            parse(data)?
        };

        if let Some(teardown) = session.clear_transport(role) {
            self.cascade_teardown(&teardown).await;
        }

        let options = self.transport_options.with_force_tcp(req.force_tcp);
        let descriptor = self
            .engine
            .create_transport(&options, engine_events.clone())
            .await
            .map_err(|e| SignalError::TransportAllocationFailed(e.to_string()))?;

        tracing::info!(
            client = %session.id(),
            role = %role,
            transport = %descriptor.id,
            force_tcp = req.force_tcp,
            "transport created"
        );

        session.install_transport(role, TransportSlot::new(descriptor.id.clone(), role));
        Ok(serde_json::to_value(descriptor)?)
    }

    async fn produce(
        &self,
        session: &mut Session,
        data: serde_json::Value,
    ) -> Result<serde_json::Value> {
        let req: ProduceRequest = parse(data)?;
        let transport_id = self.usable_transport_id(session, TransportRole::Producer)?;
        if transport_id != req.transport_id {
            return Err(SignalError::NoActiveTransport.into());
        }

        let producer_id = self
            .engine
            .produce(&transport_id, req.kind, req.rtp_parameters)
            .await?;

        session.add_producer(ProducerRecord {
            id: producer_id.clone(),
            kind: req.kind,
        });
        self.roster
            .insert_producer(session.id(), &producer_id, req.kind)
            .await?;

        tracing::info!(
            client = %session.id(),
            stream = %producer_id,
            kind = %req.kind,
            "producer created"
        );

        self.bus
            .publish(
                PushEvent::NewProducer(NewProducerNotice {
                    client_id: session.id().to_string(),
                    producer_id: producer_id.clone(),
                }),
                session.id(),
            )
            .await;

        Ok(serde_json::to_value(ProduceResponse { id: producer_id })?)
    }

    async fn consume(
        &self,
        session: &mut Session,
        data: serde_json::Value,
    ) -> Result<serde_json::Value> {
        let req: ConsumeRequest = parse(data)?;

        let stream = self
            .roster
            .resolve_producer(&req.stream_id)
            .await
            .ok_or_else(|| SignalError::ProducerNotFound(req.stream_id.clone()))?;

        let transport_id = self.usable_transport_id(session, TransportRole::Consumer)?;

        if !self
            .engine
            .can_consume(&stream.id, &req.rtp_capabilities)
            .await
        {
            return Err(SignalError::IncompatibleCapabilities(stream.id).into());
        }

        let descriptor = match self
            .engine
            .consume(&transport_id, &stream.id, req.rtp_capabilities)
            .await
        {
            Ok(descriptor) => descriptor,
            // The owner can disconnect between the index lookup and this
            // call; that is a missing producer, not an internal failure.
            Err(EngineError::UnknownProducer(id)) => {
                return Err(SignalError::ProducerNotFound(id).into())
            }
            Err(err) => return Err(err.into()),
        };

        if descriptor.consumer_type == ConsumerType::Simulcast {
            if let Err(err) = self
                .engine
                .set_preferred_layers(
                    &descriptor.id,
                    PREFERRED_SPATIAL_LAYER,
                    PREFERRED_TEMPORAL_LAYER,
                )
                .await
            {
                tracing::warn!(
                    consumer = %descriptor.id,
                    error = %err,
                    "could not set preferred layers"
                );
            }
        }

        session.add_consumer(ConsumerRecord {
            id: descriptor.id.clone(),
            kind: descriptor.kind,
            producer_id: stream.id.clone(),
            paused: true,
        });
        self.roster
            .insert_consumer(session.id(), &descriptor.id, &stream.id)
            .await?;

        tracing::info!(
            client = %session.id(),
            consumer = %descriptor.id,
            stream = %stream.id,
            "consumer created paused"
        );

        Ok(serde_json::to_value(descriptor)?)
    }

    /// Resume one consumer by id, or every consumer of the session when
    /// the request names none.
    async fn resume(
        &self,
        session: &mut Session,
        data: serde_json::Value,
    ) -> Result<serde_json::Value> {
        let req: ResumeRequest = if data.is_null() {
            ResumeRequest::default()
        } else {
            parse(data)?
        };

        match req.consumer_id {
            Some(consumer_id) => {
                let info = self
                    .roster
                    .resolve_consumer(&consumer_id)
                    .await
                    .ok_or_else(|| SignalError::ConsumerNotFound(consumer_id.clone()))?;
                self.engine.resume_consumer(&info.id).await?;
                if info.owner == session.id() {
                    session.mark_consumer_active(&info.id);
                }
                tracing::debug!(
                    client = %session.id(),
                    consumer = %info.id,
                    "consumer resumed"
                );
            }
            None => {
                let ids = session.consumer_ids();
                for id in &ids {
                    if let Err(err) = self.engine.resume_consumer(id).await {
                        tracing::warn!(
                            client = %session.id(),
                            consumer = %id,
                            error = %err,
                            "resume failed"
                        );
                    }
                }
                session.mark_all_consumers_active();
                tracing::debug!(
                    client = %session.id(),
                    count = ids.len(),
                    "resumed all consumers"
                );
            }
        }

        Ok(json!({}))
    }

    /// Fold an engine transport event into the session.
    ///
    /// A failed transport is treated like a closed one: the engine side is
    /// shut down and the streams it carried leave the index. The session
    /// stays alive, later produce or consume calls simply find no usable
    /// transport until the peer allocates a fresh one.
    pub async fn handle_transport_event(&self, session: &mut Session, event: TransportEvent) {
        match event {
            TransportEvent::Connected { transport_id } => {
                if session.connect_transport(&transport_id) {
                    tracing::info!(
                        client = %session.id(),
                        transport = %transport_id,
                        "transport connected"
                    );
                }
            }
            TransportEvent::Failed {
                transport_id,
                reason,
            } => {
                tracing::error!(
                    client = %session.id(),
                    transport = %transport_id,
                    reason = %reason,
                    "transport failed"
                );
                if let Some(teardown) = session.fail_transport(&transport_id) {
                    self.cascade_teardown(&teardown).await;
                }
            }
        }
    }

    /// Run the departure cascade for a leaving peer.
    ///
    /// Engine resources close first, then the roster forgets the session
    /// and its streams, and finally the remaining peers hear about it.
    pub async fn disconnect(&self, session: &mut Session) {
        let teardown = session.teardown();
        for transport_id in &teardown.transport_ids {
            self.engine.close_transport(transport_id).await;
        }
        self.roster
            .remove_streams(&teardown.producer_ids, &teardown.consumer_ids)
            .await;
        self.roster.remove(session.id()).await;

        tracing::info!(
            client = %session.id(),
            name = %session.display_name(),
            uptime = ?session.joined_at().elapsed(),
            transports = teardown.transport_ids.len(),
            producers = teardown.producer_ids.len(),
            consumers = teardown.consumer_ids.len(),
            "session closed"
        );

        self.bus
            .publish(
                PushEvent::ClientDisconnected(session.id().to_string()),
                session.id(),
            )
            .await;
    }

    async fn cascade_teardown(&self, teardown: &TransportTeardown) {
        self.engine.close_transport(&teardown.transport_id).await;
        self.roster
            .remove_streams(&teardown.producer_ids, &teardown.consumer_ids)
            .await;
    }

    fn usable_transport_id(&self, session: &Session, role: TransportRole) -> Result<String> {
        session
            .usable_transport(role)
            .map(|slot| slot.id().to_string())
            .ok_or_else(|| SignalError::NoActiveTransport.into())
    }
}

fn parse<T: DeserializeOwned>(data: serde_json::Value) -> Result<T> {
    serde_json::from_value(data).map_err(|e| Error::Signal(SignalError::BadRequest(e.to_string())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{
        ConsumerDescriptor, DtlsParameters, MediaKind, RtpCapabilities, RtpParameters, StubEngine,
        TransportDescriptor,
    };
    use async_trait::async_trait;

    struct Fixture {
        dispatcher: Dispatcher<StubEngine>,
        engine: Arc<StubEngine>,
        roster: Arc<Roster>,
    }

    fn fixture() -> Fixture {
        let engine = Arc::new(StubEngine::new());
        let roster = Arc::new(Roster::new());
        let bus = NotificationBus::new(Arc::clone(&roster));
        let dispatcher = Dispatcher::new(
            Arc::clone(&engine),
            Arc::clone(&roster),
            bus,
            TransportOptions::default(),
        );
        Fixture {
            dispatcher,
            engine,
            roster,
        }
    }

    async fn join(fx: &Fixture, id: &str) -> (Session, mpsc::Receiver<PushEvent>) {
        let session = Session::new(Some(id.to_string()), Some(format!("peer {id}")));
        let (tx, rx) = mpsc::channel(16);
        fx.roster
            .register(session.id(), session.display_name(), tx)
            .await
            .unwrap();
        (session, rx)
    }

    fn request(id: u64, method: &str, data: serde_json::Value) -> RequestFrame {
        RequestFrame {
            id,
            method: method.to_string(),
            data,
        }
    }

    async fn publish(
        fx: &Fixture,
        session: &mut Session,
        events: &mpsc::Sender<TransportEvent>,
    ) -> String {
        let response = fx
            .dispatcher
            .dispatch(
                session,
                events,
                request(1, methods::CREATE_PRODUCER_TRANSPORT, json!({"forceTcp": false})),
            )
            .await;
        assert!(response.error().is_none());
        let transport_id = response.data["id"].as_str().unwrap().to_string();

        let response = fx
            .dispatcher
            .dispatch(
                session,
                events,
                request(
                    2,
                    methods::PRODUCE,
                    json!({
                        "transportId": transport_id,
                        "kind": "video",
                        "rtpParameters": {"codecs": [{"mimeType": "video/VP8"}]},
                    }),
                ),
            )
            .await;
        assert!(response.error().is_none());
        response.data["id"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn produce_without_transport_is_rejected() {
        let fx = fixture();
        let (mut session, _rx) = join(&fx, "alpha").await;
        let (events, _events_rx) = mpsc::channel(8);

        let response = fx
            .dispatcher
            .dispatch(
                &mut session,
                &events,
                request(
                    1,
                    methods::PRODUCE,
                    json!({"transportId": "t1", "kind": "audio", "rtpParameters": {}}),
                ),
            )
            .await;

        assert_eq!(response.error(), Some("no active transport"));
    }

    #[tokio::test]
    async fn publish_registers_stream_and_notifies_peers() {
        let fx = fixture();
        let (mut alice, _alice_rx) = join(&fx, "alice").await;
        let (_bob, mut bob_rx) = join(&fx, "bob").await;
        let (events, _events_rx) = mpsc::channel(8);

        let producer_id = publish(&fx, &mut alice, &events).await;

        let stream = fx.roster.resolve_producer(&producer_id).await.unwrap();
        assert_eq!(stream.owner, "alice");
        assert!(fx.engine.has_producer(&producer_id));

        match bob_rx.recv().await.unwrap() {
            PushEvent::NewProducer(notice) => {
                assert_eq!(notice.client_id, "alice");
                assert_eq!(notice.producer_id, producer_id);
            }
            other => panic!("expected newProducer, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn republish_closes_previous_transport_and_streams() {
        let fx = fixture();
        let (mut alice, _rx) = join(&fx, "alice").await;
        let (events, _events_rx) = mpsc::channel(8);

        let first_producer = publish(&fx, &mut alice, &events).await;
        let first_transport = alice
            .usable_transport(TransportRole::Producer)
            .unwrap()
            .id()
            .to_string();

        let response = fx
            .dispatcher
            .dispatch(
                &mut alice,
                &events,
                request(3, methods::CREATE_PRODUCER_TRANSPORT, json!({"forceTcp": true})),
            )
            .await;
        assert!(response.error().is_none());

        assert!(!fx.engine.has_transport(&first_transport));
        assert!(!fx.engine.has_producer(&first_producer));
        assert!(fx.roster.resolve_producer(&first_producer).await.is_none());
        assert!(alice.producers().is_empty());
    }

    #[tokio::test]
    async fn consume_unknown_stream_is_rejected() {
        let fx = fixture();
        let (mut bob, _rx) = join(&fx, "bob").await;
        let (events, _events_rx) = mpsc::channel(8);

        fx.dispatcher
            .dispatch(
                &mut bob,
                &events,
                request(1, methods::CREATE_CONSUMER_TRANSPORT, json!({"forceTcp": false})),
            )
            .await;

        let response = fx
            .dispatcher
            .dispatch(
                &mut bob,
                &events,
                request(
                    2,
                    methods::CONSUME,
                    json!({"rtpCapabilities": {"codecs": [{}]}, "streamId": "missing"}),
                ),
            )
            .await;

        assert_eq!(response.error(), Some("producer missing not found"));
    }

    #[tokio::test]
    async fn consume_with_unusable_capabilities_is_rejected() {
        let fx = fixture();
        let (mut alice, _a) = join(&fx, "alice").await;
        let (mut bob, _b) = join(&fx, "bob").await;
        let (events, _events_rx) = mpsc::channel(8);

        let producer_id = publish(&fx, &mut alice, &events).await;

        fx.dispatcher
            .dispatch(
                &mut bob,
                &events,
                request(1, methods::CREATE_CONSUMER_TRANSPORT, json!({"forceTcp": false})),
            )
            .await;

        let response = fx
            .dispatcher
            .dispatch(
                &mut bob,
                &events,
                request(
                    2,
                    methods::CONSUME,
                    json!({"rtpCapabilities": {"codecs": []}, "streamId": producer_id}),
                ),
            )
            .await;

        assert_eq!(
            response.error(),
            Some(format!("incompatible capabilities for producer {producer_id}").as_str())
        );
    }

    #[tokio::test]
    async fn consume_starts_paused_and_resume_activates() {
        let fx = fixture();
        let (mut alice, _a) = join(&fx, "alice").await;
        let (mut bob, _b) = join(&fx, "bob").await;
        let (events, _events_rx) = mpsc::channel(8);

        let producer_id = publish(&fx, &mut alice, &events).await;

        fx.dispatcher
            .dispatch(
                &mut bob,
                &events,
                request(1, methods::CREATE_CONSUMER_TRANSPORT, json!({"forceTcp": false})),
            )
            .await;

        let response = fx
            .dispatcher
            .dispatch(
                &mut bob,
                &events,
                request(
                    2,
                    methods::CONSUME,
                    json!({"rtpCapabilities": {"codecs": [{}]}, "streamId": producer_id}),
                ),
            )
            .await;
        assert!(response.error().is_none());
        assert_eq!(response.data["producerPaused"], json!(false));
        let consumer_id = response.data["id"].as_str().unwrap().to_string();
        assert_eq!(fx.engine.consumer_paused(&consumer_id), Some(true));

        let response = fx
            .dispatcher
            .dispatch(
                &mut bob,
                &events,
                request(3, methods::RESUME, json!({"consumerId": consumer_id})),
            )
            .await;
        assert!(response.error().is_none());
        assert_eq!(fx.engine.consumer_paused(&consumer_id), Some(false));
        assert!(!bob.consumers()[0].paused);
    }

    #[tokio::test]
    async fn resume_without_payload_resumes_every_consumer() {
        let fx = fixture();
        let (mut alice, _a) = join(&fx, "alice").await;
        let (mut bob, _b) = join(&fx, "bob").await;
        let (events, _events_rx) = mpsc::channel(8);

        let producer_id = publish(&fx, &mut alice, &events).await;

        fx.dispatcher
            .dispatch(
                &mut bob,
                &events,
                request(1, methods::CREATE_CONSUMER_TRANSPORT, json!({"forceTcp": false})),
            )
            .await;
        let response = fx
            .dispatcher
            .dispatch(
                &mut bob,
                &events,
                request(
                    2,
                    methods::CONSUME,
                    json!({"rtpCapabilities": {"codecs": [{}]}, "streamId": producer_id}),
                ),
            )
            .await;
        let consumer_id = response.data["id"].as_str().unwrap().to_string();

        // The reference client sends resume with no data at all.
        let response = fx
            .dispatcher
            .dispatch(&mut bob, &events, request(3, methods::RESUME, json!(null)))
            .await;
        assert!(response.error().is_none());
        assert_eq!(fx.engine.consumer_paused(&consumer_id), Some(false));
        assert!(bob.consumers().iter().all(|c| !c.paused));
    }

    #[tokio::test]
    async fn resume_with_unknown_consumer_is_rejected() {
        let fx = fixture();
        let (mut bob, _b) = join(&fx, "bob").await;
        let (events, _events_rx) = mpsc::channel(8);

        let response = fx
            .dispatcher
            .dispatch(
                &mut bob,
                &events,
                request(1, methods::RESUME, json!({"consumerId": "ghost"})),
            )
            .await;

        assert_eq!(response.error(), Some("consumer ghost not found"));
    }

    #[tokio::test]
    async fn simulcast_consumer_gets_preferred_layers() {
        let fx = fixture();
        let (mut alice, _a) = join(&fx, "alice").await;
        let (mut bob, _b) = join(&fx, "bob").await;
        let (events, _events_rx) = mpsc::channel(8);

        let response = fx
            .dispatcher
            .dispatch(
                &mut alice,
                &events,
                request(1, methods::CREATE_PRODUCER_TRANSPORT, json!({"forceTcp": false})),
            )
            .await;
        let transport_id = response.data["id"].as_str().unwrap().to_string();
        let response = fx
            .dispatcher
            .dispatch(
                &mut alice,
                &events,
                request(
                    2,
                    methods::PRODUCE,
                    json!({
                        "transportId": transport_id,
                        "kind": "video",
                        "rtpParameters": {"encodings": [{"rid": "r0"}, {"rid": "r1"}, {"rid": "r2"}]},
                    }),
                ),
            )
            .await;
        let producer_id = response.data["id"].as_str().unwrap().to_string();

        fx.dispatcher
            .dispatch(
                &mut bob,
                &events,
                request(3, methods::CREATE_CONSUMER_TRANSPORT, json!({"forceTcp": false})),
            )
            .await;
        let response = fx
            .dispatcher
            .dispatch(
                &mut bob,
                &events,
                request(
                    4,
                    methods::CONSUME,
                    json!({"rtpCapabilities": {"codecs": [{}]}, "streamId": producer_id}),
                ),
            )
            .await;

        assert_eq!(response.data["type"], json!("simulcast"));
        let consumer_id = response.data["id"].as_str().unwrap();
        assert_eq!(fx.engine.preferred_layers(consumer_id), Some((2, 2)));
    }

    #[tokio::test]
    async fn failed_transport_drops_streams_until_republish() {
        let fx = fixture();
        let (mut alice, _a) = join(&fx, "alice").await;
        let (events, _events_rx) = mpsc::channel(8);

        let producer_id = publish(&fx, &mut alice, &events).await;
        let transport_id = alice
            .usable_transport(TransportRole::Producer)
            .unwrap()
            .id()
            .to_string();

        fx.dispatcher
            .handle_transport_event(
                &mut alice,
                TransportEvent::Failed {
                    transport_id: transport_id.clone(),
                    reason: "dtls failure".to_string(),
                },
            )
            .await;

        assert!(fx.roster.resolve_producer(&producer_id).await.is_none());
        assert!(!fx.engine.has_transport(&transport_id));

        let response = fx
            .dispatcher
            .dispatch(
                &mut alice,
                &events,
                request(
                    5,
                    methods::PRODUCE,
                    json!({"transportId": transport_id, "kind": "video", "rtpParameters": {}}),
                ),
            )
            .await;
        assert_eq!(response.error(), Some("no active transport"));
    }

    #[tokio::test]
    async fn disconnect_cascades_and_notifies_peers() {
        let fx = fixture();
        let (mut alice, _a) = join(&fx, "alice").await;
        let (_bob, mut bob_rx) = join(&fx, "bob").await;
        let (events, _events_rx) = mpsc::channel(8);

        let producer_id = publish(&fx, &mut alice, &events).await;
        let transport_id = alice
            .usable_transport(TransportRole::Producer)
            .unwrap()
            .id()
            .to_string();

        // Drain the newProducer notice first.
        bob_rx.recv().await.unwrap();

        fx.dispatcher.disconnect(&mut alice).await;

        assert!(!fx.roster.contains("alice").await);
        assert!(fx.roster.resolve_producer(&producer_id).await.is_none());
        assert!(!fx.engine.has_transport(&transport_id));

        match bob_rx.recv().await.unwrap() {
            PushEvent::ClientDisconnected(id) => assert_eq!(id, "alice"),
            other => panic!("expected clientDisconnected, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn stream_queries_report_live_producers() {
        let fx = fixture();
        let (mut alice, _a) = join(&fx, "alice").await;
        let (mut bob, _b) = join(&fx, "bob").await;
        let (events, _events_rx) = mpsc::channel(8);

        let producer_id = publish(&fx, &mut alice, &events).await;

        let response = fx
            .dispatcher
            .dispatch(
                &mut bob,
                &events,
                request(
                    1,
                    methods::GET_CLIENT_STREAMS,
                    json!({"clientIds": ["alice", "nobody"]}),
                ),
            )
            .await;
        assert_eq!(response.data["alice"][0]["id"], json!(producer_id.clone()));
        assert_eq!(response.data["alice"][0]["kind"], json!("video"));
        assert!(response.data.get("nobody").is_none());

        let response = fx
            .dispatcher
            .dispatch(
                &mut bob,
                &events,
                request(
                    2,
                    methods::GET_STREAM_INFO,
                    json!({"streamIds": [producer_id, "missing"]}),
                ),
            )
            .await;
        let infos = response.data.as_array().unwrap();
        assert_eq!(infos.len(), 1);
        assert_eq!(infos[0]["client"], json!("alice"));
    }

    /// Engine whose producers are gone by the time consume is called, as
    /// happens when the owner disconnects right after the index lookup.
    struct VanishingProducerEngine {
        inner: StubEngine,
    }

    #[async_trait]
    impl MediaEngine for VanishingProducerEngine {
        async fn router_capabilities(&self) -> std::result::Result<RtpCapabilities, EngineError> {
            self.inner.router_capabilities().await
        }

        async fn create_transport(
            &self,
            options: &TransportOptions,
            events: mpsc::Sender<TransportEvent>,
        ) -> std::result::Result<TransportDescriptor, EngineError> {
            self.inner.create_transport(options, events).await
        }

        async fn connect_transport(
            &self,
            transport_id: &str,
            dtls_parameters: DtlsParameters,
        ) -> std::result::Result<(), EngineError> {
            self.inner.connect_transport(transport_id, dtls_parameters).await
        }

        async fn produce(
            &self,
            transport_id: &str,
            kind: MediaKind,
            rtp_parameters: RtpParameters,
        ) -> std::result::Result<String, EngineError> {
            self.inner.produce(transport_id, kind, rtp_parameters).await
        }

        async fn can_consume(&self, _producer_id: &str, _rtp_capabilities: &RtpCapabilities) -> bool {
            true
        }

        async fn consume(
            &self,
            _transport_id: &str,
            producer_id: &str,
            _rtp_capabilities: RtpCapabilities,
        ) -> std::result::Result<ConsumerDescriptor, EngineError> {
            Err(EngineError::UnknownProducer(producer_id.to_string()))
        }

        async fn resume_consumer(&self, consumer_id: &str) -> std::result::Result<(), EngineError> {
            self.inner.resume_consumer(consumer_id).await
        }

        async fn set_preferred_layers(
            &self,
            consumer_id: &str,
            spatial_layer: u8,
            temporal_layer: u8,
        ) -> std::result::Result<(), EngineError> {
            self.inner
                .set_preferred_layers(consumer_id, spatial_layer, temporal_layer)
                .await
        }

        async fn close_transport(&self, transport_id: &str) {
            self.inner.close_transport(transport_id).await
        }

        async fn close_producer(&self, producer_id: &str) {
            self.inner.close_producer(producer_id).await
        }

        async fn close_consumer(&self, consumer_id: &str) {
            self.inner.close_consumer(consumer_id).await
        }

        async fn worker_died(&self) {
            self.inner.worker_died().await
        }
    }

    #[tokio::test]
    async fn consume_after_engine_lost_producer_reports_not_found() {
        let engine = Arc::new(VanishingProducerEngine {
            inner: StubEngine::new(),
        });
        let roster = Arc::new(Roster::new());
        let bus = NotificationBus::new(Arc::clone(&roster));
        let dispatcher = Dispatcher::new(
            Arc::clone(&engine),
            Arc::clone(&roster),
            bus,
            TransportOptions::default(),
        );

        // The index still resolves the stream; only the engine has lost it.
        let (tx, _rx) = mpsc::channel(16);
        roster.register("alice", "Alice", tx).await.unwrap();
        roster
            .insert_producer("alice", "p-ghost", MediaKind::Video)
            .await
            .unwrap();

        let mut bob = Session::new(Some("bob".into()), Some("Bob".into()));
        let (tx, _rx) = mpsc::channel(16);
        roster.register(bob.id(), bob.display_name(), tx).await.unwrap();
        let (events, _events_rx) = mpsc::channel(8);

        dispatcher
            .dispatch(
                &mut bob,
                &events,
                request(1, methods::CREATE_CONSUMER_TRANSPORT, json!({"forceTcp": false})),
            )
            .await;

        let response = dispatcher
            .dispatch(
                &mut bob,
                &events,
                request(
                    2,
                    methods::CONSUME,
                    json!({"rtpCapabilities": {"codecs": [{}]}, "streamId": "p-ghost"}),
                ),
            )
            .await;

        assert_eq!(response.error(), Some("producer p-ghost not found"));
        assert!(bob.consumers().is_empty());
    }

    #[tokio::test]
    async fn unknown_method_reports_bad_request() {
        let fx = fixture();
        let (mut session, _rx) = join(&fx, "alpha").await;
        let (events, _events_rx) = mpsc::channel(8);

        let response = fx
            .dispatcher
            .dispatch(&mut session, &events, request(9, "teleport", json!({})))
            .await;

        assert_eq!(response.error(), Some("bad request: unknown method teleport"));
    }

    #[tokio::test]
    async fn refused_allocation_surfaces_as_error() {
        let fx = fixture();
        let (mut session, _rx) = join(&fx, "alpha").await;
        let (events, _events_rx) = mpsc::channel(8);

        fx.engine.refuse_transports(true);

        let response = fx
            .dispatcher
            .dispatch(
                &mut session,
                &events,
                request(1, methods::CREATE_PRODUCER_TRANSPORT, json!({"forceTcp": false})),
            )
            .await;

        assert!(response
            .error()
            .unwrap()
            .starts_with("transport allocation failed"));
        assert!(session.usable_transport(TransportRole::Producer).is_none());
    }
}
