//! Scripted two-participant session
//!
//! Run with: cargo run --example room_walkthrough
//!
//! Starts a coordinator on a local port, then drives two clients through
//! the full protocol: admission, transport negotiation, publishing,
//! discovery, consuming, resuming, and teardown. Everything is printed as
//! it happens, so this doubles as a tour of the wire protocol.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use sfu_signal::client::{ClientConfig, SignalClient};
use sfu_signal::engine::{DtlsParameters, MediaKind, RtpParameters};
use sfu_signal::{PushEvent, ServerConfig, SignalServer, StubEngine};

const BIND: &str = "127.0.0.1:4100";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("sfu_signal=info".parse()?),
        )
        .init();

    let config = ServerConfig::default().bind(BIND.parse()?);
    let server = Arc::new(SignalServer::new(config, StubEngine::new()));
    let runner = Arc::clone(&server);
    tokio::spawn(async move {
        if let Err(e) = runner.run().await {
            eprintln!("Server error: {}", e);
        }
    });
    tokio::time::sleep(Duration::from_millis(100)).await;

    println!("--- admission ---");
    let (alice, _alice_events) =
        SignalClient::connect(ClientConfig::new(format!("ws://{BIND}")).display_name("alice"))
            .await?;
    println!("alice admitted as {} ({})", alice.id(), alice.display_name());

    let (bob, mut bob_events) =
        SignalClient::connect(ClientConfig::new(format!("ws://{BIND}"))).await?;
    println!("bob admitted as {} ({})", bob.id(), bob.display_name());

    println!();
    println!("--- alice publishes ---");
    let caps = alice.router_rtp_capabilities().await?;
    let transport = alice.create_producer_transport(false, Some(caps.clone())).await?;
    println!("producer transport {}", transport.id);

    alice
        .connect_producer_transport(DtlsParameters(json!({"role": "client"})))
        .await?;
    let audio = alice
        .produce(
            &transport.id,
            MediaKind::Audio,
            RtpParameters(json!({"codecs": [{"mimeType": "audio/opus"}]})),
        )
        .await?;
    let video = alice
        .produce(
            &transport.id,
            MediaKind::Video,
            RtpParameters(json!({"codecs": [{"mimeType": "video/VP8"}]})),
        )
        .await?;
    println!("published audio {} and video {}", audio, video);

    match bob_events.recv().await {
        Some(PushEvent::NewProducer(notice)) => {
            println!("bob heard newProducer {} from {}", notice.producer_id, notice.client_id)
        }
        other => println!("bob expected newProducer, got {:?}", other),
    }
    match bob_events.recv().await {
        Some(PushEvent::NewProducer(notice)) => {
            println!("bob heard newProducer {} from {}", notice.producer_id, notice.client_id)
        }
        other => println!("bob expected newProducer, got {:?}", other),
    }

    println!();
    println!("--- bob discovers and consumes ---");
    let listing = bob.client_streams(&[alice.id()]).await?;
    for (owner, streams) in &listing {
        for stream in streams {
            println!("{} publishes {} ({})", owner, stream.id, stream.kind);
        }
    }

    let consumer_transport = bob.create_consumer_transport(false).await?;
    bob.connect_consumer_transport(&consumer_transport.id, DtlsParameters(json!({"role": "client"})))
        .await?;
    let consumer = bob.consume(caps, &video).await?;
    println!(
        "consumer {} for producer {} (type {:?}, starts paused)",
        consumer.id, consumer.producer_id, consumer.consumer_type
    );

    bob.resume(&consumer.id).await?;
    println!("consumer {} resumed", consumer.id);

    println!();
    println!("--- alice leaves ---");
    alice.close().await;
    match bob_events.recv().await {
        Some(PushEvent::ClientDisconnected(id)) => println!("bob heard clientDisconnected {}", id),
        other => println!("bob expected clientDisconnected, got {:?}", other),
    }

    let leftovers = bob.stream_info(&[&audio, &video]).await?;
    println!("streams still resolvable after departure: {}", leftovers.len());

    bob.close().await;
    println!();
    println!("walkthrough complete");
    Ok(())
}
