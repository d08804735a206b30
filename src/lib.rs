//! Multi-party media session coordinator.
//!
//! An SFU-style signaling server: participants connect over a WebSocket,
//! negotiate media transports with an external media engine, publish and
//! subscribe to each other's audio/video streams, and hear about joins,
//! departures and new publications as push events. The media packets
//! themselves never pass through this crate; it coordinates the engine
//! that relays them.
//!
//! ```text
//!  client ──ws──┐
//!  client ──ws──┼──► SignalServer ──► Dispatcher ──► MediaEngine
//!  client ──ws──┘         │                │
//!                         │                ├──► Roster + stream index
//!                         │                └──► NotificationBus
//!                         └──── push events ◄───────┘
//! ```
//!
//! # Quick start
//!
//! ```no_run
//! use sfu_signal::{ServerConfig, SignalServer, StubEngine};
//!
//! #[tokio::main]
//! async fn main() -> sfu_signal::Result<()> {
//!     let config = ServerConfig::default().max_connections(64);
//!     let server = SignalServer::new(config, StubEngine::new());
//!
//!     server
//!         .run_until(async {
//!             let _ = tokio::signal::ctrl_c().await;
//!         })
//!         .await
//! }
//! ```
//!
//! Real deployments implement [`MediaEngine`] against their media stack;
//! [`StubEngine`] honors the full lifecycle contract without moving media
//! and backs the tests and demos.

pub mod client;
pub mod engine;
pub mod error;
pub mod notify;
pub mod registry;
pub mod server;
pub mod session;
pub mod signaling;

pub use client::{ClientConfig, SignalClient};
pub use engine::{MediaEngine, StubEngine};
pub use error::{Error, Result, SignalError};
pub use notify::NotificationBus;
pub use registry::Roster;
pub use server::{ServerConfig, SignalServer};
pub use signaling::PushEvent;
