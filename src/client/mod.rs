//! Signaling client implementation
//!
//! Provides the client side of the coordination protocol for:
//! - Driving a session from tests and demo binaries
//! - Embedding a participant in another Rust process
//!
//! Media itself never flows through this client; it only negotiates the
//! transports, producers and consumers that carry it.

pub mod config;
pub mod connector;

pub use config::ClientConfig;
pub use connector::SignalClient;
