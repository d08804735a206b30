//! Session state for connected participants
//!
//! Each connection owns exactly one [`Session`]: identity, at most one
//! producer transport, at most one consumer transport, and the streams
//! created on them. The structs here are deliberately lock-free; only the
//! owning connection task mutates them, while shared lookups live in the
//! roster.

pub mod state;
pub mod transport;

pub use state::{ConsumerRecord, ProducerRecord, Session, SessionTeardown, TransportTeardown};
pub use transport::{TransportPhase, TransportRole, TransportSlot};
