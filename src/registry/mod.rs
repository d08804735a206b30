//! Roster and stream index
//!
//! The roster tracks every connected participant and, in the same lock,
//! the global index of who owns which stream. Connection tasks register
//! and remove themselves here; the signaling layer uses it to resolve
//! streams across sessions and to reach other participants' event
//! channels.
//!
//! # Architecture
//!
//! ```text
//!                          Arc<Roster>
//!              ┌──────────────────────────────────┐
//!              │ entries: HashMap<ClientId,       │
//!              │   RosterEntry {                  │
//!              │     display_name,                │
//!              │     event_tx: mpsc::Sender,      │
//!              │   }                              │
//!              │ >                                │
//!              │ index: StreamIndex {             │
//!              │   producers, consumers, by_owner │
//!              │ }                                │
//!              └────────────────┬─────────────────┘
//!                               │
//!          ┌────────────────────┼────────────────────┐
//!          │                    │                    │
//!          ▼                    ▼                    ▼
//!     [Session task]      [Session task]      [NotificationBus]
//!     register/remove     resolve_producer    event_senders()
//!     insert_producer     client_streams      try_send fan-out
//! ```
//!
//! A session's own producer/consumer lists live in its [`crate::session::Session`]
//! and are mutated lock-free by the owning task; the index here is the
//! only cross-session view, and it updates atomically with those lists
//! from the caller's perspective because each session mutates both in one
//! request before answering.

pub mod error;
pub mod index;
pub mod roster;

pub use error::RegistryError;
pub use index::{ConsumerInfo, StreamDescriptor, StreamIndex, StreamInfo};
pub use roster::{Roster, SessionInfo};
