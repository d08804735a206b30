//! Transport slot lifecycle
//!
//! Tracks the state of the single producer-side or consumer-side transport
//! a session may hold. Allocation puts a slot straight into `Connecting`;
//! the move to `Connected` is driven by an engine event, never by the
//! connect ack. There is no recovery out of `Failed`; a replacement
//! transport must be allocated.

use std::time::Instant;

/// Which media direction a transport carries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportRole {
    /// Outbound: carries the session's producers
    Producer,
    /// Inbound: carries the session's consumers
    Consumer,
}

impl std::fmt::Display for TransportRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportRole::Producer => write!(f, "producer"),
            TransportRole::Consumer => write!(f, "consumer"),
        }
    }
}

/// Lifecycle phase of a transport slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportPhase {
    /// No transport allocated for this role
    Uninitialized,
    /// Allocated, ICE/DTLS not yet complete
    Connecting,
    /// ICE/DTLS complete, carrying media
    Connected,
    /// Engine reported an unrecoverable failure
    Failed,
    /// Closed explicitly or by cascade
    Closed,
}

/// A session's transport of one role
#[derive(Debug)]
pub struct TransportSlot {
    id: String,
    role: TransportRole,
    phase: TransportPhase,
    created_at: Instant,
}

impl TransportSlot {
    /// Track a freshly allocated transport; it starts out connecting
    pub fn new(id: String, role: TransportRole) -> Self {
        Self {
            id,
            role,
            phase: TransportPhase::Connecting,
            created_at: Instant::now(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn role(&self) -> TransportRole {
        self.role
    }

    pub fn phase(&self) -> TransportPhase {
        self.phase
    }

    /// Whether producers/consumers may be created on this transport
    ///
    /// `Connecting` counts: the engine accepts early media setup before
    /// ICE/DTLS completes.
    pub fn is_usable(&self) -> bool {
        matches!(self.phase, TransportPhase::Connecting | TransportPhase::Connected)
    }

    /// Engine reported ICE/DTLS completion
    pub fn mark_connected(&mut self) {
        if self.phase == TransportPhase::Connecting {
            self.phase = TransportPhase::Connected;
        } else {
            tracing::warn!(
                transport = %self.id,
                phase = ?self.phase,
                "ignoring connected event outside connecting phase"
            );
        }
    }

    /// Engine reported an unrecoverable failure
    pub fn mark_failed(&mut self) {
        if self.is_usable() {
            self.phase = TransportPhase::Failed;
        }
    }

    /// Close the slot; valid from any phase
    pub fn close(&mut self) {
        self.phase = TransportPhase::Closed;
    }

    /// How long this transport has existed
    pub fn age(&self) -> std::time::Duration {
        self.created_at.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocation_starts_connecting() {
        let slot = TransportSlot::new("t-1".into(), TransportRole::Producer);
        assert_eq!(slot.phase(), TransportPhase::Connecting);
        assert_eq!(slot.role(), TransportRole::Producer);
        assert!(slot.is_usable());
        assert!(slot.age() >= std::time::Duration::ZERO);
    }

    #[test]
    fn connected_only_from_connecting() {
        let mut slot = TransportSlot::new("t-1".into(), TransportRole::Consumer);
        slot.mark_connected();
        assert_eq!(slot.phase(), TransportPhase::Connected);

        slot.close();
        slot.mark_connected();
        assert_eq!(slot.phase(), TransportPhase::Closed);
    }

    #[test]
    fn no_recovery_from_failed() {
        let mut slot = TransportSlot::new("t-1".into(), TransportRole::Producer);
        slot.mark_connected();
        slot.mark_failed();
        assert_eq!(slot.phase(), TransportPhase::Failed);
        assert!(!slot.is_usable());

        slot.mark_connected();
        assert_eq!(slot.phase(), TransportPhase::Failed);

        slot.close();
        assert_eq!(slot.phase(), TransportPhase::Closed);
    }

    #[test]
    fn failed_only_from_live_phases() {
        let mut slot = TransportSlot::new("t-1".into(), TransportRole::Producer);
        slot.close();
        slot.mark_failed();
        assert_eq!(slot.phase(), TransportPhase::Closed);
    }
}
