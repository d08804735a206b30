//! Presence and publication fan-out
//!
//! Best-effort delivery of push events to every live session except the
//! originator. Delivery is a non-blocking enqueue into each recipient
//! connection's outbound queue: a full or closed queue drops that
//! recipient's copy and never blocks the rest, and no ordering is
//! guaranteed relative to events originated by other sessions.

use std::sync::Arc;

use tokio::sync::mpsc::error::TrySendError;

use crate::registry::Roster;
use crate::signaling::message::PushEvent;

/// Fan-out of push events over the roster's event channels
#[derive(Clone)]
pub struct NotificationBus {
    roster: Arc<Roster>,
}

impl NotificationBus {
    pub fn new(roster: Arc<Roster>) -> Self {
        Self { roster }
    }

    /// Deliver `event` to every session except `except`
    ///
    /// Returns how many recipients accepted the event.
    pub async fn publish(&self, event: PushEvent, except: &str) -> usize {
        let targets = self.roster.event_senders(except).await;
        let mut delivered = 0;

        for (client_id, tx) in targets {
            match tx.try_send(event.clone()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    tracing::warn!(
                        client = %client_id,
                        event = ?event,
                        "event queue full, dropping notification"
                    );
                }
                Err(TrySendError::Closed(_)) => {
                    tracing::debug!(
                        client = %client_id,
                        "event channel closed, session is going away"
                    );
                }
            }
        }

        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signaling::message::PeerInfo;
    use tokio::sync::mpsc;

    async fn roster_with(ids: &[&str]) -> (Arc<Roster>, Vec<mpsc::Receiver<PushEvent>>) {
        let roster = Arc::new(Roster::new());
        let mut receivers = Vec::new();
        for id in ids {
            let (tx, rx) = mpsc::channel(4);
            roster.register(id, "name", tx).await.unwrap();
            receivers.push(rx);
        }
        (roster, receivers)
    }

    fn joined(id: &str) -> PushEvent {
        PushEvent::NewClient(PeerInfo {
            id: id.into(),
            name: "name".into(),
        })
    }

    #[tokio::test]
    async fn delivers_to_everyone_but_originator() {
        let (roster, mut receivers) = roster_with(&["alice", "bob", "carol"]).await;
        let bus = NotificationBus::new(roster);

        let delivered = bus.publish(joined("alice"), "alice").await;
        assert_eq!(delivered, 2);

        // alice (index 0) got nothing
        assert!(receivers[0].try_recv().is_err());
        assert_eq!(receivers[1].try_recv().unwrap(), joined("alice"));
        assert_eq!(receivers[2].try_recv().unwrap(), joined("alice"));
        // exactly once
        assert!(receivers[1].try_recv().is_err());
    }

    #[tokio::test]
    async fn full_queue_does_not_block_other_recipients() {
        let roster = Arc::new(Roster::new());

        let (full_tx, _full_rx) = mpsc::channel(1);
        full_tx.try_send(joined("seed")).unwrap();
        roster.register("stuck", "Stuck", full_tx).await.unwrap();

        let (ok_tx, mut ok_rx) = mpsc::channel(4);
        roster.register("healthy", "Healthy", ok_tx).await.unwrap();

        let bus = NotificationBus::new(roster);
        let delivered = bus.publish(PushEvent::ClientDisconnected("x".into()), "nobody").await;

        assert_eq!(delivered, 1);
        assert_eq!(
            ok_rx.try_recv().unwrap(),
            PushEvent::ClientDisconnected("x".into())
        );
    }

    #[tokio::test]
    async fn closed_receiver_is_tolerated() {
        let (roster, receivers) = roster_with(&["alice", "bob"]).await;
        drop(receivers);

        let bus = NotificationBus::new(roster);
        let delivered = bus.publish(joined("alice"), "carol").await;
        assert_eq!(delivered, 0);
    }
}
