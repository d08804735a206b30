//! Per-participant session state
//!
//! One [`Session`] exists per connected participant, owned exclusively by
//! that participant's connection task. It holds the identity, at most one
//! transport per role, and the producers/consumers created on them. Cross
//! session lookups go through the roster, never through another session's
//! state.

use std::time::Instant;

use rand::RngExt;
use uuid::Uuid;

use crate::engine::MediaKind;

use super::transport::{TransportPhase, TransportRole, TransportSlot};

const NAME_ADJECTIVES: [&str; 8] = [
    "Brisk", "Amber", "Velvet", "Crimson", "Lunar", "Mossy", "Silent", "Copper",
];
const NAME_ANIMALS: [&str; 8] = [
    "Heron", "Badger", "Otter", "Falcon", "Marmot", "Lynx", "Puffin", "Newt",
];

/// Random placeholder for participants that connect without a name
fn generate_display_name() -> String {
    let mut rng = rand::rng();
    let adjective = NAME_ADJECTIVES[rng.random_range(0..NAME_ADJECTIVES.len())];
    let animal = NAME_ANIMALS[rng.random_range(0..NAME_ANIMALS.len())];
    format!("{} {}", adjective, animal)
}

/// A published stream owned by a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProducerRecord {
    pub id: String,
    pub kind: MediaKind,
}

/// A subscription owned by a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumerRecord {
    pub id: String,
    pub kind: MediaKind,
    /// Producer this consumer reads from
    pub producer_id: String,
    /// Consumers are created paused and resumed explicitly
    pub paused: bool,
}

/// Streams torn down together with one transport
#[derive(Debug, Default)]
pub struct TransportTeardown {
    pub transport_id: String,
    pub producer_ids: Vec<String>,
    pub consumer_ids: Vec<String>,
}

/// Everything a disconnecting session leaves behind
#[derive(Debug, Default)]
pub struct SessionTeardown {
    pub transport_ids: Vec<String>,
    pub producer_ids: Vec<String>,
    pub consumer_ids: Vec<String>,
}

/// State for one connected participant
#[derive(Debug)]
pub struct Session {
    id: String,
    display_name: String,
    joined_at: Instant,
    producer_transport: Option<TransportSlot>,
    consumer_transport: Option<TransportSlot>,
    producers: Vec<ProducerRecord>,
    consumers: Vec<ConsumerRecord>,
}

impl Session {
    /// Create a session, generating an id and a display name where the
    /// caller supplied none
    pub fn new(id: Option<String>, display_name: Option<String>) -> Self {
        let id = id
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let display_name = display_name
            .filter(|name| !name.is_empty())
            .unwrap_or_else(generate_display_name);

        Self {
            id,
            display_name,
            joined_at: Instant::now(),
            producer_transport: None,
            consumer_transport: None,
            producers: Vec::new(),
            consumers: Vec::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn joined_at(&self) -> Instant {
        self.joined_at
    }

    fn slot(&self, role: TransportRole) -> Option<&TransportSlot> {
        match role {
            TransportRole::Producer => self.producer_transport.as_ref(),
            TransportRole::Consumer => self.consumer_transport.as_ref(),
        }
    }

    fn slot_mut(&mut self, role: TransportRole) -> &mut Option<TransportSlot> {
        match role {
            TransportRole::Producer => &mut self.producer_transport,
            TransportRole::Consumer => &mut self.consumer_transport,
        }
    }

    /// Phase of the transport of the given role; `Uninitialized` when the
    /// session holds none
    pub fn transport_phase(&self, role: TransportRole) -> TransportPhase {
        self.slot(role)
            .map(|slot| slot.phase())
            .unwrap_or(TransportPhase::Uninitialized)
    }

    /// Transport of the given role if it can carry media setup
    pub fn usable_transport(&self, role: TransportRole) -> Option<&TransportSlot> {
        self.slot(role).filter(|slot| slot.is_usable())
    }

    /// Close and discard the transport of a role, draining the streams
    /// carried on it
    ///
    /// Returns what must be cascaded into the engine and the index, or
    /// `None` when the session held no transport of that role.
    pub fn clear_transport(&mut self, role: TransportRole) -> Option<TransportTeardown> {
        let mut old = self.slot_mut(role).take()?;
        old.close();

        let teardown = TransportTeardown {
            transport_id: old.id().to_string(),
            producer_ids: match role {
                TransportRole::Producer => self.drain_producers(),
                TransportRole::Consumer => Vec::new(),
            },
            consumer_ids: match role {
                TransportRole::Producer => Vec::new(),
                TransportRole::Consumer => self.drain_consumers(),
            },
        };

        tracing::info!(
            client = %self.id,
            role = %old.role(),
            transport = %teardown.transport_id,
            age = ?old.age(),
            producers = teardown.producer_ids.len(),
            consumers = teardown.consumer_ids.len(),
            "transport cleared, cascading closure"
        );

        Some(teardown)
    }

    /// Install a freshly allocated transport for a role
    ///
    /// Re-publish semantics: a prior transport of the same role is closed
    /// and returned with the streams that were carried on it, so the caller
    /// can cascade the closure into the engine and the index. Callers that
    /// must cascade before allocating call [`Session::clear_transport`]
    /// first, in which case this returns `None`.
    pub fn install_transport(
        &mut self,
        role: TransportRole,
        slot: TransportSlot,
    ) -> Option<TransportTeardown> {
        let replaced = self.clear_transport(role);
        *self.slot_mut(role) = Some(slot);
        replaced
    }

    /// React to an engine failure event for one of this session's
    /// transports; the slot goes to `Closed` and its streams are drained
    pub fn fail_transport(&mut self, transport_id: &str) -> Option<TransportTeardown> {
        let role = [TransportRole::Producer, TransportRole::Consumer]
            .into_iter()
            .find(|role| self.slot(*role).map(|s| s.id() == transport_id).unwrap_or(false))?;

        if let Some(slot) = self.slot_mut(role).as_mut() {
            slot.mark_failed();
            slot.close();
        }

        Some(TransportTeardown {
            transport_id: transport_id.to_string(),
            producer_ids: match role {
                TransportRole::Producer => self.drain_producers(),
                TransportRole::Consumer => Vec::new(),
            },
            consumer_ids: match role {
                TransportRole::Producer => Vec::new(),
                TransportRole::Consumer => self.drain_consumers(),
            },
        })
    }

    /// Apply a connected event to whichever slot owns the transport
    pub fn connect_transport(&mut self, transport_id: &str) -> bool {
        for role in [TransportRole::Producer, TransportRole::Consumer] {
            if let Some(slot) = self.slot_mut(role).as_mut() {
                if slot.id() == transport_id {
                    slot.mark_connected();
                    return true;
                }
            }
        }
        false
    }

    pub fn add_producer(&mut self, record: ProducerRecord) {
        self.producers.push(record);
    }

    pub fn add_consumer(&mut self, record: ConsumerRecord) {
        self.consumers.push(record);
    }

    pub fn producers(&self) -> &[ProducerRecord] {
        &self.producers
    }

    pub fn consumers(&self) -> &[ConsumerRecord] {
        &self.consumers
    }

    /// Ids of every consumer this session owns, in creation order
    pub fn consumer_ids(&self) -> Vec<String> {
        self.consumers.iter().map(|c| c.id.clone()).collect()
    }

    /// Mark a consumer active after resume; false if this session does not
    /// own it
    pub fn mark_consumer_active(&mut self, consumer_id: &str) -> bool {
        match self.consumers.iter_mut().find(|c| c.id == consumer_id) {
            Some(consumer) => {
                consumer.paused = false;
                true
            }
            None => false,
        }
    }

    /// Mark every owned consumer active
    pub fn mark_all_consumers_active(&mut self) {
        for consumer in &mut self.consumers {
            consumer.paused = false;
        }
    }

    fn drain_producers(&mut self) -> Vec<String> {
        self.producers.drain(..).map(|p| p.id).collect()
    }

    fn drain_consumers(&mut self) -> Vec<String> {
        self.consumers.drain(..).map(|c| c.id).collect()
    }

    /// Drain everything for disconnect teardown
    ///
    /// Both slots are closed and every owned stream id is handed back so
    /// the caller can cascade into the engine, the index and the roster.
    pub fn teardown(&mut self) -> SessionTeardown {
        let mut transport_ids = Vec::with_capacity(2);
        for role in [TransportRole::Producer, TransportRole::Consumer] {
            if let Some(mut slot) = self.slot_mut(role).take() {
                slot.close();
                transport_ids.push(slot.id().to_string());
            }
        }

        SessionTeardown {
            transport_ids,
            producer_ids: self.drain_producers(),
            consumer_ids: self.drain_consumers(),
        }
    }
}
