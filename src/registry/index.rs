//! Producer/consumer index
//!
//! Maps stream ids to their owning sessions so that "who owns this
//! stream" is a hash lookup, not a scan across every session. The index
//! is plain data; the roster wraps it in the same lock that guards the
//! session entries, so the pair always mutates as one atomic operation.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::engine::MediaKind;

/// A published stream as seen in directory listings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamDescriptor {
    pub id: String,
    pub kind: MediaKind,
}

/// A published stream together with its owner
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamInfo {
    pub id: String,
    pub kind: MediaKind,
    /// Owning session id; `client` on the wire
    #[serde(rename = "client")]
    pub owner: String,
}

/// A live consumer together with its owner and source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumerInfo {
    pub id: String,
    pub owner: String,
    pub producer_id: String,
}

struct ProducerSlot {
    kind: MediaKind,
    owner: String,
}

struct ConsumerSlot {
    owner: String,
    producer_id: String,
}

/// Stream id to owner mapping, with a per-owner publication list
#[derive(Default)]
pub struct StreamIndex {
    producers: HashMap<String, ProducerSlot>,
    consumers: HashMap<String, ConsumerSlot>,
    /// Producer ids per owner, in publish order
    by_owner: HashMap<String, Vec<String>>,
}

impl StreamIndex {
    pub fn insert_producer(&mut self, owner: &str, stream_id: &str, kind: MediaKind) {
        let previous = self.producers.insert(
            stream_id.to_string(),
            ProducerSlot {
                kind,
                owner: owner.to_string(),
            },
        );
        if previous.is_some() {
            tracing::warn!(stream = %stream_id, "producer id re-registered");
        } else {
            self.by_owner
                .entry(owner.to_string())
                .or_default()
                .push(stream_id.to_string());
        }
    }

    pub fn remove_producer(&mut self, stream_id: &str) -> Option<StreamInfo> {
        let slot = self.producers.remove(stream_id)?;
        if let Some(ids) = self.by_owner.get_mut(&slot.owner) {
            ids.retain(|id| id != stream_id);
            if ids.is_empty() {
                self.by_owner.remove(&slot.owner);
            }
        }
        Some(StreamInfo {
            id: stream_id.to_string(),
            kind: slot.kind,
            owner: slot.owner,
        })
    }

    pub fn insert_consumer(&mut self, owner: &str, consumer_id: &str, producer_id: &str) {
        let previous = self.consumers.insert(
            consumer_id.to_string(),
            ConsumerSlot {
                owner: owner.to_string(),
                producer_id: producer_id.to_string(),
            },
        );
        if previous.is_some() {
            tracing::warn!(consumer = %consumer_id, "consumer id re-registered");
        }
    }

    pub fn remove_consumer(&mut self, consumer_id: &str) -> Option<ConsumerInfo> {
        let slot = self.consumers.remove(consumer_id)?;
        Some(ConsumerInfo {
            id: consumer_id.to_string(),
            owner: slot.owner,
            producer_id: slot.producer_id,
        })
    }

    pub fn resolve_producer(&self, stream_id: &str) -> Option<StreamInfo> {
        self.producers.get(stream_id).map(|slot| StreamInfo {
            id: stream_id.to_string(),
            kind: slot.kind,
            owner: slot.owner.clone(),
        })
    }

    pub fn resolve_consumer(&self, consumer_id: &str) -> Option<ConsumerInfo> {
        self.consumers.get(consumer_id).map(|slot| ConsumerInfo {
            id: consumer_id.to_string(),
            owner: slot.owner.clone(),
            producer_id: slot.producer_id.clone(),
        })
    }

    /// Streams one owner publishes, in publish order
    pub fn streams_of(&self, owner: &str) -> Vec<StreamDescriptor> {
        self.by_owner
            .get(owner)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| {
                        self.producers.get(id).map(|slot| StreamDescriptor {
                            id: id.clone(),
                            kind: slot.kind,
                        })
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Resolve a batch of stream ids; unknown ids are skipped
    pub fn resolve_many(&self, stream_ids: &[String]) -> Vec<StreamInfo> {
        stream_ids
            .iter()
            .filter_map(|id| self.resolve_producer(id))
            .collect()
    }

    /// Drop every entry owned by one session, returning what was dropped
    pub fn purge_owner(&mut self, owner: &str) -> (Vec<String>, Vec<String>) {
        let producer_ids = self.by_owner.remove(owner).unwrap_or_default();
        for id in &producer_ids {
            self.producers.remove(id);
        }

        let consumer_ids: Vec<String> = self
            .consumers
            .iter()
            .filter(|(_, slot)| slot.owner == owner)
            .map(|(id, _)| id.clone())
            .collect();
        for id in &consumer_ids {
            self.consumers.remove(id);
        }

        (producer_ids, consumer_ids)
    }

    pub fn producer_count(&self) -> usize {
        self.producers.len()
    }

    pub fn consumer_count(&self) -> usize {
        self.consumers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_after_insert_and_remove() {
        let mut index = StreamIndex::default();
        index.insert_producer("alice", "p-1", MediaKind::Audio);

        let info = index.resolve_producer("p-1").unwrap();
        assert_eq!(info.owner, "alice");
        assert_eq!(info.kind, MediaKind::Audio);

        let removed = index.remove_producer("p-1").unwrap();
        assert_eq!(removed.id, "p-1");
        assert!(index.resolve_producer("p-1").is_none());
        assert!(index.remove_producer("p-1").is_none());
    }

    #[test]
    fn streams_of_keeps_publish_order() {
        let mut index = StreamIndex::default();
        index.insert_producer("alice", "p-audio", MediaKind::Audio);
        index.insert_producer("alice", "p-video", MediaKind::Video);
        index.insert_producer("bob", "p-other", MediaKind::Video);

        let streams = index.streams_of("alice");
        assert_eq!(streams.len(), 2);
        assert_eq!(streams[0].id, "p-audio");
        assert_eq!(streams[1].id, "p-video");

        assert!(index.streams_of("nobody").is_empty());
    }

    #[test]
    fn resolve_many_skips_unknown_ids() {
        let mut index = StreamIndex::default();
        index.insert_producer("alice", "p-1", MediaKind::Video);

        let infos = index.resolve_many(&["p-1".into(), "missing".into()]);
        assert_eq!(infos.len(), 1);
        assert_eq!(infos[0].id, "p-1");
    }

    #[test]
    fn purge_owner_drops_both_kinds() {
        let mut index = StreamIndex::default();
        index.insert_producer("alice", "p-1", MediaKind::Video);
        index.insert_producer("alice", "p-2", MediaKind::Audio);
        index.insert_consumer("alice", "c-1", "p-remote");
        index.insert_producer("bob", "p-3", MediaKind::Video);

        let (producers, consumers) = index.purge_owner("alice");
        assert_eq!(producers, vec!["p-1", "p-2"]);
        assert_eq!(consumers, vec!["c-1"]);

        assert_eq!(index.producer_count(), 1);
        assert_eq!(index.consumer_count(), 0);
        assert!(index.resolve_producer("p-3").is_some());
    }

    #[test]
    fn consumer_roundtrip() {
        let mut index = StreamIndex::default();
        index.insert_consumer("bob", "c-1", "p-1");

        let info = index.resolve_consumer("c-1").unwrap();
        assert_eq!(info.owner, "bob");
        assert_eq!(info.producer_id, "p-1");

        assert!(index.remove_consumer("c-1").is_some());
        assert!(index.resolve_consumer("c-1").is_none());
    }
}
