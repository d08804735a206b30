//! Roster implementation
//!
//! The central registry of connected participants. Holds the session
//! entries and the stream index behind one lock so that a session
//! insertion or removal and its index updates are observed atomically.

use std::collections::HashMap;
use std::time::Instant;

use tokio::sync::{mpsc, RwLock};

use crate::engine::MediaKind;
use crate::signaling::message::PushEvent;

use super::error::RegistryError;
use super::index::{ConsumerInfo, StreamDescriptor, StreamIndex, StreamInfo};

/// Owned snapshot of one roster entry
#[derive(Debug, Clone)]
pub struct SessionInfo {
    pub id: String,
    pub display_name: String,
    pub joined_at: Instant,
}

struct RosterEntry {
    display_name: String,
    joined_at: Instant,
    event_tx: mpsc::Sender<PushEvent>,
}

#[derive(Default)]
struct RosterInner {
    entries: HashMap<String, RosterEntry>,
    index: StreamIndex,
}

/// Registry of all live sessions plus the stream index
///
/// Thread-safe via `RwLock`. Directory queries and notification fan-out
/// are read-heavy and benefit from the concurrent read access; every
/// mutation takes the write lock and is linearizable with respect to
/// reads.
pub struct Roster {
    inner: RwLock<RosterInner>,
}

impl Roster {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(RosterInner::default()),
        }
    }

    /// Register a session under `id`
    ///
    /// Fails with `DuplicateIdentity` if the id already maps to a live
    /// session; the existing entry is left untouched.
    pub async fn register(
        &self,
        id: &str,
        display_name: &str,
        event_tx: mpsc::Sender<PushEvent>,
    ) -> Result<(), RegistryError> {
        let mut inner = self.inner.write().await;

        if inner.entries.contains_key(id) {
            return Err(RegistryError::DuplicateIdentity(id.to_string()));
        }

        inner.entries.insert(
            id.to_string(),
            RosterEntry {
                display_name: display_name.to_string(),
                joined_at: Instant::now(),
                event_tx,
            },
        );

        tracing::info!(client = %id, name = %display_name, "session registered");
        Ok(())
    }

    /// Remove a session; removing an absent id is a no-op
    ///
    /// Teardown removes the session's streams before the session itself,
    /// so leftovers here indicate a missed cascade; they are purged and
    /// logged rather than leaked.
    pub async fn remove(&self, id: &str) -> bool {
        let mut inner = self.inner.write().await;

        let removed = inner.entries.remove(id).is_some();
        if removed {
            let (producers, consumers) = inner.index.purge_owner(id);
            if !producers.is_empty() || !consumers.is_empty() {
                tracing::warn!(
                    client = %id,
                    producers = producers.len(),
                    consumers = consumers.len(),
                    "purged stream entries left behind by teardown"
                );
            }
            tracing::info!(client = %id, "session removed");
        }

        removed
    }

    /// Owned snapshot of one session, if live
    pub async fn lookup(&self, id: &str) -> Option<SessionInfo> {
        let inner = self.inner.read().await;
        inner.entries.get(id).map(|entry| SessionInfo {
            id: id.to_string(),
            display_name: entry.display_name.clone(),
            joined_at: entry.joined_at,
        })
    }

    /// Owned snapshot of every live session
    pub async fn list_all(&self) -> Vec<SessionInfo> {
        let inner = self.inner.read().await;
        inner
            .entries
            .iter()
            .map(|(id, entry)| SessionInfo {
                id: id.clone(),
                display_name: entry.display_name.clone(),
                joined_at: entry.joined_at,
            })
            .collect()
    }

    pub async fn session_count(&self) -> usize {
        self.inner.read().await.entries.len()
    }

    pub async fn contains(&self, id: &str) -> bool {
        self.inner.read().await.entries.contains_key(id)
    }

    /// Record a new producer owned by `owner`
    pub async fn insert_producer(
        &self,
        owner: &str,
        stream_id: &str,
        kind: MediaKind,
    ) -> Result<(), RegistryError> {
        let mut inner = self.inner.write().await;
        if !inner.entries.contains_key(owner) {
            return Err(RegistryError::SessionNotFound(owner.to_string()));
        }
        inner.index.insert_producer(owner, stream_id, kind);
        Ok(())
    }

    /// Record a new consumer owned by `owner`
    pub async fn insert_consumer(
        &self,
        owner: &str,
        consumer_id: &str,
        producer_id: &str,
    ) -> Result<(), RegistryError> {
        let mut inner = self.inner.write().await;
        if !inner.entries.contains_key(owner) {
            return Err(RegistryError::SessionNotFound(owner.to_string()));
        }
        inner.index.insert_consumer(owner, consumer_id, producer_id);
        Ok(())
    }

    /// Drop a batch of stream entries in one atomic operation
    ///
    /// Used by the transport-closure cascades so readers never observe a
    /// half-removed set.
    pub async fn remove_streams(&self, producer_ids: &[String], consumer_ids: &[String]) {
        if producer_ids.is_empty() && consumer_ids.is_empty() {
            return;
        }

        let mut inner = self.inner.write().await;
        for id in producer_ids {
            inner.index.remove_producer(id);
        }
        for id in consumer_ids {
            inner.index.remove_consumer(id);
        }
    }

    /// Who owns this stream id, in O(1)
    pub async fn resolve_producer(&self, stream_id: &str) -> Option<StreamInfo> {
        self.inner.read().await.index.resolve_producer(stream_id)
    }

    /// Which live consumer has this id, in O(1)
    pub async fn resolve_consumer(&self, consumer_id: &str) -> Option<ConsumerInfo> {
        self.inner.read().await.index.resolve_consumer(consumer_id)
    }

    /// Streams one participant publishes, in publish order
    pub async fn streams_of(&self, owner: &str) -> Vec<StreamDescriptor> {
        self.inner.read().await.index.streams_of(owner)
    }

    /// Directory query: streams per requested participant
    ///
    /// Ids with no live session are omitted from the result rather than
    /// reported as errors.
    pub async fn client_streams(
        &self,
        client_ids: &[String],
    ) -> HashMap<String, Vec<StreamDescriptor>> {
        let inner = self.inner.read().await;
        client_ids
            .iter()
            .filter(|id| inner.entries.contains_key(*id))
            .map(|id| (id.clone(), inner.index.streams_of(id)))
            .collect()
    }

    /// Directory query: ownership records for specific stream ids
    pub async fn resolve_streams(&self, stream_ids: &[String]) -> Vec<StreamInfo> {
        self.inner.read().await.index.resolve_many(stream_ids)
    }

    /// Event channels of every session except `except`
    ///
    /// Returns owned sender clones so the caller fans out without holding
    /// the roster lock.
    pub async fn event_senders(&self, except: &str) -> Vec<(String, mpsc::Sender<PushEvent>)> {
        let inner = self.inner.read().await;
        inner
            .entries
            .iter()
            .filter(|(id, _)| id.as_str() != except)
            .map(|(id, entry)| (id.clone(), entry.event_tx.clone()))
            .collect()
    }

    pub async fn producer_count(&self) -> usize {
        self.inner.read().await.index.producer_count()
    }
}

impl Default for Roster {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event_channel() -> mpsc::Sender<PushEvent> {
        mpsc::channel(8).0
    }

    #[tokio::test]
    async fn register_rejects_duplicate_identity() {
        let roster = Roster::new();

        roster.register("alice", "Alice", event_channel()).await.unwrap();

        let result = roster.register("alice", "Imposter", event_channel()).await;
        assert_eq!(result, Err(RegistryError::DuplicateIdentity("alice".into())));

        // Original entry is untouched
        let info = roster.lookup("alice").await.unwrap();
        assert_eq!(info.display_name, "Alice");
    }

    #[tokio::test]
    async fn remove_is_idempotent() {
        let roster = Roster::new();
        roster.register("alice", "Alice", event_channel()).await.unwrap();

        assert!(roster.remove("alice").await);
        assert!(!roster.remove("alice").await);
        assert!(roster.lookup("alice").await.is_none());
        assert_eq!(roster.session_count().await, 0);
    }

    #[tokio::test]
    async fn producer_resolution_after_departure() {
        let roster = Roster::new();
        roster.register("alice", "Alice", event_channel()).await.unwrap();

        roster
            .insert_producer("alice", "p-1", MediaKind::Video)
            .await
            .unwrap();
        assert_eq!(
            roster.resolve_producer("p-1").await.map(|i| i.owner),
            Some("alice".to_string())
        );

        // Streams removed during teardown, then the session
        roster.remove_streams(&["p-1".into()], &[]).await;
        roster.remove("alice").await;

        assert!(roster.resolve_producer("p-1").await.is_none());
        assert!(roster.streams_of("alice").await.is_empty());
    }

    #[tokio::test]
    async fn remove_purges_leftover_streams() {
        let roster = Roster::new();
        roster.register("alice", "Alice", event_channel()).await.unwrap();
        roster
            .insert_producer("alice", "p-1", MediaKind::Audio)
            .await
            .unwrap();

        // Teardown skipped the stream removal; remove must not leak it
        roster.remove("alice").await;
        assert!(roster.resolve_producer("p-1").await.is_none());
        assert_eq!(roster.producer_count().await, 0);
    }

    #[tokio::test]
    async fn insert_requires_live_owner() {
        let roster = Roster::new();
        let result = roster.insert_producer("ghost", "p-1", MediaKind::Video).await;
        assert_eq!(result, Err(RegistryError::SessionNotFound("ghost".into())));
    }

    #[tokio::test]
    async fn client_streams_skips_unknown_ids() {
        let roster = Roster::new();
        roster.register("alice", "Alice", event_channel()).await.unwrap();
        roster.register("bob", "Bob", event_channel()).await.unwrap();
        roster
            .insert_producer("alice", "p-1", MediaKind::Audio)
            .await
            .unwrap();
        roster
            .insert_producer("alice", "p-2", MediaKind::Video)
            .await
            .unwrap();

        let streams = roster
            .client_streams(&["alice".into(), "bob".into(), "ghost".into()])
            .await;

        assert_eq!(streams.len(), 2);
        assert_eq!(streams["alice"].len(), 2);
        assert_eq!(streams["alice"][0].kind, MediaKind::Audio);
        assert!(streams["bob"].is_empty());
        assert!(!streams.contains_key("ghost"));
    }

    #[tokio::test]
    async fn event_senders_exclude_originator() {
        let roster = Roster::new();
        roster.register("alice", "Alice", event_channel()).await.unwrap();
        roster.register("bob", "Bob", event_channel()).await.unwrap();
        roster.register("carol", "Carol", event_channel()).await.unwrap();

        let senders = roster.event_senders("bob").await;
        let ids: Vec<&str> = senders.iter().map(|(id, _)| id.as_str()).collect();

        assert_eq!(senders.len(), 2);
        assert!(ids.contains(&"alice"));
        assert!(ids.contains(&"carol"));
        assert!(!ids.contains(&"bob"));
    }
}
