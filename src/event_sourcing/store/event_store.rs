use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{bail, Result};
use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::event_sourcing::core::{DomainEvent, EntityVersion, StoredEvent};
use crate::event_sourcing::transcoding::Transcoder;

// ============================================================================
// Stored Event Repository
// ============================================================================
//
// The contract a persistence backend fulfils:
// 1. Append stored events per stream (append-only)
// 2. Load a stream's events in append order
// 3. Enforce optimistic concurrency on the stream version
//
// ============================================================================

#[async_trait]
pub trait StoredEventRepository: Send + Sync {
    /// Append events to one stream. Returns the new version.
    async fn append_events(
        &self,
        stored_entity_id: &str,
        expected_version: u64,
        events: Vec<StoredEvent>,
    ) -> Result<u64>;

    async fn load_events(&self, stored_entity_id: &str) -> Result<Vec<StoredEvent>>;

    /// Number of events in the stream; 0 for an unknown stream.
    async fn get_current_version(&self, stored_entity_id: &str) -> Result<u64>;
}

// ============================================================================
// In-Memory Event Store
// ============================================================================

#[derive(Debug, Default)]
struct Stream {
    events: Vec<StoredEvent>,
    versions: Vec<EntityVersion>,
}

/// Non-durable store keyed by stored_entity_id. Domain events go in and
/// out through the configured transcoder.
pub struct EventStore {
    transcoder: Arc<dyn Transcoder>,
    streams: RwLock<HashMap<String, Stream>>,
}

impl EventStore {
    pub fn new(transcoder: Arc<dyn Transcoder>) -> Self {
        Self {
            transcoder,
            streams: RwLock::new(HashMap::new()),
        }
    }

    pub fn transcoder(&self) -> &Arc<dyn Transcoder> {
        &self.transcoder
    }

    /// Serialize and append events that all belong to one entity.
    pub async fn append_domain_events(
        &self,
        expected_version: u64,
        events: &[&dyn DomainEvent],
    ) -> Result<u64> {
        if events.is_empty() {
            bail!("Cannot append empty event list");
        }

        let stored = events
            .iter()
            .map(|event| self.transcoder.serialize(*event))
            .collect::<Result<Vec<_>, _>>()?;

        let stored_entity_id = stored[0].stored_entity_id.clone();
        if let Some(other) = stored.iter().find(|s| s.stored_entity_id != stored_entity_id) {
            bail!(
                "Cannot append events for several entities at once: {} and {}",
                stored_entity_id,
                other.stored_entity_id
            );
        }

        self.append_events(&stored_entity_id, expected_version, stored).await
    }

    /// Load and deserialize a stream's events in order.
    pub async fn load_domain_events(&self, stored_entity_id: &str) -> Result<Vec<Box<dyn DomainEvent>>> {
        let stored = self.load_events(stored_entity_id).await?;
        let events = stored
            .iter()
            .map(|record| self.transcoder.deserialize(record))
            .collect::<Result<Vec<_>, _>>()?;

        tracing::debug!(
            stored_entity_id = %stored_entity_id,
            event_count = events.len(),
            "Loaded domain events"
        );
        Ok(events)
    }

    /// The version record written when the stream reached `version`.
    pub async fn entity_version(&self, stored_entity_id: &str, version: u64) -> Option<EntityVersion> {
        let streams = self.streams.read().await;
        let index = usize::try_from(version).ok()?.checked_sub(1)?;
        streams
            .get(stored_entity_id)
            .and_then(|stream| stream.versions.get(index))
            .cloned()
    }

    pub async fn stream_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.streams.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }
}

#[async_trait]
impl StoredEventRepository for EventStore {
    async fn append_events(
        &self,
        stored_entity_id: &str,
        expected_version: u64,
        events: Vec<StoredEvent>,
    ) -> Result<u64> {
        if events.is_empty() {
            bail!("Cannot append empty event list");
        }
        if let Some(foreign) = events.iter().find(|e| e.stored_entity_id != stored_entity_id) {
            bail!(
                "Event {} belongs to {}, not {}",
                foreign.event_id,
                foreign.stored_entity_id,
                stored_entity_id
            );
        }

        let mut streams = self.streams.write().await;
        let stream = streams.entry(stored_entity_id.to_string()).or_default();

        // Check optimistic concurrency
        let current_version = stream.events.len() as u64;
        if current_version != expected_version {
            bail!(
                "Concurrency conflict: expected version {}, but current is {}",
                expected_version,
                current_version
            );
        }

        let event_count = events.len();
        let mut new_version = current_version;
        for event in events {
            new_version += 1;
            stream
                .versions
                .push(EntityVersion::new(stored_entity_id, new_version, event.event_id.clone()));
            stream.events.push(event);
        }

        tracing::info!(
            stored_entity_id = %stored_entity_id,
            new_version = new_version,
            event_count = event_count,
            "Appended events to event store"
        );

        Ok(new_version)
    }

    async fn load_events(&self, stored_entity_id: &str) -> Result<Vec<StoredEvent>> {
        let streams = self.streams.read().await;
        Ok(streams
            .get(stored_entity_id)
            .map(|stream| stream.events.clone())
            .unwrap_or_default())
    }

    async fn get_current_version(&self, stored_entity_id: &str) -> Result<u64> {
        let streams = self.streams.read().await;
        Ok(streams
            .get(stored_entity_id)
            .map(|stream| stream.events.len() as u64)
            .unwrap_or(0))
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
