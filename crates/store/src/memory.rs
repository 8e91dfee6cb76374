use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::{
    AggregateId, EventEnvelope, RecordQuery, Result, StoreError, StoredRecord, Version,
    store::{RecordStore, validate_save},
};

#[derive(Default)]
struct MemoryState {
    /// Records keyed by ID, with their insertion position for stable ordering.
    records: HashMap<AggregateId, (u64, StoredRecord)>,
    events: Vec<EventEnvelope>,
    sequences: HashMap<String, u64>,
    next_position: u64,
}

impl MemoryState {
    fn matching(&self, query: &RecordQuery) -> Vec<&(u64, StoredRecord)> {
        let mut matches: Vec<_> = self
            .records
            .values()
            .filter(|(_, r)| r.aggregate_type == query.aggregate_type)
            .filter(|(_, r)| query.matches_keys(|name| r.key(name)))
            .collect();
        matches.sort_by_key(|(position, _)| *position);
        matches
    }
}

/// In-memory record store implementation for tests and local runs.
///
/// Provides the same semantics as the PostgreSQL implementation, including
/// version checks and unique keys.
#[derive(Clone, Default)]
pub struct InMemoryRecordStore {
    state: Arc<RwLock<MemoryState>>,
}

impl InMemoryRecordStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the total number of records stored.
    pub async fn record_count(&self) -> usize {
        self.state.read().await.records.len()
    }

    /// Returns the total number of audit events stored.
    pub async fn event_count(&self) -> usize {
        self.state.read().await.events.len()
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn save(
        &self,
        mut record: StoredRecord,
        expected_version: Version,
        events: Vec<EventEnvelope>,
    ) -> Result<Version> {
        validate_save(&record, &events)?;

        let mut state = self.state.write().await;

        let existing = state
            .records
            .get(&record.aggregate_id)
            .map(|(position, r)| (*position, r.version, r.created_at));
        let current_version = existing
            .map(|(_, version, _)| version)
            .unwrap_or(Version::initial());

        if current_version != expected_version {
            return Err(StoreError::ConcurrencyConflict {
                aggregate_type: record.aggregate_type,
                aggregate_id: record.aggregate_id,
                expected: expected_version,
                actual: current_version,
            });
        }

        for key in record.keys.iter().filter(|k| k.unique) {
            let taken = state.records.values().any(|(_, other)| {
                other.aggregate_id != record.aggregate_id
                    && other.aggregate_type == record.aggregate_type
                    && other.key(&key.name) == Some(key.value.as_str())
            });
            if taken {
                return Err(StoreError::UniqueViolation {
                    aggregate_type: record.aggregate_type.clone(),
                    key: key.name.clone(),
                    value: key.value.clone(),
                });
            }
        }

        let new_version = expected_version.next();
        let position = match existing {
            Some((position, _, created_at)) => {
                record.created_at = created_at;
                position
            }
            None => {
                state.next_position += 1;
                state.next_position
            }
        };
        record.version = new_version;
        record.updated_at = Utc::now();

        state.records.insert(record.aggregate_id, (position, record));
        state
            .events
            .extend(events.into_iter().map(|mut e| {
                e.version = new_version;
                e
            }));

        Ok(new_version)
    }

    async fn load(
        &self,
        aggregate_type: &str,
        aggregate_id: AggregateId,
    ) -> Result<Option<StoredRecord>> {
        let state = self.state.read().await;
        Ok(state
            .records
            .get(&aggregate_id)
            .filter(|(_, r)| r.aggregate_type == aggregate_type)
            .map(|(_, r)| r.clone()))
    }

    async fn query(&self, query: RecordQuery) -> Result<Vec<StoredRecord>> {
        let state = self.state.read().await;
        let offset = query.offset.unwrap_or(0);
        let limit = query.limit.unwrap_or(usize::MAX);

        Ok(state
            .matching(&query)
            .into_iter()
            .skip(offset)
            .take(limit)
            .map(|(_, r)| r.clone())
            .collect())
    }

    async fn count(&self, query: RecordQuery) -> Result<u64> {
        let state = self.state.read().await;
        Ok(state.matching(&query).len() as u64)
    }

    async fn events_for(&self, aggregate_id: AggregateId) -> Result<Vec<EventEnvelope>> {
        let state = self.state.read().await;
        Ok(state
            .events
            .iter()
            .filter(|e| e.aggregate_id == aggregate_id)
            .cloned()
            .collect())
    }

    async fn next_sequence(&self, name: &str) -> Result<u64> {
        let mut state = self.state.write().await;
        let value = state.sequences.entry(name.to_string()).or_insert(0);
        *value += 1;
        Ok(*value)
    }
}
