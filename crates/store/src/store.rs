use async_trait::async_trait;

use crate::{AggregateId, EventEnvelope, RecordQuery, Result, StoreError, StoredRecord, Version};

/// Core trait for record store implementations.
///
/// All implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Saves a record and appends its events to the audit log atomically.
    ///
    /// Fails with `ConcurrencyConflict` unless the stored version equals
    /// `expected_version` (`Version::initial()` for a record that must not
    /// exist yet), and with `UniqueViolation` if a unique key is already
    /// owned by another record of the same type.
    ///
    /// Returns the new version of the record.
    async fn save(
        &self,
        record: StoredRecord,
        expected_version: Version,
        events: Vec<EventEnvelope>,
    ) -> Result<Version>;

    /// Loads a record by ID. Returns None if it does not exist or has a different type.
    async fn load(
        &self,
        aggregate_type: &str,
        aggregate_id: AggregateId,
    ) -> Result<Option<StoredRecord>>;

    /// Lists records matching a query, oldest first.
    async fn query(&self, query: RecordQuery) -> Result<Vec<StoredRecord>>;

    /// Counts records matching a query, ignoring its paging.
    async fn count(&self, query: RecordQuery) -> Result<u64>;

    /// Returns the audit log of an aggregate in the order it was written.
    async fn events_for(&self, aggregate_id: AggregateId) -> Result<Vec<EventEnvelope>>;

    /// Returns the next value of a named counter, starting at 1.
    async fn next_sequence(&self, name: &str) -> Result<u64>;

    /// Finds the single record holding a unique key value.
    async fn find_unique(
        &self,
        aggregate_type: &str,
        key: &str,
        value: &str,
    ) -> Result<Option<StoredRecord>> {
        let mut records = self
            .query(RecordQuery::for_type(aggregate_type).key(key, value).limit(1))
            .await?;
        Ok(records.pop())
    }
}

/// Validates a record and its events before saving.
pub fn validate_save(record: &StoredRecord, events: &[EventEnvelope]) -> Result<()> {
    if record.aggregate_type.is_empty() {
        return Err(StoreError::InvalidRecord(
            "aggregate type must not be empty".to_string(),
        ));
    }

    let mut names: Vec<&str> = record.keys.iter().map(|k| k.name.as_str()).collect();
    names.sort_unstable();
    if names.windows(2).any(|w| w[0] == w[1]) {
        return Err(StoreError::InvalidRecord(format!(
            "duplicate key name on {} {}",
            record.aggregate_type, record.aggregate_id
        )));
    }

    // Events must belong to the record being saved
    for event in events {
        if event.aggregate_id != record.aggregate_id
            || event.aggregate_type != record.aggregate_type
        {
            return Err(StoreError::InvalidRecord(format!(
                "event {} does not belong to {} {}",
                event.event_type, record.aggregate_type, record.aggregate_id
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RecordKey;

    fn record(keys: Vec<RecordKey>) -> StoredRecord {
        StoredRecord::from_state(AggregateId::new(), "Order", keys, &serde_json::json!({}))
            .unwrap()
    }

    #[test]
    fn rejects_duplicate_key_names() {
        let record = record(vec![
            RecordKey::lookup("status", "PENDING"),
            RecordKey::lookup("status", "CONFIRMED"),
        ]);
        assert!(matches!(
            validate_save(&record, &[]),
            Err(StoreError::InvalidRecord(_))
        ));
    }

    #[test]
    fn rejects_foreign_events() {
        let record = record(vec![]);
        let event = EventEnvelope::builder()
            .aggregate_id(AggregateId::new())
            .aggregate_type("Order")
            .event_type("OrderPlaced")
            .build();
        assert!(validate_save(&record, &[event]).is_err());
    }

    #[test]
    fn accepts_matching_events() {
        let record = record(vec![RecordKey::unique("order_number", "N-1")]);
        let event = EventEnvelope::builder()
            .aggregate_id(record.aggregate_id)
            .aggregate_type("Order")
            .event_type("OrderPlaced")
            .build();
        assert!(validate_save(&record, &[event]).is_ok());
    }
}
