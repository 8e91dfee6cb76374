//! Persistence for aggregate state.
//!
//! Aggregates are stored as versioned JSON records. Each save carries the
//! version the caller loaded; a mismatch is rejected, which gives every
//! aggregate optimistic mutual exclusion. A save may also append domain
//! events to a per-aggregate audit log in the same unit of work.

pub mod error;
pub mod memory;
pub mod postgres;
pub mod query;
pub mod record;
pub mod store;

pub use common::AggregateId;
pub use error::{Result, StoreError};
pub use memory::InMemoryRecordStore;
pub use postgres::PostgresRecordStore;
pub use query::RecordQuery;
pub use record::{EventEnvelope, EventEnvelopeBuilder, EventId, RecordKey, StoredRecord, Version};
pub use store::{RecordStore, validate_save};
