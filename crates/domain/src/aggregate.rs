//! Core aggregate and domain event traits.

use common::AggregateId;
use serde::{Serialize, de::DeserializeOwned};
use store::{RecordKey, Version};

/// Trait for domain events.
///
/// Domain events represent facts that have happened in the domain.
/// They are immutable and should be named in past tense.
pub trait DomainEvent: Serialize + DeserializeOwned + Send + Sync + Clone {
    /// Returns the event type name, used as the audit log event type.
    fn event_type(&self) -> &'static str;
}

/// Trait for aggregates persisted as versioned records.
///
/// Aggregates never change state directly. A command method inspects the
/// current state, checks its guard, and returns the events describing the
/// change; `apply` then folds those events into the state. A command that
/// fails its guard returns an error and leaves the aggregate untouched.
pub trait Aggregate: Default + Serialize + DeserializeOwned + Send + Sync + Sized {
    /// The type of events this aggregate produces and consumes.
    type Event: DomainEvent;

    /// The type of errors this aggregate's commands can produce.
    type Error: std::error::Error + Send + Sync;

    /// Returns the aggregate type name, used as the record type.
    fn aggregate_type() -> &'static str;

    /// Returns the aggregate's unique identifier.
    ///
    /// Returns None for a new, uninitialized aggregate.
    fn id(&self) -> Option<AggregateId>;

    /// Returns the version the aggregate was loaded at.
    fn version(&self) -> Version;

    /// Sets the aggregate version.
    ///
    /// Called by the repository after loading or saving.
    fn set_version(&mut self, version: Version);

    /// Applies an event to the aggregate, updating its state.
    ///
    /// Must be deterministic and must not fail: events are facts.
    fn apply(&mut self, event: Self::Event);

    /// Secondary keys the record is stored under (unique numbers, status, owner).
    fn keys(&self) -> Vec<RecordKey>;

    /// Applies multiple events in sequence.
    fn apply_events(&mut self, events: impl IntoIterator<Item = Self::Event>) {
        for event in events {
            self.apply(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, Serialize, Deserialize)]
    enum TestEvent {
        Created { id: AggregateId },
        Updated { value: i32 },
    }

    impl DomainEvent for TestEvent {
        fn event_type(&self) -> &'static str {
            match self {
                TestEvent::Created { .. } => "TestCreated",
                TestEvent::Updated { .. } => "TestUpdated",
            }
        }
    }

    #[derive(Debug, Default, Clone, Serialize, Deserialize)]
    struct TestAggregate {
        id: Option<AggregateId>,
        value: i32,
        #[serde(skip)]
        version: Version,
    }

    #[derive(Debug, thiserror::Error)]
    #[error("test error")]
    struct TestError;

    impl Aggregate for TestAggregate {
        type Event = TestEvent;
        type Error = TestError;

        fn aggregate_type() -> &'static str {
            "TestAggregate"
        }

        fn id(&self) -> Option<AggregateId> {
            self.id
        }

        fn version(&self) -> Version {
            self.version
        }

        fn set_version(&mut self, version: Version) {
            self.version = version;
        }

        fn apply(&mut self, event: Self::Event) {
            match event {
                TestEvent::Created { id } => self.id = Some(id),
                TestEvent::Updated { value } => self.value = value,
            }
        }

        fn keys(&self) -> Vec<RecordKey> {
            vec![RecordKey::lookup("value", self.value.to_string())]
        }
    }

    #[test]
    fn test_aggregate_apply_events() {
        let mut aggregate = TestAggregate::default();
        let id = AggregateId::new();

        aggregate.apply_events(vec![
            TestEvent::Created { id },
            TestEvent::Updated { value: 42 },
        ]);

        assert_eq!(aggregate.id(), Some(id));
        assert_eq!(aggregate.value, 42);
        assert_eq!(aggregate.keys()[0].value, "42");
    }

    #[test]
    fn test_domain_event_type() {
        let event = TestEvent::Updated { value: 42 };
        assert_eq!(event.event_type(), "TestUpdated");
    }
}
