//! Command handling infrastructure.

use std::marker::PhantomData;

use common::{AggregateId, Page, PageRequest};
use store::{EventEnvelope, RecordQuery, RecordStore, StoredRecord, Version};

use crate::aggregate::{Aggregate, DomainEvent};
use crate::error::DomainError;

/// Result of command execution.
#[derive(Debug)]
pub struct CommandResult<A: Aggregate> {
    /// The aggregate after applying the new events.
    pub aggregate: A,

    /// The events that were generated and persisted.
    pub events: Vec<A::Event>,

    /// The new version of the aggregate after the command.
    pub new_version: Version,
}

/// Handler for executing commands against aggregates.
///
/// The handler is responsible for:
/// 1. Loading the aggregate's current record
/// 2. Executing the command to produce events
/// 3. Applying the events and saving the new state at the loaded version
/// 4. Appending the events to the aggregate's audit log in the same save
pub struct CommandHandler<S, A>
where
    S: RecordStore,
    A: Aggregate,
{
    store: S,
    _phantom: PhantomData<A>,
}

impl<S, A> Clone for CommandHandler<S, A>
where
    S: RecordStore + Clone,
    A: Aggregate,
{
    fn clone(&self) -> Self {
        Self::new(self.store.clone())
    }
}

impl<S, A> CommandHandler<S, A>
where
    S: RecordStore,
    A: Aggregate,
{
    /// Creates a new command handler with the given store.
    pub fn new(store: S) -> Self {
        Self {
            store,
            _phantom: PhantomData,
        }
    }

    /// Returns a reference to the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    fn hydrate(record: StoredRecord) -> Result<A, DomainError> {
        let mut aggregate: A = serde_json::from_value(record.state)?;
        aggregate.set_version(record.version);
        Ok(aggregate)
    }

    /// Loads an aggregate, returning None if it doesn't exist.
    pub async fn load(&self, aggregate_id: AggregateId) -> Result<Option<A>, DomainError> {
        self.store
            .load(A::aggregate_type(), aggregate_id)
            .await?
            .map(Self::hydrate)
            .transpose()
    }

    /// Loads an aggregate, failing with `NotFound` if it doesn't exist.
    pub async fn get(&self, aggregate_id: AggregateId) -> Result<A, DomainError> {
        self.load(aggregate_id)
            .await?
            .ok_or_else(|| DomainError::not_found(A::aggregate_type(), aggregate_id))
    }

    /// Finds the aggregate owning a unique key value.
    pub async fn find_unique(&self, key: &str, value: &str) -> Result<Option<A>, DomainError> {
        self.store
            .find_unique(A::aggregate_type(), key, value)
            .await?
            .map(Self::hydrate)
            .transpose()
    }

    /// Lists aggregates matching a query.
    pub async fn query(&self, query: RecordQuery) -> Result<Vec<A>, DomainError> {
        self.store
            .query(query)
            .await?
            .into_iter()
            .map(Self::hydrate)
            .collect()
    }

    /// Lists one page of aggregates matching a query, with the total count.
    pub async fn page(
        &self,
        query: RecordQuery,
        request: PageRequest,
    ) -> Result<Page<A>, DomainError> {
        let total = self.store.count(query.unpaged()).await?;
        let items = self
            .query(query.limit(request.size).offset(request.offset()))
            .await?;
        Ok(Page::new(items, request, total))
    }

    /// Returns the audit log of an aggregate.
    pub async fn history(&self, aggregate_id: AggregateId) -> Result<Vec<EventEnvelope>, DomainError> {
        Ok(self.store.events_for(aggregate_id).await?)
    }

    /// Creates a new aggregate from a command run against an empty instance.
    ///
    /// Fails with a concurrency conflict if the ID is already taken.
    pub async fn create<F>(
        &self,
        aggregate_id: AggregateId,
        command_fn: F,
    ) -> Result<CommandResult<A>, DomainError>
    where
        F: FnOnce(&A) -> Result<Vec<A::Event>, A::Error>,
        DomainError: From<A::Error>,
    {
        self.run(aggregate_id, A::default(), command_fn).await
    }

    /// Executes a command against an existing aggregate and persists the result.
    ///
    /// The command function receives the current aggregate state and returns
    /// either a list of events to apply, or an error. An empty list leaves the
    /// aggregate unchanged and writes nothing.
    pub async fn execute<F>(
        &self,
        aggregate_id: AggregateId,
        command_fn: F,
    ) -> Result<CommandResult<A>, DomainError>
    where
        F: FnOnce(&A) -> Result<Vec<A::Event>, A::Error>,
        DomainError: From<A::Error>,
    {
        let aggregate = self.get(aggregate_id).await?;
        self.run(aggregate_id, aggregate, command_fn).await
    }

    /// Executes a command, reloading and re-running it when a concurrent writer
    /// wins the race, up to `attempts` times in total.
    ///
    /// The command is re-evaluated against the fresh state on every attempt,
    /// so its guard still decides whether the change is allowed.
    pub async fn execute_with_retry<F>(
        &self,
        aggregate_id: AggregateId,
        attempts: usize,
        command_fn: F,
    ) -> Result<CommandResult<A>, DomainError>
    where
        F: Fn(&A) -> Result<Vec<A::Event>, A::Error>,
        DomainError: From<A::Error>,
    {
        let mut attempt = 1;
        loop {
            match self.execute(aggregate_id, &command_fn).await {
                Err(e) if e.is_conflict() && attempt < attempts => {
                    tracing::debug!(%aggregate_id, attempt, "retrying after concurrent modification");
                    attempt += 1;
                }
                result => return result,
            }
        }
    }

    async fn run<F>(
        &self,
        aggregate_id: AggregateId,
        mut aggregate: A,
        command_fn: F,
    ) -> Result<CommandResult<A>, DomainError>
    where
        F: FnOnce(&A) -> Result<Vec<A::Event>, A::Error>,
        DomainError: From<A::Error>,
    {
        let current_version = aggregate.version();

        // Execute command to get events
        let events = command_fn(&aggregate)?;

        if events.is_empty() {
            return Ok(CommandResult {
                aggregate,
                events: vec![],
                new_version: current_version,
            });
        }

        let envelopes = Self::build_envelopes(aggregate_id, current_version, &events)?;

        aggregate.apply_events(events.iter().cloned());

        let record = StoredRecord::from_state(
            aggregate_id,
            A::aggregate_type(),
            aggregate.keys(),
            &aggregate,
        )?;

        let new_version = self.store.save(record, current_version, envelopes).await?;
        aggregate.set_version(new_version);

        Ok(CommandResult {
            aggregate,
            events,
            new_version,
        })
    }

    /// Builds audit envelopes from domain events.
    fn build_envelopes(
        aggregate_id: AggregateId,
        current_version: Version,
        events: &[A::Event],
    ) -> Result<Vec<EventEnvelope>, DomainError> {
        let version = current_version.next();
        events
            .iter()
            .map(|event| -> Result<EventEnvelope, DomainError> {
                Ok(EventEnvelope::builder()
                    .aggregate_id(aggregate_id)
                    .aggregate_type(A::aggregate_type())
                    .event_type(event.event_type())
                    .version(version)
                    .payload(event)?
                    .build())
            })
            .collect()
    }
}
