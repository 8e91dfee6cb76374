use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgRow};
use uuid::Uuid;

use crate::{
    AggregateId, EventEnvelope, EventId, RecordKey, RecordQuery, Result, StoreError,
    StoredRecord, Version,
    store::{RecordStore, validate_save},
};

const UNIQUE_KEY_CONSTRAINT: &str = "unique_record_key";

/// PostgreSQL-backed record store implementation.
#[derive(Clone)]
pub struct PostgresRecordStore {
    pool: PgPool,
}

impl PostgresRecordStore {
    /// Creates a new PostgreSQL record store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects to the database at `url`.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(10)
            .connect(url)
            .await?;
        Ok(Self::new(pool))
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    async fn load_keys(
        executor: &PgPool,
        aggregate_ids: &[Uuid],
    ) -> Result<Vec<(Uuid, RecordKey)>> {
        let rows = sqlx::query(
            r#"
            SELECT aggregate_id, key_name, key_value, is_unique
            FROM record_keys
            WHERE aggregate_id = ANY($1)
            ORDER BY key_name ASC
            "#,
        )
        .bind(aggregate_ids)
        .fetch_all(executor)
        .await?;

        rows.into_iter()
            .map(|row| {
                Ok((
                    row.try_get::<Uuid, _>("aggregate_id")?,
                    RecordKey {
                        name: row.try_get("key_name")?,
                        value: row.try_get("key_value")?,
                        unique: row.try_get("is_unique")?,
                    },
                ))
            })
            .collect()
    }

    /// Loads records for the given rows and attaches their keys.
    async fn hydrate(&self, rows: Vec<PgRow>) -> Result<Vec<StoredRecord>> {
        let mut records = rows
            .into_iter()
            .map(Self::row_to_record)
            .collect::<Result<Vec<_>>>()?;

        let ids: Vec<Uuid> = records.iter().map(|r| r.aggregate_id.as_uuid()).collect();
        for (id, key) in Self::load_keys(&self.pool, &ids).await? {
            if let Some(record) = records.iter_mut().find(|r| r.aggregate_id.as_uuid() == id) {
                record.keys.push(key);
            }
        }

        Ok(records)
    }

    fn row_to_record(row: PgRow) -> Result<StoredRecord> {
        Ok(StoredRecord {
            aggregate_id: AggregateId::from_uuid(row.try_get::<Uuid, _>("aggregate_id")?),
            aggregate_type: row.try_get("aggregate_type")?,
            version: Version::new(row.try_get("version")?),
            keys: Vec::new(),
            state: row.try_get("state")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn row_to_event(row: PgRow) -> Result<EventEnvelope> {
        Ok(EventEnvelope {
            event_id: EventId::from_uuid(row.try_get::<Uuid, _>("id")?),
            event_type: row.try_get("event_type")?,
            aggregate_id: AggregateId::from_uuid(row.try_get::<Uuid, _>("aggregate_id")?),
            aggregate_type: row.try_get("aggregate_type")?,
            version: Version::new(row.try_get("version")?),
            timestamp: row.try_get("timestamp")?,
            payload: row.try_get("payload")?,
        })
    }

    /// Writes the record row, failing on a version mismatch.
    async fn write_record(
        tx: &mut Transaction<'_, Postgres>,
        record: &StoredRecord,
        expected_version: Version,
        new_version: Version,
    ) -> Result<()> {
        let current: Option<i64> =
            sqlx::query_scalar("SELECT version FROM records WHERE aggregate_id = $1 FOR UPDATE")
                .bind(record.aggregate_id.as_uuid())
                .fetch_optional(&mut **tx)
                .await?;

        let actual = Version::new(current.unwrap_or(0));
        if actual != expected_version {
            return Err(StoreError::ConcurrencyConflict {
                aggregate_type: record.aggregate_type.clone(),
                aggregate_id: record.aggregate_id,
                expected: expected_version,
                actual,
            });
        }

        let result = if current.is_none() {
            sqlx::query(
                r#"
                INSERT INTO records (aggregate_id, aggregate_type, version, state, created_at, updated_at)
                VALUES ($1, $2, $3, $4, $5, NOW())
                ON CONFLICT (aggregate_id) DO NOTHING
                "#,
            )
            .bind(record.aggregate_id.as_uuid())
            .bind(&record.aggregate_type)
            .bind(new_version.as_i64())
            .bind(&record.state)
            .bind(record.created_at)
            .execute(&mut **tx)
            .await?
        } else {
            sqlx::query(
                r#"
                UPDATE records
                SET version = $2, state = $3, updated_at = NOW()
                WHERE aggregate_id = $1 AND version = $4
                "#,
            )
            .bind(record.aggregate_id.as_uuid())
            .bind(new_version.as_i64())
            .bind(&record.state)
            .bind(expected_version.as_i64())
            .execute(&mut **tx)
            .await?
        };

        // A concurrent insert of the same new aggregate lands here
        if result.rows_affected() != 1 {
            return Err(StoreError::ConcurrencyConflict {
                aggregate_type: record.aggregate_type.clone(),
                aggregate_id: record.aggregate_id,
                expected: expected_version,
                actual: expected_version.next(),
            });
        }

        Ok(())
    }

    async fn write_keys(tx: &mut Transaction<'_, Postgres>, record: &StoredRecord) -> Result<()> {
        sqlx::query("DELETE FROM record_keys WHERE aggregate_id = $1")
            .bind(record.aggregate_id.as_uuid())
            .execute(&mut **tx)
            .await?;

        for key in &record.keys {
            sqlx::query(
                r#"
                INSERT INTO record_keys (aggregate_id, aggregate_type, key_name, key_value, is_unique)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(record.aggregate_id.as_uuid())
            .bind(&record.aggregate_type)
            .bind(&key.name)
            .bind(&key.value)
            .bind(key.unique)
            .execute(&mut **tx)
            .await
            .map_err(|e| {
                if let sqlx::Error::Database(ref db_err) = e
                    && db_err.constraint() == Some(UNIQUE_KEY_CONSTRAINT)
                {
                    return StoreError::UniqueViolation {
                        aggregate_type: record.aggregate_type.clone(),
                        key: key.name.clone(),
                        value: key.value.clone(),
                    };
                }
                StoreError::Database(e)
            })?;
        }

        Ok(())
    }

    /// Builds the `WHERE` clause shared by `query` and `count`.
    fn filter_sql(query: &RecordQuery) -> String {
        let mut sql = String::from(" WHERE r.aggregate_type = $1");
        for i in 0..query.keys.len() {
            let name_param = 2 + i * 2;
            let value_param = name_param + 1;
            sql.push_str(&format!(
                " AND EXISTS (SELECT 1 FROM record_keys k WHERE k.aggregate_id = r.aggregate_id \
                 AND k.key_name = ${name_param} AND k.key_value = ${value_param})"
            ));
        }
        sql
    }
}

#[async_trait]
impl RecordStore for PostgresRecordStore {
    async fn save(
        &self,
        record: StoredRecord,
        expected_version: Version,
        events: Vec<EventEnvelope>,
    ) -> Result<Version> {
        validate_save(&record, &events)?;

        let new_version = expected_version.next();
        let mut tx = self.pool.begin().await?;

        Self::write_record(&mut tx, &record, expected_version, new_version).await?;
        Self::write_keys(&mut tx, &record).await?;

        for event in &events {
            sqlx::query(
                r#"
                INSERT INTO record_events (id, event_type, aggregate_id, aggregate_type, version, timestamp, payload)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(event.event_id.as_uuid())
            .bind(&event.event_type)
            .bind(event.aggregate_id.as_uuid())
            .bind(&event.aggregate_type)
            .bind(new_version.as_i64())
            .bind(event.timestamp)
            .bind(&event.payload)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        metrics::counter!("record_store_saves_total").increment(1);
        Ok(new_version)
    }

    async fn load(
        &self,
        aggregate_type: &str,
        aggregate_id: AggregateId,
    ) -> Result<Option<StoredRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT aggregate_id, aggregate_type, version, state, created_at, updated_at
            FROM records
            WHERE aggregate_id = $1 AND aggregate_type = $2
            "#,
        )
        .bind(aggregate_id.as_uuid())
        .bind(aggregate_type)
        .fetch_all(&self.pool)
        .await?;

        Ok(self.hydrate(rows).await?.pop())
    }

    async fn query(&self, query: RecordQuery) -> Result<Vec<StoredRecord>> {
        let mut sql = String::from(
            "SELECT r.aggregate_id, r.aggregate_type, r.version, r.state, r.created_at, r.updated_at FROM records r",
        );
        sql.push_str(&Self::filter_sql(&query));
        sql.push_str(" ORDER BY r.created_at ASC, r.aggregate_id ASC");

        let mut param_count = 1 + query.keys.len() * 2;
        if query.limit.is_some() {
            param_count += 1;
            sql.push_str(&format!(" LIMIT ${param_count}"));
        }
        if query.offset.is_some() {
            param_count += 1;
            sql.push_str(&format!(" OFFSET ${param_count}"));
        }

        let mut sqlx_query = sqlx::query(&sql).bind(&query.aggregate_type);
        for (name, value) in &query.keys {
            sqlx_query = sqlx_query.bind(name).bind(value);
        }
        if let Some(limit) = query.limit {
            sqlx_query = sqlx_query.bind(limit as i64);
        }
        if let Some(offset) = query.offset {
            sqlx_query = sqlx_query.bind(offset as i64);
        }

        let rows = sqlx_query.fetch_all(&self.pool).await?;
        self.hydrate(rows).await
    }

    async fn count(&self, query: RecordQuery) -> Result<u64> {
        let mut sql = String::from("SELECT COUNT(*) FROM records r");
        sql.push_str(&Self::filter_sql(&query));

        let mut sqlx_query = sqlx::query_scalar::<_, i64>(&sql).bind(&query.aggregate_type);
        for (name, value) in &query.keys {
            sqlx_query = sqlx_query.bind(name).bind(value);
        }

        let count = sqlx_query.fetch_one(&self.pool).await?;
        Ok(count.max(0) as u64)
    }

    async fn events_for(&self, aggregate_id: AggregateId) -> Result<Vec<EventEnvelope>> {
        let rows = sqlx::query(
            r#"
            SELECT id, event_type, aggregate_id, aggregate_type, version, timestamp, payload
            FROM record_events
            WHERE aggregate_id = $1
            ORDER BY position ASC
            "#,
        )
        .bind(aggregate_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_event).collect()
    }

    async fn next_sequence(&self, name: &str) -> Result<u64> {
        let value: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO sequences (name, value) VALUES ($1, 1)
            ON CONFLICT (name) DO UPDATE SET value = sequences.value + 1
            RETURNING value
            "#,
        )
        .bind(name)
        .fetch_one(&self.pool)
        .await?;

        Ok(value.max(0) as u64)
    }
}
