//! PostgreSQL integration tests
//!
//! These tests use a shared PostgreSQL container for efficiency.
//! Run with:
//!
//! ```bash
//! cargo test -p store --test postgres_integration -- --test-threads=1
//! ```

use std::sync::Arc;

use serial_test::serial;
use sqlx::PgPool;
use store::{
    AggregateId, EventEnvelope, PostgresRecordStore, RecordKey, RecordQuery, RecordStore,
    StoreError, StoredRecord, Version,
};
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

/// Shared container info - container stays alive for all tests
struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

/// Global shared container
static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();

            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();

            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            let temp_pool = PgPool::connect(&connection_string).await.unwrap();

            // Run migrations using raw_sql to execute multiple statements
            sqlx::raw_sql(include_str!("../../../migrations/001_create_records.sql"))
                .execute(&temp_pool)
                .await
                .unwrap();

            temp_pool.close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

/// Get a fresh store with its own pool and cleared tables
async fn get_test_store() -> PostgresRecordStore {
    let info = get_container_info().await;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&info.connection_string)
        .await
        .unwrap();

    sqlx::query("TRUNCATE TABLE record_keys, record_events, records, sequences")
        .execute(&pool)
        .await
        .unwrap();

    PostgresRecordStore::new(pool)
}

fn order_record(id: AggregateId, number: &str, status: &str) -> StoredRecord {
    StoredRecord::from_state(
        id,
        "Order",
        vec![
            RecordKey::unique("order_number", number),
            RecordKey::lookup("status", status),
        ],
        &serde_json::json!({ "order_number": number, "status": status }),
    )
    .unwrap()
}

fn event(id: AggregateId, event_type: &str) -> EventEnvelope {
    EventEnvelope::builder()
        .aggregate_id(id)
        .aggregate_type("Order")
        .event_type(event_type)
        .payload_raw(serde_json::json!({ "test": true }))
        .build()
}

#[tokio::test]
#[serial]
async fn save_and_load_record() {
    let store = get_test_store().await;
    let id = AggregateId::new();

    let version = store
        .save(
            order_record(id, "N-1", "PENDING"),
            Version::initial(),
            vec![event(id, "OrderPlaced")],
        )
        .await
        .unwrap();
    assert_eq!(version, Version::first());

    let loaded = store.load("Order", id).await.unwrap().unwrap();
    assert_eq!(loaded.version, Version::first());
    assert_eq!(loaded.state["status"], "PENDING");
    assert_eq!(loaded.key("order_number"), Some("N-1"));
    assert!(store.load("Payment", id).await.unwrap().is_none());
}

#[tokio::test]
#[serial]
async fn stale_version_is_a_conflict() {
    let store = get_test_store().await;
    let id = AggregateId::new();
    store
        .save(order_record(id, "N-1", "PENDING"), Version::initial(), vec![])
        .await
        .unwrap();
    store
        .save(order_record(id, "N-1", "CONFIRMED"), Version::first(), vec![])
        .await
        .unwrap();

    let err = store
        .save(
            order_record(id, "N-1", "CANCELLED"),
            Version::first(),
            vec![event(id, "OrderCancelled")],
        )
        .await
        .unwrap_err();

    assert!(err.is_conflict());
    let loaded = store.load("Order", id).await.unwrap().unwrap();
    assert_eq!(loaded.version, Version::new(2));
    assert_eq!(loaded.state["status"], "CONFIRMED");
    // The rejected save wrote no audit events
    assert!(store.events_for(id).await.unwrap().is_empty());
}

#[tokio::test]
#[serial]
async fn concurrent_saves_at_same_version_succeed_once() {
    let store = get_test_store().await;
    let id = AggregateId::new();
    store
        .save(order_record(id, "N-1", "PROCESSING"), Version::initial(), vec![])
        .await
        .unwrap();

    let tasks: Vec<_> = (0..5)
        .map(|_| {
            let store = store.clone();
            tokio::spawn(async move {
                store
                    .save(
                        order_record(id, "N-1", "SHIPPED"),
                        Version::first(),
                        vec![event(id, "OrderShipped")],
                    )
                    .await
            })
        })
        .collect();

    let mut successes = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(version) => {
                assert_eq!(version, Version::new(2));
                successes += 1;
            }
            Err(e) => assert!(e.is_conflict(), "unexpected error: {e}"),
        }
    }

    assert_eq!(successes, 1);
    assert_eq!(store.events_for(id).await.unwrap().len(), 1);
}

#[tokio::test]
#[serial]
async fn unique_key_violation_is_reported() {
    let store = get_test_store().await;
    store
        .save(
            order_record(AggregateId::new(), "N-1", "PENDING"),
            Version::initial(),
            vec![],
        )
        .await
        .unwrap();

    let err = store
        .save(
            order_record(AggregateId::new(), "N-1", "PENDING"),
            Version::initial(),
            vec![],
        )
        .await
        .unwrap_err();

    match err {
        StoreError::UniqueViolation { key, value, .. } => {
            assert_eq!(key, "order_number");
            assert_eq!(value, "N-1");
        }
        other => panic!("expected unique violation, got {other:?}"),
    }
    assert_eq!(store.count(RecordQuery::for_type("Order")).await.unwrap(), 1);
}

#[tokio::test]
#[serial]
async fn lookup_keys_follow_state_changes() {
    let store = get_test_store().await;
    let id = AggregateId::new();
    store
        .save(order_record(id, "N-1", "PENDING"), Version::initial(), vec![])
        .await
        .unwrap();
    store
        .save(order_record(id, "N-1", "CONFIRMED"), Version::first(), vec![])
        .await
        .unwrap();

    let pending = RecordQuery::for_type("Order").key("status", "PENDING");
    let confirmed = RecordQuery::for_type("Order").key("status", "CONFIRMED");
    assert_eq!(store.count(pending).await.unwrap(), 0);
    assert_eq!(store.count(confirmed).await.unwrap(), 1);

    let found = store
        .find_unique("Order", "order_number", "N-1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found.aggregate_id, id);
}

#[tokio::test]
#[serial]
async fn query_pages_in_creation_order() {
    let store = get_test_store().await;
    let mut ids = Vec::new();
    for i in 0..5 {
        let id = AggregateId::new();
        store
            .save(
                order_record(id, &format!("N-{i}"), "PENDING"),
                Version::initial(),
                vec![],
            )
            .await
            .unwrap();
        ids.push(id);
    }

    let page = store
        .query(RecordQuery::for_type("Order").limit(2).offset(2))
        .await
        .unwrap();

    let page_ids: Vec<_> = page.iter().map(|r| r.aggregate_id).collect();
    assert_eq!(page_ids, ids[2..4].to_vec());
    assert_eq!(
        store
            .count(RecordQuery::for_type("Order").limit(2))
            .await
            .unwrap(),
        5
    );
}

#[tokio::test]
#[serial]
async fn events_are_stamped_with_saved_version() {
    let store = get_test_store().await;
    let id = AggregateId::new();
    store
        .save(
            order_record(id, "N-1", "PENDING"),
            Version::initial(),
            vec![event(id, "OrderPlaced")],
        )
        .await
        .unwrap();
    store
        .save(
            order_record(id, "N-1", "CONFIRMED"),
            Version::first(),
            vec![
                event(id, "OrderPaymentStatusChanged"),
                event(id, "OrderConfirmed"),
            ],
        )
        .await
        .unwrap();

    let events = store.events_for(id).await.unwrap();
    let summary: Vec<_> = events
        .iter()
        .map(|e| (e.event_type.as_str(), e.version))
        .collect();
    assert_eq!(
        summary,
        vec![
            ("OrderPlaced", Version::first()),
            ("OrderPaymentStatusChanged", Version::new(2)),
            ("OrderConfirmed", Version::new(2)),
        ]
    );
}

#[tokio::test]
#[serial]
async fn sequences_increment_independently() {
    let store = get_test_store().await;

    assert_eq!(store.next_sequence("order_display_id").await.unwrap(), 1);
    assert_eq!(store.next_sequence("order_display_id").await.unwrap(), 2);
    assert_eq!(store.next_sequence("payment_display_id").await.unwrap(), 1);
    assert_eq!(store.next_sequence("order_display_id").await.unwrap(), 3);
}
