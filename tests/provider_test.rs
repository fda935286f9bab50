//! Integration tests for the persistence provider.
//!
//! Requires a Postgres instance. Set `DATABASE_TEST_URL` or these tests
//! are skipped. Each test provisions its own table prefix, so tests are
//! independent and safe to run in parallel against one database.

#![allow(clippy::unwrap_used, clippy::panic, clippy::indexing_slicing)]

use eventstore_pg::{Payload, PersistenceProvider, StoreConfig};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::PgPool;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum OrderEvent {
    Placed { sku: String, quantity: u32 },
    Shipped,
    Cancelled { reason: String },
}

impl Payload for OrderEvent {
    const KIND: &'static str = "order_event";
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct OrderState {
    placed: u32,
    shipped: u32,
}

impl Payload for OrderState {
    const KIND: &'static str = "order_state";
}

fn placed(n: u32) -> OrderEvent {
    OrderEvent::Placed {
        sku: format!("sku-{n}"),
        quantity: n,
    }
}

/// Get a test database pool, or skip if no test DB is available.
async fn test_pool() -> Option<PgPool> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
    let url = std::env::var("DATABASE_TEST_URL").ok()?;
    PgPool::connect(&url).await.ok()
}

/// Build a provider over freshly-provisioned tables under `prefix`.
async fn test_provider(prefix: &str) -> Option<PersistenceProvider<OrderEvent, OrderState>> {
    let pool = test_pool().await?;

    // Clean slate for this prefix
    for table in [
        format!("public.{prefix}_events"),
        format!("public.{prefix}_snapshots"),
    ] {
        sqlx::query(&format!("DROP TABLE IF EXISTS {table}"))
            .execute(&pool)
            .await
            .ok()?;
    }

    let config = StoreConfig::new(std::env::var("DATABASE_TEST_URL").ok()?)
        .with_table_prefix(prefix)
        .with_auto_create_tables(true);
    PersistenceProvider::with_pool(pool, &config).await.ok()
}

// =========================================================================
// Event log behavior
// =========================================================================

#[tokio::test]
async fn events_read_in_ascending_order_regardless_of_append_order() {
    let Some(provider) = test_provider("t_order").await else {
        return;
    };

    // Deliberately appended out of order
    provider.persist_event("a", 3, &placed(3)).await.unwrap();
    provider.persist_event("a", 1, &placed(1)).await.unwrap();
    provider.persist_event("a", 2, &placed(2)).await.unwrap();

    let mut seen = Vec::new();
    let last = provider
        .read_events("a", 1, |event| seen.push(event))
        .await
        .unwrap();

    assert_eq!(last, Some(3));
    assert_eq!(seen, vec![placed(1), placed(2), placed(3)]);
}

#[tokio::test]
async fn read_from_index_is_inclusive_lower_bound() {
    let Some(provider) = test_provider("t_lower_bound").await else {
        return;
    };

    for index in [1, 3, 5, 6, 9] {
        provider
            .persist_event("a", index, &placed(u32::try_from(index).unwrap()))
            .await
            .unwrap();
    }

    let mut indices = Vec::new();
    provider
        .read_events("a", 5, |event| {
            if let OrderEvent::Placed { quantity, .. } = event {
                indices.push(i64::from(quantity));
            }
        })
        .await
        .unwrap();

    assert_eq!(indices, vec![5, 6, 9]);
}

#[tokio::test]
async fn read_of_empty_stream_returns_none() {
    let Some(provider) = test_provider("t_empty").await else {
        return;
    };

    let mut visits = 0;
    let last = provider
        .read_events("nobody", 0, |_| visits += 1)
        .await
        .unwrap();

    assert_eq!(last, None);
    assert_eq!(visits, 0);
}

#[tokio::test]
async fn duplicate_append_fails_and_first_row_stands() {
    let Some(provider) = test_provider("t_dup").await else {
        return;
    };

    provider.persist_event("a", 4, &placed(4)).await.unwrap();
    let err = provider
        .persist_event("a", 4, &OrderEvent::Shipped)
        .await
        .unwrap_err();
    assert!(err.is_duplicate(), "expected duplicate, got: {err}");

    // The first-committed row is unchanged
    let mut seen = Vec::new();
    provider
        .read_events("a", 0, |event| seen.push(event))
        .await
        .unwrap();
    assert_eq!(seen, vec![placed(4)]);
}

#[tokio::test]
async fn same_index_on_different_actors_is_allowed() {
    let Some(provider) = test_provider("t_same_index").await else {
        return;
    };

    provider.persist_event("x", 1, &placed(1)).await.unwrap();
    provider.persist_event("y", 1, &placed(1)).await.unwrap();
}

#[tokio::test]
async fn delete_events_up_to_is_inclusive_and_scoped() {
    let Some(provider) = test_provider("t_delete").await else {
        return;
    };

    for index in [1, 3, 5, 6, 9] {
        provider
            .persist_event("a", index, &placed(u32::try_from(index).unwrap()))
            .await
            .unwrap();
    }

    let deleted = provider.delete_events("a", 5).await.unwrap();
    assert_eq!(deleted, 3); // {1, 3, 5}

    let mut remaining = Vec::new();
    provider
        .read_events("a", 0, |event| {
            if let OrderEvent::Placed { quantity, .. } = event {
                remaining.push(quantity);
            }
        })
        .await
        .unwrap();
    assert_eq!(remaining, vec![6, 9]);
}

#[tokio::test]
async fn delete_with_no_matching_rows_is_a_noop() {
    let Some(provider) = test_provider("t_delete_none").await else {
        return;
    };

    assert_eq!(provider.delete_events("ghost", 100).await.unwrap(), 0);
    assert_eq!(provider.delete_snapshots("ghost", 100).await.unwrap(), 0);
}

#[tokio::test]
async fn cross_actor_isolation() {
    let Some(provider) = test_provider("t_isolation").await else {
        return;
    };

    provider.persist_event("x", 1, &placed(1)).await.unwrap();
    provider.persist_event("x", 2, &placed(2)).await.unwrap();
    provider.persist_event("y", 1, &placed(10)).await.unwrap();

    // Deleting x's history must not touch y
    provider.delete_events("x", 100).await.unwrap();

    let mut x_events = 0;
    provider.read_events("x", 0, |_| x_events += 1).await.unwrap();
    assert_eq!(x_events, 0);

    let mut y_events = Vec::new();
    provider
        .read_events("y", 0, |event| y_events.push(event))
        .await
        .unwrap();
    assert_eq!(y_events, vec![placed(10)]);
}

#[tokio::test]
async fn stored_event_rows_carry_ids_and_server_timestamps() {
    let Some(provider) = test_provider("t_stored").await else {
        return;
    };

    provider.persist_event("a", 1, &placed(1)).await.unwrap();
    provider.persist_event("a", 2, &placed(2)).await.unwrap();

    let rows = provider.event_log().read_stored("a", 0).await.unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].event_index, 1);
    assert_eq!(rows[1].event_index, 2);
    assert_ne!(rows[0].id, rows[1].id);
    // Server-assigned timestamps follow insert order
    assert!(rows[0].created <= rows[1].created);
    // Payloads stay in envelope form
    assert_eq!(rows[0].event_data["kind"], json!("order_event"));
}

// =========================================================================
// Snapshot behavior
// =========================================================================

#[tokio::test]
async fn latest_snapshot_is_the_one_with_max_index() {
    let Some(provider) = test_provider("t_latest").await else {
        return;
    };

    for (index, count) in [(3, 3), (7, 7), (5, 5)] {
        provider
            .persist_snapshot(
                "a",
                index,
                &OrderState {
                    placed: count,
                    shipped: 0,
                },
            )
            .await
            .unwrap();
    }

    let (state, index) = provider.load_latest_snapshot("a").await.unwrap().unwrap();
    assert_eq!(index, 7);
    assert_eq!(state.placed, 7);
}

#[tokio::test]
async fn no_snapshot_is_a_normal_outcome() {
    let Some(provider) = test_provider("t_no_snapshot").await else {
        return;
    };

    let result = provider.load_latest_snapshot("fresh-actor").await.unwrap();
    assert!(result.is_none());
}

#[tokio::test]
async fn delete_snapshots_up_to_is_inclusive() {
    let Some(provider) = test_provider("t_snap_delete").await else {
        return;
    };

    for index in [2, 4, 8] {
        provider
            .persist_snapshot(
                "a",
                index,
                &OrderState {
                    placed: u32::try_from(index).unwrap(),
                    shipped: 0,
                },
            )
            .await
            .unwrap();
    }

    let deleted = provider.delete_snapshots("a", 4).await.unwrap();
    assert_eq!(deleted, 2);

    let (state, index) = provider.load_latest_snapshot("a").await.unwrap().unwrap();
    assert_eq!(index, 8);
    assert_eq!(state.placed, 8);
}

#[tokio::test]
async fn latest_stored_snapshot_keeps_envelope_form() {
    let Some(provider) = test_provider("t_snap_stored").await else {
        return;
    };

    for (index, count) in [(3, 3), (7, 7)] {
        provider
            .persist_snapshot(
                "a",
                index,
                &OrderState {
                    placed: count,
                    shipped: 0,
                },
            )
            .await
            .unwrap();
    }

    let row = provider
        .snapshot_store()
        .load_latest_stored("a")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.snapshot_index, 7);
    assert_eq!(row.actor_name, "a");
    assert_eq!(row.snapshot_data["kind"], json!("order_state"));
    assert!(row.created.timestamp() > 0);
}

// =========================================================================
// Replay flow
// =========================================================================

#[tokio::test]
async fn snapshot_plus_tail_replay_matches_full_replay() {
    let Some(provider) = test_provider("t_replay").await else {
        return;
    };

    let events = [
        (1, placed(1)),
        (2, OrderEvent::Shipped),
        (3, placed(2)),
        (4, placed(3)),
        (5, OrderEvent::Shipped),
    ];
    for (index, event) in &events {
        provider.persist_event("a", *index, event).await.unwrap();
    }

    // Snapshot captures state as of index 3
    provider
        .persist_snapshot(
            "a",
            3,
            &OrderState {
                placed: 2,
                shipped: 1,
            },
        )
        .await
        .unwrap();

    // Full replay from scratch
    let mut full = OrderState {
        placed: 0,
        shipped: 0,
    };
    provider
        .read_events("a", 0, |event| apply(&mut full, &event))
        .await
        .unwrap();

    // Snapshot + tail replay
    let (mut resumed, index) = provider.load_latest_snapshot("a").await.unwrap().unwrap();
    provider
        .read_events("a", index + 1, |event| apply(&mut resumed, &event))
        .await
        .unwrap();

    assert_eq!(resumed, full);
}

fn apply(state: &mut OrderState, event: &OrderEvent) {
    match event {
        OrderEvent::Placed { .. } => state.placed += 1,
        OrderEvent::Shipped => state.shipped += 1,
        OrderEvent::Cancelled { .. } => {}
    }
}

// =========================================================================
// Failure semantics
// =========================================================================

#[tokio::test]
async fn decode_failure_aborts_the_scan() {
    let Some(provider) = test_provider("t_bad_row").await else {
        return;
    };
    let Some(pool) = test_pool().await else {
        return;
    };

    provider.persist_event("a", 1, &placed(1)).await.unwrap();
    provider.persist_event("a", 3, &placed(3)).await.unwrap();

    // A row written under a different payload type, wedged mid-stream
    sqlx::query(
        "INSERT INTO public.t_bad_row_events (id, actor_name, event_index, event_data) \
         VALUES ($1, $2, $3, $4)",
    )
    .bind(uuid::Uuid::new_v4())
    .bind("a")
    .bind(2_i64)
    .bind(json!({ "kind": "something_else", "data": {} }))
    .execute(&pool)
    .await
    .unwrap();

    let mut visits = 0;
    let err = provider
        .read_events("a", 0, |_| visits += 1)
        .await
        .unwrap_err();

    // The good row before the bad one was delivered; nothing after it was.
    assert_eq!(visits, 1);
    let msg = err.to_string();
    assert!(msg.contains("actor a"), "missing context: {msg}");
}

#[tokio::test]
async fn missing_schema_surfaces_when_auto_create_is_disabled() {
    let Some(pool) = test_pool().await else {
        return;
    };

    sqlx::query("DROP TABLE IF EXISTS public.t_missing_events")
        .execute(&pool)
        .await
        .unwrap();
    sqlx::query("DROP TABLE IF EXISTS public.t_missing_snapshots")
        .execute(&pool)
        .await
        .unwrap();

    let config = StoreConfig::new(std::env::var("DATABASE_TEST_URL").unwrap())
        .with_table_prefix("t_missing");
    let err = PersistenceProvider::<OrderEvent, OrderState>::with_pool(pool, &config)
        .await
        .unwrap_err();

    assert!(err.is_schema_missing(), "expected SchemaMissing, got: {err}");
}

#[tokio::test]
async fn provisioning_twice_is_idempotent() {
    let Some(provider) = test_provider("t_idempotent").await else {
        return;
    };
    provider.persist_event("a", 1, &placed(1)).await.unwrap();

    // Re-provision over the same prefix; existing data must survive.
    let Some(pool) = test_pool().await else {
        return;
    };
    let config = StoreConfig::new(std::env::var("DATABASE_TEST_URL").unwrap())
        .with_table_prefix("t_idempotent")
        .with_auto_create_tables(true);
    let second = PersistenceProvider::<OrderEvent, OrderState>::with_pool(pool, &config)
        .await
        .unwrap();

    let mut seen = Vec::new();
    second
        .read_events("a", 0, |event| seen.push(event))
        .await
        .unwrap();
    assert_eq!(seen, vec![placed(1)]);
}

#[tokio::test]
async fn unicode_payloads_round_trip() {
    let Some(provider) = test_provider("t_unicode").await else {
        return;
    };

    let event = OrderEvent::Cancelled {
        reason: "客户取消 — \"quotes\" & <brackets> \u{1F30E}".to_string(),
    };
    provider.persist_event("a", 1, &event).await.unwrap();

    let mut seen = Vec::new();
    provider
        .read_events("a", 0, |e| seen.push(e))
        .await
        .unwrap();
    assert_eq!(seen, vec![event]);
}
