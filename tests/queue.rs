use chrono::{Duration, Utc};
use sqlx::PgPool;
use usage_bridge::pipeline::{BillingEvent, QueueStatus, QueueStore};

// key: queue-tests -> status machine,dedup,retry windows

fn sample_event(key: &str) -> BillingEvent {
    BillingEvent {
        idempotency_key: key.to_string(),
        external_customer_id: "ext-cust-1".to_string(),
        event_code: "ai_usage".to_string(),
        timestamp: Utc::now(),
        properties: serde_json::json!({
            "model": "gpt-large",
            "input_tokens": 10,
            "output_tokens": 5,
            "total_tokens": 15,
            "cost_usd": 0.01,
            "duration_seconds": 2,
        }),
    }
}

#[sqlx::test]
#[ignore = "requires DATABASE_URL with Postgres server"]
async fn enqueue_deduplicates_by_idempotency_key(pool: PgPool) {
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    let store = QueueStore::new(pool.clone());

    let event = sample_event("metering_evt-1_1700000000");
    let first = store.enqueue(&event).await.unwrap();
    assert!(!first.deduplicated);

    let second = store.enqueue(&event).await.unwrap();
    assert!(second.deduplicated);
    assert_eq!(first.entry_id, second.entry_id);

    let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM queue_entries")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(rows, 1);
}

#[sqlx::test]
#[ignore = "requires DATABASE_URL with Postgres server"]
async fn select_due_claims_oldest_first_with_limit(pool: PgPool) {
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    let store = QueueStore::new(pool.clone());

    let now = Utc::now();
    for (key, age_minutes) in [("key-a", 30_i64), ("key-b", 20), ("key-c", 10)] {
        let outcome = store.enqueue(&sample_event(key)).await.unwrap();
        sqlx::query("UPDATE queue_entries SET created_at = $2 WHERE id = $1")
            .bind(outcome.entry_id)
            .bind(now - Duration::minutes(age_minutes))
            .execute(&pool)
            .await
            .unwrap();
    }

    let due = store.select_due(2, 3, 0).await.unwrap();
    assert_eq!(due.len(), 2);
    assert_eq!(due[0].idempotency_key, "key-a");
    assert_eq!(due[1].idempotency_key, "key-b");
}

#[sqlx::test]
#[ignore = "requires DATABASE_URL with Postgres server"]
async fn claiming_stamps_the_attempt_and_respects_the_retry_window(pool: PgPool) {
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    let store = QueueStore::new(pool.clone());

    store
        .enqueue(&sample_event("metering_evt-2_1700000000"))
        .await
        .unwrap();

    let first = store.select_due(10, 3, 3600).await.unwrap();
    assert_eq!(first.len(), 1);

    // Just claimed, so within a one-hour window nothing is due again.
    let within_window = store.select_due(10, 3, 3600).await.unwrap();
    assert!(within_window.is_empty());

    // With a zero-length window the same entry is immediately eligible.
    let zero_window = store.select_due(10, 3, 0).await.unwrap();
    assert_eq!(zero_window.len(), 1);
}

#[sqlx::test]
#[ignore = "requires DATABASE_URL with Postgres server"]
async fn mark_failed_increments_until_the_entry_is_dead(pool: PgPool) {
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    let store = QueueStore::new(pool.clone());

    let outcome = store
        .enqueue(&sample_event("metering_evt-3_1700000000"))
        .await
        .unwrap();
    let id = outcome.entry_id;

    let first = store.mark_failed(id, "boom", 3).await.unwrap().unwrap();
    assert_eq!(first.retry_count, 1);
    assert_eq!(first.status, QueueStatus::Pending);

    let second = store.mark_failed(id, "boom", 3).await.unwrap().unwrap();
    assert_eq!(second.retry_count, 2);
    assert_eq!(second.status, QueueStatus::Pending);

    let third = store.mark_failed(id, "boom", 3).await.unwrap().unwrap();
    assert_eq!(third.retry_count, 3);
    assert_eq!(third.status, QueueStatus::Dead);
    assert_eq!(third.error_message.as_deref(), Some("boom"));

    // Dead entries are terminal: never selected, never mutated again.
    let due = store.select_due(10, 3, 0).await.unwrap();
    assert!(due.is_empty());
    let after_dead = store.mark_failed(id, "boom", 3).await.unwrap();
    assert!(after_dead.is_none());
    let entry = store.entry(id).await.unwrap().unwrap();
    assert_eq!(entry.retry_count, 3);
}

#[sqlx::test]
#[ignore = "requires DATABASE_URL with Postgres server"]
async fn completed_entries_are_terminal(pool: PgPool) {
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    let store = QueueStore::new(pool.clone());

    let outcome = store
        .enqueue(&sample_event("metering_evt-4_1700000000"))
        .await
        .unwrap();
    let id = outcome.entry_id;

    store.mark_completed(id).await.unwrap();
    // The successful attempt is counted too.
    let entry = store.entry(id).await.unwrap().unwrap();
    assert_eq!(entry.retry_count, 1);

    // Double completion is a no-op and does not count another attempt.
    store.mark_completed(id).await.unwrap();

    // A racing failure report cannot resurrect the entry.
    let failed = store.mark_failed(id, "late failure", 3).await.unwrap();
    assert!(failed.is_none());

    let entry = store.entry(id).await.unwrap().unwrap();
    assert_eq!(entry.status, QueueStatus::Completed);
    assert_eq!(entry.retry_count, 1);
    assert!(entry.error_message.is_none());

    let due = store.select_due(10, 3, 0).await.unwrap();
    assert!(due.is_empty());
}

#[sqlx::test]
#[ignore = "requires DATABASE_URL with Postgres server"]
async fn stats_count_by_status_within_window(pool: PgPool) {
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    let store = QueueStore::new(pool.clone());

    let fresh = store.enqueue(&sample_event("key-fresh")).await.unwrap();
    let retrying = store.enqueue(&sample_event("key-retrying")).await.unwrap();
    let done = store.enqueue(&sample_event("key-done")).await.unwrap();
    let gone = store.enqueue(&sample_event("key-dead")).await.unwrap();

    store.mark_failed(retrying.entry_id, "boom", 3).await.unwrap();
    store.mark_completed(done.entry_id).await.unwrap();
    for _ in 0..3 {
        store.mark_failed(gone.entry_id, "boom", 3).await.unwrap();
    }

    let stats = store.stats(24).await.unwrap();
    assert_eq!(stats.total_events, 4);
    assert_eq!(stats.pending_events, 2);
    assert_eq!(stats.completed_events, 1);
    assert_eq!(stats.dead_events, 1);
    assert_eq!(stats.retrying_events, 1);
    assert_eq!(stats.active_customers, 1);

    // An entry outside the window drops out of the counts.
    sqlx::query("UPDATE queue_entries SET created_at = NOW() - INTERVAL '2 days' WHERE id = $1")
        .bind(fresh.entry_id)
        .execute(&pool)
        .await
        .unwrap();
    let stats = store.stats(24).await.unwrap();
    assert_eq!(stats.total_events, 3);
}
