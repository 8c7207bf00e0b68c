use anyhow::{anyhow, Result};
use serde::Serialize;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use super::models::{BillingEvent, QueueEntry};

// key: queue-store -> durable delivery state machine
/// Single owner of all queue_entries mutation. Every transition is one
/// conditional statement, so racing actors (inline attempt vs. sweep, or two
/// dispatcher processes) cannot corrupt retry_count or resurrect a terminal
/// row.
#[derive(Clone)]
pub struct QueueStore {
    pool: PgPool,
}

#[derive(Debug, Clone)]
pub struct EnqueueOutcome {
    pub entry_id: Uuid,
    /// True when a live row for this idempotency key already existed.
    pub deduplicated: bool,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct QueueStats {
    pub total_events: i64,
    pub pending_events: i64,
    pub completed_events: i64,
    pub dead_events: i64,
    pub retrying_events: i64,
    pub active_customers: i64,
}

impl QueueStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Inserts a pending entry for the event. Re-enqueueing an event with the
    /// same idempotency key returns the existing row instead of creating a
    /// second live entry.
    pub async fn enqueue(&self, event: &BillingEvent) -> Result<EnqueueOutcome> {
        let payload = serde_json::to_value(event)?;
        let inserted: Option<Uuid> = sqlx::query_scalar(
            r#"
            INSERT INTO queue_entries (id, idempotency_key, external_customer_id, payload)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (idempotency_key) DO NOTHING
            RETURNING id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&event.idempotency_key)
        .bind(&event.external_customer_id)
        .bind(&payload)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(entry_id) = inserted {
            return Ok(EnqueueOutcome {
                entry_id,
                deduplicated: false,
            });
        }

        let existing: Uuid =
            sqlx::query_scalar("SELECT id FROM queue_entries WHERE idempotency_key = $1")
                .bind(&event.idempotency_key)
                .fetch_one(&self.pool)
                .await?;
        Ok(EnqueueOutcome {
            entry_id: existing,
            deduplicated: true,
        })
    }

    pub async fn entry(&self, entry_id: Uuid) -> Result<Option<QueueEntry>> {
        let entry = sqlx::query_as::<_, QueueEntry>("SELECT * FROM queue_entries WHERE id = $1")
            .bind(entry_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(entry)
    }

    /// Claims up to `limit` due entries, oldest first. Claiming stamps
    /// `last_attempt_at`, so a concurrent dispatcher sweeping within the
    /// retry window skips rows that are already in flight; `FOR UPDATE SKIP
    /// LOCKED` keeps two simultaneous sweeps from claiming the same row.
    pub async fn select_due(
        &self,
        limit: i64,
        max_retries: i32,
        retry_delay_secs: u64,
    ) -> Result<Vec<QueueEntry>> {
        let mut entries = sqlx::query_as::<_, QueueEntry>(
            r#"
            UPDATE queue_entries
            SET last_attempt_at = NOW()
            WHERE id IN (
                SELECT id FROM queue_entries
                WHERE status = 'pending'
                  AND retry_count < $1
                  AND (last_attempt_at IS NULL
                       OR last_attempt_at <= NOW() - make_interval(secs => $2))
                ORDER BY created_at ASC
                LIMIT $3
                FOR UPDATE SKIP LOCKED
            )
            RETURNING *
            "#,
        )
        .bind(max_retries)
        .bind(retry_delay_secs as f64)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        // UPDATE ... RETURNING does not preserve the subquery ordering.
        entries.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(entries)
    }

    /// Terminal success. Counts as one delivery attempt, so retry_count keeps
    /// growing monotonically across successes and failures alike. Idempotent:
    /// completing an already-completed entry is a no-op. A late success may
    /// still complete a dead entry, since the billing API did accept the
    /// event.
    pub async fn mark_completed(&self, entry_id: Uuid) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE queue_entries
            SET status = 'completed',
                retry_count = retry_count + 1,
                last_attempt_at = NOW(),
                error_message = NULL
            WHERE id = $1 AND status <> 'completed'
            "#,
        )
        .bind(entry_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Records one failed attempt: atomically increments retry_count and
    /// transitions to `dead` once the budget is exhausted. Completed entries
    /// are never touched. Returns the updated entry, or None when the row was
    /// already terminal.
    pub async fn mark_failed(
        &self,
        entry_id: Uuid,
        error_message: &str,
        max_retries: i32,
    ) -> Result<Option<QueueEntry>> {
        if max_retries <= 0 {
            return Err(anyhow!("max_retries must be positive"));
        }
        let entry = sqlx::query_as::<_, QueueEntry>(
            r#"
            UPDATE queue_entries
            SET retry_count = retry_count + 1,
                last_attempt_at = NOW(),
                error_message = $2,
                status = CASE
                    WHEN retry_count + 1 >= $3 THEN 'dead'::queue_status
                    ELSE 'pending'::queue_status
                END
            WHERE id = $1 AND status = 'pending'
            RETURNING *
            "#,
        )
        .bind(entry_id)
        .bind(error_message)
        .bind(max_retries)
        .fetch_optional(&self.pool)
        .await?;
        Ok(entry)
    }

    /// Aggregate counts over the trailing window, for the stats endpoint.
    pub async fn stats(&self, window_hours: i32) -> Result<QueueStats> {
        let stats = sqlx::query_as::<_, QueueStats>(
            r#"
            SELECT
                COUNT(*) AS total_events,
                COUNT(*) FILTER (WHERE status = 'pending') AS pending_events,
                COUNT(*) FILTER (WHERE status = 'completed') AS completed_events,
                COUNT(*) FILTER (WHERE status = 'dead') AS dead_events,
                COUNT(*) FILTER (WHERE status = 'pending' AND retry_count > 0) AS retrying_events,
                COUNT(DISTINCT external_customer_id) AS active_customers
            FROM queue_entries
            WHERE created_at >= NOW() - make_interval(hours => $1)
            "#,
        )
        .bind(window_hours)
        .fetch_one(&self.pool)
        .await?;
        Ok(stats)
    }
}
