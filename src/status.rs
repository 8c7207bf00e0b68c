use std::sync::Arc;

use axum::{Extension, Json};
use chrono::Utc;
use serde::Serialize;
use sqlx::PgPool;

use crate::config;
use crate::error::{AppError, AppResult};
use crate::observability::{DeliveryMetrics, MetricsSnapshot};
use crate::pipeline::{BillingClient, QueueStats, QueueStore};

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub database: &'static str,
    pub billing_api: &'static str,
    pub timestamp: chrono::DateTime<Utc>,
}

/// Liveness of the two collaborators the pipeline cannot work without. An
/// unreachable billing API is reported but not fatal; the queue keeps
/// absorbing events until it recovers.
pub async fn health(
    Extension(pool): Extension<PgPool>,
    Extension(client): Extension<Arc<BillingClient>>,
) -> AppResult<Json<HealthResponse>> {
    sqlx::query_scalar::<_, i32>("SELECT 1")
        .fetch_one(&pool)
        .await
        .map_err(|err| AppError::Unavailable(format!("database unreachable: {err}")))?;

    let billing_healthy = client.health().await;

    Ok(Json(HealthResponse {
        status: "healthy",
        database: "connected",
        billing_api: if billing_healthy {
            "connected"
        } else {
            "disconnected"
        },
        timestamp: Utc::now(),
    }))
}

#[derive(Debug, Serialize)]
pub struct QueueStatsResponse {
    pub window_hours: i32,
    pub queue: QueueStats,
    pub pipeline: MetricsSnapshot,
}

// key: queue-stats -> status counts for operators
pub async fn queue_stats(
    Extension(store): Extension<QueueStore>,
    Extension(metrics): Extension<Arc<DeliveryMetrics>>,
) -> AppResult<Json<QueueStatsResponse>> {
    let window_hours = *config::STATS_WINDOW_HOURS;
    let queue = store
        .stats(window_hours)
        .await
        .map_err(|err| AppError::Message(err.to_string()))?;

    Ok(Json(QueueStatsResponse {
        window_hours,
        queue,
        pipeline: metrics.snapshot(),
    }))
}
