use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

// key: pipeline-models -> usage records,billing events,queue entries

/// Raw usage record from the metering source. Immutable input; never
/// persisted verbatim past the ingress boundary.
#[derive(Debug, Clone, Deserialize)]
pub struct UsageRecord {
    pub id: String,
    pub customer_id: String,
    pub model: String,
    #[serde(default)]
    pub prompt_tokens: i64,
    #[serde(default)]
    pub completion_tokens: i64,
    #[serde(default)]
    pub total_tokens: i64,
    #[serde(default)]
    pub spend: f64,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    #[serde(default)]
    pub request_id: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
}

/// Mapping from a source customer to the external billing identities.
/// Owned by the provisioning process; read-only to the pipeline.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct CustomerMapping {
    pub source_customer_id: String,
    pub external_customer_id: String,
    pub external_org_id: String,
    pub plan_code: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Canonical billing event. Immutable once derived; the idempotency key is a
/// deterministic function of the source event, so re-deriving it after a
/// crash produces an indistinguishable event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BillingEvent {
    pub idempotency_key: String,
    pub external_customer_id: String,
    pub event_code: String,
    pub timestamp: DateTime<Utc>,
    pub properties: serde_json::Value,
}

// key: queue-status -> closed delivery state machine
/// A retry-eligible failure stays `pending` with `retry_count > 0`;
/// eligibility is derived from `retry_count` and `last_attempt_at` rather
/// than from a separate status value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "queue_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum QueueStatus {
    Pending,
    Completed,
    Dead,
}

/// Durable delivery-state row. All mutation goes through `QueueStore`.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct QueueEntry {
    pub id: Uuid,
    pub idempotency_key: String,
    pub external_customer_id: String,
    pub payload: serde_json::Value,
    pub status: QueueStatus,
    pub retry_count: i32,
    pub created_at: DateTime<Utc>,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
}

impl QueueEntry {
    pub fn billing_event(&self) -> Result<BillingEvent, serde_json::Error> {
        serde_json::from_value(self.payload.clone())
    }
}
