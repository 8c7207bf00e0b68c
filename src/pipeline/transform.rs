use serde_json::json;
use sha2::{Digest, Sha256};

use super::models::{BillingEvent, CustomerMapping, UsageRecord};

// key: event-transformer -> canonical billing event derivation
/// Deterministic: the same record and mapping always produce the same
/// idempotency key and property bag, so a crash between transformation and
/// persistence is recovered by simply re-transforming the record.
pub fn transform(
    record: &UsageRecord,
    mapping: &CustomerMapping,
    source_prefix: &str,
    event_code: &str,
) -> BillingEvent {
    let duration_seconds = (record.end_time - record.start_time).num_seconds().max(0);
    let correlation_id = record.request_id.as_deref().unwrap_or(&record.id);

    let mut properties = json!({
        "model": record.model,
        "input_tokens": record.prompt_tokens,
        "output_tokens": record.completion_tokens,
        "total_tokens": record.total_tokens,
        "cost_usd": record.spend,
        "duration_seconds": duration_seconds,
        "source_customer_id": record.customer_id,
        "request_id": correlation_id,
    });
    if let Some(api_key) = record.api_key.as_deref() {
        properties["api_key_hash"] = json!(credential_hash(api_key));
    }

    BillingEvent {
        idempotency_key: idempotency_key(source_prefix, &record.id, record),
        external_customer_id: mapping.external_customer_id.clone(),
        event_code: event_code.to_string(),
        timestamp: record.start_time,
        properties,
    }
}

fn idempotency_key(prefix: &str, source_event_id: &str, record: &UsageRecord) -> String {
    format!(
        "{}_{}_{}",
        prefix,
        source_event_id,
        record.start_time.timestamp()
    )
}

/// Truncated one-way hash of a credential reference. The raw credential never
/// leaves the ingress boundary.
fn credential_hash(credential: &str) -> String {
    let digest = Sha256::digest(credential.as_bytes());
    hex::encode(digest)[..16].to_string()
}
