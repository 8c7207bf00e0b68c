use std::sync::Arc;

use axum::{body::Bytes, http::HeaderMap, http::StatusCode, Extension, Json};
use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::Sha256;
use tracing::warn;
use uuid::Uuid;

use crate::config;
use crate::error::{AppError, AppResult};
use crate::observability::DeliveryMetrics;
use crate::pipeline::{
    deliver_entry, transform, BillingClient, IdentityResolver, QueueStatus, QueueStore, UsageRecord,
};

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "x-webhook-signature";

#[derive(Debug, Serialize)]
pub struct AcceptedResponse {
    pub status: &'static str,
    pub entry_id: Uuid,
    pub idempotency_key: String,
    pub deduplicated: bool,
}

// key: ingress-receiver -> webhook acceptance path
/// Verify, validate, resolve, transform, enqueue. The inline delivery attempt
/// runs on a spawned task; acceptance is decided by the enqueue alone, so the
/// caller gets 202 regardless of the billing API being reachable.
pub async fn accept_usage(
    Extension(store): Extension<QueueStore>,
    Extension(resolver): Extension<IdentityResolver>,
    Extension(client): Extension<Arc<BillingClient>>,
    Extension(metrics): Extension<Arc<DeliveryMetrics>>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<(StatusCode, Json<AcceptedResponse>)> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok());
    if let Err(reason) = verify_signature(config::WEBHOOK_SECRET.as_deref(), &body, signature) {
        metrics.record_rejected_signature();
        warn!(reason, "rejected webhook with bad signature");
        return Err(AppError::Unauthorized);
    }

    let record: UsageRecord = serde_json::from_slice(&body).map_err(|err| {
        metrics.record_rejected_validation();
        AppError::BadRequest(format!("invalid usage record: {err}"))
    })?;
    if record.id.trim().is_empty() || record.customer_id.trim().is_empty() {
        metrics.record_rejected_validation();
        return Err(AppError::BadRequest(
            "usage record requires id and customer_id".to_string(),
        ));
    }

    let mapping = resolver
        .resolve(&record.customer_id)
        .await
        .map_err(|err| AppError::Message(err.to_string()))?;
    let Some(mapping) = mapping else {
        metrics.record_rejected_unmapped();
        warn!(
            source_customer_id = %record.customer_id,
            source_event_id = %record.id,
            "no active customer mapping, usage record dropped"
        );
        return Err(AppError::Unprocessable(format!(
            "no active customer mapping for {}",
            record.customer_id
        )));
    };

    let event = transform(
        &record,
        &mapping,
        &config::EVENT_SOURCE_PREFIX,
        &config::EVENT_CODE,
    );
    let outcome = store
        .enqueue(&event)
        .await
        .map_err(|err| AppError::Message(err.to_string()))?;
    metrics.record_accepted();

    spawn_inline_attempt(store, client, metrics, outcome.entry_id);

    Ok((
        StatusCode::ACCEPTED,
        Json(AcceptedResponse {
            status: "accepted",
            entry_id: outcome.entry_id,
            idempotency_key: event.idempotency_key,
            deduplicated: outcome.deduplicated,
        }),
    ))
}

/// Best-effort first delivery. Goes through the same `deliver_entry` path the
/// dispatcher uses; any failure here simply leaves the entry for the sweep.
fn spawn_inline_attempt(
    store: QueueStore,
    client: Arc<BillingClient>,
    metrics: Arc<DeliveryMetrics>,
    entry_id: Uuid,
) {
    let max_retries = *config::MAX_RETRIES;
    tokio::spawn(async move {
        let entry = match store.entry(entry_id).await {
            Ok(Some(entry)) if entry.status == QueueStatus::Pending => entry,
            Ok(_) => return,
            Err(err) => {
                warn!(?err, %entry_id, "failed to load entry for inline delivery");
                return;
            }
        };
        if let Err(err) = deliver_entry(&store, &client, &entry, max_retries, &metrics).await {
            warn!(?err, %entry_id, "inline delivery attempt errored");
        }
    });
}

/// Constant-time HMAC-SHA256 check of the raw body against the
/// `sha256=<hex>` signature header. With no configured secret every payload
/// passes; that fail-open state is logged once at startup.
pub fn verify_signature(
    secret: Option<&str>,
    body: &[u8],
    signature: Option<&str>,
) -> Result<(), &'static str> {
    let Some(secret) = secret else {
        return Ok(());
    };
    let Some(signature) = signature else {
        return Err("missing signature header");
    };
    let Some(hex_digest) = signature.strip_prefix("sha256=") else {
        return Err("malformed signature header");
    };
    let provided = hex::decode(hex_digest).map_err(|_| "malformed signature header")?;

    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| "unusable webhook secret")?;
    mac.update(body);
    mac.verify_slice(&provided).map_err(|_| "signature mismatch")
}

pub fn sign_payload(secret: &str, body: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("hmac accepts any key size");
    mac.update(body);
    format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_secret_accepts_any_signature() {
        assert!(verify_signature(None, b"payload", None).is_ok());
        assert!(verify_signature(None, b"payload", Some("sha256=deadbeef")).is_ok());
    }

    #[test]
    fn secret_requires_signature_header() {
        let err = verify_signature(Some("s3cret"), b"payload", None).unwrap_err();
        assert_eq!(err, "missing signature header");
    }

    #[test]
    fn valid_signature_passes() {
        let signature = sign_payload("s3cret", b"payload");
        assert!(verify_signature(Some("s3cret"), b"payload", Some(&signature)).is_ok());
    }

    #[test]
    fn tampered_body_is_rejected() {
        let signature = sign_payload("s3cret", b"payload");
        let err = verify_signature(Some("s3cret"), b"tampered", Some(&signature)).unwrap_err();
        assert_eq!(err, "signature mismatch");
    }

    #[test]
    fn malformed_header_is_rejected() {
        assert!(verify_signature(Some("s3cret"), b"payload", Some("not-hex")).is_err());
        assert!(verify_signature(Some("s3cret"), b"payload", Some("sha256=zzzz")).is_err());
    }
}
