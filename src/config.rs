use once_cell::sync::Lazy;

/// Address the HTTP server should bind to. Defaults to `0.0.0.0`.
pub static BIND_ADDRESS: Lazy<String> =
    Lazy::new(|| std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0".to_string()));

/// Port the HTTP server should listen on. Defaults to `8080`.
pub static BIND_PORT: Lazy<u16> = Lazy::new(|| {
    std::env::var("BIND_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(8080)
});

/// When set to a truthy value, allows the application to continue running even if database
/// migrations fail. Defaults to `false`.
pub static ALLOW_MIGRATION_FAILURE: Lazy<bool> = Lazy::new(|| {
    std::env::var("ALLOW_MIGRATION_FAILURE")
        .ok()
        .map(|value| {
            let normalized = value.trim().to_ascii_lowercase();
            matches!(normalized.as_str(), "1" | "true" | "yes")
        })
        .unwrap_or(false)
});

/// Base URL of the external billing API.
pub static BILLING_API_URL: Lazy<String> = Lazy::new(|| {
    std::env::var("BILLING_API_URL")
        .ok()
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| "http://localhost:3000".to_string())
});

/// Optional bearer token presented to the billing API.
pub static BILLING_API_KEY: Lazy<Option<String>> =
    Lazy::new(|| read_optional_env("BILLING_API_KEY"));

/// Shared secret for inbound webhook signatures. When unset, signature
/// verification is disabled and every payload is accepted.
pub static WEBHOOK_SECRET: Lazy<Option<String>> = Lazy::new(|| read_optional_env("WEBHOOK_SECRET"));

/// Shared credential gating the administrative customer-mapping endpoints.
/// When unset, those endpoints reject every request.
pub static ADMIN_API_TOKEN: Lazy<Option<String>> =
    Lazy::new(|| read_optional_env("ADMIN_API_TOKEN"));

// key: delivery-config -> retry budget per queue entry
pub static MAX_RETRIES: Lazy<i32> = Lazy::new(|| {
    std::env::var("MAX_RETRIES")
        .ok()
        .and_then(|value| value.parse::<i32>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(3)
});

// key: delivery-config -> sweep cadence and retry backoff window
pub static RETRY_DELAY_SECS: Lazy<u64> = Lazy::new(|| {
    std::env::var("RETRY_DELAY_SECS")
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .unwrap_or(60)
});

// key: delivery-config -> entries claimed per dispatcher cycle
pub static BATCH_SIZE: Lazy<i64> = Lazy::new(|| {
    std::env::var("BATCH_SIZE")
        .ok()
        .and_then(|value| value.parse::<i64>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(100)
});

// key: delivery-config -> in-flight billing calls per cycle
pub static WORKER_CONCURRENCY: Lazy<usize> = Lazy::new(|| {
    std::env::var("WORKER_CONCURRENCY")
        .ok()
        .and_then(|value| value.parse::<usize>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(10)
});

/// Hard timeout for one billing API call, in seconds.
pub static DELIVERY_TIMEOUT_SECS: Lazy<u64> = Lazy::new(|| {
    std::env::var("DELIVERY_TIMEOUT_SECS")
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(30)
});

/// Prefix baked into every idempotency key, identifying the metering source.
pub static EVENT_SOURCE_PREFIX: Lazy<String> = Lazy::new(|| {
    std::env::var("EVENT_SOURCE_PREFIX")
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| "metering".to_string())
});

/// Billing event code attached to every converted usage record.
pub static EVENT_CODE: Lazy<String> = Lazy::new(|| {
    std::env::var("EVENT_CODE")
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| "ai_usage".to_string())
});

/// Look-back window for the queue stats endpoint, in hours.
pub static STATS_WINDOW_HOURS: Lazy<i32> = Lazy::new(|| {
    std::env::var("STATS_WINDOW_HOURS")
        .ok()
        .and_then(|value| value.parse::<i32>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(24)
});

fn read_optional_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
