use axum::{
    routing::{get, post},
    Router,
};

use crate::{customers, ingress, status};

pub fn api_routes() -> Router {
    Router::new()
        .route("/webhook/usage", post(ingress::accept_usage))
        .route(
            "/api/customers/:source_customer_id",
            get(customers::get_mapping).put(customers::upsert_mapping),
        )
        .route("/api/queue/stats", get(status::queue_stats))
        .route("/health", get(status::health))
}
