use std::sync::Arc;

use anyhow::Result;
use dashmap::DashMap;
use sqlx::PgPool;

use super::models::CustomerMapping;

// key: identity-resolver -> source customer to billing identity
/// Pure lookup with a read-through cache. Only active mappings resolve; a
/// miss is not an error, it marks the record as non-billable under current
/// configuration.
#[derive(Clone)]
pub struct IdentityResolver {
    pool: PgPool,
    cache: Arc<DashMap<String, CustomerMapping>>,
}

impl IdentityResolver {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            cache: Arc::new(DashMap::new()),
        }
    }

    pub async fn resolve(&self, source_customer_id: &str) -> Result<Option<CustomerMapping>> {
        if let Some(mapping) = self.cache.get(source_customer_id) {
            return Ok(Some(mapping.clone()));
        }

        let mapping = sqlx::query_as::<_, CustomerMapping>(
            "SELECT * FROM customer_mappings WHERE source_customer_id = $1 AND is_active = TRUE",
        )
        .bind(source_customer_id)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(mapping) = &mapping {
            self.cache
                .insert(source_customer_id.to_string(), mapping.clone());
        }

        Ok(mapping)
    }

    /// Called by the administrative upsert so a changed or deactivated
    /// mapping takes effect without a restart.
    pub fn invalidate(&self, source_customer_id: &str) {
        self.cache.remove(source_customer_id);
    }
}
