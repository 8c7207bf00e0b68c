use axum::{extract::Path, http::HeaderMap, Extension, Json};
use serde::Deserialize;
use sqlx::PgPool;
use subtle::ConstantTimeEq;

use crate::config;
use crate::error::{AppError, AppResult};
use crate::pipeline::{CustomerMapping, IdentityResolver};

// key: customer-admin -> mapping read/upsert endpoints
//
// Owned by the provisioning side of the house; the pipeline itself only
// reads mappings through the resolver.

#[derive(Debug, Deserialize)]
pub struct UpsertMappingRequest {
    pub external_customer_id: String,
    pub external_org_id: String,
    #[serde(default)]
    pub plan_code: Option<String>,
    #[serde(default)]
    pub is_active: Option<bool>,
}

pub async fn get_mapping(
    Extension(pool): Extension<PgPool>,
    Path(source_customer_id): Path<String>,
    headers: HeaderMap,
) -> AppResult<Json<CustomerMapping>> {
    require_admin(&headers)?;

    let mapping = sqlx::query_as::<_, CustomerMapping>(
        "SELECT * FROM customer_mappings WHERE source_customer_id = $1",
    )
    .bind(&source_customer_id)
    .fetch_optional(&pool)
    .await?;

    mapping.map(Json).ok_or(AppError::NotFound)
}

pub async fn upsert_mapping(
    Extension(pool): Extension<PgPool>,
    Extension(resolver): Extension<IdentityResolver>,
    Path(source_customer_id): Path<String>,
    headers: HeaderMap,
    Json(payload): Json<UpsertMappingRequest>,
) -> AppResult<Json<CustomerMapping>> {
    require_admin(&headers)?;

    if payload.external_customer_id.trim().is_empty() || payload.external_org_id.trim().is_empty()
    {
        return Err(AppError::BadRequest(
            "external_customer_id and external_org_id are required".to_string(),
        ));
    }

    let mapping = sqlx::query_as::<_, CustomerMapping>(
        r#"
        INSERT INTO customer_mappings
            (source_customer_id, external_customer_id, external_org_id, plan_code, is_active)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (source_customer_id) DO UPDATE SET
            external_customer_id = EXCLUDED.external_customer_id,
            external_org_id = EXCLUDED.external_org_id,
            plan_code = EXCLUDED.plan_code,
            is_active = EXCLUDED.is_active,
            updated_at = NOW()
        RETURNING *
        "#,
    )
    .bind(&source_customer_id)
    .bind(&payload.external_customer_id)
    .bind(&payload.external_org_id)
    .bind(payload.plan_code.as_deref().unwrap_or("ai_basic"))
    .bind(payload.is_active.unwrap_or(true))
    .fetch_one(&pool)
    .await?;

    // A cached mapping would otherwise serve stale identities until restart.
    resolver.invalidate(&source_customer_id);

    Ok(Json(mapping))
}

/// Bearer-token gate for the administrative surface. Fails closed when no
/// token is configured.
fn require_admin(headers: &HeaderMap) -> AppResult<()> {
    let Some(expected) = config::ADMIN_API_TOKEN.as_deref() else {
        return Err(AppError::Unauthorized);
    };
    let presented = headers
        .get("authorization")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or(AppError::Unauthorized)?;

    if bool::from(presented.as_bytes().ct_eq(expected.as_bytes())) {
        Ok(())
    } else {
        Err(AppError::Unauthorized)
    }
}
