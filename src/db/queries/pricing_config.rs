//! Pricing configuration queries
//!
//! Configs are an append-only version history per business. Creating a new
//! version deactivates the previous one inside a single transaction, guarded
//! by a per-business advisory lock so concurrent creates serialize instead
//! of racing on the version number.

use anyhow::Result;
use chrono::Utc;
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

use crate::types::{CreateConfigRequest, PricingConfig};

const CONFIG_COLUMNS: &str = r#"
    id, business_id, version, effective_date, expiry_date, is_active,
    origin_lat, origin_lng,
    base_rate_per_1000_units, currency, minimum_charge,
    policy, service_rules, created_at
"#;

/// Get the config currently in effect for a business.
///
/// Active is resolved by the effective/expiry window on top of the
/// `is_active` flag; the version sort is a tie-break in case historical
/// data ever holds two active rows.
pub async fn get_active_config(pool: &PgPool, business_id: Uuid) -> Result<Option<PricingConfig>> {
    let config = sqlx::query_as::<_, PricingConfig>(&format!(
        r#"
        SELECT {CONFIG_COLUMNS}
        FROM pricing_configs
        WHERE business_id = $1
          AND is_active = true
          AND effective_date <= $2
          AND (expiry_date IS NULL OR expiry_date > $2)
        ORDER BY version DESC
        LIMIT 1
        "#
    ))
    .bind(business_id)
    .bind(Utc::now())
    .fetch_optional(pool)
    .await?;

    Ok(config)
}

/// Create the next config version and deactivate the current one.
///
/// Existing versions are never mutated beyond the `is_active` flag; the
/// history stays intact for calculation-record auditability.
pub async fn create_config(
    pool: &PgPool,
    business_id: Uuid,
    req: &CreateConfigRequest,
) -> Result<PricingConfig> {
    let mut tx = pool.begin().await?;

    // Serialize concurrent creates for the same business
    sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1::text, 0))")
        .bind(business_id)
        .execute(&mut *tx)
        .await?;

    let (next_version,): (i32,) = sqlx::query_as(
        "SELECT COALESCE(MAX(version), 0) + 1 FROM pricing_configs WHERE business_id = $1",
    )
    .bind(business_id)
    .fetch_one(&mut *tx)
    .await?;

    sqlx::query(
        "UPDATE pricing_configs SET is_active = false WHERE business_id = $1 AND is_active = true",
    )
    .bind(business_id)
    .execute(&mut *tx)
    .await?;

    let config = sqlx::query_as::<_, PricingConfig>(&format!(
        r#"
        INSERT INTO pricing_configs (
            business_id, version, effective_date, expiry_date, is_active,
            origin_lat, origin_lng,
            base_rate_per_1000_units, currency, minimum_charge,
            policy, service_rules
        )
        VALUES ($1, $2, $3, $4, true, $5, $6, $7, $8, $9, $10, $11)
        RETURNING {CONFIG_COLUMNS}
        "#
    ))
    .bind(business_id)
    .bind(next_version)
    .bind(req.effective_date.unwrap_or_else(Utc::now))
    .bind(req.expiry_date)
    .bind(req.origin.map(|c| c.lat))
    .bind(req.origin.map(|c| c.lng))
    .bind(req.base_rate_per_1000_units)
    .bind(&req.currency)
    .bind(req.minimum_charge)
    .bind(Json(&req.policy))
    .bind(Json(&req.service_rules))
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;

    Ok(config)
}

/// List all config versions for a business, newest first
pub async fn list_configs(
    pool: &PgPool,
    business_id: Uuid,
    limit: i64,
    offset: i64,
) -> Result<(Vec<PricingConfig>, i64)> {
    let configs = sqlx::query_as::<_, PricingConfig>(&format!(
        r#"
        SELECT {CONFIG_COLUMNS}
        FROM pricing_configs
        WHERE business_id = $1
        ORDER BY version DESC
        LIMIT $2 OFFSET $3
        "#
    ))
    .bind(business_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?;

    let (total,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM pricing_configs WHERE business_id = $1")
            .bind(business_id)
            .fetch_one(pool)
            .await?;

    Ok((configs, total))
}
