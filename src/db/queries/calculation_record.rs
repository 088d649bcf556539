//! Calculation audit record queries
//!
//! Records are written once per completed calculation and never updated,
//! with one exception: the sales workflow may stamp `converted_at` later.

use anyhow::Result;
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

use crate::types::{CalculationRecord, NewCalculationRecord};

const RECORD_COLUMNS: &str = r#"
    id, business_id, config_id, config_version,
    input_address, input_postal_code, resolved_lat, resolved_lng,
    travel_minutes, distance_meters, travel_from_cache,
    matched_rule_id, in_service_area,
    service_breakdown, total_price, processing_time_ms,
    converted_at, created_at
"#;

/// Persist one completed calculation
pub async fn insert_record(pool: &PgPool, rec: &NewCalculationRecord) -> Result<CalculationRecord> {
    let record = sqlx::query_as::<_, CalculationRecord>(&format!(
        r#"
        INSERT INTO calculation_records (
            business_id, config_id, config_version,
            input_address, input_postal_code, resolved_lat, resolved_lng,
            travel_minutes, distance_meters, travel_from_cache,
            matched_rule_id, in_service_area,
            service_breakdown, total_price, processing_time_ms
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
        RETURNING {RECORD_COLUMNS}
        "#
    ))
    .bind(rec.business_id)
    .bind(rec.config_id)
    .bind(rec.config_version)
    .bind(&rec.input_address)
    .bind(&rec.input_postal_code)
    .bind(rec.resolved_coordinates.map(|c| c.lat))
    .bind(rec.resolved_coordinates.map(|c| c.lng))
    .bind(rec.travel_minutes)
    .bind(rec.distance_meters)
    .bind(rec.travel_from_cache)
    .bind(&rec.matched_rule_id)
    .bind(rec.in_service_area)
    .bind(Json(&rec.service_breakdown))
    .bind(rec.total_price)
    .bind(rec.processing_time_ms)
    .fetch_one(pool)
    .await?;

    Ok(record)
}

/// List calculation records for a business, newest first
pub async fn list_records(
    pool: &PgPool,
    business_id: Uuid,
    limit: i64,
    offset: i64,
) -> Result<(Vec<CalculationRecord>, i64)> {
    let records = sqlx::query_as::<_, CalculationRecord>(&format!(
        r#"
        SELECT {RECORD_COLUMNS}
        FROM calculation_records
        WHERE business_id = $1
        ORDER BY created_at DESC
        LIMIT $2 OFFSET $3
        "#
    ))
    .bind(business_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?;

    let (total,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM calculation_records WHERE business_id = $1")
            .bind(business_id)
            .fetch_one(pool)
            .await?;

    Ok((records, total))
}

/// Stamp a record as converted to a sale. Idempotent: the first timestamp
/// wins, later calls return the row unchanged.
pub async fn mark_converted(
    pool: &PgPool,
    business_id: Uuid,
    calculation_id: Uuid,
) -> Result<Option<CalculationRecord>> {
    let record = sqlx::query_as::<_, CalculationRecord>(&format!(
        r#"
        UPDATE calculation_records
        SET converted_at = COALESCE(converted_at, NOW())
        WHERE id = $1 AND business_id = $2
        RETURNING {RECORD_COLUMNS}
        "#
    ))
    .bind(calculation_id)
    .bind(business_id)
    .fetch_optional(pool)
    .await?;

    Ok(record)
}
