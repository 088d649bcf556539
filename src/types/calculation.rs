//! Calculation request/response and audit record types

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;

use super::geo::Coordinates;
use super::pricing_config::AdjustmentType;

/// One requested service
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceInput {
    #[serde(rename = "type")]
    pub service_type: String,
    /// Area covered by this service, in area units
    pub area: Decimal,
    /// Overrides the config base rate for this service when set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_rate: Option<Decimal>,
}

/// Calculation options
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalculateOptions {
    #[serde(default = "default_true")]
    pub use_cache: bool,
    #[serde(default)]
    pub traffic_model: Option<String>,
    /// Persist the audit record (on by default)
    #[serde(default = "default_true")]
    pub persist_record: bool,
}

fn default_true() -> bool {
    true
}

impl Default for CalculateOptions {
    fn default() -> Self {
        Self {
            use_cache: true,
            traffic_model: None,
            persist_record: true,
        }
    }
}

/// Price calculation request
///
/// Exactly one of `address` / `coordinates` locates the customer for
/// travel-time configs; postal-rule configs require `postal_code`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalculateRequest {
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub coordinates: Option<Coordinates>,
    #[serde(default)]
    pub postal_code: Option<String>,
    pub property_size_area_units: Decimal,
    #[serde(default)]
    pub services: Vec<ServiceInput>,
    #[serde(default)]
    pub options: CalculateOptions,
}

/// The zone or postal rule a calculation landed in
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleSummary {
    pub id: String,
    pub name: String,
    pub adjustment_type: AdjustmentType,
    pub adjustment_value: Decimal,
}

/// Travel-time data echoed in the response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TravelTimeInfo {
    pub minutes: f64,
    pub distance_meters: u64,
    pub from_cache: bool,
}

/// Priced line item for one service
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceQuote {
    #[serde(rename = "type")]
    pub service_type: String,
    pub base_rate: Decimal,
    pub adjusted_rate: Decimal,
    pub area: Decimal,
    pub total_price: Decimal,
    pub available: bool,
}

/// Price calculation response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalculateResponse {
    pub success: bool,
    pub in_service_area: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched_zone_or_rule: Option<RuleSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub travel_time: Option<TravelTimeInfo>,
    pub services: Vec<ServiceQuote>,
    pub currency: String,
    /// Set when the audit record was persisted
    #[serde(skip_serializing_if = "Option::is_none")]
    pub calculation_id: Option<Uuid>,
}

/// Per-service availability flag (no pricing)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceAvailability {
    #[serde(rename = "type")]
    pub service_type: String,
    pub available: bool,
}

/// Availability-check response: the calculate contract minus pricing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilityResponse {
    pub success: bool,
    pub in_service_area: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched_zone_or_rule: Option<RuleSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub travel_time: Option<TravelTimeInfo>,
    pub services: Vec<ServiceAvailability>,
}

/// Persisted audit record for one completed calculation
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct CalculationRecord {
    pub id: Uuid,
    pub business_id: Uuid,
    pub config_id: Uuid,
    pub config_version: i32,
    pub input_address: Option<String>,
    pub input_postal_code: Option<String>,
    pub resolved_lat: Option<f64>,
    pub resolved_lng: Option<f64>,
    pub travel_minutes: Option<f64>,
    pub distance_meters: Option<i64>,
    pub travel_from_cache: Option<bool>,
    pub matched_rule_id: Option<String>,
    pub in_service_area: bool,
    pub service_breakdown: Json<Vec<ServiceQuote>>,
    pub total_price: Option<Decimal>,
    pub processing_time_ms: i64,
    /// Set once by the sales workflow; records are otherwise immutable
    pub converted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Record contents produced by the engine, before persistence assigns an id
#[derive(Debug, Clone)]
pub struct NewCalculationRecord {
    pub business_id: Uuid,
    pub config_id: Uuid,
    pub config_version: i32,
    pub input_address: Option<String>,
    pub input_postal_code: Option<String>,
    pub resolved_coordinates: Option<Coordinates>,
    pub travel_minutes: Option<f64>,
    pub distance_meters: Option<i64>,
    pub travel_from_cache: Option<bool>,
    pub matched_rule_id: Option<String>,
    pub in_service_area: bool,
    pub service_breakdown: Vec<ServiceQuote>,
    pub total_price: Option<Decimal>,
    pub processing_time_ms: i64,
}

/// Mark-converted request
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConvertCalculationRequest {
    pub calculation_id: Uuid,
}
