//! Pricing configuration types
//!
//! A business has an append-only history of `PricingConfig` versions; at most
//! one version is active at any instant. Each version carries either a list
//! of travel-time zones or a set of postal-code rules, never both; the
//! `PricingPolicy` enum keeps the two shapes statically distinct.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;

/// How a zone or rule adjusts the base rate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdjustmentType {
    /// Flat currency delta added to the rate per 1,000 area units
    Fixed,
    /// Multiplies the rate by (1 + value/100)
    Percentage,
}

/// A signed rate adjustment
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Adjustment {
    pub adjustment_type: AdjustmentType,
    pub value: Decimal,
}

/// Travel-time zone: a half-open band [min, max) in driving minutes
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Zone {
    pub id: String,
    pub name: String,
    pub min_travel_minutes: f64,
    /// None = unbounded; only permitted on the last zone
    pub max_travel_minutes: Option<f64>,
    pub adjustment: Adjustment,
    /// Lower value is applied first when a malformed config matches twice
    pub priority: i32,
    /// When set, services not listed here are unavailable in this zone
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub available_services: Option<Vec<String>>,
}

impl Zone {
    /// Half-open containment: min <= t, and t < max when max is bounded
    pub fn contains(&self, travel_minutes: f64) -> bool {
        travel_minutes >= self.min_travel_minutes
            && self
                .max_travel_minutes
                .map_or(true, |max| travel_minutes < max)
    }
}

/// Exact postal-code rule; outranks every pattern rule
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExactPostalRule {
    pub id: String,
    pub name: String,
    /// Stored normalized (uppercase, no whitespace)
    pub code: String,
    pub adjustment: Adjustment,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub available_services: Option<Vec<String>>,
}

/// Region-pattern rule matched by normalized postal-code prefix
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatternPostalRule {
    pub id: String,
    pub name: String,
    pub prefix: String,
    pub adjustment: Adjustment,
    /// Higher value wins among matching patterns
    pub priority: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub available_services: Option<Vec<String>>,
}

/// Fallback applied when neither exact codes nor patterns match
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DefaultPostalRule {
    pub id: String,
    pub name: String,
    pub adjustment: Adjustment,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub available_services: Option<Vec<String>>,
}

/// Zone-matching policy: travel-time zones or postal-code rules
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PricingPolicy {
    TravelTimeZones {
        zones: Vec<Zone>,
    },
    PostalRules {
        #[serde(default)]
        exact: Vec<ExactPostalRule>,
        #[serde(default)]
        patterns: Vec<PatternPostalRule>,
        #[serde(default)]
        default_rule: Option<DefaultPostalRule>,
    },
}

impl PricingPolicy {
    /// Validate the shape invariants enforced at config-creation time.
    ///
    /// Travel-time zones must be sorted ascending, non-overlapping and
    /// contiguous, with an unbounded upper bound permitted only on the last
    /// zone. Postal rules must have non-empty codes/prefixes.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            PricingPolicy::TravelTimeZones { zones } => {
                for pair in zones.windows(2) {
                    let (a, b) = (&pair[0], &pair[1]);
                    let a_max = a
                        .max_travel_minutes
                        .ok_or_else(|| format!("zone '{}' is unbounded but not last", a.id))?;
                    if a_max <= a.min_travel_minutes {
                        return Err(format!("zone '{}' has max <= min", a.id));
                    }
                    if b.min_travel_minutes != a_max {
                        return Err(format!(
                            "zones '{}' and '{}' are not contiguous ({} vs {})",
                            a.id, b.id, a_max, b.min_travel_minutes
                        ));
                    }
                }
                if let Some(last) = zones.last() {
                    if let Some(max) = last.max_travel_minutes {
                        if max <= last.min_travel_minutes {
                            return Err(format!("zone '{}' has max <= min", last.id));
                        }
                    }
                }
                Ok(())
            }
            PricingPolicy::PostalRules {
                exact, patterns, ..
            } => {
                if let Some(rule) = exact.iter().find(|r| r.code.trim().is_empty()) {
                    return Err(format!("postal rule '{}' has an empty code", rule.id));
                }
                if let Some(rule) = patterns.iter().find(|r| r.prefix.trim().is_empty()) {
                    return Err(format!("pattern rule '{}' has an empty prefix", rule.id));
                }
                Ok(())
            }
        }
    }
}

/// Per-service offering rule layered on top of the zone adjustment
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceRule {
    pub service_type: String,
    /// Zone/rule ids where the service is offered; None = everywhere
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zone_ids: Option<Vec<String>>,
    /// Compounded multiplicatively after the zone percentage
    #[serde(default)]
    pub additional_fee_percentage: Decimal,
}

/// One version of a business's pricing configuration
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct PricingConfig {
    pub id: Uuid,
    pub business_id: Uuid,
    pub version: i32,
    pub effective_date: DateTime<Utc>,
    pub expiry_date: Option<DateTime<Utc>>,
    pub is_active: bool,
    /// Business base location; travel times are measured from here.
    /// Required for travel-time-zone policies, unused for postal rules.
    pub origin_lat: Option<f64>,
    pub origin_lng: Option<f64>,
    pub base_rate_per_1000_units: Decimal,
    pub currency: String,
    pub minimum_charge: Decimal,
    pub policy: Json<PricingPolicy>,
    pub service_rules: Json<Vec<ServiceRule>>,
    pub created_at: DateTime<Utc>,
}

impl PricingConfig {
    pub fn origin(&self) -> Option<crate::types::Coordinates> {
        match (self.origin_lat, self.origin_lng) {
            (Some(lat), Some(lng)) => Some(crate::types::Coordinates { lat, lng }),
            _ => None,
        }
    }
}

/// Create request; a new version deactivates the prior one
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateConfigRequest {
    /// Defaults to now
    #[serde(default)]
    pub effective_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub expiry_date: Option<DateTime<Utc>>,
    /// Required when the policy is travel-time zones
    #[serde(default)]
    pub origin: Option<crate::types::Coordinates>,
    pub base_rate_per_1000_units: Decimal,
    pub currency: String,
    pub minimum_charge: Decimal,
    pub policy: PricingPolicy,
    #[serde(default)]
    pub service_rules: Vec<ServiceRule>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn pct(value: Decimal) -> Adjustment {
        Adjustment {
            adjustment_type: AdjustmentType::Percentage,
            value,
        }
    }

    fn zone(id: &str, min: f64, max: Option<f64>) -> Zone {
        Zone {
            id: id.to_string(),
            name: id.to_string(),
            min_travel_minutes: min,
            max_travel_minutes: max,
            adjustment: pct(dec!(0)),
            priority: 0,
            available_services: None,
        }
    }

    #[test]
    fn zone_contains_is_half_open() {
        let z = zone("a", 10.0, Some(60.0));
        assert!(!z.contains(9.99));
        assert!(z.contains(10.0));
        assert!(z.contains(59.99));
        assert!(!z.contains(60.0));
    }

    #[test]
    fn unbounded_zone_contains_any_tail_value() {
        let z = zone("far", 60.0, None);
        assert!(z.contains(60.0));
        assert!(z.contains(10_000.0));
    }

    #[test]
    fn validate_accepts_contiguous_zones() {
        let policy = PricingPolicy::TravelTimeZones {
            zones: vec![
                zone("a", 0.0, Some(10.0)),
                zone("b", 10.0, Some(60.0)),
                zone("c", 60.0, None),
            ],
        };
        assert!(policy.validate().is_ok());
    }

    #[test]
    fn validate_rejects_gap() {
        let policy = PricingPolicy::TravelTimeZones {
            zones: vec![zone("a", 0.0, Some(10.0)), zone("b", 15.0, Some(60.0))],
        };
        assert!(policy.validate().is_err());
    }

    #[test]
    fn validate_rejects_overlap() {
        let policy = PricingPolicy::TravelTimeZones {
            zones: vec![zone("a", 0.0, Some(20.0)), zone("b", 10.0, Some(60.0))],
        };
        assert!(policy.validate().is_err());
    }

    #[test]
    fn validate_rejects_unbounded_zone_that_is_not_last() {
        let policy = PricingPolicy::TravelTimeZones {
            zones: vec![zone("a", 0.0, None), zone("b", 10.0, Some(60.0))],
        };
        assert!(policy.validate().is_err());
    }

    #[test]
    fn validate_rejects_empty_postal_code() {
        let policy = PricingPolicy::PostalRules {
            exact: vec![ExactPostalRule {
                id: "r1".to_string(),
                name: "Downtown".to_string(),
                code: "  ".to_string(),
                adjustment: pct(dec!(0)),
                available_services: None,
            }],
            patterns: vec![],
            default_rule: None,
        };
        assert!(policy.validate().is_err());
    }

    #[test]
    fn policy_round_trips_through_tagged_json() {
        let policy = PricingPolicy::TravelTimeZones {
            zones: vec![zone("a", 0.0, Some(30.0)), zone("b", 30.0, None)],
        };
        let json = serde_json::to_value(&policy).unwrap();
        assert_eq!(json["kind"], "travel_time_zones");
        let back: PricingPolicy = serde_json::from_value(json).unwrap();
        assert!(matches!(back, PricingPolicy::TravelTimeZones { ref zones } if zones.len() == 2));
    }
}
