//! Zone and postal-rule matching
//!
//! Pure functions: (travel minutes or postal code, policy) → matched rule or
//! out-of-service. No clocks and no I/O; the orchestrator supplies the inputs.

use rust_decimal::Decimal;

use crate::types::{
    Adjustment, DefaultPostalRule, ExactPostalRule, PatternPostalRule, ServiceRule, Zone,
};

/// The zone or rule a location landed in
#[derive(Debug, Clone, PartialEq)]
pub struct MatchedRule {
    pub id: String,
    pub name: String,
    pub adjustment: Adjustment,
    /// When set, services not listed are unavailable here
    pub available_services: Option<Vec<String>>,
    /// True when more than one zone matched (overlapping config) and the
    /// lowest-priority tie-break was applied. Handlers log this.
    pub malformed_config: bool,
}

/// Outcome of matching one location against a policy
#[derive(Debug, Clone, PartialEq)]
pub enum ZoneMatch {
    Matched(MatchedRule),
    OutOfService,
}

/// Uppercase and strip all whitespace, so "M5V 3A8" and "M5V3A8" compare equal
pub fn normalize_postal_code(code: &str) -> String {
    code.chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_uppercase()
}

/// Match a travel time against ordered zones.
///
/// Bands are half-open: [min, max). A well-formed config matches exactly one
/// zone; if a malformed config matches several, the zone with the lowest
/// `priority` value wins and the result is flagged.
pub fn match_travel_time(zones: &[Zone], travel_minutes: f64) -> ZoneMatch {
    let mut matches: Vec<&Zone> = zones.iter().filter(|z| z.contains(travel_minutes)).collect();

    match matches.len() {
        0 => ZoneMatch::OutOfService,
        1 => ZoneMatch::Matched(to_matched(matches[0], false)),
        _ => {
            matches.sort_by_key(|z| z.priority);
            ZoneMatch::Matched(to_matched(matches[0], true))
        }
    }
}

fn to_matched(zone: &Zone, malformed: bool) -> MatchedRule {
    MatchedRule {
        id: zone.id.clone(),
        name: zone.name.clone(),
        adjustment: zone.adjustment,
        available_services: zone.available_services.clone(),
        malformed_config: malformed,
    }
}

/// Match a postal code against the rule set.
///
/// Precedence: exact code > highest-priority matching prefix pattern >
/// default rule > out of service. The input and stored codes are both
/// normalized before comparison.
pub fn match_postal_code(
    exact: &[ExactPostalRule],
    patterns: &[PatternPostalRule],
    default_rule: Option<&DefaultPostalRule>,
    postal_code: &str,
) -> ZoneMatch {
    let code = normalize_postal_code(postal_code);

    if let Some(rule) = exact.iter().find(|r| normalize_postal_code(&r.code) == code) {
        return ZoneMatch::Matched(MatchedRule {
            id: rule.id.clone(),
            name: rule.name.clone(),
            adjustment: rule.adjustment,
            available_services: rule.available_services.clone(),
            malformed_config: false,
        });
    }

    let best_pattern = patterns
        .iter()
        .filter(|r| code.starts_with(&normalize_postal_code(&r.prefix)))
        .max_by_key(|r| r.priority);

    if let Some(rule) = best_pattern {
        return ZoneMatch::Matched(MatchedRule {
            id: rule.id.clone(),
            name: rule.name.clone(),
            adjustment: rule.adjustment,
            available_services: rule.available_services.clone(),
            malformed_config: false,
        });
    }

    if let Some(rule) = default_rule {
        return ZoneMatch::Matched(MatchedRule {
            id: rule.id.clone(),
            name: rule.name.clone(),
            adjustment: rule.adjustment,
            available_services: rule.available_services.clone(),
            malformed_config: false,
        });
    }

    ZoneMatch::OutOfService
}

/// Evaluate one service against the matched rule.
///
/// Returns whether the service is offered there and the additional fee
/// percentage from its `ServiceRule` (zero when no rule exists).
pub fn service_availability(
    rule: &MatchedRule,
    service_rules: &[ServiceRule],
    service_type: &str,
) -> (bool, Decimal) {
    if let Some(ref allowed) = rule.available_services {
        if !allowed.iter().any(|s| s == service_type) {
            return (false, Decimal::ZERO);
        }
    }

    match service_rules.iter().find(|r| r.service_type == service_type) {
        Some(service_rule) => {
            let offered = service_rule
                .zone_ids
                .as_ref()
                .map_or(true, |ids| ids.iter().any(|id| *id == rule.id));
            if offered {
                (true, service_rule.additional_fee_percentage)
            } else {
                (false, Decimal::ZERO)
            }
        }
        None => (true, Decimal::ZERO),
    }
}
