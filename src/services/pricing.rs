//! Per-service price computation
//!
//! All arithmetic is exact `Decimal`; results are rounded half-up to two
//! decimal places only when the quote is assembled, never mid-computation.

use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;

use super::zones::MatchedRule;
use crate::types::{Adjustment, AdjustmentType, ServiceInput, ServiceQuote, ServiceRule};

const HUNDRED: Decimal = dec!(100);
const RATE_UNIT: Decimal = dec!(1000);

/// Round a money amount half-up to 2 decimal places
pub fn round_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Apply a zone/rule adjustment to a rate per 1,000 area units
fn apply_adjustment(rate: Decimal, adjustment: &Adjustment) -> Decimal {
    match adjustment.adjustment_type {
        AdjustmentType::Fixed => rate + adjustment.value,
        AdjustmentType::Percentage => rate * (Decimal::ONE + adjustment.value / HUNDRED),
    }
}

/// Price one service inside a matched zone or postal rule.
///
/// The rate pipeline is: base rate (or the service's custom rate), then the
/// zone adjustment, then the service's additional fee percentage compounded
/// on top. Raw price is area/1000 × adjusted rate, floored at the config's
/// minimum charge.
pub fn price_service(
    service: &ServiceInput,
    rule: &MatchedRule,
    service_rules: &[ServiceRule],
    base_rate_per_1000_units: Decimal,
    minimum_charge: Decimal,
) -> ServiceQuote {
    let (available, additional_fee_pct) =
        super::zones::service_availability(rule, service_rules, &service.service_type);

    let base_rate = service.custom_rate.unwrap_or(base_rate_per_1000_units);

    if !available {
        return ServiceQuote {
            service_type: service.service_type.clone(),
            base_rate: round_money(base_rate),
            adjusted_rate: Decimal::ZERO,
            area: service.area,
            total_price: Decimal::ZERO,
            available: false,
        };
    }

    let mut adjusted_rate = apply_adjustment(base_rate, &rule.adjustment);
    if !additional_fee_pct.is_zero() {
        adjusted_rate *= Decimal::ONE + additional_fee_pct / HUNDRED;
    }
    // A large negative percentage must not produce a negative rate
    if adjusted_rate < Decimal::ZERO {
        adjusted_rate = Decimal::ZERO;
    }

    let raw_price = service.area / RATE_UNIT * adjusted_rate;
    let total_price = raw_price.max(minimum_charge);

    ServiceQuote {
        service_type: service.service_type.clone(),
        base_rate: round_money(base_rate),
        adjusted_rate: round_money(adjusted_rate),
        area: service.area,
        total_price: round_money(total_price),
        available: true,
    }
}
