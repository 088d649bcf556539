//! Geopricing engine
//!
//! Composes geocoding, travel-time lookup, the shared cache, zone matching
//! and pricing into one request/response cycle. The engine is transport
//! agnostic: handlers feed it the active config and the parsed request, and
//! decide themselves whether to persist the record it produces.
//!
//! Failures are request-scoped. A geocoder or routing fault fails this one
//! calculation and nothing else.

use std::sync::Arc;
use std::time::Instant;

use rust_decimal::Decimal;
use thiserror::Error;
use tracing::{debug, warn};

use super::cache::{RouteKey, TravelTimeCache};
use super::geocoding::Geocoder;
use super::pricing::{price_service, round_money};
use super::routing::{TravelTime, TravelTimeProvider};
use super::zones::{self, MatchedRule, ZoneMatch};
use crate::types::{
    AvailabilityResponse, CalculateRequest, CalculateResponse, Coordinates, NewCalculationRecord,
    PricingConfig, PricingPolicy, RuleSummary, ServiceAvailability, ServiceQuote, TravelTimeInfo,
};

/// Request-scoped engine failures, each mapped to a stable error code
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("request must supply an address or coordinates")]
    MissingLocation,
    #[error("the active pricing configuration requires a postal code")]
    MissingPostalCode,
    #[error("address could not be resolved: {0}")]
    GeocodeFailed(String),
    #[error("travel time lookup failed: {0}")]
    RoutingFailed(String),
    #[error("pricing configuration is unusable: {0}")]
    ConfigInvalid(String),
}

impl EngineError {
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::MissingLocation | EngineError::MissingPostalCode => "INVALID_REQUEST",
            EngineError::GeocodeFailed(_) => "GEOCODE_FAILED",
            EngineError::RoutingFailed(_) => "ROUTING_FAILED",
            EngineError::ConfigInvalid(_) => "CONFIG_INVALID",
        }
    }
}

/// A completed calculation: the caller-facing response plus the audit
/// record contents for the persistence layer
#[derive(Debug)]
pub struct CalculationOutcome {
    pub response: CalculateResponse,
    pub record: NewCalculationRecord,
}

/// Where the calculation landed after location resolution and matching
struct ResolvedMatch {
    zone_match: ZoneMatch,
    coordinates: Option<Coordinates>,
    travel_time: Option<TravelTimeInfo>,
}

pub struct GeopricingEngine {
    geocoder: Arc<dyn Geocoder>,
    travel_time_provider: Arc<dyn TravelTimeProvider>,
    cache: Arc<TravelTimeCache>,
}

impl GeopricingEngine {
    pub fn new(
        geocoder: Arc<dyn Geocoder>,
        travel_time_provider: Arc<dyn TravelTimeProvider>,
        cache: Arc<TravelTimeCache>,
    ) -> Self {
        Self {
            geocoder,
            travel_time_provider,
            cache,
        }
    }

    /// Run the full calculation: resolve location, look up or compute travel
    /// time, match the zone or postal rule, price each requested service.
    pub async fn calculate(
        &self,
        config: &PricingConfig,
        request: &CalculateRequest,
    ) -> Result<CalculationOutcome, EngineError> {
        let started = Instant::now();

        let resolved = self.resolve_and_match(config, request).await?;

        let (response, matched_rule_id, total_price) = match resolved.zone_match {
            ZoneMatch::OutOfService => {
                let services = request
                    .services
                    .iter()
                    .map(|s| ServiceQuote {
                        service_type: s.service_type.clone(),
                        base_rate: round_money(
                            s.custom_rate.unwrap_or(config.base_rate_per_1000_units),
                        ),
                        adjusted_rate: Decimal::ZERO,
                        area: s.area,
                        total_price: Decimal::ZERO,
                        available: false,
                    })
                    .collect();

                let response = CalculateResponse {
                    success: true,
                    in_service_area: false,
                    matched_zone_or_rule: None,
                    travel_time: resolved.travel_time.clone(),
                    services,
                    currency: config.currency.clone(),
                    calculation_id: None,
                };
                (response, None, None)
            }
            ZoneMatch::Matched(rule) => {
                if rule.malformed_config {
                    warn!(
                        config_id = %config.id,
                        rule_id = %rule.id,
                        "overlapping zones in config, applied lowest-priority tie-break"
                    );
                }

                let services: Vec<ServiceQuote> = request
                    .services
                    .iter()
                    .map(|s| {
                        price_service(
                            s,
                            &rule,
                            &config.service_rules,
                            config.base_rate_per_1000_units,
                            config.minimum_charge,
                        )
                    })
                    .collect();

                let total: Decimal = services
                    .iter()
                    .filter(|q| q.available)
                    .map(|q| q.total_price)
                    .sum();

                let response = CalculateResponse {
                    success: true,
                    in_service_area: true,
                    matched_zone_or_rule: Some(rule_summary(&rule)),
                    travel_time: resolved.travel_time.clone(),
                    services,
                    currency: config.currency.clone(),
                    calculation_id: None,
                };
                (response, Some(rule.id), Some(total))
            }
        };

        let record = NewCalculationRecord {
            business_id: config.business_id,
            config_id: config.id,
            config_version: config.version,
            input_address: request.address.clone(),
            input_postal_code: request.postal_code.clone(),
            resolved_coordinates: resolved.coordinates,
            travel_minutes: resolved.travel_time.as_ref().map(|t| t.minutes),
            distance_meters: resolved
                .travel_time
                .as_ref()
                .map(|t| t.distance_meters as i64),
            travel_from_cache: resolved.travel_time.as_ref().map(|t| t.from_cache),
            matched_rule_id,
            in_service_area: response.in_service_area,
            service_breakdown: response.services.clone(),
            total_price,
            processing_time_ms: started.elapsed().as_millis() as i64,
        };

        Ok(CalculationOutcome { response, record })
    }

    /// Availability check: the calculate cycle minus pricing
    pub async fn check_availability(
        &self,
        config: &PricingConfig,
        request: &CalculateRequest,
    ) -> Result<AvailabilityResponse, EngineError> {
        let resolved = self.resolve_and_match(config, request).await?;

        let response = match resolved.zone_match {
            ZoneMatch::OutOfService => AvailabilityResponse {
                success: true,
                in_service_area: false,
                matched_zone_or_rule: None,
                travel_time: resolved.travel_time,
                services: request
                    .services
                    .iter()
                    .map(|s| ServiceAvailability {
                        service_type: s.service_type.clone(),
                        available: false,
                    })
                    .collect(),
            },
            ZoneMatch::Matched(rule) => AvailabilityResponse {
                success: true,
                in_service_area: true,
                services: request
                    .services
                    .iter()
                    .map(|s| ServiceAvailability {
                        service_type: s.service_type.clone(),
                        available: zones::service_availability(
                            &rule,
                            &config.service_rules,
                            &s.service_type,
                        )
                        .0,
                    })
                    .collect(),
                matched_zone_or_rule: Some(rule_summary(&rule)),
                travel_time: resolved.travel_time,
            },
        };

        Ok(response)
    }

    /// Resolve the customer location and run the policy-appropriate matcher
    async fn resolve_and_match(
        &self,
        config: &PricingConfig,
        request: &CalculateRequest,
    ) -> Result<ResolvedMatch, EngineError> {
        match &*config.policy {
            PricingPolicy::TravelTimeZones { zones } => {
                let origin = config.origin().ok_or_else(|| {
                    EngineError::ConfigInvalid(
                        "travel-time policy has no business origin".to_string(),
                    )
                })?;

                let destination = self.resolve_location(request).await?;
                let (travel_time, from_cache) = self
                    .lookup_travel_time(&origin, &destination, request)
                    .await?;

                debug!(
                    minutes = travel_time.minutes,
                    from_cache, "matching travel time against zones"
                );

                Ok(ResolvedMatch {
                    zone_match: zones::match_travel_time(zones, travel_time.minutes),
                    coordinates: Some(destination),
                    travel_time: Some(TravelTimeInfo {
                        minutes: travel_time.minutes,
                        distance_meters: travel_time.distance_meters,
                        from_cache,
                    }),
                })
            }
            PricingPolicy::PostalRules {
                exact,
                patterns,
                default_rule,
            } => {
                let postal_code = request
                    .postal_code
                    .as_deref()
                    .filter(|c| !c.trim().is_empty())
                    .ok_or(EngineError::MissingPostalCode)?;

                Ok(ResolvedMatch {
                    zone_match: zones::match_postal_code(
                        exact,
                        patterns,
                        default_rule.as_ref(),
                        postal_code,
                    ),
                    coordinates: request.coordinates,
                    travel_time: None,
                })
            }
        }
    }

    /// Customer coordinates, either supplied directly or geocoded
    async fn resolve_location(&self, request: &CalculateRequest) -> Result<Coordinates, EngineError> {
        if let Some(coordinates) = request.coordinates {
            return Ok(coordinates);
        }

        let address = request
            .address
            .as_deref()
            .filter(|a| !a.trim().is_empty())
            .ok_or(EngineError::MissingLocation)?;

        let located = self
            .geocoder
            .resolve(address)
            .await
            .map_err(|e| EngineError::GeocodeFailed(e.to_string()))?
            .ok_or_else(|| {
                EngineError::GeocodeFailed(format!("no results for '{}'", address))
            })?;

        debug!(
            geocoder = self.geocoder.name(),
            display_name = %located.display_name,
            "resolved address"
        );

        Ok(located.coordinates)
    }

    /// Cache-checked travel-time lookup. A fresh provider result is cached
    /// regardless of `use_cache`, which only controls the read side.
    async fn lookup_travel_time(
        &self,
        origin: &Coordinates,
        destination: &Coordinates,
        request: &CalculateRequest,
    ) -> Result<(TravelTime, bool), EngineError> {
        let traffic_model = request.options.traffic_model.as_deref();
        let key = RouteKey::new(origin, destination, traffic_model);

        if request.options.use_cache {
            if let Some(hit) = self.cache.get(&key) {
                return Ok((hit, true));
            }
        }

        let fresh = self
            .travel_time_provider
            .travel_time(origin, destination, traffic_model)
            .await
            .map_err(|e| EngineError::RoutingFailed(e.to_string()))?;

        self.cache.put(key, fresh.clone());
        Ok((fresh, false))
    }
}

fn rule_summary(rule: &MatchedRule) -> RuleSummary {
    RuleSummary {
        id: rule.id.clone(),
        name: rule.name.clone(),
        adjustment_type: rule.adjustment.adjustment_type,
        adjustment_value: rule.adjustment.value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::cache::{ManualClock, DEFAULT_CACHE_TTL};
    use crate::services::geocoding::MockGeocoder;
    use crate::types::{
        Adjustment, AdjustmentType, CalculateOptions, ExactPostalRule, ServiceInput, Zone,
    };
    use anyhow::Result;
    use async_trait::async_trait;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use sqlx::types::Json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use uuid::Uuid;

    /// Provider that returns a fixed duration and counts its calls
    struct FixedProvider {
        minutes: f64,
        calls: AtomicUsize,
    }

    impl FixedProvider {
        fn new(minutes: f64) -> Self {
            Self {
                minutes,
                calls: AtomicUsize::new(0),
            }
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl TravelTimeProvider for FixedProvider {
        async fn travel_time(
            &self,
            _origin: &Coordinates,
            _destination: &Coordinates,
            _traffic_model: Option<&str>,
        ) -> Result<TravelTime> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(TravelTime::from_meters_and_seconds(
                12_000,
                self.minutes * 60.0,
            ))
        }

        fn name(&self) -> &str {
            "fixed"
        }
    }

    struct FailingProvider;

    #[async_trait]
    impl TravelTimeProvider for FailingProvider {
        async fn travel_time(
            &self,
            _origin: &Coordinates,
            _destination: &Coordinates,
            _traffic_model: Option<&str>,
        ) -> Result<TravelTime> {
            anyhow::bail!("no route found")
        }

        fn name(&self) -> &str {
            "failing"
        }
    }

    fn pct(value: Decimal) -> Adjustment {
        Adjustment {
            adjustment_type: AdjustmentType::Percentage,
            value,
        }
    }

    fn zone(id: &str, min: f64, max: Option<f64>, value: Decimal) -> Zone {
        Zone {
            id: id.to_string(),
            name: format!("Zone {}", id),
            min_travel_minutes: min,
            max_travel_minutes: max,
            adjustment: pct(value),
            priority: 0,
            available_services: None,
        }
    }

    fn zone_config(zones: Vec<Zone>) -> PricingConfig {
        PricingConfig {
            id: Uuid::new_v4(),
            business_id: Uuid::new_v4(),
            version: 1,
            effective_date: Utc::now(),
            expiry_date: None,
            is_active: true,
            origin_lat: Some(45.5152),
            origin_lng: Some(-122.6784),
            base_rate_per_1000_units: dec!(25),
            currency: "USD".to_string(),
            minimum_charge: dec!(50),
            policy: Json(PricingPolicy::TravelTimeZones { zones }),
            service_rules: Json(vec![]),
            created_at: Utc::now(),
        }
    }

    fn postal_config() -> PricingConfig {
        let mut config = zone_config(vec![]);
        config.policy = Json(PricingPolicy::PostalRules {
            exact: vec![ExactPostalRule {
                id: "downtown".to_string(),
                name: "Downtown".to_string(),
                code: "M5V3A8".to_string(),
                adjustment: pct(dec!(10)),
                available_services: None,
            }],
            patterns: vec![],
            default_rule: None,
        });
        config
    }

    fn request_with_coordinates() -> CalculateRequest {
        CalculateRequest {
            address: None,
            coordinates: Some(Coordinates {
                lat: 45.4887,
                lng: -122.8040,
            }),
            postal_code: None,
            property_size_area_units: dec!(5000),
            services: vec![ServiceInput {
                service_type: "mowing".to_string(),
                area: dec!(5000),
                custom_rate: None,
            }],
            options: CalculateOptions::default(),
        }
    }

    fn engine_with(provider: Arc<dyn TravelTimeProvider>) -> GeopricingEngine {
        GeopricingEngine::new(
            Arc::new(MockGeocoder::new()),
            provider,
            Arc::new(TravelTimeCache::new(DEFAULT_CACHE_TTL)),
        )
    }

    #[tokio::test]
    async fn reference_scenario_prices_correctly() {
        // 25/1000 units, +15% zone, 5,000 units: final price 143.75
        let config = zone_config(vec![
            zone("near", 0.0, Some(10.0), dec!(0)),
            zone("mid", 10.0, Some(60.0), dec!(15)),
        ]);
        let engine = engine_with(Arc::new(FixedProvider::new(20.0)));

        let outcome = engine
            .calculate(&config, &request_with_coordinates())
            .await
            .unwrap();

        assert!(outcome.response.in_service_area);
        let rule = outcome.response.matched_zone_or_rule.unwrap();
        assert_eq!(rule.id, "mid");

        let quote = &outcome.response.services[0];
        assert_eq!(quote.adjusted_rate, dec!(28.75));
        assert_eq!(quote.total_price, dec!(143.75));

        assert_eq!(outcome.record.total_price, Some(dec!(143.75)));
        assert_eq!(outcome.record.matched_rule_id.as_deref(), Some("mid"));
    }

    #[tokio::test]
    async fn travel_time_beyond_all_zones_is_out_of_service() {
        // 65 minutes against [0,10) and [10,60) with no unbounded tail
        let config = zone_config(vec![
            zone("near", 0.0, Some(10.0), dec!(0)),
            zone("mid", 10.0, Some(60.0), dec!(15)),
        ]);
        let engine = engine_with(Arc::new(FixedProvider::new(65.0)));

        let outcome = engine
            .calculate(&config, &request_with_coordinates())
            .await
            .unwrap();

        assert!(outcome.response.success);
        assert!(!outcome.response.in_service_area);
        assert!(outcome.response.matched_zone_or_rule.is_none());
        assert!(!outcome.response.services[0].available);
        assert_eq!(outcome.record.total_price, None);
    }

    #[tokio::test]
    async fn identical_requests_within_ttl_hit_the_provider_once() {
        let provider = Arc::new(FixedProvider::new(20.0));
        let config = zone_config(vec![zone("all", 0.0, None, dec!(0))]);
        let engine = engine_with(provider.clone());

        let first = engine
            .calculate(&config, &request_with_coordinates())
            .await
            .unwrap();
        let second = engine
            .calculate(&config, &request_with_coordinates())
            .await
            .unwrap();

        assert_eq!(provider.call_count(), 1);
        assert!(!first.response.travel_time.unwrap().from_cache);
        let cached = second.response.travel_time.unwrap();
        assert!(cached.from_cache);
        assert_eq!(cached.minutes, 20.0);
    }

    #[tokio::test]
    async fn expired_cache_entry_triggers_a_fresh_provider_call() {
        let provider = Arc::new(FixedProvider::new(20.0));
        let clock = Arc::new(ManualClock::new());
        let cache = Arc::new(TravelTimeCache::with_clock(
            Duration::from_secs(900),
            clock.clone(),
        ));
        let config = zone_config(vec![zone("all", 0.0, None, dec!(0))]);
        let engine = GeopricingEngine::new(Arc::new(MockGeocoder::new()), provider.clone(), cache);

        engine
            .calculate(&config, &request_with_coordinates())
            .await
            .unwrap();
        clock.advance(Duration::from_secs(901));
        let outcome = engine
            .calculate(&config, &request_with_coordinates())
            .await
            .unwrap();

        assert_eq!(provider.call_count(), 2);
        assert!(!outcome.response.travel_time.unwrap().from_cache);
    }

    #[tokio::test]
    async fn use_cache_false_skips_the_cache_read() {
        let provider = Arc::new(FixedProvider::new(20.0));
        let config = zone_config(vec![zone("all", 0.0, None, dec!(0))]);
        let engine = engine_with(provider.clone());

        let mut request = request_with_coordinates();
        request.options.use_cache = false;

        engine.calculate(&config, &request).await.unwrap();
        engine.calculate(&config, &request).await.unwrap();

        assert_eq!(provider.call_count(), 2);
    }

    #[tokio::test]
    async fn routing_failure_surfaces_as_engine_error() {
        let config = zone_config(vec![zone("all", 0.0, None, dec!(0))]);
        let engine = engine_with(Arc::new(FailingProvider));

        let err = engine
            .calculate(&config, &request_with_coordinates())
            .await
            .unwrap_err();

        assert!(matches!(err, EngineError::RoutingFailed(_)));
        assert_eq!(err.code(), "ROUTING_FAILED");
    }

    #[tokio::test]
    async fn address_is_geocoded_when_no_coordinates_given() {
        let config = zone_config(vec![zone("all", 0.0, None, dec!(0))]);
        let engine = engine_with(Arc::new(FixedProvider::new(5.0)));

        let mut request = request_with_coordinates();
        request.coordinates = None;
        request.address = Some("742 Evergreen Terrace".to_string());

        let outcome = engine.calculate(&config, &request).await.unwrap();
        assert!(outcome.record.resolved_coordinates.is_some());
    }

    #[tokio::test]
    async fn missing_location_is_rejected() {
        let config = zone_config(vec![zone("all", 0.0, None, dec!(0))]);
        let engine = engine_with(Arc::new(FixedProvider::new(5.0)));

        let mut request = request_with_coordinates();
        request.coordinates = None;
        request.address = None;

        let err = engine.calculate(&config, &request).await.unwrap_err();
        assert!(matches!(err, EngineError::MissingLocation));
        assert_eq!(err.code(), "INVALID_REQUEST");
    }

    #[tokio::test]
    async fn postal_policy_requires_a_postal_code() {
        let engine = engine_with(Arc::new(FixedProvider::new(5.0)));

        let err = engine
            .calculate(&postal_config(), &request_with_coordinates())
            .await
            .unwrap_err();

        assert!(matches!(err, EngineError::MissingPostalCode));
    }

    #[tokio::test]
    async fn postal_codes_normalize_to_the_same_rule_and_price() {
        let engine = engine_with(Arc::new(FixedProvider::new(5.0)));
        let config = postal_config();

        let mut spaced = request_with_coordinates();
        spaced.postal_code = Some("M5V 3A8".to_string());
        let mut compact = request_with_coordinates();
        compact.postal_code = Some("m5v3a8".to_string());

        let a = engine.calculate(&config, &spaced).await.unwrap();
        let b = engine.calculate(&config, &compact).await.unwrap();

        let rule_a = a.response.matched_zone_or_rule.unwrap();
        let rule_b = b.response.matched_zone_or_rule.unwrap();
        assert_eq!(rule_a.id, "downtown");
        assert_eq!(rule_b.id, "downtown");
        assert_eq!(
            a.response.services[0].total_price,
            b.response.services[0].total_price
        );
        // Postal policies never hit the routing provider
        assert!(a.response.travel_time.is_none());
    }

    #[tokio::test]
    async fn availability_check_reports_flags_without_pricing() {
        let mut restricted = zone("near", 0.0, Some(30.0), dec!(0));
        restricted.available_services = Some(vec!["mowing".to_string()]);
        let config = zone_config(vec![restricted]);
        let engine = engine_with(Arc::new(FixedProvider::new(10.0)));

        let mut request = request_with_coordinates();
        request.services.push(ServiceInput {
            service_type: "aeration".to_string(),
            area: dec!(5000),
            custom_rate: None,
        });

        let response = engine.check_availability(&config, &request).await.unwrap();

        assert!(response.in_service_area);
        assert_eq!(response.services.len(), 2);
        assert!(response.services[0].available, "mowing is offered");
        assert!(!response.services[1].available, "aeration is not");
    }

    #[tokio::test]
    async fn config_without_origin_is_rejected_for_zone_policies() {
        let mut config = zone_config(vec![zone("all", 0.0, None, dec!(0))]);
        config.origin_lat = None;
        config.origin_lng = None;
        let engine = engine_with(Arc::new(FixedProvider::new(5.0)));

        let err = engine
            .calculate(&config, &request_with_coordinates())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::ConfigInvalid(_)));
    }
}
