//! Geocoding abstraction layer
//!
//! Resolves free-form customer addresses to coordinates behind a narrow
//! trait so the orchestrator and its tests never touch the network:
//! - MockGeocoder for tests (deterministic, no network)
//! - RateLimitedNominatimGeocoder for production (rate limit + circuit breaker,
//!   so a burst of quote requests can never get the worker blocked upstream)
//!
//! Selected via the GEOCODER_BACKEND env variable ("mock" | "nominatim").

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::services::nominatim::NominatimClient;
use crate::types::Coordinates;

/// Result of a successful address resolution
#[derive(Debug, Clone)]
pub struct GeocodedLocation {
    pub coordinates: Coordinates,
    /// Canonical address string returned by the provider
    pub display_name: String,
}

/// Geocoder trait - abstraction for all geocoding implementations
#[async_trait]
pub trait Geocoder: Send + Sync {
    /// Resolve a free-form address to coordinates.
    /// Returns Ok(None) when the provider has no match.
    async fn resolve(&self, address: &str) -> Result<Option<GeocodedLocation>>;

    /// Get the name of this geocoder implementation
    fn name(&self) -> &'static str;
}

// ==========================================================================
// MockGeocoder
// ==========================================================================

/// Mock geocoder for testing - returns deterministic fake coordinates
pub struct MockGeocoder;

impl MockGeocoder {
    pub fn new() -> Self {
        Self
    }

    /// Hash the address into a stable coordinate inside a plausible
    /// metropolitan bounding box, so travel times stay reasonable.
    fn hash_to_coordinates(address: &str) -> Coordinates {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};

        let mut hasher = DefaultHasher::new();
        address.hash(&mut hasher);
        let hash = hasher.finish();

        const LAT_MIN: f64 = 45.0;
        const LAT_MAX: f64 = 46.0;
        const LNG_MIN: f64 = -123.5;
        const LNG_MAX: f64 = -122.0;

        let lat_normalized = ((hash >> 32) as f64) / (u32::MAX as f64);
        let lng_normalized = ((hash & 0xFFFFFFFF) as f64) / (u32::MAX as f64);

        Coordinates {
            lat: LAT_MIN + lat_normalized * (LAT_MAX - LAT_MIN),
            lng: LNG_MIN + lng_normalized * (LNG_MAX - LNG_MIN),
        }
    }
}

impl Default for MockGeocoder {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Geocoder for MockGeocoder {
    async fn resolve(&self, address: &str) -> Result<Option<GeocodedLocation>> {
        if address.trim().is_empty() {
            return Ok(None);
        }

        Ok(Some(GeocodedLocation {
            coordinates: Self::hash_to_coordinates(address),
            display_name: address.to_string(),
        }))
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

// ==========================================================================
// RateLimiter
// ==========================================================================

/// Rate limiter that enforces minimum interval between calls
pub struct RateLimiter {
    last_call: Arc<Mutex<Option<Instant>>>,
    min_interval: Duration,
}

impl RateLimiter {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            last_call: Arc::new(Mutex::new(None)),
            min_interval,
        }
    }

    /// Wait until it's safe to make another call
    pub async fn wait(&self) {
        let mut last = self.last_call.lock().await;

        if let Some(last_time) = *last {
            let elapsed = last_time.elapsed();
            if elapsed < self.min_interval {
                let wait_time = self.min_interval - elapsed;
                drop(last); // Release lock while sleeping
                tokio::time::sleep(wait_time).await;
                last = self.last_call.lock().await;
            }
        }

        *last = Some(Instant::now());
    }
}

// ==========================================================================
// CircuitBreaker
// ==========================================================================

/// Circuit breaker to prevent hammering a failing service
pub struct CircuitBreaker {
    failure_count: AtomicU32,
    threshold: u32,
    last_failure: Arc<Mutex<Option<Instant>>>,
    recovery_time: Duration,
}

impl CircuitBreaker {
    pub fn new(threshold: u32, recovery_time: Duration) -> Self {
        Self {
            failure_count: AtomicU32::new(0),
            threshold,
            last_failure: Arc::new(Mutex::new(None)),
            recovery_time,
        }
    }

    /// Check if circuit is open (blocking calls)
    pub fn is_open(&self) -> bool {
        let count = self.failure_count.load(Ordering::Relaxed);
        if count >= self.threshold {
            if let Ok(last) = self.last_failure.try_lock() {
                if let Some(last_time) = *last {
                    if last_time.elapsed() >= self.recovery_time {
                        return false; // Allow retry (half-open)
                    }
                }
            }
            return true;
        }
        false
    }

    /// Record a failure
    pub fn record_failure(&self) {
        self.failure_count.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut last) = self.last_failure.try_lock() {
            *last = Some(Instant::now());
        }
    }

    /// Record a success (resets failure count)
    pub fn record_success(&self) {
        self.failure_count.store(0, Ordering::Relaxed);
    }
}

// ==========================================================================
// RateLimitedNominatimGeocoder
// ==========================================================================

/// Default rate limit interval (1.5 seconds - Nominatim allows 1 req/s)
const DEFAULT_RATE_LIMIT_MS: u64 = 1500;

/// Default circuit breaker threshold (3 failures)
const DEFAULT_CIRCUIT_BREAKER_THRESHOLD: u32 = 3;

/// Default circuit breaker recovery time (5 minutes)
const DEFAULT_CIRCUIT_BREAKER_RECOVERY_SECS: u64 = 300;

/// Rate-limited Nominatim geocoder with circuit breaker protection
pub struct RateLimitedNominatimGeocoder {
    client: NominatimClient,
    rate_limiter: RateLimiter,
    /// Circuit breaker - pub(crate) for testing
    pub(crate) circuit_breaker: CircuitBreaker,
}

impl RateLimitedNominatimGeocoder {
    /// Create a new rate-limited Nominatim geocoder with default settings
    pub fn new(base_url: &str) -> Self {
        Self::with_config(
            base_url,
            Duration::from_millis(DEFAULT_RATE_LIMIT_MS),
            DEFAULT_CIRCUIT_BREAKER_THRESHOLD,
            Duration::from_secs(DEFAULT_CIRCUIT_BREAKER_RECOVERY_SECS),
        )
    }

    /// Create with custom configuration
    pub fn with_config(
        base_url: &str,
        rate_limit_interval: Duration,
        circuit_breaker_threshold: u32,
        circuit_breaker_recovery: Duration,
    ) -> Self {
        Self {
            client: NominatimClient::new(base_url),
            rate_limiter: RateLimiter::new(rate_limit_interval),
            circuit_breaker: CircuitBreaker::new(circuit_breaker_threshold, circuit_breaker_recovery),
        }
    }
}

#[async_trait]
impl Geocoder for RateLimitedNominatimGeocoder {
    async fn resolve(&self, address: &str) -> Result<Option<GeocodedLocation>> {
        if self.circuit_breaker.is_open() {
            tracing::warn!("Circuit breaker is open, rejecting geocoding request");
            anyhow::bail!("Geocoding service temporarily unavailable (circuit breaker open)");
        }

        self.rate_limiter.wait().await;

        match self.client.geocode(address).await {
            Ok(Some((coordinates, display_name))) => {
                self.circuit_breaker.record_success();
                Ok(Some(GeocodedLocation {
                    coordinates,
                    display_name,
                }))
            }
            Ok(None) => {
                // No result found is not a provider failure
                self.circuit_breaker.record_success();
                Ok(None)
            }
            Err(e) => {
                self.circuit_breaker.record_failure();
                tracing::error!("Geocoding failed: {}", e);
                Err(e)
            }
        }
    }

    fn name(&self) -> &'static str {
        "nominatim"
    }
}

// ==========================================================================
// Factory
// ==========================================================================

/// Create geocoder based on the GEOCODER_BACKEND environment variable
/// ("mock" | "nominatim", default "mock").
pub fn create_geocoder(nominatim_url: &str) -> Box<dyn Geocoder> {
    let backend = std::env::var("GEOCODER_BACKEND").unwrap_or_else(|_| "mock".to_string());

    match backend.as_str() {
        "mock" => {
            tracing::info!("Using MockGeocoder");
            Box::new(MockGeocoder::new())
        }
        "nominatim" => {
            tracing::info!("Using RateLimitedNominatimGeocoder");
            Box::new(RateLimitedNominatimGeocoder::new(nominatim_url))
        }
        _ => {
            tracing::warn!("Unknown GEOCODER_BACKEND '{}', using mock", backend);
            Box::new(MockGeocoder::new())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_geocoder_returns_coordinates_for_any_address() {
        let geocoder = MockGeocoder::new();

        let result = geocoder.resolve("742 Evergreen Terrace, Springfield").await;

        assert!(result.is_ok());
        assert!(result.unwrap().is_some(), "MockGeocoder should always resolve");
    }

    #[tokio::test]
    async fn mock_geocoder_is_deterministic() {
        let geocoder = MockGeocoder::new();

        let a = geocoder.resolve("100 Main St").await.unwrap().unwrap();
        let b = geocoder.resolve("100 Main St").await.unwrap().unwrap();

        assert_eq!(a.coordinates.lat, b.coordinates.lat);
        assert_eq!(a.coordinates.lng, b.coordinates.lng);
    }

    #[tokio::test]
    async fn mock_geocoder_distinguishes_addresses() {
        let geocoder = MockGeocoder::new();

        let a = geocoder.resolve("100 Main St").await.unwrap().unwrap();
        let b = geocoder.resolve("200 Oak Ave").await.unwrap().unwrap();

        assert_ne!(a.coordinates.lat, b.coordinates.lat);
    }

    #[tokio::test]
    async fn mock_geocoder_rejects_blank_address() {
        let geocoder = MockGeocoder::new();
        let result = geocoder.resolve("   ").await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn rate_limiter_enforces_minimum_interval() {
        let limiter = RateLimiter::new(Duration::from_millis(100));

        let start = Instant::now();

        limiter.wait().await;
        assert!(start.elapsed() < Duration::from_millis(50), "First call should be immediate");

        limiter.wait().await;
        assert!(
            start.elapsed() >= Duration::from_millis(100),
            "Second call should wait at least 100ms, took {:?}",
            start.elapsed()
        );
    }

    #[test]
    fn circuit_breaker_opens_after_threshold_failures() {
        let breaker = CircuitBreaker::new(3, Duration::from_secs(60));

        breaker.record_failure();
        breaker.record_failure();
        assert!(!breaker.is_open(), "Should not open below threshold");

        breaker.record_failure();
        assert!(breaker.is_open(), "Should open at threshold");
    }

    #[test]
    fn circuit_breaker_resets_on_success() {
        let breaker = CircuitBreaker::new(3, Duration::from_secs(60));

        breaker.record_failure();
        breaker.record_failure();
        breaker.record_success();

        breaker.record_failure();
        breaker.record_failure();
        assert!(!breaker.is_open(), "Count was reset by the success");
    }

    #[tokio::test]
    async fn circuit_breaker_allows_retry_after_recovery_time() {
        let breaker = CircuitBreaker::new(1, Duration::from_millis(50));

        breaker.record_failure();
        assert!(breaker.is_open());

        tokio::time::sleep(Duration::from_millis(60)).await;

        assert!(!breaker.is_open(), "Should be half-open after recovery time");
    }

    #[tokio::test]
    async fn nominatim_geocoder_rejects_when_circuit_breaker_open() {
        let geocoder = RateLimitedNominatimGeocoder::with_config(
            "https://nominatim.openstreetmap.org",
            Duration::from_millis(100),
            1,
            Duration::from_secs(300),
        );

        geocoder.circuit_breaker.record_failure();
        assert!(geocoder.circuit_breaker.is_open());

        let result = geocoder.resolve("100 Main St").await;
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("circuit breaker"));
    }
}
