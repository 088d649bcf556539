//! Travel-time lookup between the business origin and a customer location
//!
//! Uses Valhalla for production, mock for tests.

mod valhalla;

pub use valhalla::{ValhallaClient, ValhallaConfig};

use anyhow::Result;
use async_trait::async_trait;

use crate::types::Coordinates;

/// Result of one origin→destination routing call
#[derive(Debug, Clone, PartialEq)]
pub struct TravelTime {
    /// Driving duration in minutes
    pub minutes: f64,
    /// Road distance in meters
    pub distance_meters: u64,
    /// Human-readable distance, e.g. "12.4 km"
    pub distance_text: String,
}

impl TravelTime {
    pub fn from_meters_and_seconds(distance_meters: u64, duration_seconds: f64) -> Self {
        Self {
            minutes: duration_seconds / 60.0,
            distance_meters,
            distance_text: format!("{:.1} km", distance_meters as f64 / 1000.0),
        }
    }
}

/// Travel-time provider trait for abstraction (Valhalla, mock, etc.)
#[async_trait]
pub trait TravelTimeProvider: Send + Sync {
    /// Get driving duration and distance from origin to destination.
    /// `traffic_model` is a provider-specific costing hint; None = default.
    async fn travel_time(
        &self,
        origin: &Coordinates,
        destination: &Coordinates,
        traffic_model: Option<&str>,
    ) -> Result<TravelTime>;

    /// Get provider name for logging
    fn name(&self) -> &str;
}

/// Mock provider for tests
/// Uses Haversine distance × road coefficient at a fixed average speed
pub struct MockTravelTimeProvider {
    /// Coefficient for converting straight-line to road distance (default: 1.3)
    road_coefficient: f64,
    /// Average speed in km/h for time estimation (default: 40)
    average_speed_kmh: f64,
}

impl Default for MockTravelTimeProvider {
    fn default() -> Self {
        Self {
            road_coefficient: 1.3,
            average_speed_kmh: 40.0,
        }
    }
}

impl MockTravelTimeProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_params(road_coefficient: f64, average_speed_kmh: f64) -> Self {
        Self {
            road_coefficient,
            average_speed_kmh,
        }
    }
}

#[async_trait]
impl TravelTimeProvider for MockTravelTimeProvider {
    async fn travel_time(
        &self,
        origin: &Coordinates,
        destination: &Coordinates,
        _traffic_model: Option<&str>,
    ) -> Result<TravelTime> {
        use crate::services::geo::haversine_distance;

        let straight_line_km = haversine_distance(origin, destination);
        let road_km = straight_line_km * self.road_coefficient;
        let duration_seconds = road_km / self.average_speed_kmh * 3600.0;

        Ok(TravelTime::from_meters_and_seconds(
            (road_km * 1000.0) as u64,
            duration_seconds,
        ))
    }

    fn name(&self) -> &str {
        "MockTravelTime"
    }
}

/// Create travel-time provider with automatic Valhalla detection and fallback
///
/// Tries to connect to Valhalla if URL is provided. Falls back to the mock
/// provider if Valhalla is unavailable or the URL is not configured.
pub async fn create_travel_time_provider_with_fallback(
    valhalla_url: Option<String>,
) -> Box<dyn TravelTimeProvider> {
    use tracing::{info, warn};

    if let Some(url) = valhalla_url {
        let config = ValhallaConfig::new(&url);
        let client = ValhallaClient::new(config);

        match check_valhalla_health(&url).await {
            Ok(()) => {
                info!("Valhalla travel-time provider available at {}", url);
                return Box::new(client);
            }
            Err(e) => {
                warn!("Valhalla not available at {}: {}. Falling back to mock provider.", url, e);
            }
        }
    }

    info!("Using mock travel-time provider (Valhalla not configured or unavailable)");
    Box::new(MockTravelTimeProvider::new())
}

/// Check if Valhalla is healthy by making a simple status request
async fn check_valhalla_health(base_url: &str) -> Result<()> {
    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(5))
        .build()?;

    let url = format!("{}/status", base_url);
    let response = client.get(&url).send().await?;

    if response.status().is_success() {
        Ok(())
    } else {
        anyhow::bail!("Valhalla returned status {}", response.status())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn depot() -> Coordinates {
        Coordinates { lat: 45.5152, lng: -122.6784 } // Portland
    }

    fn customer_nearby() -> Coordinates {
        Coordinates { lat: 45.4887, lng: -122.8040 } // Beaverton, ~12 km away
    }

    fn customer_far() -> Coordinates {
        Coordinates { lat: 44.0521, lng: -123.0868 } // Eugene, ~175 km away
    }

    #[tokio::test]
    async fn test_mock_provider_same_point_is_zero() {
        let provider = MockTravelTimeProvider::new();
        let tt = provider.travel_time(&depot(), &depot(), None).await.unwrap();

        assert_eq!(tt.distance_meters, 0);
        assert_eq!(tt.minutes, 0.0);
    }

    #[tokio::test]
    async fn test_mock_provider_nearby_customer() {
        let provider = MockTravelTimeProvider::new();
        let tt = provider
            .travel_time(&depot(), &customer_nearby(), None)
            .await
            .unwrap();

        // ~10 km straight line × 1.3 at 40 km/h → roughly 20 minutes
        assert!(tt.minutes > 10.0 && tt.minutes < 35.0, "got {} minutes", tt.minutes);
        assert!(tt.distance_meters > 8_000 && tt.distance_meters < 20_000);
    }

    #[tokio::test]
    async fn test_mock_provider_far_customer_takes_longer() {
        let provider = MockTravelTimeProvider::new();
        let near = provider
            .travel_time(&depot(), &customer_nearby(), None)
            .await
            .unwrap();
        let far = provider
            .travel_time(&depot(), &customer_far(), None)
            .await
            .unwrap();

        assert!(far.minutes > near.minutes);
        assert!(far.distance_meters > near.distance_meters);
    }

    #[tokio::test]
    async fn test_mock_provider_custom_params() {
        let slow = MockTravelTimeProvider::with_params(1.3, 20.0);
        let fast = MockTravelTimeProvider::with_params(1.3, 80.0);

        let slow_tt = slow.travel_time(&depot(), &customer_far(), None).await.unwrap();
        let fast_tt = fast.travel_time(&depot(), &customer_far(), None).await.unwrap();

        assert!(slow_tt.minutes > fast_tt.minutes * 3.0);
    }

    #[test]
    fn test_distance_text_formatting() {
        let tt = TravelTime::from_meters_and_seconds(12_400, 600.0);
        assert_eq!(tt.distance_text, "12.4 km");
        assert_eq!(tt.minutes, 10.0);
    }

    #[tokio::test]
    async fn test_fallback_without_url_uses_mock() {
        let provider = create_travel_time_provider_with_fallback(None).await;
        assert_eq!(provider.name(), "MockTravelTime");
    }

    #[tokio::test]
    async fn test_fallback_with_unreachable_url_uses_mock() {
        let provider =
            create_travel_time_provider_with_fallback(Some("http://localhost:1".to_string())).await;
        assert_eq!(provider.name(), "MockTravelTime");
    }

    #[tokio::test]
    #[ignore = "Requires running Valhalla server"]
    async fn test_fallback_with_valhalla_available() {
        let provider = create_travel_time_provider_with_fallback(
            Some("http://localhost:8002".to_string()),
        )
        .await;
        assert_eq!(provider.name(), "Valhalla");
    }
}
