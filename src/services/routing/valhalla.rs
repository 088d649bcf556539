//! Valhalla routing engine client
//!
//! Valhalla API documentation:
//! https://valhalla.github.io/valhalla/api/matrix/api-reference/

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{TravelTime, TravelTimeProvider};
use crate::types::Coordinates;

/// Valhalla client configuration
#[derive(Debug, Clone)]
pub struct ValhallaConfig {
    /// Base URL of Valhalla server (e.g., "http://localhost:8002")
    pub base_url: String,
    /// Request timeout in seconds
    pub timeout_seconds: u64,
}

impl Default for ValhallaConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8002".to_string(),
            timeout_seconds: 10,
        }
    }
}

impl ValhallaConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }
}

/// Valhalla routing client
pub struct ValhallaClient {
    client: Client,
    config: ValhallaConfig,
}

impl ValhallaClient {
    pub fn new(config: ValhallaConfig) -> Self {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_seconds))
            .build()
            .expect("Failed to create HTTP client");

        Self { client, config }
    }

    /// Build a single-pair sources_to_targets request
    fn build_request(
        &self,
        origin: &Coordinates,
        destination: &Coordinates,
        traffic_model: Option<&str>,
    ) -> MatrixRequest {
        let to_loc = |c: &Coordinates| ValhallaLocation {
            lat: c.lat,
            lon: c.lng,
            // 500m radius – tolerant of geocoded coordinates that land
            // slightly off-road (building centroid vs road edge)
            radius: Some(500),
        };

        MatrixRequest {
            sources: vec![to_loc(origin)],
            targets: vec![to_loc(destination)],
            costing: traffic_model.unwrap_or("auto").to_string(),
            units: "kilometers".to_string(),
        }
    }
}

#[async_trait]
impl TravelTimeProvider for ValhallaClient {
    async fn travel_time(
        &self,
        origin: &Coordinates,
        destination: &Coordinates,
        traffic_model: Option<&str>,
    ) -> Result<TravelTime> {
        let request = self.build_request(origin, destination, traffic_model);
        let url = format!("{}/sources_to_targets", self.config.base_url);

        debug!(
            "Requesting travel time from Valhalla: ({}, {}) -> ({}, {})",
            origin.lat, origin.lng, destination.lat, destination.lng
        );

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .context("Failed to send request to Valhalla")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Valhalla returned error {}: {}", status, body);
        }

        let matrix_response: MatrixResponse = response
            .json()
            .await
            .context("Failed to parse Valhalla response")?;

        let cell = matrix_response
            .sources_to_targets
            .first()
            .and_then(|row| row.first())
            .context("Valhalla response contained no matrix cell")?;

        // A present cell with null distance/time means no drivable route
        let (distance_km, time_seconds) = match (cell.distance, cell.time) {
            (Some(d), Some(t)) => (d, t),
            _ => anyhow::bail!("No drivable route between origin and destination"),
        };

        let travel_time =
            TravelTime::from_meters_and_seconds((distance_km * 1000.0) as u64, time_seconds);

        debug!(
            "Valhalla travel time: {:.1} minutes, {} m",
            travel_time.minutes, travel_time.distance_meters
        );

        Ok(travel_time)
    }

    fn name(&self) -> &str {
        "Valhalla"
    }
}

// Valhalla API types

#[derive(Debug, Serialize)]
struct MatrixRequest {
    sources: Vec<ValhallaLocation>,
    targets: Vec<ValhallaLocation>,
    costing: String,
    units: String,
}

#[derive(Debug, Serialize, Clone)]
struct ValhallaLocation {
    lat: f64,
    lon: f64,
    /// Radius in meters for snapping to roads
    #[serde(skip_serializing_if = "Option::is_none")]
    radius: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct MatrixResponse {
    sources_to_targets: Vec<Vec<MatrixCell>>,
}

#[derive(Debug, Deserialize)]
struct MatrixCell {
    /// Distance in kilometers (when units="kilometers")
    distance: Option<f64>,
    /// Time in seconds
    time: Option<f64>,
}
