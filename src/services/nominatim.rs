//! Nominatim geocoding client

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::types::Coordinates;

/// Nominatim API response
#[derive(Debug, Deserialize)]
pub struct NominatimResult {
    pub lat: String,
    pub lon: String,
    pub display_name: String,
}

/// Nominatim geocoding client
pub struct NominatimClient {
    base_url: String,
    client: reqwest::Client,
}

/// Upstream call timeout; geocoding must fail fast, not hang a request
const REQUEST_TIMEOUT_SECS: u64 = 5;

impl NominatimClient {
    /// Create a new client
    pub fn new(base_url: &str) -> Self {
        let client = reqwest::Client::builder()
            .user_agent("GeopricingWorker/0.3 (quoting platform)")
            .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            base_url: base_url.to_string(),
            client,
        }
    }

    /// Geocode a free-form address to coordinates.
    /// Returns Ok(None) when the provider has no match for the address.
    pub async fn geocode(&self, address: &str) -> Result<Option<(Coordinates, String)>> {
        let url = format!(
            "{}/search?q={}&format=json&limit=1",
            self.base_url,
            urlencoding::encode(address)
        );

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .context("Failed to send geocoding request")?;

        if !response.status().is_success() {
            anyhow::bail!("Nominatim returned status {}", response.status());
        }

        let results: Vec<NominatimResult> = response
            .json()
            .await
            .context("Failed to parse geocoding response")?;

        if let Some(result) = results.first() {
            let lat: f64 = result.lat.parse().context("Invalid latitude")?;
            let lng: f64 = result.lon.parse().context("Invalid longitude")?;

            Ok(Some((Coordinates { lat, lng }, result.display_name.clone())))
        } else {
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Hits the public Nominatim API, run manually.

    #[tokio::test]
    #[ignore]
    async fn test_geocode_free_form_address() {
        let client = NominatimClient::new("https://nominatim.openstreetmap.org");

        let result = client
            .geocode("1600 Amphitheatre Parkway, Mountain View, CA")
            .await
            .unwrap();

        assert!(result.is_some());
        let (coords, _) = result.unwrap();

        // Mountain View is around 37.42°N, -122.08°E
        assert!((coords.lat - 37.42).abs() < 0.2);
        assert!((coords.lng + 122.08).abs() < 0.2);
    }
}
