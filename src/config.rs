//! Configuration management

use std::time::Duration;

use anyhow::{self, Context, Result};

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// NATS server URL
    pub nats_url: String,

    /// PostgreSQL connection string
    pub database_url: String,

    /// Nominatim API URL (for geocoding)
    pub nominatim_url: String,

    /// Valhalla routing engine URL (optional, falls back to mock if unavailable)
    pub valhalla_url: Option<String>,

    /// JWT secret key for token validation
    pub jwt_secret: String,

    /// Lifetime of cached travel-time results
    pub travel_time_cache_ttl: Duration,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present
        dotenvy::dotenv().ok();

        let nats_url =
            std::env::var("NATS_URL").unwrap_or_else(|_| "nats://localhost:4222".to_string());

        let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?;

        let nominatim_url = std::env::var("NOMINATIM_URL")
            .unwrap_or_else(|_| "https://nominatim.openstreetmap.org".to_string());

        let valhalla_url = std::env::var("VALHALLA_URL").ok();

        let jwt_secret = std::env::var("JWT_SECRET")
            .context("JWT_SECRET must be set — generate one with: openssl rand -base64 48")?;

        if jwt_secret.len() < 32 {
            anyhow::bail!(
                "JWT_SECRET must be at least 32 bytes (current: {} bytes). Generate one with: openssl rand -base64 48",
                jwt_secret.len()
            );
        }

        let travel_time_cache_ttl = match std::env::var("TRAVEL_TIME_CACHE_TTL_SECS") {
            Ok(raw) => {
                let secs: u64 = raw
                    .parse()
                    .context("TRAVEL_TIME_CACHE_TTL_SECS must be an integer number of seconds")?;
                Duration::from_secs(secs)
            }
            Err(_) => crate::services::cache::DEFAULT_CACHE_TTL,
        };

        Ok(Self {
            nats_url,
            database_url,
            nominatim_url,
            valhalla_url,
            jwt_secret,
            travel_time_cache_ttl,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set_required_env() {
        std::env::set_var("DATABASE_URL", "postgres://test");
        std::env::set_var(
            "JWT_SECRET",
            "test-secret-key-for-jwt-at-least-32-bytes-long",
        );
    }

    #[test]
    fn test_config_valhalla_url_some_when_set() {
        set_required_env();
        std::env::set_var("VALHALLA_URL", "http://localhost:8002");

        let config = Config::from_env().unwrap();
        assert_eq!(config.valhalla_url, Some("http://localhost:8002".to_string()));

        std::env::remove_var("VALHALLA_URL");
    }

    #[test]
    fn test_config_nominatim_url_uses_local_when_set() {
        set_required_env();
        std::env::set_var("NOMINATIM_URL", "http://localhost:8080");

        let config = Config::from_env().unwrap();
        assert_eq!(config.nominatim_url, "http://localhost:8080");

        std::env::remove_var("NOMINATIM_URL");
    }

    #[test]
    #[ignore] // requires --test-threads=1 due to env var race
    fn test_config_cache_ttl_defaults_to_fifteen_minutes() {
        set_required_env();
        std::env::remove_var("TRAVEL_TIME_CACHE_TTL_SECS");

        let config = Config::from_env().unwrap();
        assert_eq!(config.travel_time_cache_ttl, Duration::from_secs(900));
    }

    #[test]
    fn test_config_cache_ttl_reads_override() {
        set_required_env();
        std::env::set_var("TRAVEL_TIME_CACHE_TTL_SECS", "60");

        let config = Config::from_env().unwrap();
        assert_eq!(config.travel_time_cache_ttl, Duration::from_secs(60));

        std::env::remove_var("TRAVEL_TIME_CACHE_TTL_SECS");
    }
}
