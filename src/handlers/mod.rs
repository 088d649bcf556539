//! NATS message handlers

pub mod calculate;
pub mod ping;
pub mod pricing_config;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_nats::Client;
use sqlx::PgPool;
use tokio::select;
use tracing::{error, info};

use crate::config::Config;
use crate::services::cache::TravelTimeCache;
use crate::services::geocoding::{create_geocoder, Geocoder};
use crate::services::geopricing::GeopricingEngine;
use crate::services::routing::{create_travel_time_provider_with_fallback, TravelTimeProvider};

/// How often the background task evicts expired cache entries
const CACHE_SWEEP_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Start all message handlers
pub async fn start_handlers(client: Client, pool: PgPool, config: &Config) -> Result<()> {
    info!("Starting message handlers...");

    // Shared engine components
    let geocoder: Arc<dyn Geocoder> = Arc::from(create_geocoder(&config.nominatim_url));
    info!("Geocoder initialized: {}", geocoder.name());

    let travel_time_provider: Arc<dyn TravelTimeProvider> = Arc::from(
        create_travel_time_provider_with_fallback(config.valhalla_url.clone()).await,
    );
    info!(
        "Travel-time provider initialized: {}",
        travel_time_provider.name()
    );

    let cache = Arc::new(TravelTimeCache::new(config.travel_time_cache_ttl));
    let engine = Arc::new(GeopricingEngine::new(
        geocoder,
        travel_time_provider,
        Arc::clone(&cache),
    ));

    // Expiry is lazy on reads; this just bounds memory for keys never read again
    let sweep_cache = Arc::clone(&cache);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(CACHE_SWEEP_INTERVAL);
        loop {
            interval.tick().await;
            sweep_cache.sweep();
        }
    });

    // Subscribe to all subjects
    let ping_sub = client.subscribe("geopricing.ping").await?;
    let calculate_sub = client.subscribe("geopricing.calculate").await?;
    let availability_sub = client.subscribe("geopricing.availability.check").await?;
    let config_create_sub = client.subscribe("geopricing.config.create").await?;
    let config_get_sub = client.subscribe("geopricing.config.get").await?;
    let config_list_sub = client.subscribe("geopricing.config.list").await?;
    let calculation_list_sub = client.subscribe("geopricing.calculation.list").await?;
    let calculation_convert_sub = client.subscribe("geopricing.calculation.convert").await?;

    info!("Subscribed to NATS subjects");

    // Clone for each handler
    let client_ping = client.clone();
    let client_calculate = client.clone();
    let client_availability = client.clone();
    let client_config_create = client.clone();
    let client_config_get = client.clone();
    let client_config_list = client.clone();
    let client_calculation_list = client.clone();
    let client_calculation_convert = client.clone();

    let pool_calculate = pool.clone();
    let pool_availability = pool.clone();
    let pool_config_create = pool.clone();
    let pool_config_get = pool.clone();
    let pool_config_list = pool.clone();
    let pool_calculation_list = pool.clone();
    let pool_calculation_convert = pool.clone();

    let engine_calculate = Arc::clone(&engine);
    let engine_availability = Arc::clone(&engine);

    let secret_calculate = config.jwt_secret.clone();
    let secret_availability = config.jwt_secret.clone();
    let secret_config_create = config.jwt_secret.clone();
    let secret_config_get = config.jwt_secret.clone();
    let secret_config_list = config.jwt_secret.clone();
    let secret_calculation_list = config.jwt_secret.clone();
    let secret_calculation_convert = config.jwt_secret.clone();

    // Spawn handlers
    let ping_handle = tokio::spawn(async move { ping::handle_ping(client_ping, ping_sub).await });

    let calculate_handle = tokio::spawn(async move {
        calculate::handle_calculate(
            client_calculate,
            calculate_sub,
            pool_calculate,
            engine_calculate,
            secret_calculate,
        )
        .await
    });

    let availability_handle = tokio::spawn(async move {
        calculate::handle_availability(
            client_availability,
            availability_sub,
            pool_availability,
            engine_availability,
            secret_availability,
        )
        .await
    });

    let config_create_handle = tokio::spawn(async move {
        pricing_config::handle_create(
            client_config_create,
            config_create_sub,
            pool_config_create,
            secret_config_create,
        )
        .await
    });

    let config_get_handle = tokio::spawn(async move {
        pricing_config::handle_get(
            client_config_get,
            config_get_sub,
            pool_config_get,
            secret_config_get,
        )
        .await
    });

    let config_list_handle = tokio::spawn(async move {
        pricing_config::handle_list(
            client_config_list,
            config_list_sub,
            pool_config_list,
            secret_config_list,
        )
        .await
    });

    let calculation_list_handle = tokio::spawn(async move {
        calculate::handle_list(
            client_calculation_list,
            calculation_list_sub,
            pool_calculation_list,
            secret_calculation_list,
        )
        .await
    });

    let calculation_convert_handle = tokio::spawn(async move {
        calculate::handle_convert(
            client_calculation_convert,
            calculation_convert_sub,
            pool_calculation_convert,
            secret_calculation_convert,
        )
        .await
    });

    info!("All handlers started");

    // Wait for any handler to finish (they shouldn't)
    select! {
        result = ping_handle => {
            error!("Ping handler finished: {:?}", result);
        }
        result = calculate_handle => {
            error!("Calculate handler finished: {:?}", result);
        }
        result = availability_handle => {
            error!("Availability handler finished: {:?}", result);
        }
        result = config_create_handle => {
            error!("Config create handler finished: {:?}", result);
        }
        result = config_get_handle => {
            error!("Config get handler finished: {:?}", result);
        }
        result = config_list_handle => {
            error!("Config list handler finished: {:?}", result);
        }
        result = calculation_list_handle => {
            error!("Calculation list handler finished: {:?}", result);
        }
        result = calculation_convert_handle => {
            error!("Calculation convert handler finished: {:?}", result);
        }
    }

    Ok(())
}
