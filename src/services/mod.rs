pub mod cache;
pub mod geo;
pub mod geocoding;
pub mod geopricing;
pub mod nominatim;
pub mod pricing;
pub mod routing;
pub mod zones;
