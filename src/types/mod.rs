//! Type definitions

pub mod calculation;
pub mod geo;
pub mod messages;
pub mod pricing_config;

pub use calculation::*;
pub use geo::*;
pub use messages::*;
pub use pricing_config::*;
