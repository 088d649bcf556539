pub mod calculation_record;
pub mod pricing_config;
