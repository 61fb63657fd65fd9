pub mod configuration;
pub mod core;
pub mod results;
