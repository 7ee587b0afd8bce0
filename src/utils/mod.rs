//! Configuration utilities.

/// TOML infrastructure configuration (`registrar.toml`).
pub mod toml_config;
