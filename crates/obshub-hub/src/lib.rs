//! The obshub binary's building blocks: configuration and startup wiring.

pub mod config;
pub mod hub;

pub use config::{load_config, Config, ConfigError};
pub use hub::{Hub, HubError};
