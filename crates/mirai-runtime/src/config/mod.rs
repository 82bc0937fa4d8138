//! Configuration module for the mirai runtime.
//!
//! Layered loading of connection, ingestion and logging settings from
//! TOML/YAML files and `MIRAI_*` environment variables, plus validation.

pub mod error;
pub mod loader;
pub mod schema;
pub mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigLoader, Profile, load_config, load_config_from_file};
pub use schema::{
    ConnectionConfig, IngestionConfig, IngestionMode, LogFormat, LogLevel, LogOutput,
    LoggingConfig, MiraiConfig, SpanEventConfig,
};
pub use validation::validate_config;
