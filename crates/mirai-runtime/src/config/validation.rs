//! Configuration validation utilities.

use super::error::{ConfigError, ConfigResult};
use super::schema::{ConnectionConfig, IngestionConfig, LogOutput, LoggingConfig, MiraiConfig};

/// Validates the entire configuration.
pub fn validate_config(config: &MiraiConfig) -> ConfigResult<()> {
    validate_connection(&config.connection)?;
    validate_ingestion(&config.ingestion)?;
    validate_logging(&config.logging)?;
    Ok(())
}

fn validate_connection(connection: &ConnectionConfig) -> ConfigResult<()> {
    if connection.verify_key.is_empty() {
        return Err(ConfigError::missing_field("connection.verify_key"));
    }

    if connection.qq <= 0 {
        return Err(ConfigError::missing_field("connection.qq"));
    }

    validate_url(&connection.base_url)?;

    if connection.timeout_secs == 0 {
        return Err(ConfigError::validation("Timeout must be greater than 0"));
    }

    Ok(())
}

fn validate_ingestion(ingestion: &IngestionConfig) -> ConfigResult<()> {
    if ingestion.poll_batch_size == 0 {
        return Err(ConfigError::validation(
            "Poll batch size must be greater than 0",
        ));
    }

    if ingestion.reconnect_delay_secs == 0 {
        return Err(ConfigError::validation(
            "Reconnect delay must be greater than 0",
        ));
    }

    if ingestion.channel_capacity == 0 {
        return Err(ConfigError::validation(
            "Channel capacity must be greater than 0",
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> ConfigResult<()> {
    if logging.output == LogOutput::File && logging.file_path.is_none() {
        return Err(ConfigError::missing_field("logging.file_path"));
    }
    Ok(())
}

/// Validates the server base url.
fn validate_url(url: &str) -> ConfigResult<()> {
    if url.is_empty() {
        return Err(ConfigError::missing_field("connection.base_url"));
    }

    let valid_schemes = ["http://", "https://"];
    if !valid_schemes.iter().any(|s| url.starts_with(s)) {
        return Err(ConfigError::invalid_url(
            url,
            format!("URL must start with one of: {valid_schemes:?}"),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> MiraiConfig {
        let mut config = MiraiConfig::default();
        config.connection.verify_key = "INITKEY".to_string();
        config.connection.qq = 10001;
        config
    }

    #[test]
    fn test_validate_minimal_config() {
        assert!(validate_config(&valid()).is_ok());
    }

    #[test]
    fn test_defaults_lack_credentials() {
        let result = validate_config(&MiraiConfig::default());
        assert!(matches!(result, Err(ConfigError::MissingField { .. })));

        let mut config = valid();
        config.connection.qq = 0;
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::MissingField { field }) if field == "connection.qq"
        ));
    }

    #[test]
    fn test_validate_base_url_scheme() {
        let mut config = valid();
        config.connection.base_url = "ws://127.0.0.1:8080".to_string();
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::InvalidUrl { .. })
        ));
    }

    #[test]
    fn test_validate_zero_values() {
        let mut config = valid();
        config.connection.timeout_secs = 0;
        assert!(validate_config(&config).is_err());

        let mut config = valid();
        config.ingestion.poll_batch_size = 0;
        assert!(validate_config(&config).is_err());

        let mut config = valid();
        config.ingestion.reconnect_delay_secs = 0;
        assert!(validate_config(&config).is_err());

        let mut config = valid();
        config.ingestion.channel_capacity = 0;
        assert!(validate_config(&config).is_err());

        let mut config = valid();
        config.ingestion.heartbeat_interval_secs = 0;
        assert!(validate_config(&config).is_ok());
        assert_eq!(config.ingestion.heartbeat(), None);
    }

    #[test]
    fn test_file_output_needs_path() {
        let mut config = valid();
        config.logging.output = LogOutput::File;
        assert!(validate_config(&config).is_err());

        config.logging.file_path = Some("mirai.log".into());
        assert!(validate_config(&config).is_ok());
    }
}
