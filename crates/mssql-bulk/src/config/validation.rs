//! Configuration validation.

use super::{Config, WriterConfig};
use crate::error::{BulkError, Result};

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    let conn = &config.connection;
    if conn.host.is_empty() {
        return Err(BulkError::Config("connection.host is required".into()));
    }
    if conn.database.is_empty() {
        return Err(BulkError::Config("connection.database is required".into()));
    }
    if conn.user.is_empty() {
        return Err(BulkError::Config("connection.user is required".into()));
    }
    if conn.port == 0 {
        return Err(BulkError::Config("connection.port must be non-zero".into()));
    }

    validate_writer(&config.writer)?;

    if config.reader.retry_count == 0 {
        return Err(BulkError::Config(
            "reader.retry_count must be at least 1".into(),
        ));
    }
    if config.reader.command_timeout_secs == 0 {
        return Err(BulkError::Config(
            "reader.command_timeout_secs must be at least 1".into(),
        ));
    }

    Ok(())
}

/// Validate the writer settings on their own.
pub fn validate_writer(writer: &WriterConfig) -> Result<()> {
    // Only session-scoped tables are dropped by the server on close.
    let staging = &writer.staging_table;
    if !staging.starts_with('#') || staging.len() < 2 {
        return Err(BulkError::Config(format!(
            "writer.staging_table must be a #temp table name, got '{}'",
            staging
        )));
    }
    if staging.chars().any(char::is_whitespace) {
        return Err(BulkError::Config(format!(
            "writer.staging_table must not contain whitespace, got '{}'",
            staging
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConnectionConfig, ReaderConfig, WriterConfig};

    fn valid_config() -> Config {
        Config {
            connection: ConnectionConfig {
                host: "localhost".to_string(),
                port: 1433,
                database: "school".to_string(),
                user: "sa".to_string(),
                password: "password".to_string(),
                encrypt: false,
                trust_server_cert: true,
                application_name: "mssql-bulk".to_string(),
            },
            writer: WriterConfig::default(),
            reader: ReaderConfig::default(),
        }
    }

    #[test]
    fn test_valid_config() {
        let config = valid_config();
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_missing_host() {
        let mut config = valid_config();
        config.connection.host = "".to_string();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_staging_table_must_be_temp() {
        let mut config = valid_config();
        config.writer.staging_table = "Staging".to_string();
        assert!(validate(&config).is_err());
        config.writer.staging_table = "#".to_string();
        assert!(validate(&config).is_err());
        config.writer.staging_table = "#Temp Table".to_string();
        assert!(validate(&config).is_err());
        config.writer.staging_table = "#TempTable".to_string();
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_zero_retries_rejected() {
        let mut config = valid_config();
        config.reader.retry_count = 0;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_connection_config_debug_redacts_password() {
        let mut config = valid_config();
        config.connection.password = "super_secret_password_123".to_string();
        let debug_output = format!("{:?}", config.connection);
        assert!(
            debug_output.contains("[REDACTED]"),
            "Debug output should contain [REDACTED]"
        );
        assert!(
            !debug_output.contains("super_secret_password_123"),
            "Debug output should not contain actual password value"
        );
    }
}
