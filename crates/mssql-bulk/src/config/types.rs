//! Configuration type definitions.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// SQL Server connection settings.
    pub connection: ConnectionConfig,

    /// Bulk write behavior.
    #[serde(default)]
    pub writer: WriterConfig,

    /// Read facade behavior.
    #[serde(default)]
    pub reader: ReaderConfig,
}

/// SQL Server connection configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Database host.
    pub host: String,

    /// Database port (default: 1433).
    #[serde(default = "default_mssql_port")]
    pub port: u16,

    /// Database name.
    pub database: String,

    /// Username.
    pub user: String,

    /// Password.
    #[serde(default)]
    pub password: String,

    /// Encrypt the connection (default: true).
    #[serde(default = "default_true")]
    pub encrypt: bool,

    /// Trust server certificate (default: false).
    #[serde(default)]
    pub trust_server_cert: bool,

    /// Application name reported to the server.
    #[serde(default = "default_application_name")]
    pub application_name: String,
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("encrypt", &self.encrypt)
            .field("trust_server_cert", &self.trust_server_cert)
            .field("application_name", &self.application_name)
            .finish()
    }
}

/// Bulk write configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriterConfig {
    /// Session-scoped staging table name (default: "#staging").
    #[serde(default = "default_staging_table")]
    pub staging_table: String,

    /// Include primary key columns in the upsert INSERT branch (default: true).
    /// Turn off for identity keys the server generates.
    #[serde(default = "default_true")]
    pub upsert_insert_primary_keys: bool,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            staging_table: default_staging_table(),
            upsert_insert_primary_keys: true,
        }
    }
}

/// Read facade configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReaderConfig {
    /// Total attempts before giving up (default: 3).
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,

    /// Base backoff between attempts; attempt `n` waits `n` times this (default: 200).
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Per-attempt timeout in seconds (default: 300).
    #[serde(default = "default_command_timeout_secs")]
    pub command_timeout_secs: u64,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            retry_count: default_retry_count(),
            retry_delay_ms: default_retry_delay_ms(),
            command_timeout_secs: default_command_timeout_secs(),
        }
    }
}

fn default_mssql_port() -> u16 {
    1433
}

fn default_true() -> bool {
    true
}

fn default_application_name() -> String {
    "mssql-bulk".to_string()
}

fn default_staging_table() -> String {
    "#staging".to_string()
}

fn default_retry_count() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    200
}

fn default_command_timeout_secs() -> u64 {
    300
}
