//! Error types for bulk write operations.

use std::fmt;

use thiserror::Error;

/// Pipeline phase in which a statement failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Creating the staging table.
    Staging,
    /// Streaming rows with the bulk copier.
    Copy,
    /// Running the final INSERT/UPDATE/MERGE/DELETE.
    Final,
    /// Read-path query.
    Read,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Staging => "staging table creation",
            Phase::Copy => "bulk copy",
            Phase::Final => "final statement",
            Phase::Read => "read query",
        };
        f.write_str(name)
    }
}

/// Main error type for bulk operations.
#[derive(Error, Debug)]
pub enum BulkError {
    /// Invalid caller input (missing match fields, empty keys, ...).
    #[error("Invalid argument `{name}`: {message}")]
    Argument { name: String, message: String },

    /// Configuration error (invalid YAML, missing fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Opening or closing a session failed.
    #[error("Connection error: {message}\n  Context: {context}")]
    Connection { message: String, context: String },

    /// Catalog query failed or returned an unusable shape.
    #[error("Schema introspection failed for table {table}: {message}")]
    SchemaIntrospection { table: String, message: String },

    /// A statement failed at the store.
    #[error("{phase} failed for table {table}: {message}")]
    Statement {
        phase: Phase,
        table: String,
        message: String,
    },

    /// Records could not be projected into a tabular buffer.
    #[error("Projection error: {0}")]
    Projection(String),

    /// The read facade gave up after its retry budget.
    #[error("Failed calls to database exceeded allowed retries ({attempts})")]
    RetriesExceeded {
        attempts: u32,
        #[source]
        source: Box<BulkError>,
    },

    /// Raw driver error.
    #[error("Database error: {0}")]
    Database(#[from] tiberius::error::Error),

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl BulkError {
    /// Create an Argument error.
    pub fn argument(name: impl Into<String>, message: impl Into<String>) -> Self {
        BulkError::Argument {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Create a Connection error with context about where it occurred.
    pub fn connection(message: impl fmt::Display, context: impl Into<String>) -> Self {
        BulkError::Connection {
            message: message.to_string(),
            context: context.into(),
        }
    }

    /// Create a SchemaIntrospection error.
    pub fn introspection(table: impl Into<String>, message: impl fmt::Display) -> Self {
        BulkError::SchemaIntrospection {
            table: table.into(),
            message: message.to_string(),
        }
    }

    /// Create a Statement error for the given phase.
    pub fn statement(phase: Phase, table: impl Into<String>, message: impl fmt::Display) -> Self {
        BulkError::Statement {
            phase,
            table: table.into(),
            message: message.to_string(),
        }
    }

    /// Whether the read facade may retry after this error.
    ///
    /// Only store-side failures qualify; caller mistakes never do.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            BulkError::Database(_)
                | BulkError::Connection { .. }
                | BulkError::Statement { .. }
                | BulkError::Io(_)
        )
    }

    /// Process exit code for the CLI.
    pub fn exit_code(&self) -> u8 {
        match self {
            BulkError::Argument { .. }
            | BulkError::Config(_)
            | BulkError::Yaml(_)
            | BulkError::Json(_) => 1,
            BulkError::Connection { .. } => 2,
            BulkError::SchemaIntrospection { .. } => 3,
            BulkError::Statement { .. } | BulkError::Database(_) => 4,
            BulkError::Projection(_) => 5,
            BulkError::RetriesExceeded { .. } => 6,
            BulkError::Io(_) => 7,
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for bulk operations.
pub type Result<T> = std::result::Result<T, BulkError>;
