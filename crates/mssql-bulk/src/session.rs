//! Connection and session abstractions consumed by the writer and reader.
//!
//! - [`Connector`]: opens a fresh [`Session`] (connection factory + open)
//! - [`Session`]: one open connection; runs statements and catalog queries
//!   and streams a [`TabularBuffer`] with the server's bulk copy
//!
//! [`MssqlConnector`](crate::mssql::MssqlConnector) is the SQL Server
//! implementation. Tests substitute in-memory sessions.

use async_trait::async_trait;

use crate::buffer::TabularBuffer;
use crate::error::{BulkError, Result};
use crate::value::{SqlNullType, SqlValue};

/// Opens sessions against a database.
#[async_trait]
pub trait Connector: Send + Sync {
    type Session: Session;

    /// Open a new session. The caller owns it until [`Session::close`].
    async fn connect(&self) -> Result<Self::Session>;
}

/// One open database connection.
///
/// Session-scoped objects such as `#temp` tables live exactly as long as the
/// session does.
#[async_trait]
pub trait Session: Send {
    /// Execute a statement that returns no rows. Returns rows affected.
    async fn execute(&mut self, sql: &str) -> Result<u64>;

    /// Run a query and materialize its first result set.
    async fn query(&mut self, sql: &str) -> Result<RowSet>;

    /// Copy all buffer rows into a table with the server's bulk load.
    async fn bulk_copy(&mut self, buffer: &TabularBuffer, options: &BulkCopyOptions)
        -> Result<u64>;

    /// Release the connection.
    async fn close(self) -> Result<()>
    where
        Self: Sized;
}

/// Bulk copy settings for one [`Session::bulk_copy`] call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BulkCopyOptions {
    /// Destination table. Falls back to the buffer name when unset.
    pub destination_table: Option<String>,
    /// Rows per round trip. `None` sends everything in one load.
    pub batch_size: Option<usize>,
}

impl BulkCopyOptions {
    pub fn to_table(table: impl Into<String>) -> Self {
        Self {
            destination_table: Some(table.into()),
            batch_size: None,
        }
    }

    #[must_use]
    pub fn with_batch_size(mut self, batch_size: Option<usize>) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Resolve the destination: explicit table, else the buffer name.
    pub fn destination<'a>(&'a self, buffer: &'a TabularBuffer) -> Result<&'a str> {
        self.destination_table
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .or_else(|| buffer.name().filter(|n| !n.trim().is_empty()))
            .ok_or_else(|| {
                BulkError::argument("destination_table", "cannot be null or empty")
            })
    }
}

/// Result column metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowColumn {
    pub name: String,
    pub sql_type: SqlNullType,
}

/// A materialized query result.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowSet {
    columns: Vec<RowColumn>,
    rows: Vec<Vec<SqlValue>>,
}

impl RowSet {
    pub fn new(columns: Vec<RowColumn>, rows: Vec<Vec<SqlValue>>) -> Self {
        Self { columns, rows }
    }

    pub fn columns(&self) -> &[RowColumn] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Iterate rows in result order.
    pub fn iter(&self) -> impl Iterator<Item = RowRef<'_>> {
        self.rows.iter().map(move |values| RowRef {
            columns: &self.columns,
            values,
        })
    }

    pub fn into_parts(self) -> (Vec<RowColumn>, Vec<Vec<SqlValue>>) {
        (self.columns, self.rows)
    }
}

/// Borrowed view of one result row.
#[derive(Debug, Clone, Copy)]
pub struct RowRef<'a> {
    columns: &'a [RowColumn],
    values: &'a [SqlValue],
}

impl<'a> RowRef<'a> {
    /// Value of a column by name (case-insensitive).
    pub fn get(&self, name: &str) -> Option<&'a SqlValue> {
        self.columns
            .iter()
            .position(|c| c.name.eq_ignore_ascii_case(name))
            .and_then(|idx| self.values.get(idx))
    }

    /// Text form of a column value; `None` when missing or NULL.
    pub fn text(&self, name: &str) -> Option<String> {
        self.get(name).and_then(SqlValue::to_text)
    }
}
