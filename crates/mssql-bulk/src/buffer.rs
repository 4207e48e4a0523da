//! In-memory tabular buffer handed to the bulk copier.

use serde::Serialize;

use crate::error::{BulkError, Result};
use crate::value::{SqlNullType, SqlValue};

/// One declared buffer column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BufferColumn {
    pub name: String,
    pub sql_type: SqlNullType,
    pub nullable: bool,
}

impl BufferColumn {
    pub fn new(name: impl Into<String>, sql_type: SqlNullType, nullable: bool) -> Self {
        Self {
            name: name.into(),
            sql_type,
            nullable,
        }
    }
}

/// Ordered named columns plus ordered rows of values.
///
/// The column set is fixed at construction. [`push_row`](Self::push_row)
/// rejects rows whose arity, types, or nullability disagree with it, so every
/// stored row holds exactly one value per column.
#[derive(Debug, Clone, PartialEq)]
pub struct TabularBuffer {
    name: Option<String>,
    columns: Vec<BufferColumn>,
    rows: Vec<Vec<SqlValue>>,
}

impl TabularBuffer {
    /// Create an empty buffer with the given columns.
    pub fn new(columns: Vec<BufferColumn>) -> Self {
        Self {
            name: None,
            columns,
            rows: Vec::new(),
        }
    }

    /// Set the buffer name, used as a fallback bulk copy destination.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn columns(&self) -> &[BufferColumn] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<SqlValue>] {
        &self.rows
    }

    /// Number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Position of a column, matched case-insensitively.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// Append a row after checking it against the declared columns.
    pub fn push_row(&mut self, row: Vec<SqlValue>) -> Result<()> {
        if row.len() != self.columns.len() {
            return Err(BulkError::Projection(format!(
                "row {} has {} values but the buffer declares {} columns",
                self.rows.len(),
                row.len(),
                self.columns.len()
            )));
        }

        for (column, value) in self.columns.iter().zip(&row) {
            if value.null_type() != column.sql_type {
                return Err(BulkError::Projection(format!(
                    "row {}: column {} expects {:?}, got {:?}",
                    self.rows.len(),
                    column.name,
                    column.sql_type,
                    value.null_type()
                )));
            }
            if value.is_null() && !column.nullable {
                return Err(BulkError::Projection(format!(
                    "row {}: column {} is not nullable",
                    self.rows.len(),
                    column.name
                )));
            }
        }

        self.rows.push(row);
        Ok(())
    }

    /// Values of one column, top to bottom.
    pub fn column_values(&self, name: &str) -> Option<impl Iterator<Item = &SqlValue>> {
        let idx = self.column_index(name)?;
        Some(self.rows.iter().map(move |row| &row[idx]))
    }

    /// Single cell by row index and column name.
    pub fn value(&self, row: usize, column: &str) -> Option<&SqlValue> {
        let idx = self.column_index(column)?;
        self.rows.get(row).map(|r| &r[idx])
    }
}
