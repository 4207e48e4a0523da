//! Destination table introspection through `information_schema.columns`.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{BulkError, Result};
use crate::session::{RowRef, Session};

/// Column metadata as reported by the catalog.
///
/// Field order in a `Vec<ColumnDescriptor>` is the catalog return order and
/// becomes the staging table's column order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    /// Column name.
    pub name: String,

    /// Declared type name (e.g. `varchar`, `decimal`).
    pub sql_type: String,

    /// Whether NULL is allowed.
    pub nullable: bool,

    /// Character maximum length; `-1` means unbounded.
    pub max_length: Option<i32>,

    /// Numeric precision.
    pub numeric_precision: Option<i32>,

    /// Numeric scale.
    pub numeric_scale: Option<i32>,
}

impl ColumnDescriptor {
    /// Descriptor for a column without length or precision.
    pub fn new(name: impl Into<String>, sql_type: impl Into<String>, nullable: bool) -> Self {
        Self {
            name: name.into(),
            sql_type: sql_type.into(),
            nullable,
            max_length: None,
            numeric_precision: None,
            numeric_scale: None,
        }
    }

    #[must_use]
    pub fn with_max_length(mut self, max_length: i32) -> Self {
        self.max_length = Some(max_length);
        self
    }

    #[must_use]
    pub fn with_precision(mut self, precision: i32, scale: i32) -> Self {
        self.numeric_precision = Some(precision);
        self.numeric_scale = Some(scale);
        self
    }

    /// Build a descriptor from one `information_schema.columns` row.
    pub fn from_catalog_row(table: &str, row: &RowRef<'_>) -> Result<Self> {
        let name = row
            .text("COLUMN_NAME")
            .filter(|n| !n.is_empty())
            .ok_or_else(|| BulkError::introspection(table, "missing COLUMN_NAME"))?;
        let sql_type = row
            .text("DATA_TYPE")
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                BulkError::introspection(table, format!("missing DATA_TYPE for column {}", name))
            })?;
        let nullable = row.text("IS_NULLABLE").as_deref() == Some("YES");

        Ok(Self {
            max_length: catalog_int(table, &name, row, "CHARACTER_MAXIMUM_LENGTH")?,
            numeric_precision: catalog_int(table, &name, row, "NUMERIC_PRECISION")?,
            numeric_scale: catalog_int(table, &name, row, "NUMERIC_SCALE")?,
            name,
            sql_type,
            nullable,
        })
    }
}

/// Parse an optional integer catalog field from its text form.
fn catalog_int(table: &str, column: &str, row: &RowRef<'_>, field: &str) -> Result<Option<i32>> {
    match row.text(field) {
        None => Ok(None),
        Some(text) if text.trim().is_empty() => Ok(None),
        Some(text) => text.trim().parse::<i32>().map(Some).map_err(|_| {
            BulkError::introspection(
                table,
                format!("{} of column {} is not an integer: {:?}", field, column, text),
            )
        }),
    }
}

/// Catalog query for a table's columns.
///
/// The table name is embedded as a string literal; embedded quotes are
/// doubled.
pub fn columns_query(table: &str) -> String {
    format!(
        "SELECT * FROM information_schema.columns WHERE table_name = '{}'",
        table.replace('\'', "''")
    )
}

/// Describe a table's columns in catalog order.
///
/// An unknown table yields an empty list; callers that need columns decide
/// whether that is an error.
pub async fn describe_columns<S>(session: &mut S, table: &str) -> Result<Vec<ColumnDescriptor>>
where
    S: Session + ?Sized,
{
    let query = columns_query(table);
    debug!("Describing columns of {}", table);

    let rows = session
        .query(&query)
        .await
        .map_err(|e| BulkError::introspection(table, format!("querying catalog: {}", e)))?;

    let columns = rows
        .iter()
        .map(|row| ColumnDescriptor::from_catalog_row(table, &row))
        .collect::<Result<Vec<_>>>()?;

    debug!("Loaded {} columns for {}", columns.len(), table);
    Ok(columns)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{RowColumn, RowSet};
    use crate::value::{SqlNullType, SqlValue};

    fn catalog(rows: Vec<Vec<SqlValue>>) -> RowSet {
        let columns = [
            ("COLUMN_NAME", SqlNullType::String),
            ("DATA_TYPE", SqlNullType::String),
            ("IS_NULLABLE", SqlNullType::String),
            ("CHARACTER_MAXIMUM_LENGTH", SqlNullType::I32),
            ("NUMERIC_PRECISION", SqlNullType::U8),
            ("NUMERIC_SCALE", SqlNullType::I32),
        ]
        .into_iter()
        .map(|(name, sql_type)| RowColumn {
            name: name.to_string(),
            sql_type,
        })
        .collect();
        RowSet::new(columns, rows)
    }

    fn text(s: &str) -> SqlValue {
        SqlValue::Text(s.to_string())
    }

    #[test]
    fn test_columns_query_is_literal() {
        assert_eq!(
            columns_query("Students"),
            "SELECT * FROM information_schema.columns WHERE table_name = 'Students'"
        );
        assert_eq!(
            columns_query("O'Brien"),
            "SELECT * FROM information_schema.columns WHERE table_name = 'O''Brien'"
        );
    }

    #[test]
    fn test_from_catalog_row_reads_numeric_fields() {
        let set = catalog(vec![vec![
            text("TestScore"),
            text("decimal"),
            text("NO"),
            SqlValue::Null(SqlNullType::I32),
            SqlValue::U8(10),
            SqlValue::I32(2),
        ]]);
        let row = set.iter().next().unwrap();
        let col = ColumnDescriptor::from_catalog_row("Students", &row).unwrap();
        assert_eq!(
            col,
            ColumnDescriptor::new("TestScore", "decimal", false).with_precision(10, 2)
        );
    }

    #[test]
    fn test_from_catalog_row_nullable_flag() {
        let set = catalog(vec![vec![
            text("Notes"),
            text("varchar"),
            text("YES"),
            SqlValue::I32(-1),
            SqlValue::Null(SqlNullType::U8),
            SqlValue::Null(SqlNullType::I32),
        ]]);
        let row = set.iter().next().unwrap();
        let col = ColumnDescriptor::from_catalog_row("Students", &row).unwrap();
        assert!(col.nullable);
        assert_eq!(col.max_length, Some(-1));
        assert_eq!(col.numeric_precision, None);
    }

    #[test]
    fn test_from_catalog_row_rejects_garbage_length() {
        let set = catalog(vec![vec![
            text("Notes"),
            text("varchar"),
            text("YES"),
            text("lots"),
            SqlValue::Null(SqlNullType::U8),
            SqlValue::Null(SqlNullType::I32),
        ]]);
        let row = set.iter().next().unwrap();
        let err = ColumnDescriptor::from_catalog_row("Students", &row).unwrap_err();
        assert!(matches!(err, BulkError::SchemaIntrospection { .. }));
    }
}
