//! JSON input and output for the CLI.
//!
//! Input is a JSON array of objects, one per row. Keys are column names and
//! are matched to the destination columns case-insensitively; a missing key
//! or `null` is a NULL. Values are coerced to the catalog type of their
//! column.

use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use mssql_bulk::typemap::mssql_to_buffer_type;
use mssql_bulk::{
    BufferColumn, BulkError, ColumnDescriptor, Result, SqlNullType, SqlValue, TabularBuffer,
};
use rust_decimal::Decimal;
use serde_json::{Map, Value};
use uuid::Uuid;

/// Build a buffer from a JSON array of objects, typed by `columns`.
///
/// Buffer columns are the catalog columns mentioned by at least one row, in
/// catalog order.
pub fn json_to_buffer(json: &str, columns: &[ColumnDescriptor]) -> Result<TabularBuffer> {
    let value: Value = serde_json::from_str(json)?;
    let Value::Array(items) = value else {
        return Err(BulkError::Projection(
            "input must be a JSON array of objects".into(),
        ));
    };

    let mut objects = Vec::with_capacity(items.len());
    for (idx, item) in items.into_iter().enumerate() {
        match item {
            Value::Object(map) => objects.push(map),
            other => {
                return Err(BulkError::Projection(format!(
                    "row {}: expected an object, got {}",
                    idx, other
                )))
            }
        }
    }

    for (idx, object) in objects.iter().enumerate() {
        if let Some(key) = object
            .keys()
            .find(|k| !columns.iter().any(|c| c.name.eq_ignore_ascii_case(k)))
        {
            return Err(BulkError::Projection(format!(
                "row {}: unknown column {}",
                idx, key
            )));
        }
    }

    let selected: Vec<&ColumnDescriptor> = columns
        .iter()
        .filter(|c| objects.iter().any(|o| lookup(o, &c.name).is_some()))
        .collect();

    let buffer_columns = selected
        .iter()
        .map(|c| BufferColumn::new(c.name.clone(), mssql_to_buffer_type(&c.sql_type), c.nullable))
        .collect();
    let mut buffer = TabularBuffer::new(buffer_columns);

    for (idx, object) in objects.iter().enumerate() {
        let row = selected
            .iter()
            .map(|c| {
                let sql_type = mssql_to_buffer_type(&c.sql_type);
                match lookup(object, &c.name) {
                    None | Some(Value::Null) => Ok(SqlValue::Null(sql_type)),
                    Some(v) => coerce(v, sql_type).map_err(|msg| {
                        BulkError::Projection(format!("row {}: column {}: {}", idx, c.name, msg))
                    }),
                }
            })
            .collect::<Result<Vec<_>>>()?;
        buffer.push_row(row)?;
    }

    Ok(buffer)
}

fn lookup<'a>(object: &'a Map<String, Value>, name: &str) -> Option<&'a Value> {
    object
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v)
}

/// Coerce one JSON value to a column type.
fn coerce(value: &Value, sql_type: SqlNullType) -> std::result::Result<SqlValue, String> {
    let text = match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };

    match sql_type {
        SqlNullType::Bool => match value {
            Value::Bool(b) => Ok(SqlValue::Bool(*b)),
            _ => match text.to_lowercase().as_str() {
                "true" | "1" => Ok(SqlValue::Bool(true)),
                "false" | "0" => Ok(SqlValue::Bool(false)),
                _ => Err(format!("expected a boolean, got {}", text)),
            },
        },
        SqlNullType::U8 => parse(&text).map(SqlValue::U8),
        SqlNullType::I16 => parse(&text).map(SqlValue::I16),
        SqlNullType::I32 => parse(&text).map(SqlValue::I32),
        SqlNullType::I64 => parse(&text).map(SqlValue::I64),
        SqlNullType::F32 => parse(&text).map(SqlValue::F32),
        SqlNullType::F64 => parse(&text).map(SqlValue::F64),
        SqlNullType::Decimal => Decimal::from_str(&text)
            .or_else(|_| Decimal::from_scientific(&text))
            .map(SqlValue::Decimal)
            .map_err(|e| format!("invalid decimal {}: {}", text, e)),
        SqlNullType::String => Ok(SqlValue::Text(text)),
        SqlNullType::Bytes => decode_hex(&text).map(SqlValue::Bytes),
        SqlNullType::Uuid => Uuid::parse_str(&text)
            .map(SqlValue::Uuid)
            .map_err(|e| format!("invalid uuid {}: {}", text, e)),
        SqlNullType::DateTime => parse_datetime(&text).map(SqlValue::DateTime),
        SqlNullType::DateTimeOffset => DateTime::parse_from_rfc3339(&text)
            .map(SqlValue::DateTimeOffset)
            .map_err(|e| format!("invalid datetimeoffset {}: {}", text, e)),
        SqlNullType::Date => NaiveDate::parse_from_str(&text, "%Y-%m-%d")
            .map(SqlValue::Date)
            .map_err(|e| format!("invalid date {}: {}", text, e)),
        SqlNullType::Time => NaiveTime::parse_from_str(&text, "%H:%M:%S%.f")
            .map(SqlValue::Time)
            .map_err(|e| format!("invalid time {}: {}", text, e)),
    }
}

fn parse<T: FromStr>(text: &str) -> std::result::Result<T, String>
where
    T::Err: std::fmt::Display,
{
    text.trim()
        .parse::<T>()
        .map_err(|e| format!("invalid number {}: {}", text, e))
}

fn parse_datetime(text: &str) -> std::result::Result<NaiveDateTime, String> {
    const FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];
    FORMATS
        .iter()
        .find_map(|f| NaiveDateTime::parse_from_str(text, f).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(text, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
        .ok_or_else(|| format!("invalid datetime {}", text))
}

/// Hex string, with or without a `0x` prefix.
fn decode_hex(text: &str) -> std::result::Result<Vec<u8>, String> {
    let digits = text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
        .unwrap_or(text);
    hex::decode(digits).map_err(|e| format!("invalid hex string {}: {}", text, e))
}

/// Render a buffer as a JSON array of objects.
pub fn buffer_to_json(buffer: &TabularBuffer) -> Value {
    let rows = buffer
        .rows()
        .iter()
        .map(|row| {
            let object = buffer
                .columns()
                .iter()
                .zip(row)
                .map(|(c, v)| (c.name.clone(), value_to_json(v)))
                .collect::<Map<_, _>>();
            Value::Object(object)
        })
        .collect();
    Value::Array(rows)
}

fn value_to_json(value: &SqlValue) -> Value {
    match value {
        SqlValue::Null(_) => Value::Null,
        SqlValue::Bool(b) => Value::Bool(*b),
        SqlValue::U8(v) => Value::from(*v),
        SqlValue::I16(v) => Value::from(*v),
        SqlValue::I32(v) => Value::from(*v),
        SqlValue::I64(v) => Value::from(*v),
        SqlValue::F32(v) => Value::from(f64::from(*v)),
        SqlValue::F64(v) => Value::from(*v),
        other => other.to_text().map_or(Value::Null, Value::String),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn people() -> Vec<ColumnDescriptor> {
        vec![
            ColumnDescriptor::new("Id", "int", false),
            ColumnDescriptor::new("Name", "nvarchar", true).with_max_length(50),
            ColumnDescriptor::new("Score", "decimal", true).with_precision(5, 2),
            ColumnDescriptor::new("Born", "date", true),
            ColumnDescriptor::new("Active", "bit", true),
        ]
    }

    #[test]
    fn test_columns_follow_catalog_order() {
        let json = r#"[{"score": "12.50", "id": 1}, {"ID": 2, "Name": "Bo"}]"#;
        let buffer = json_to_buffer(json, &people()).unwrap();
        let names: Vec<_> = buffer.columns().iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Id", "Name", "Score"]);
        assert_eq!(buffer.len(), 2);
        assert_eq!(buffer.value(0, "Name"), Some(&SqlValue::Null(SqlNullType::String)));
        assert_eq!(
            buffer.value(0, "Score"),
            Some(&SqlValue::Decimal(Decimal::new(1250, 2)))
        );
    }

    #[test]
    fn test_values_are_coerced_to_catalog_types() {
        let json = r#"[{"Id": "7", "Born": "2001-02-03", "Active": 1}]"#;
        let buffer = json_to_buffer(json, &people()).unwrap();
        assert_eq!(buffer.value(0, "Id"), Some(&SqlValue::I32(7)));
        assert_eq!(
            buffer.value(0, "Born"),
            Some(&SqlValue::Date(NaiveDate::from_ymd_opt(2001, 2, 3).unwrap()))
        );
        assert_eq!(buffer.value(0, "Active"), Some(&SqlValue::Bool(true)));
    }

    #[test]
    fn test_unknown_column_rejected() {
        let err = json_to_buffer(r#"[{"Id": 1, "Nickname": "x"}]"#, &people()).unwrap_err();
        assert!(err.to_string().contains("unknown column Nickname"));
    }

    #[test]
    fn test_null_in_not_null_column_rejected() {
        let err = json_to_buffer(r#"[{"Id": null, "Name": "x"}]"#, &people()).unwrap_err();
        assert!(matches!(err, BulkError::Projection(_)));
    }

    #[test]
    fn test_non_array_input_rejected() {
        assert!(json_to_buffer(r#"{"Id": 1}"#, &people()).is_err());
        assert!(json_to_buffer(r#"[1, 2]"#, &people()).is_err());
    }

    #[test]
    fn test_decode_hex() {
        assert_eq!(decode_hex("0xCAFE").unwrap(), vec![0xca, 0xfe]);
        assert_eq!(decode_hex("00ff").unwrap(), vec![0x00, 0xff]);
        assert!(decode_hex("abc").is_err());
        assert!(decode_hex("0xzz").is_err());
        assert!(decode_hex("é1").is_err());
    }

    #[test]
    fn test_buffer_to_json() {
        let buffer = json_to_buffer(r#"[{"Id": 1, "Name": "Ann"}]"#, &people()).unwrap();
        let json = buffer_to_json(&buffer);
        assert_eq!(json, serde_json::json!([{"Id": 1, "Name": "Ann"}]));
    }
}
