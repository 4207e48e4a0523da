//! Mapping from SQL Server catalog type names to buffer column types.

use crate::value::SqlNullType;

/// Map an MSSQL data type name to the buffer type used to carry its values.
///
/// Unknown and character types fall back to [`SqlNullType::String`].
pub fn mssql_to_buffer_type(data_type: &str) -> SqlNullType {
    match data_type.to_lowercase().as_str() {
        // Boolean
        "bit" => SqlNullType::Bool,

        // Integer types
        "tinyint" => SqlNullType::U8,
        "smallint" => SqlNullType::I16,
        "int" => SqlNullType::I32,
        "bigint" => SqlNullType::I64,

        // Exact numerics
        "decimal" | "numeric" | "money" | "smallmoney" => SqlNullType::Decimal,

        // Floating point
        "real" => SqlNullType::F32,
        "float" => SqlNullType::F64,

        // Binary types
        "binary" | "varbinary" | "image" | "timestamp" | "rowversion" => SqlNullType::Bytes,

        // Date/time types
        "date" => SqlNullType::Date,
        "time" => SqlNullType::Time,
        "datetime" | "datetime2" | "smalldatetime" => SqlNullType::DateTime,
        "datetimeoffset" => SqlNullType::DateTimeOffset,

        // GUID
        "uniqueidentifier" => SqlNullType::Uuid,

        _ => SqlNullType::String,
    }
}
