//! SQL Server sessions over tiberius.
//!
//! Statements go out as plain SQL batches (`simple_query`), never through
//! `sp_executesql`: a `#temp` table created inside `sp_executesql` is dropped
//! when that call returns, and the staging table has to survive until the
//! final statement runs.

use std::borrow::Cow;
use std::collections::HashMap;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use tiberius::numeric::Numeric;
use tiberius::xml::XmlData;
use uuid::Uuid;
use tiberius::{
    AuthMethod, Client, Column, ColumnData, ColumnType, Config, EncryptionLevel, FromSql, TokenRow,
};
use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};
use tracing::{debug, warn};

use crate::buffer::TabularBuffer;
use crate::config::ConnectionConfig;
use crate::error::{BulkError, Result};
use crate::session::{BulkCopyOptions, Connector, RowColumn, RowSet, Session};
use crate::value::{SqlNullType, SqlValue};

type TiberiusClient = Client<Compat<TcpStream>>;

/// Opens [`MssqlSession`]s from a [`ConnectionConfig`].
#[derive(Debug, Clone)]
pub struct MssqlConnector {
    config: ConnectionConfig,
}

impl MssqlConnector {
    pub fn new(config: ConnectionConfig) -> Self {
        Self { config }
    }

    fn build_config(&self) -> Config {
        let mut config = Config::new();
        config.host(&self.config.host);
        config.port(self.config.port);
        config.database(&self.config.database);
        config.application_name(&self.config.application_name);
        config.authentication(AuthMethod::sql_server(
            &self.config.user,
            &self.config.password,
        ));

        if self.config.trust_server_cert {
            config.trust_cert();
        }
        if self.config.encrypt {
            config.encryption(EncryptionLevel::Required);
        } else {
            config.encryption(EncryptionLevel::NotSupported);
        }

        config
    }
}

#[async_trait]
impl Connector for MssqlConnector {
    type Session = MssqlSession;

    async fn connect(&self) -> Result<MssqlSession> {
        let config = self.build_config();
        let addr = config.get_addr();
        let context = format!("connecting to {}/{}", addr, self.config.database);

        let tcp = TcpStream::connect(&addr)
            .await
            .map_err(|e| BulkError::connection(e, context.clone()))?;
        tcp.set_nodelay(true).ok();

        let client = Client::connect(config, tcp.compat_write())
            .await
            .map_err(|e| BulkError::connection(e, context))?;
        debug!("Opened session to {}/{}", addr, self.config.database);

        Ok(MssqlSession { client })
    }
}

/// One open SQL Server connection.
pub struct MssqlSession {
    client: TiberiusClient,
}

/// A destination column as `SELECT TOP 0 *` and the catalog describe it.
#[derive(Debug, Clone)]
struct DestinationColumn {
    name: String,
    column_type: ColumnType,
    max_length: Option<i16>,
    scale: Option<u8>,
    generated: bool,
}

/// Per-column catalog facts the wire metadata does not carry.
#[derive(Debug, Clone, Copy)]
struct CatalogColumn {
    scale: u8,
    max_length: i16,
    generated: bool,
}

/// `sys.columns.system_type_id` of `timestamp`/`rowversion`.
const ROWVERSION_TYPE_ID: u8 = 189;

impl MssqlSession {
    /// Destination columns in table order.
    async fn destination_columns(&mut self, table: &str) -> Result<Vec<DestinationColumn>> {
        let mut stream = self
            .client
            .simple_query(format!("SELECT TOP 0 * FROM {}", table))
            .await?;
        let columns: Vec<Column> = stream
            .columns()
            .await?
            .map(|c| c.to_vec())
            .unwrap_or_default();
        stream.into_results().await?;

        let catalog = self.catalog_columns(table).await?;
        Ok(columns
            .into_iter()
            .map(|c| {
                let facts = catalog.get(&c.name().to_lowercase());
                DestinationColumn {
                    name: c.name().to_string(),
                    column_type: c.column_type(),
                    max_length: facts.map(|f| f.max_length),
                    scale: facts.map(|f| f.scale),
                    generated: facts.is_some_and(|f| f.generated),
                }
            })
            .collect())
    }

    /// Declared scale, storage size and generated flag of every column.
    ///
    /// Identity, computed and rowversion columns are filled in by the
    /// server; a bulk load carries no values for them.
    async fn catalog_columns(&mut self, table: &str) -> Result<HashMap<String, CatalogColumn>> {
        let (catalog, object) = if table.starts_with('#') {
            ("tempdb.sys.columns", format!("tempdb..{}", table))
        } else {
            ("sys.columns", table.to_string())
        };
        let sql = format!(
            "SELECT name, scale, max_length, is_identity, is_computed, system_type_id \
             FROM {} WHERE object_id = OBJECT_ID(N'{}')",
            catalog,
            object.replace('\'', "''")
        );

        let rows = self
            .client
            .simple_query(sql)
            .await?
            .into_first_result()
            .await?;
        let mut columns = HashMap::with_capacity(rows.len());
        for row in rows {
            let Some(name) = row.get::<&str, _>(0) else {
                continue;
            };
            let identity: bool = row.get(3).unwrap_or(false);
            let computed: bool = row.get(4).unwrap_or(false);
            let type_id: u8 = row.get(5).unwrap_or(0);
            columns.insert(
                name.to_lowercase(),
                CatalogColumn {
                    scale: row.get(1).unwrap_or(0),
                    max_length: row.get(2).unwrap_or(0),
                    generated: identity || computed || type_id == ROWVERSION_TYPE_ID,
                },
            );
        }
        Ok(columns)
    }
}

#[async_trait]
impl Session for MssqlSession {
    async fn execute(&mut self, sql: &str) -> Result<u64> {
        let batch = format!("{}\nSELECT CAST(@@ROWCOUNT AS BIGINT)", sql.trim_end());
        let results = self.client.simple_query(batch).await?.into_results().await?;

        let affected = results
            .into_iter()
            .flatten()
            .last()
            .and_then(|row| row.get::<i64, _>(0))
            .unwrap_or(0);
        Ok(u64::try_from(affected).unwrap_or(0))
    }

    async fn query(&mut self, sql: &str) -> Result<RowSet> {
        let mut stream = self.client.simple_query(sql).await?;
        let columns: Vec<Column> = stream
            .columns()
            .await?
            .map(|c| c.to_vec())
            .unwrap_or_default();
        let rows = stream.into_first_result().await?;

        let mut values = Vec::with_capacity(rows.len());
        for row in rows {
            let converted = row
                .into_iter()
                .map(column_data_to_sql_value)
                .collect::<Result<Vec<_>>>()?;
            values.push(converted);
        }

        Ok(normalize_result(&columns, values))
    }

    async fn bulk_copy(
        &mut self,
        buffer: &TabularBuffer,
        options: &BulkCopyOptions,
    ) -> Result<u64> {
        let destination = options.destination(buffer)?.to_string();
        if buffer.is_empty() {
            return Ok(0);
        }

        let columns = self.destination_columns(&destination).await?;
        let layout = BulkLayout::new(buffer, columns, &destination)?;

        let chunk_size = match options.batch_size {
            Some(n) if n > 0 => n,
            _ => buffer.len(),
        };

        let mut total = 0u64;
        for rows in buffer.rows().chunks(chunk_size) {
            let mut load = self.client.bulk_insert(&destination).await?;
            for row in rows {
                load.send(layout.token_row(row)?).await?;
            }
            load.finalize().await?;
            total += rows.len() as u64;
            debug!("Bulk loaded {} rows into {}", total, destination);
        }

        Ok(total)
    }

    async fn close(self) -> Result<()> {
        self.client
            .close()
            .await
            .map_err(|e| BulkError::connection(e, "closing session"))
    }
}

/// Wire type a destination column accepts during a bulk load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WireType {
    Bit,
    TinyInt,
    SmallInt,
    Int,
    BigInt,
    Real,
    Float,
    Numeric,
    Guid,
    Text,
    Binary,
    Xml,
    DateTime,
    SmallDateTime,
    DateTime2,
    Date,
    Time,
    DateTimeOffset,
}

impl WireType {
    /// Resolve a column type, using the catalog size where the wire type
    /// alone is ambiguous. `None` for types tiberius cannot bulk load.
    fn resolve(column_type: ColumnType, max_length: Option<i16>) -> Option<Self> {
        let wire = match column_type {
            ColumnType::Bit | ColumnType::Bitn => WireType::Bit,
            ColumnType::Int1 => WireType::TinyInt,
            ColumnType::Int2 => WireType::SmallInt,
            ColumnType::Int4 => WireType::Int,
            ColumnType::Int8 => WireType::BigInt,
            ColumnType::Intn => match max_length {
                Some(1) => WireType::TinyInt,
                Some(2) => WireType::SmallInt,
                Some(8) => WireType::BigInt,
                _ => WireType::Int,
            },
            ColumnType::Float4 => WireType::Real,
            ColumnType::Float8 => WireType::Float,
            ColumnType::Floatn => match max_length {
                Some(4) => WireType::Real,
                _ => WireType::Float,
            },
            ColumnType::Decimaln | ColumnType::Numericn => WireType::Numeric,
            ColumnType::Guid => WireType::Guid,
            ColumnType::BigVarChar
            | ColumnType::BigChar
            | ColumnType::NVarchar
            | ColumnType::NChar => WireType::Text,
            ColumnType::BigVarBin | ColumnType::BigBinary => WireType::Binary,
            ColumnType::Xml => WireType::Xml,
            ColumnType::Datetime => WireType::DateTime,
            ColumnType::Datetime4 => WireType::SmallDateTime,
            ColumnType::Datetimen => match max_length {
                Some(4) => WireType::SmallDateTime,
                _ => WireType::DateTime,
            },
            ColumnType::Datetime2 => WireType::DateTime2,
            ColumnType::Daten => WireType::Date,
            ColumnType::Timen => WireType::Time,
            ColumnType::DatetimeOffsetn => WireType::DateTimeOffset,
            ColumnType::Money
            | ColumnType::Money4
            | ColumnType::Text
            | ColumnType::NText
            | ColumnType::Image
            | ColumnType::Udt
            | ColumnType::SSVariant
            | ColumnType::Null => return None,
        };
        Some(wire)
    }
}

/// A column the bulk load sends a value for.
#[derive(Debug, Clone)]
struct LoadColumn {
    name: String,
    wire: WireType,
    scale: Option<u8>,
}

/// Row layout of a bulk load: the destination columns that take values, in
/// table order, and the buffer column feeding each one.
///
/// Server-generated columns are left out, matching the column list tiberius
/// sends with `INSERT BULK`.
#[derive(Debug)]
struct BulkLayout {
    columns: Vec<LoadColumn>,
    sources: Vec<Option<usize>>,
}

impl BulkLayout {
    /// Names match case-insensitively. Every buffer column must exist in the
    /// destination; destination columns without a buffer column get NULLs.
    fn new(
        buffer: &TabularBuffer,
        destination: Vec<DestinationColumn>,
        table: &str,
    ) -> Result<Self> {
        if let Some(missing) = buffer.columns().iter().find(|b| {
            !destination
                .iter()
                .any(|d| d.name.eq_ignore_ascii_case(&b.name))
        }) {
            return Err(BulkError::argument(
                "buffer",
                format!("column {} does not exist in {}", missing.name, table),
            ));
        }

        let mut columns = Vec::with_capacity(destination.len());
        let mut sources = Vec::with_capacity(destination.len());
        for column in destination {
            let source = buffer.column_index(&column.name);
            if column.generated {
                if source.is_some() {
                    debug!(
                        "Skipping values for server-generated column {} of {}",
                        column.name, table
                    );
                }
                continue;
            }
            let Some(wire) = WireType::resolve(column.column_type, column.max_length) else {
                return Err(BulkError::argument(
                    "buffer",
                    format!(
                        "column {} of {} has type {:?}, which bulk load cannot send",
                        column.name, table, column.column_type
                    ),
                ));
            };
            columns.push(LoadColumn {
                name: column.name,
                wire,
                scale: column.scale,
            });
            sources.push(source);
        }

        Ok(Self { columns, sources })
    }

    fn token_row(&self, row: &[SqlValue]) -> Result<TokenRow<'static>> {
        let mut token_row = TokenRow::new();
        for (column, source) in self.columns.iter().zip(&self.sources) {
            let data = match source {
                Some(idx) => to_column_data(&row[*idx], column)?,
                None => null_for(column.wire),
            };
            token_row.push(data);
        }
        Ok(token_row)
    }
}

/// Column type of every result column: the type of its first non-null
/// value, else the wire type. NULLs are retagged with that type.
fn normalize_result(columns: &[Column], mut rows: Vec<Vec<SqlValue>>) -> RowSet {
    let row_columns: Vec<RowColumn> = columns
        .iter()
        .enumerate()
        .map(|(idx, c)| {
            let observed = rows
                .iter()
                .filter_map(|r| r.get(idx))
                .find(|v| !v.is_null())
                .map(SqlValue::null_type);
            RowColumn {
                name: c.name().to_string(),
                sql_type: observed.unwrap_or_else(|| wire_type(c.column_type())),
            }
        })
        .collect();

    for row in &mut rows {
        for (value, column) in row.iter_mut().zip(&row_columns) {
            if value.is_null() {
                *value = SqlValue::Null(column.sql_type);
            }
        }
    }

    RowSet::new(row_columns, rows)
}

/// Best guess at the value type carried by a result column.
fn wire_type(column_type: ColumnType) -> SqlNullType {
    match column_type {
        ColumnType::Bit | ColumnType::Bitn => SqlNullType::Bool,
        ColumnType::Int1 => SqlNullType::U8,
        ColumnType::Int2 => SqlNullType::I16,
        ColumnType::Int4 | ColumnType::Intn => SqlNullType::I32,
        ColumnType::Int8 => SqlNullType::I64,
        ColumnType::Float4 => SqlNullType::F32,
        ColumnType::Float8 | ColumnType::Floatn => SqlNullType::F64,
        ColumnType::Money | ColumnType::Money4 | ColumnType::Decimaln | ColumnType::Numericn => {
            SqlNullType::Decimal
        }
        ColumnType::Guid => SqlNullType::Uuid,
        ColumnType::Datetime
        | ColumnType::Datetime4
        | ColumnType::Datetimen
        | ColumnType::Datetime2 => SqlNullType::DateTime,
        ColumnType::Daten => SqlNullType::Date,
        ColumnType::Timen => SqlNullType::Time,
        ColumnType::DatetimeOffsetn => SqlNullType::DateTimeOffset,
        ColumnType::BigVarBin | ColumnType::BigBinary | ColumnType::Image => SqlNullType::Bytes,
        _ => SqlNullType::String,
    }
}

/// Typed NULL accepted by a destination column.
fn null_for(wire: WireType) -> ColumnData<'static> {
    match wire {
        WireType::Bit => ColumnData::Bit(None),
        WireType::TinyInt => ColumnData::U8(None),
        WireType::SmallInt => ColumnData::I16(None),
        WireType::Int => ColumnData::I32(None),
        WireType::BigInt => ColumnData::I64(None),
        WireType::Real => ColumnData::F32(None),
        WireType::Float => ColumnData::F64(None),
        WireType::Numeric => ColumnData::Numeric(None),
        WireType::Guid => ColumnData::Guid(None),
        WireType::Text => ColumnData::String(None),
        WireType::Binary => ColumnData::Binary(None),
        WireType::Xml => ColumnData::Xml(None),
        WireType::DateTime => ColumnData::DateTime(None),
        WireType::SmallDateTime => ColumnData::SmallDateTime(None),
        WireType::DateTime2 => ColumnData::DateTime2(None),
        WireType::Date => ColumnData::Date(None),
        WireType::Time => ColumnData::Time(None),
        WireType::DateTimeOffset => ColumnData::DateTimeOffset(None),
    }
}

/// Convert one buffer value to the wire type of its destination column.
///
/// Integers widen or narrow to the column width, temporal values take the
/// column's date/time parts, and anything renders into a text column. A
/// value that cannot be represented is a projection error.
fn to_column_data(value: &SqlValue, column: &LoadColumn) -> Result<ColumnData<'static>> {
    if value.is_null() {
        return Ok(null_for(column.wire));
    }
    let mismatch = || {
        BulkError::Projection(format!(
            "column {}: cannot send {:?} value {} as {:?}",
            column.name,
            value.null_type(),
            value.to_text().unwrap_or_default(),
            column.wire
        ))
    };
    let scale = column.scale.unwrap_or(7);

    let data = match column.wire {
        WireType::Bit => match value {
            SqlValue::Bool(b) => ColumnData::Bit(Some(*b)),
            other => ColumnData::Bit(Some(integer(other).ok_or_else(mismatch)? != 0)),
        },
        WireType::TinyInt => ColumnData::U8(Some(narrow(value).ok_or_else(mismatch)?)),
        WireType::SmallInt => ColumnData::I16(Some(narrow(value).ok_or_else(mismatch)?)),
        WireType::Int => ColumnData::I32(Some(narrow(value).ok_or_else(mismatch)?)),
        WireType::BigInt => ColumnData::I64(Some(integer(value).ok_or_else(mismatch)?)),
        WireType::Real => match float(value).ok_or_else(mismatch)? {
            f if f.is_finite() => ColumnData::F32(Some(f as f32)),
            _ => {
                // SQL Server has no NaN/Infinity
                warn!("Converting NaN/Infinity in {} to NULL", column.name);
                ColumnData::F32(None)
            }
        },
        WireType::Float => match float(value).ok_or_else(mismatch)? {
            f if f.is_finite() => ColumnData::F64(Some(f)),
            _ => {
                warn!("Converting NaN/Infinity in {} to NULL", column.name);
                ColumnData::F64(None)
            }
        },
        WireType::Numeric => {
            let mut d = decimal(value).ok_or_else(mismatch)?;
            let target_scale = column.scale.map_or(d.scale(), u32::from);
            d.rescale(target_scale);
            ColumnData::Numeric(Some(Numeric::new_with_scale(d.mantissa(), d.scale() as u8)))
        }
        WireType::Guid => match value {
            SqlValue::Uuid(u) => ColumnData::Guid(Some(*u)),
            SqlValue::Text(s) => {
                ColumnData::Guid(Some(s.trim().parse::<Uuid>().map_err(|_| mismatch())?))
            }
            _ => return Err(mismatch()),
        },
        WireType::Text => match value.to_text() {
            Some(text) => ColumnData::String(Some(Cow::Owned(text))),
            None => ColumnData::String(None),
        },
        WireType::Binary => match value {
            SqlValue::Bytes(b) => ColumnData::Binary(Some(Cow::Owned(b.clone()))),
            _ => return Err(mismatch()),
        },
        WireType::Xml => match value {
            SqlValue::Text(s) => ColumnData::Xml(Some(Cow::Owned(XmlData::new(s)))),
            _ => return Err(mismatch()),
        },
        WireType::DateTime => {
            let dt = naive_datetime(value).ok_or_else(mismatch)?;
            ColumnData::DateTime(Some(legacy_datetime(&dt).ok_or_else(mismatch)?))
        }
        WireType::SmallDateTime => {
            let dt = naive_datetime(value).ok_or_else(mismatch)?;
            ColumnData::SmallDateTime(Some(small_datetime(&dt).ok_or_else(mismatch)?))
        }
        WireType::DateTime2 => {
            let dt = naive_datetime(value).ok_or_else(mismatch)?;
            ColumnData::DateTime2(Some(datetime2(&dt, scale).ok_or_else(mismatch)?))
        }
        WireType::Date => {
            let date = match value {
                SqlValue::Date(d) => *d,
                other => naive_datetime(other).ok_or_else(mismatch)?.date(),
            };
            ColumnData::Date(Some(date_value(date).ok_or_else(mismatch)?))
        }
        WireType::Time => {
            let time = match value {
                SqlValue::Time(t) => *t,
                other => naive_datetime(other).ok_or_else(mismatch)?.time(),
            };
            ColumnData::Time(Some(time_of_day(&time, scale)))
        }
        WireType::DateTimeOffset => {
            let dto = match value {
                SqlValue::DateTimeOffset(dto) => *dto,
                SqlValue::DateTime(dt) => dt.and_utc().fixed_offset(),
                _ => return Err(mismatch()),
            };
            let offset_minutes = (dto.offset().local_minus_utc() / 60) as i16;
            let utc = datetime2(&dto.naive_utc(), scale).ok_or_else(mismatch)?;
            ColumnData::DateTimeOffset(Some(tiberius::time::DateTimeOffset::new(
                utc,
                offset_minutes,
            )))
        }
    };
    Ok(data)
}

/// Whole-number value of a scalar, if it has one.
fn integer(value: &SqlValue) -> Option<i64> {
    match value {
        SqlValue::Bool(b) => Some(i64::from(*b)),
        SqlValue::U8(v) => Some(i64::from(*v)),
        SqlValue::I16(v) => Some(i64::from(*v)),
        SqlValue::I32(v) => Some(i64::from(*v)),
        SqlValue::I64(v) => Some(*v),
        SqlValue::Decimal(d) if d.fract().is_zero() => d.to_i64(),
        SqlValue::Text(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn narrow<T: TryFrom<i64>>(value: &SqlValue) -> Option<T> {
    integer(value).and_then(|v| T::try_from(v).ok())
}

fn float(value: &SqlValue) -> Option<f64> {
    match value {
        SqlValue::F32(v) => Some(f64::from(*v)),
        SqlValue::F64(v) => Some(*v),
        SqlValue::Decimal(d) => d.to_f64(),
        SqlValue::Text(s) => s.trim().parse().ok(),
        other => integer(other).map(|v| v as f64),
    }
}

fn decimal(value: &SqlValue) -> Option<Decimal> {
    match value {
        SqlValue::Decimal(d) => Some(*d),
        SqlValue::F32(v) => Decimal::from_f32(*v),
        SqlValue::F64(v) => Decimal::from_f64(*v),
        SqlValue::Text(s) => Decimal::from_str(s.trim())
            .or_else(|_| Decimal::from_scientific(s.trim()))
            .ok(),
        other => integer(other).map(Decimal::from),
    }
}

/// Date and time of day of a temporal value. An offset value keeps its
/// local clock time, as SQL Server does when it drops the offset.
fn naive_datetime(value: &SqlValue) -> Option<NaiveDateTime> {
    match value {
        SqlValue::DateTime(dt) => Some(*dt),
        SqlValue::Date(d) => d.and_hms_opt(0, 0, 0),
        SqlValue::DateTimeOffset(dto) => Some(dto.naive_local()),
        _ => None,
    }
}

/// Whole days from `year-month-day` to `date`.
fn days_since(date: NaiveDate, year: i32, month: u32, day: u32) -> Option<i64> {
    let epoch = NaiveDate::from_ymd_opt(year, month, day)?;
    Some((date - epoch).num_days())
}

/// `date`: days since 0001-01-01.
fn date_value(date: NaiveDate) -> Option<tiberius::time::Date> {
    let days = days_since(date, 1, 1, 1).and_then(|d| u32::try_from(d).ok())?;
    Some(tiberius::time::Date::new(days))
}

/// Time of day as increments of 10^-scale seconds.
fn time_of_day(t: &NaiveTime, scale: u8) -> tiberius::time::Time {
    let scale = scale.min(7);
    let nanos = u64::from(t.num_seconds_from_midnight()) * 1_000_000_000
        + u64::from(t.nanosecond() % 1_000_000_000);
    let divisor = 10u64.pow(9 - u32::from(scale));
    tiberius::time::Time::new(nanos / divisor, scale)
}

fn datetime2(dt: &NaiveDateTime, scale: u8) -> Option<tiberius::time::DateTime2> {
    Some(tiberius::time::DateTime2::new(
        date_value(dt.date())?,
        time_of_day(&dt.time(), scale),
    ))
}

/// `datetime`: days since 1900-01-01 plus 1/300 second ticks.
fn legacy_datetime(dt: &NaiveDateTime) -> Option<tiberius::time::DateTime> {
    let days = days_since(dt.date(), 1900, 1, 1).and_then(|d| i32::try_from(d).ok())?;
    let t = dt.time();
    let nanos = u64::from(t.num_seconds_from_midnight()) * 1_000_000_000
        + u64::from(t.nanosecond() % 1_000_000_000);
    let ticks = (nanos * 300 / 1_000_000_000) as u32;
    Some(tiberius::time::DateTime::new(days, ticks))
}

/// `smalldatetime`: days since 1900-01-01 plus minutes.
fn small_datetime(dt: &NaiveDateTime) -> Option<tiberius::time::SmallDateTime> {
    let days = days_since(dt.date(), 1900, 1, 1).and_then(|d| u16::try_from(d).ok())?;
    let minutes = (dt.time().num_seconds_from_midnight() / 60) as u16;
    Some(tiberius::time::SmallDateTime::new(days, minutes))
}

/// Convert a result cell to a SqlValue.
fn column_data_to_sql_value(data: ColumnData<'static>) -> Result<SqlValue> {
    let value = match &data {
        ColumnData::U8(v) => v.map_or(SqlValue::Null(SqlNullType::U8), SqlValue::U8),
        ColumnData::I16(v) => v.map_or(SqlValue::Null(SqlNullType::I16), SqlValue::I16),
        ColumnData::I32(v) => v.map_or(SqlValue::Null(SqlNullType::I32), SqlValue::I32),
        ColumnData::I64(v) => v.map_or(SqlValue::Null(SqlNullType::I64), SqlValue::I64),
        ColumnData::F32(v) => v.map_or(SqlValue::Null(SqlNullType::F32), SqlValue::F32),
        ColumnData::F64(v) => v.map_or(SqlValue::Null(SqlNullType::F64), SqlValue::F64),
        ColumnData::Bit(v) => v.map_or(SqlValue::Null(SqlNullType::Bool), SqlValue::Bool),
        ColumnData::Guid(v) => v.map_or(SqlValue::Null(SqlNullType::Uuid), SqlValue::Uuid),
        ColumnData::String(v) => match v {
            Some(s) => SqlValue::Text(s.to_string()),
            None => SqlValue::Null(SqlNullType::String),
        },
        ColumnData::Binary(v) => match v {
            Some(b) => SqlValue::Bytes(b.to_vec()),
            None => SqlValue::Null(SqlNullType::Bytes),
        },
        ColumnData::Xml(v) => match v {
            Some(xml) => SqlValue::Text(xml.clone().into_owned().into_string()),
            None => SqlValue::Null(SqlNullType::String),
        },
        ColumnData::Numeric(_) => Decimal::from_sql(&data)?
            .map_or(SqlValue::Null(SqlNullType::Decimal), SqlValue::Decimal),
        ColumnData::DateTime(_) | ColumnData::SmallDateTime(_) | ColumnData::DateTime2(_) => {
            NaiveDateTime::from_sql(&data)?
                .map_or(SqlValue::Null(SqlNullType::DateTime), SqlValue::DateTime)
        }
        ColumnData::Date(_) => NaiveDate::from_sql(&data)?
            .map_or(SqlValue::Null(SqlNullType::Date), SqlValue::Date),
        ColumnData::Time(_) => NaiveTime::from_sql(&data)?
            .map_or(SqlValue::Null(SqlNullType::Time), SqlValue::Time),
        ColumnData::DateTimeOffset(_) => DateTime::<FixedOffset>::from_sql(&data)?.map_or(
            SqlValue::Null(SqlNullType::DateTimeOffset),
            SqlValue::DateTimeOffset,
        ),
    };
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::BufferColumn;

    fn load(name: &str, wire: WireType, scale: Option<u8>) -> LoadColumn {
        LoadColumn {
            name: name.to_string(),
            wire,
            scale,
        }
    }

    fn dest(name: &str, column_type: ColumnType, generated: bool) -> DestinationColumn {
        DestinationColumn {
            name: name.to_string(),
            column_type,
            max_length: None,
            scale: None,
            generated,
        }
    }

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_nan_and_infinity_become_null() {
        let real = load("Ratio", WireType::Real, None);
        let float = load("Ratio", WireType::Float, None);
        assert!(matches!(
            to_column_data(&SqlValue::F32(f32::NAN), &real).unwrap(),
            ColumnData::F32(None)
        ));
        assert!(matches!(
            to_column_data(&SqlValue::F64(f64::NEG_INFINITY), &float).unwrap(),
            ColumnData::F64(None)
        ));
        assert!(matches!(
            to_column_data(&SqlValue::F64(1.5), &float).unwrap(),
            ColumnData::F64(Some(_))
        ));
    }

    #[test]
    fn test_typed_nulls() {
        assert!(matches!(null_for(WireType::Bit), ColumnData::Bit(None)));
        assert!(matches!(null_for(WireType::TinyInt), ColumnData::U8(None)));
        assert!(matches!(null_for(WireType::DateTime), ColumnData::DateTime(None)));
        assert!(matches!(null_for(WireType::Text), ColumnData::String(None)));
        let column = load("Total", WireType::BigInt, None);
        assert!(matches!(
            to_column_data(&SqlValue::Null(SqlNullType::I32), &column).unwrap(),
            ColumnData::I64(None)
        ));
    }

    #[test]
    fn test_integers_take_the_column_width() {
        let bigint = load("Total", WireType::BigInt, None);
        assert!(matches!(
            to_column_data(&SqlValue::I32(7), &bigint).unwrap(),
            ColumnData::I64(Some(7))
        ));

        let tinyint = load("Level", WireType::TinyInt, None);
        assert!(matches!(
            to_column_data(&SqlValue::I64(200), &tinyint).unwrap(),
            ColumnData::U8(Some(200))
        ));
        let err = to_column_data(&SqlValue::I32(-1), &tinyint).unwrap_err();
        assert!(matches!(err, BulkError::Projection(_)));
        assert!(err.to_string().contains("Level"));

        let int = load("Id", WireType::Int, None);
        assert!(to_column_data(&SqlValue::I64(i64::MAX), &int).is_err());
        assert!(matches!(
            to_column_data(&SqlValue::Decimal(Decimal::new(4200, 2)), &int).unwrap(),
            ColumnData::I32(Some(42))
        ));
        assert!(to_column_data(&SqlValue::Decimal(Decimal::new(4250, 2)), &int).is_err());
    }

    #[test]
    fn test_temporal_values_take_the_column_type() {
        let dt = ymd(2001, 2, 3).and_hms_opt(4, 5, 6).unwrap();

        let date = load("Born", WireType::Date, None);
        match to_column_data(&SqlValue::DateTime(dt), &date).unwrap() {
            ColumnData::Date(Some(d)) => assert_eq!(d, date_value(ymd(2001, 2, 3)).unwrap()),
            other => panic!("unexpected column data: {other:?}"),
        }

        let datetime2 = load("Seen", WireType::DateTime2, Some(3));
        match to_column_data(&SqlValue::Date(ymd(2001, 2, 3)), &datetime2).unwrap() {
            ColumnData::DateTime2(Some(v)) => {
                assert_eq!(v.date(), date_value(ymd(2001, 2, 3)).unwrap());
                assert_eq!(v.time().increments(), 0);
                assert_eq!(v.time().scale(), 3);
            }
            other => panic!("unexpected column data: {other:?}"),
        }

        let time = load("At", WireType::Time, Some(0));
        match to_column_data(&SqlValue::DateTime(dt), &time).unwrap() {
            ColumnData::Time(Some(t)) => assert_eq!(t.increments(), 4 * 3600 + 5 * 60 + 6),
            other => panic!("unexpected column data: {other:?}"),
        }

        assert!(to_column_data(&SqlValue::I32(1), &date).is_err());
    }

    #[test]
    fn test_text_column_accepts_any_scalar() {
        let column = load("Note", WireType::Text, None);
        match to_column_data(&SqlValue::I32(12), &column).unwrap() {
            ColumnData::String(Some(s)) => assert_eq!(s, "12"),
            other => panic!("unexpected column data: {other:?}"),
        }
    }

    #[test]
    fn test_guid_from_text() {
        let column = load("Key", WireType::Guid, None);
        let id = "67e55044-10b1-426f-9247-bb680e5fe0c8";
        match to_column_data(&SqlValue::Text(id.to_string()), &column).unwrap() {
            ColumnData::Guid(Some(u)) => assert_eq!(u.to_string(), id),
            other => panic!("unexpected column data: {other:?}"),
        }
        assert!(to_column_data(&SqlValue::Text("nope".into()), &column).is_err());
    }

    #[test]
    fn test_decimal_rescaled_to_column_scale() {
        let value = SqlValue::Decimal(Decimal::new(12345, 3)); // 12.345
        let column = load("TestScore", WireType::Numeric, Some(5));
        match to_column_data(&value, &column).unwrap() {
            ColumnData::Numeric(Some(n)) => {
                assert_eq!(n.scale(), 5);
                assert_eq!(n.value(), 1_234_500);
            }
            other => panic!("unexpected column data: {other:?}"),
        }

        match to_column_data(&SqlValue::I32(3), &column).unwrap() {
            ColumnData::Numeric(Some(n)) => assert_eq!(n.value(), 300_000),
            other => panic!("unexpected column data: {other:?}"),
        }
    }

    #[test]
    fn test_time_of_day_scales() {
        let t = NaiveTime::from_hms_nano_opt(0, 0, 1, 500_000_000).unwrap();
        assert_eq!(time_of_day(&t, 7).increments(), 15_000_000);
        assert_eq!(time_of_day(&t, 3).increments(), 1_500);
    }

    #[test]
    fn test_legacy_datetime_epoch() {
        let dt = ymd(1900, 1, 2).and_hms_opt(0, 0, 1).unwrap();
        let v = legacy_datetime(&dt).unwrap();
        assert_eq!(v.days(), 1);
        assert_eq!(v.seconds_fragments(), 300);
    }

    #[test]
    fn test_wire_type_uses_catalog_size() {
        assert_eq!(
            WireType::resolve(ColumnType::Datetimen, Some(4)),
            Some(WireType::SmallDateTime)
        );
        assert_eq!(
            WireType::resolve(ColumnType::Datetimen, Some(8)),
            Some(WireType::DateTime)
        );
        assert_eq!(WireType::resolve(ColumnType::Intn, Some(8)), Some(WireType::BigInt));
        assert_eq!(WireType::resolve(ColumnType::Floatn, Some(4)), Some(WireType::Real));
        assert_eq!(WireType::resolve(ColumnType::Money, Some(8)), None);
    }

    #[test]
    fn test_layout_maps_by_name() {
        let buffer = TabularBuffer::new(vec![
            BufferColumn::new("name", SqlNullType::String, false),
            BufferColumn::new("ID", SqlNullType::I32, false),
        ]);
        let destination = vec![
            dest("Id", ColumnType::Int4, false),
            dest("Name", ColumnType::NVarchar, false),
            dest("Notes", ColumnType::NVarchar, false),
        ];
        let layout = BulkLayout::new(&buffer, destination, "People").unwrap();
        assert_eq!(layout.sources, vec![Some(1), Some(0), None]);
    }

    #[test]
    fn test_layout_skips_server_generated_columns() {
        let buffer = TabularBuffer::new(vec![
            BufferColumn::new("Id", SqlNullType::I32, false),
            BufferColumn::new("Name", SqlNullType::String, false),
        ]);
        let destination = vec![
            dest("Id", ColumnType::Int4, true),
            dest("Name", ColumnType::NVarchar, false),
            dest("Version", ColumnType::BigBinary, true),
        ];
        let layout = BulkLayout::new(&buffer, destination, "People").unwrap();
        let names: Vec<_> = layout.columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Name"]);
        assert_eq!(layout.sources, vec![Some(1)]);

        let row = layout
            .token_row(&[SqlValue::I32(9), SqlValue::Text("Ada".into())])
            .unwrap();
        assert_eq!(row.len(), 1);
    }

    #[test]
    fn test_layout_rejects_unknown_buffer_column() {
        let buffer = TabularBuffer::new(vec![BufferColumn::new("Ghost", SqlNullType::I32, true)]);
        let destination = vec![dest("Id", ColumnType::Int4, false)];
        let err = BulkLayout::new(&buffer, destination, "People").unwrap_err();
        assert!(err.to_string().contains("Ghost"));
    }

    #[test]
    fn test_layout_rejects_unsendable_column() {
        let buffer = TabularBuffer::new(vec![BufferColumn::new("Id", SqlNullType::I32, false)]);
        let destination = vec![
            dest("Id", ColumnType::Int4, false),
            dest("Price", ColumnType::Money, false),
        ];
        let err = BulkLayout::new(&buffer, destination, "Items").unwrap_err();
        assert!(err.to_string().contains("Price"));
    }

    #[test]
    fn test_column_data_to_sql_value() {
        let v = column_data_to_sql_value(ColumnData::I32(None)).unwrap();
        assert_eq!(v, SqlValue::Null(SqlNullType::I32));
        let v = column_data_to_sql_value(ColumnData::String(Some("abc".into()))).unwrap();
        assert_eq!(v.to_text().as_deref(), Some("abc"));
        let v = column_data_to_sql_value(ColumnData::U8(Some(7))).unwrap();
        assert_eq!(v, SqlValue::U8(7));
    }
}
