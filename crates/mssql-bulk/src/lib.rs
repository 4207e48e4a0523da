//! # mssql-bulk
//!
//! Staging-table bulk writes for Microsoft SQL Server.
//!
//! Typed records are projected into a tabular buffer and written with:
//!
//! - **INSERT** straight through the TDS bulk load
//! - **UPDATE**, **UPSERT** (MERGE) and **DELETE** through a session-scoped
//!   `#staging` table whose layout is read from `information_schema.columns`
//!
//! A read facade with bounded retries materializes queries as buffers.
//!
//! ## Example
//!
//! ```rust,no_run
//! use mssql_bulk::record::{FieldDescriptor, Record};
//! use mssql_bulk::value::{SqlValue, ToSqlValue};
//! use mssql_bulk::{BulkWriter, Config, MssqlConnector};
//!
//! struct Student {
//!     id: i32,
//!     score: f64,
//! }
//!
//! impl Record for Student {
//!     fn fields() -> Vec<FieldDescriptor> {
//!         vec![
//!             FieldDescriptor::of::<i32>("StudentId"),
//!             FieldDescriptor::of::<f64>("TestScore"),
//!         ]
//!     }
//!
//!     fn values(&self) -> Vec<SqlValue> {
//!         vec![self.id.to_sql_value(), self.score.to_sql_value()]
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load("config.yaml")?;
//!     let writer = BulkWriter::with_settings(
//!         MssqlConnector::new(config.connection),
//!         config.writer,
//!     )?;
//!     let students = vec![Student { id: 1, score: 0.5 }];
//!     let summary = writer
//!         .bulk_update(&students, "Students", &["StudentId"], &[], None)
//!         .await?;
//!     println!("Updated {} rows", summary.rows_affected);
//!     Ok(())
//! }
//! ```

pub mod buffer;
pub mod clauses;
pub mod config;
pub mod error;
pub mod mssql;
pub mod reader;
pub mod record;
pub mod schema;
pub mod session;
pub mod staging;
pub mod typemap;
pub mod value;
pub mod writer;

// Re-exports for convenient access
pub use buffer::{BufferColumn, TabularBuffer};
pub use config::{Config, ConnectionConfig, ReaderConfig, WriterConfig};
pub use error::{BulkError, Phase, Result};
pub use mssql::{MssqlConnector, MssqlSession};
pub use reader::{FillOptions, ReadFacade};
pub use record::{FieldDescriptor, Record};
pub use schema::ColumnDescriptor;
pub use session::{BulkCopyOptions, Connector, RowSet, Session};
pub use value::{SqlNullType, SqlValue, ToSqlValue};
pub use writer::{BulkWriter, OperationKind, WriteOperation, WritePlan, WriteSummary};
