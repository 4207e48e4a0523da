//! Bulk write orchestrator.
//!
//! Each call runs one pass on one session:
//!
//! 1. validate arguments (no connection yet)
//! 2. project records into a [`TabularBuffer`]
//! 3. open a session
//! 4. insert: bulk copy straight into the table, done
//! 5. otherwise: describe the table, synthesize clauses, create the staging
//!    table, bulk copy into it, and run the final UPDATE / MERGE / DELETE
//! 6. close the session, on success and on failure alike
//!
//! Nothing is retried and nothing is cached between calls.

use std::fmt;
use std::time::Instant;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::buffer::TabularBuffer;
use crate::clauses::{self, ClauseSet};
use crate::config::WriterConfig;
use crate::error::{BulkError, Phase, Result};
use crate::record::{project, FieldDescriptor, Record};
use crate::schema::{describe_columns, ColumnDescriptor};
use crate::session::{BulkCopyOptions, Connector, Session};
use crate::staging::StagingTable;

/// Kind of bulk write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Insert,
    Update,
    Upsert,
    Delete,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OperationKind::Insert => "insert",
            OperationKind::Update => "update",
            OperationKind::Upsert => "upsert",
            OperationKind::Delete => "delete",
        };
        f.write_str(name)
    }
}

/// A bulk write request, minus the data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOperation<'a> {
    /// Copy rows straight into the table.
    Insert,
    /// Update rows matched on `primary_keys`. An empty `fields_to_update`
    /// updates every non-key column.
    Update {
        primary_keys: &'a [&'a str],
        fields_to_update: &'a [&'a str],
    },
    /// MERGE on `fields_to_match`; update matches, insert the rest.
    Upsert {
        primary_keys: &'a [&'a str],
        fields_to_match: &'a [&'a str],
    },
    /// Delete rows matched on `primary_keys`.
    Delete { primary_keys: &'a [&'a str] },
}

impl WriteOperation<'_> {
    pub fn kind(&self) -> OperationKind {
        match self {
            WriteOperation::Insert => OperationKind::Insert,
            WriteOperation::Update { .. } => OperationKind::Update,
            WriteOperation::Upsert { .. } => OperationKind::Upsert,
            WriteOperation::Delete { .. } => OperationKind::Delete,
        }
    }

    /// Check caller input. Runs before any connection is opened.
    pub fn validate(&self, table: &str) -> Result<()> {
        if table.trim().is_empty() {
            return Err(BulkError::argument("table_name", "cannot be null or empty"));
        }
        match self {
            WriteOperation::Insert => Ok(()),
            WriteOperation::Update { primary_keys, .. }
            | WriteOperation::Delete { primary_keys } => {
                if primary_keys.is_empty() {
                    return Err(BulkError::argument(
                        "primary_keys",
                        format!("at least one key is required to {}", self.kind()),
                    ));
                }
                Ok(())
            }
            WriteOperation::Upsert {
                fields_to_match, ..
            } => {
                if fields_to_match.is_empty() {
                    return Err(BulkError::argument(
                        "fields_to_match",
                        "at least one field to match on is required",
                    ));
                }
                Ok(())
            }
        }
    }
}

/// The statements one write will run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WritePlan {
    pub operation: OperationKind,
    pub table: String,
    /// Staging table name; `None` for inserts.
    pub staging_table: Option<String>,
    /// Synthesized fragments; `None` for inserts.
    pub clauses: Option<ClauseSet>,
    /// Table the bulk copy writes to.
    pub copy_destination: String,
    /// UPDATE / MERGE / DELETE text; `None` for inserts.
    pub final_statement: Option<String>,
}

impl WritePlan {
    /// `CREATE TABLE` text for the staging table.
    pub fn staging_ddl(&self) -> Option<String> {
        let staging = self.staging_table.as_deref()?;
        let clauses = self.clauses.as_ref()?;
        Some(clauses::create_staging_sql(
            staging,
            clauses.create_table_clauses(),
        ))
    }
}

/// Synthesize the plan for `operation` against a described table.
pub fn build_plan(
    operation: &WriteOperation<'_>,
    table: &str,
    columns: &[ColumnDescriptor],
    settings: &WriterConfig,
) -> Result<WritePlan> {
    let kind = operation.kind();
    let staging = settings.staging_table.as_str();
    let require_columns = || {
        if columns.is_empty() {
            Err(BulkError::introspection(
                table,
                "no columns found in target table",
            ))
        } else {
            Ok(())
        }
    };

    let (clause_set, final_statement) = match *operation {
        WriteOperation::Insert => {
            return Ok(WritePlan {
                operation: kind,
                table: table.to_string(),
                staging_table: None,
                clauses: None,
                copy_destination: table.to_string(),
                final_statement: None,
            });
        }
        WriteOperation::Update {
            primary_keys,
            fields_to_update,
        } => {
            require_columns()?;
            let c = clauses::update_clauses(columns, primary_keys, fields_to_update);
            if c.assignments.is_empty() {
                return Err(BulkError::argument(
                    "fields_to_update",
                    format!("no updatable columns left in {}", table),
                ));
            }
            let sql = clauses::update_sql(table, staging, &c, primary_keys);
            (ClauseSet::Update(c), sql)
        }
        WriteOperation::Upsert {
            primary_keys,
            fields_to_match,
        } => {
            require_columns()?;
            let c = clauses::upsert_clauses(
                columns,
                primary_keys,
                fields_to_match,
                settings.upsert_insert_primary_keys,
            );
            if c.matches.is_empty() {
                return Err(BulkError::argument(
                    "fields_to_match",
                    format!("none of {:?} is a column of {}", fields_to_match, table),
                ));
            }
            let sql = clauses::merge_sql(table, staging, &c);
            (ClauseSet::Upsert(c), sql)
        }
        WriteOperation::Delete { primary_keys } => {
            require_columns()?;
            let c = clauses::delete_clauses(columns);
            let sql = clauses::delete_sql(table, staging, primary_keys);
            (ClauseSet::Delete(c), sql)
        }
    };

    Ok(WritePlan {
        operation: kind,
        table: table.to_string(),
        staging_table: Some(staging.to_string()),
        clauses: Some(clause_set),
        copy_destination: staging.to_string(),
        final_statement: Some(final_statement),
    })
}

/// Outcome of one bulk write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WriteSummary {
    pub operation: OperationKind,
    pub table: String,
    /// Rows streamed by the bulk copier.
    pub rows_copied: u64,
    /// Rows the final statement reported as affected (the copy count for inserts).
    pub rows_affected: u64,
    pub elapsed_ms: u64,
}

impl WriteSummary {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Performs bulk INSERT / UPDATE / UPSERT / DELETE through a staging table.
pub struct BulkWriter<C: Connector> {
    connector: C,
    settings: WriterConfig,
}

impl<C: Connector> BulkWriter<C> {
    /// Create a writer with default settings.
    pub fn new(connector: C) -> Self {
        Self {
            connector,
            settings: WriterConfig::default(),
        }
    }

    /// Create a writer with explicit settings.
    ///
    /// Fails with [`BulkError::Config`] when the staging table is not a
    /// `#temp` name, since anything else would outlive the session.
    pub fn with_settings(connector: C, settings: WriterConfig) -> Result<Self> {
        settings.validate()?;
        Ok(Self {
            connector,
            settings,
        })
    }

    pub fn settings(&self) -> &WriterConfig {
        &self.settings
    }

    /// Bulk INSERT records into `table`.
    pub async fn bulk_insert<T: Record>(
        &self,
        records: &[T],
        table: &str,
        batch_size: Option<usize>,
    ) -> Result<WriteSummary> {
        self.write_records(WriteOperation::Insert, records, table, batch_size)
            .await
    }

    /// Bulk UPDATE rows matched on `primary_keys`.
    ///
    /// An empty `fields_to_update` updates every non-key column.
    pub async fn bulk_update<T: Record>(
        &self,
        records: &[T],
        table: &str,
        primary_keys: &[&str],
        fields_to_update: &[&str],
        batch_size: Option<usize>,
    ) -> Result<WriteSummary> {
        let op = WriteOperation::Update {
            primary_keys,
            fields_to_update,
        };
        self.write_records(op, records, table, batch_size).await
    }

    /// Bulk UPSERT: MERGE on `fields_to_match`.
    ///
    /// `fields_to_match` must not be empty.
    pub async fn bulk_upsert<T: Record>(
        &self,
        records: &[T],
        table: &str,
        primary_keys: &[&str],
        fields_to_match: &[&str],
        batch_size: Option<usize>,
    ) -> Result<WriteSummary> {
        let op = WriteOperation::Upsert {
            primary_keys,
            fields_to_match,
        };
        self.write_records(op, records, table, batch_size).await
    }

    /// Bulk DELETE rows matched on `primary_keys`.
    pub async fn bulk_delete<T: Record>(
        &self,
        records: &[T],
        table: &str,
        primary_keys: &[&str],
        batch_size: Option<usize>,
    ) -> Result<WriteSummary> {
        let op = WriteOperation::Delete { primary_keys };
        self.write_records(op, records, table, batch_size).await
    }

    /// Run `operation` with an already built buffer.
    pub async fn write_buffer(
        &self,
        operation: WriteOperation<'_>,
        table: &str,
        buffer: &TabularBuffer,
        batch_size: Option<usize>,
    ) -> Result<WriteSummary> {
        operation.validate(table)?;
        self.execute(&operation, table, buffer, batch_size).await
    }

    /// Describe `table` and return the plan without running it.
    pub async fn plan(&self, operation: WriteOperation<'_>, table: &str) -> Result<WritePlan> {
        operation.validate(table)?;
        if operation.kind() == OperationKind::Insert {
            return build_plan(&operation, table, &[], &self.settings);
        }

        let columns = self.describe(table).await?;
        build_plan(&operation, table, &columns, &self.settings)
    }

    /// Column descriptors of `table`, in catalog order.
    pub async fn describe(&self, table: &str) -> Result<Vec<ColumnDescriptor>> {
        let mut session = self.connector.connect().await?;
        let result = describe_columns(&mut session, table).await;
        close_session(session).await;
        result
    }

    async fn write_records<T: Record>(
        &self,
        operation: WriteOperation<'_>,
        records: &[T],
        table: &str,
        batch_size: Option<usize>,
    ) -> Result<WriteSummary> {
        operation.validate(table)?;
        let buffer = project(records, FieldDescriptor::is_stored)?;
        self.execute(&operation, table, &buffer, batch_size).await
    }

    async fn execute(
        &self,
        operation: &WriteOperation<'_>,
        table: &str,
        buffer: &TabularBuffer,
        batch_size: Option<usize>,
    ) -> Result<WriteSummary> {
        let start = Instant::now();
        let kind = operation.kind();
        debug!(
            "Starting bulk {} of {} rows into {}",
            kind,
            buffer.len(),
            table
        );

        let mut session = self.connector.connect().await?;
        let result = self
            .run_in_session(&mut session, operation, table, buffer, batch_size)
            .await;
        close_session(session).await;
        let (rows_copied, rows_affected) = result?;

        let summary = WriteSummary {
            operation: kind,
            table: table.to_string(),
            rows_copied,
            rows_affected,
            elapsed_ms: start.elapsed().as_millis() as u64,
        };
        info!(
            "Bulk {} into {}: {} rows copied, {} affected in {}ms",
            kind, table, summary.rows_copied, summary.rows_affected, summary.elapsed_ms
        );
        Ok(summary)
    }

    async fn run_in_session(
        &self,
        session: &mut C::Session,
        operation: &WriteOperation<'_>,
        table: &str,
        buffer: &TabularBuffer,
        batch_size: Option<usize>,
    ) -> Result<(u64, u64)> {
        if operation.kind() == OperationKind::Insert {
            let options = BulkCopyOptions::to_table(table).with_batch_size(batch_size);
            let copied = session
                .bulk_copy(buffer, &options)
                .await
                .map_err(|e| BulkError::statement(Phase::Copy, table, e))?;
            return Ok((copied, copied));
        }

        let columns = describe_columns(session, table).await?;
        let plan = build_plan(operation, table, &columns, &self.settings)?;
        let (Some(staging_name), Some(clause_set), Some(final_sql)) = (
            plan.staging_table.as_deref(),
            plan.clauses.as_ref(),
            plan.final_statement.as_deref(),
        ) else {
            return Err(BulkError::argument(
                "operation",
                "staged write produced an incomplete plan",
            ));
        };

        let mut staging = StagingTable::create(
            session,
            staging_name,
            table,
            clause_set.create_table_clauses(),
        )
        .await?;
        let copied = staging.load(buffer, batch_size).await?;
        let affected = staging.apply(final_sql).await?;
        debug!("{} affected {} rows in {}", plan.operation, affected, table);

        Ok((copied, affected))
    }
}

/// Close a session, logging instead of failing.
async fn close_session<S: Session>(session: S) {
    if let Err(e) = session.close().await {
        warn!("Failed to close session cleanly: {}", e);
    }
}
