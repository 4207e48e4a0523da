//! Read-path facade: run a query and materialize it as a named buffer.
//!
//! Store failures are retried with linear backoff. Caller mistakes fail
//! immediately.

use std::time::Duration;

use tokio::time::{sleep, timeout};
use tracing::{debug, warn};

use crate::buffer::{BufferColumn, TabularBuffer};
use crate::config::ReaderConfig;
use crate::error::{BulkError, Phase, Result};
use crate::session::{Connector, RowSet, Session};

/// Per-call overrides for [`ReadFacade::fill_table_with`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FillOptions {
    /// Positional values substituted for `{0}`, `{1}`, ... in the query text.
    pub parameters: Vec<String>,
    /// Overrides the configured command timeout.
    pub command_timeout: Option<Duration>,
}

/// Executes read queries with bounded retries.
pub struct ReadFacade<C: Connector> {
    connector: C,
    settings: ReaderConfig,
}

impl<C: Connector> ReadFacade<C> {
    pub fn new(connector: C) -> Self {
        Self::with_settings(connector, ReaderConfig::default())
    }

    pub fn with_settings(connector: C, settings: ReaderConfig) -> Self {
        Self {
            connector,
            settings,
        }
    }

    pub fn settings(&self) -> &ReaderConfig {
        &self.settings
    }

    /// Run `query` and return its rows as a buffer named `table_name`.
    pub async fn fill_table(&self, query: &str, table_name: &str) -> Result<TabularBuffer> {
        self.fill_table_with(query, table_name, &FillOptions::default())
            .await
    }

    /// [`fill_table`](Self::fill_table) with parameters and a timeout override.
    pub async fn fill_table_with(
        &self,
        query: &str,
        table_name: &str,
        options: &FillOptions,
    ) -> Result<TabularBuffer> {
        if query.trim().is_empty() {
            return Err(BulkError::argument("query", "cannot be null or empty"));
        }
        let sql = format_query(query, &options.parameters)?;
        let command_timeout = options
            .command_timeout
            .unwrap_or_else(|| Duration::from_secs(self.settings.command_timeout_secs));
        let max_attempts = self.settings.retry_count.max(1);

        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self.try_fill(&sql, table_name, command_timeout).await {
                Ok(buffer) => {
                    debug!(
                        "Filled {} with {} rows on attempt {}",
                        table_name,
                        buffer.len(),
                        attempt
                    );
                    return Ok(buffer);
                }
                Err(e) if !e.is_transient() => return Err(e),
                Err(e) if attempt >= max_attempts => {
                    return Err(BulkError::RetriesExceeded {
                        attempts: attempt,
                        source: Box::new(e),
                    });
                }
                Err(e) => {
                    let delay = Duration::from_millis(
                        self.settings.retry_delay_ms.saturating_mul(u64::from(attempt)),
                    );
                    warn!(
                        "Read of {} failed (attempt {}/{}), retrying in {:?}: {}",
                        table_name, attempt, max_attempts, delay, e
                    );
                    sleep(delay).await;
                }
            }
        }
    }

    async fn try_fill(
        &self,
        sql: &str,
        table_name: &str,
        command_timeout: Duration,
    ) -> Result<TabularBuffer> {
        let work = async {
            let mut session = self.connector.connect().await?;
            let result = session.query(sql).await;
            if let Err(e) = session.close().await {
                warn!("Failed to close session cleanly: {}", e);
            }
            result
        };

        let rows = timeout(command_timeout, work).await.map_err(|_| {
            BulkError::statement(
                Phase::Read,
                table_name,
                format!("timed out after {}s", command_timeout.as_secs()),
            )
        })??;

        rows_to_buffer(rows, table_name)
    }
}

/// Substitute positional `{n}` placeholders. `{{` and `}}` stand for
/// literal braces; any other braced text is kept as written.
fn format_query(query: &str, parameters: &[String]) -> Result<String> {
    let bytes = query.as_bytes();
    let mut out = String::with_capacity(query.len());
    let mut start = 0;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'{' | b'}' if bytes.get(i + 1) == Some(&bytes[i]) => {
                out.push_str(&query[start..=i]);
                i += 2;
                start = i;
            }
            b'{' => {
                let Some(len) = query[i + 1..].find('}') else {
                    break;
                };
                let close = i + 1 + len;
                if let Ok(idx) = query[i + 1..close].parse::<usize>() {
                    let value = parameters.get(idx).ok_or_else(|| {
                        BulkError::argument(
                            "parameters",
                            format!(
                                "placeholder {{{}}} has no value ({} given)",
                                idx,
                                parameters.len()
                            ),
                        )
                    })?;
                    out.push_str(&query[start..i]);
                    out.push_str(value);
                    start = close + 1;
                }
                i = close + 1;
            }
            _ => i += 1,
        }
    }
    out.push_str(&query[start..]);
    Ok(out)
}

/// Materialize a result set. Every column is nullable.
fn rows_to_buffer(rows: RowSet, table_name: &str) -> Result<TabularBuffer> {
    let (columns, rows) = rows.into_parts();
    let columns = columns
        .into_iter()
        .map(|c| BufferColumn::new(c.name, c.sql_type, true))
        .collect();

    let mut buffer = TabularBuffer::new(columns).with_name(table_name);
    for row in rows {
        buffer.push_row(row)?;
    }
    Ok(buffer)
}
