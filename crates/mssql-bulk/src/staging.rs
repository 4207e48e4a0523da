//! Session-scoped staging table handle.

use tracing::debug;

use crate::buffer::TabularBuffer;
use crate::clauses::create_staging_sql;
use crate::error::{BulkError, Phase, Result};
use crate::session::{BulkCopyOptions, Session};

/// A `#temp` staging table living inside one session.
///
/// The handle borrows the session mutably, so the table cannot outlive the
/// connection that owns it. There is no explicit DROP: SQL Server discards
/// the table when the session closes.
pub struct StagingTable<'s, S: Session + ?Sized> {
    session: &'s mut S,
    name: String,
    target: String,
}

impl<'s, S: Session + ?Sized> StagingTable<'s, S> {
    /// Create the staging table from its column definitions.
    ///
    /// `target` is the destination table the staged rows are meant for; it
    /// only labels errors.
    pub async fn create(
        session: &'s mut S,
        name: &str,
        target: &str,
        create_table: &[String],
    ) -> Result<StagingTable<'s, S>> {
        let sql = create_staging_sql(name, create_table);
        session
            .execute(&sql)
            .await
            .map_err(|e| BulkError::statement(Phase::Staging, target, e))?;
        debug!("Created staging table {} for {}", name, target);

        Ok(Self {
            session,
            name: name.to_string(),
            target: target.to_string(),
        })
    }

    /// Bulk copy a buffer into the staging table.
    pub async fn load(&mut self, buffer: &TabularBuffer, batch_size: Option<usize>) -> Result<u64> {
        let options = BulkCopyOptions::to_table(self.name.clone()).with_batch_size(batch_size);
        let copied = self
            .session
            .bulk_copy(buffer, &options)
            .await
            .map_err(|e| BulkError::statement(Phase::Copy, &self.target, e))?;
        debug!("Staged {} rows in {}", copied, self.name);
        Ok(copied)
    }

    /// Run a statement against the target that reads from the staging table.
    pub async fn apply(&mut self, sql: &str) -> Result<u64> {
        self.session
            .execute(sql)
            .await
            .map_err(|e| BulkError::statement(Phase::Final, &self.target, e))
    }
}
