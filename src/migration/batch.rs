// ABOUTME: Splits SQL scripts on standalone GO lines and replays the batches
// ABOUTME: Defines the SqlConnection seam used to execute non-query commands

use crate::error::{Error, Outcome, Result};
use crate::utils::ensure_not_cancelled;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// Connection that SQL batches are replayed on.
#[async_trait]
pub trait SqlConnection: Send {
    fn is_open(&self) -> bool;

    async fn open(&mut self) -> Result<()>;

    /// Run one batch as a non-query command
    async fn execute(&mut self, sql: &str) -> Result<()>;

    async fn close(&mut self) -> Result<()>;
}

/// Counters for one or more replayed scripts.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BatchStats {
    pub executed: usize,
    pub failed: usize,
    /// Empty or whitespace-only segments
    pub skipped: usize,
}

impl BatchStats {
    pub fn merge(&mut self, other: BatchStats) {
        self.executed += other.executed;
        self.failed += other.failed;
        self.skipped += other.skipped;
    }
}

/// True for a line that is only `GO` (any case) once surrounding whitespace is trimmed
pub fn is_batch_separator(line: &str) -> bool {
    line.trim().eq_ignore_ascii_case("GO")
}

/// Split a script into batches on standalone `GO` lines.
///
/// Always yields one more segment than there are separator lines; segments
/// may be empty and keep their original text, separator lines excluded.
pub fn split_batches(script: &str) -> Vec<&str> {
    let mut batches = Vec::new();
    let mut start = 0;
    let mut offset = 0;

    for line in script.split_inclusive('\n') {
        if is_batch_separator(line) {
            batches.push(&script[start..offset]);
            start = offset + line.len();
        }
        offset += line.len();
    }
    batches.push(&script[start..]);

    batches
}

/// Replays scripts batch by batch on a borrowed connection.
///
/// A failing batch is recorded in the outcome and replay moves on to the
/// next one; nothing is rolled back.
pub struct SqlBatchExecutor<'a, C: SqlConnection + ?Sized> {
    connection: &'a mut C,
    cancel: &'a CancellationToken,
}

impl<'a, C: SqlConnection + ?Sized> SqlBatchExecutor<'a, C> {
    pub fn new(connection: &'a mut C, cancel: &'a CancellationToken) -> Self {
        Self { connection, cancel }
    }

    /// Execute every non-empty batch of `script`, in order.
    ///
    /// `source_name` identifies the script in log lines and errors.
    pub async fn execute(
        &mut self,
        script: &str,
        source_name: &str,
        outcome: &mut Outcome,
    ) -> Result<BatchStats> {
        if !self.connection.is_open() {
            self.connection.open().await?;
        }

        let mut stats = BatchStats::default();

        for (index, batch) in split_batches(script).into_iter().enumerate() {
            if batch.trim().is_empty() {
                stats.skipped += 1;
                continue;
            }

            ensure_not_cancelled(self.cancel)?;

            match self.connection.execute(batch).await {
                Ok(()) => stats.executed += 1,
                Err(e) => {
                    stats.failed += 1;
                    outcome.record(Error::BatchExecution {
                        source_name: source_name.to_string(),
                        index: index + 1,
                        message: e.to_string(),
                    })?;
                }
            }
        }

        tracing::debug!(
            "{}: {} batch(es) executed, {} failed",
            source_name,
            stats.executed,
            stats.failed
        );
        Ok(stats)
    }
}
