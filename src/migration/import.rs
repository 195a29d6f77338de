// ABOUTME: Import pipeline from a package file into a target database
// ABOUTME: Unpacks, replays schema.sql, then each table's data.sql in name order

use super::batch::{BatchStats, SqlBatchExecutor, SqlConnection};
use crate::error::{Error, FailurePolicy, Outcome, Result};
use crate::package::{run_blocking, Archiver, PackageLayout, DATA_FILE, SCHEMA_FILE};
use crate::utils::{ensure_not_cancelled, sanitize_identifier};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;

/// Progress of an import run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportState {
    Idle,
    Unpacked,
    Connected,
    SchemaApplied,
    DataApplied,
    Done,
    Failed,
    Cancelled,
}

/// Result of a completed import.
#[derive(Debug)]
pub struct ImportReport {
    /// Table directories replayed, in replay order
    pub tables: Vec<String>,
    pub schema_batches: BatchStats,
    pub data_batches: BatchStats,
    pub outcome: Outcome,
}

/// Replays a package file against a [`SqlConnection`].
pub struct ImportPipeline<C, A> {
    connection: C,
    archiver: A,
    policy: FailurePolicy,
    cancel: CancellationToken,
    state: ImportState,
}

impl<C: SqlConnection, A: Archiver + Clone + 'static> ImportPipeline<C, A> {
    pub fn new(connection: C, archiver: A) -> Self {
        Self {
            connection,
            archiver,
            policy: FailurePolicy::default(),
            cancel: CancellationToken::new(),
            state: ImportState::Idle,
        }
    }

    pub fn with_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn state(&self) -> ImportState {
        self.state
    }

    pub fn connection(&self) -> &C {
        &self.connection
    }

    /// Import `package` into the connection's database.
    ///
    /// Unpack and connect failures are fatal. Failing batches are recorded
    /// in the report's outcome and replay continues (unless strict).
    pub async fn import(&mut self, package: impl AsRef<Path>) -> Result<ImportReport> {
        let result = self.run(package.as_ref()).await;
        self.state = match &result {
            Ok(_) => ImportState::Done,
            Err(Error::Cancelled) => ImportState::Cancelled,
            Err(_) => ImportState::Failed,
        };
        result
    }

    async fn run(&mut self, package: &Path) -> Result<ImportReport> {
        let layout = PackageLayout::for_import(package)?;
        ensure_not_cancelled(&self.cancel)?;

        self.unpack(&layout).await?;
        self.state = ImportState::Unpacked;

        ensure_not_cancelled(&self.cancel)?;
        tracing::info!("Connecting to target database...");
        self.connection.open().await?;
        self.state = ImportState::Connected;
        tracing::info!("✓ Connected to target");

        let mut outcome = Outcome::new(self.policy);
        let replayed = self.replay(&layout, &mut outcome).await;

        if let Err(e) = self.connection.close().await {
            tracing::warn!("⚠ Failed to close target connection: {}", e);
        }
        let (tables, schema_batches, data_batches) = replayed?;

        ensure_not_cancelled(&self.cancel)?;
        let temp = layout.staging_dir();
        if let Err(e) = tokio::fs::remove_dir_all(temp).await {
            outcome.record(Error::staging(temp, e))?;
        }

        tracing::info!(
            "✅ Import completed: {} table(s), {} batch(es) executed, {} failed",
            tables.len(),
            schema_batches.executed + data_batches.executed,
            schema_batches.failed + data_batches.failed
        );
        Ok(ImportReport {
            tables,
            schema_batches,
            data_batches,
            outcome,
        })
    }

    async fn unpack(&self, layout: &PackageLayout) -> Result<()> {
        let package = layout.package_path();
        if !tokio::fs::try_exists(package).await.unwrap_or(false) {
            return Err(Error::archive(package, "package file not found"));
        }

        let temp = layout.staging_dir();
        if tokio::fs::try_exists(temp).await.unwrap_or(false) {
            tracing::debug!("Removing stale temp directory {}", temp.display());
            tokio::fs::remove_dir_all(temp)
                .await
                .map_err(|e| Error::staging(temp, e))?;
        }

        let (source, dest) = (package.to_path_buf(), temp.to_path_buf());
        run_blocking(&self.archiver, package, move |archiver| {
            archiver.extract(&source, &dest, false)
        })
        .await?;
        tracing::debug!("Package unpacked to {}", temp.display());
        Ok(())
    }

    async fn replay(
        &mut self,
        layout: &PackageLayout,
        outcome: &mut Outcome,
    ) -> Result<(Vec<String>, BatchStats, BatchStats)> {
        tracing::info!("Step 1/2: Applying schema...");
        let schema_file = layout.schema_file_path();
        let schema = tokio::fs::read_to_string(&schema_file).await.map_err(|e| {
            Error::archive(
                layout.package_path(),
                format!("cannot read {}: {}", SCHEMA_FILE, e),
            )
        })?;

        let schema_batches = SqlBatchExecutor::new(&mut self.connection, &self.cancel)
            .execute(&schema, SCHEMA_FILE, outcome)
            .await?;
        self.state = ImportState::SchemaApplied;

        tracing::info!("Step 2/2: Importing table data...");
        let mut tables = Vec::new();
        let mut data_batches = BatchStats::default();

        for (name, data_file) in table_scripts(layout.staging_dir()).await? {
            ensure_not_cancelled(&self.cancel)?;
            tracing::debug!("Processing folder: {}", sanitize_identifier(&name));

            let script = tokio::fs::read_to_string(&data_file)
                .await
                .map_err(|e| Error::staging(&data_file, e))?;
            let source_name = format!("{}/{}", name, DATA_FILE);
            let stats = SqlBatchExecutor::new(&mut self.connection, &self.cancel)
                .execute(&script, &source_name, outcome)
                .await?;

            data_batches.merge(stats);
            tables.push(name);
        }
        self.state = ImportState::DataApplied;

        Ok((tables, schema_batches, data_batches))
    }
}

/// Immediate subdirectories holding a `data.sql`, sorted by directory name.
///
/// Names compare case-insensitively (`apple < Banana`), with byte order
/// breaking ties between names that differ only in case.
///
/// Name order is the only replay order across tables; packages with
/// foreign keys between tables rely on it matching a dependency-safe order.
async fn table_scripts(temp: &Path) -> Result<Vec<(String, PathBuf)>> {
    let mut entries = tokio::fs::read_dir(temp)
        .await
        .map_err(|e| Error::staging(temp, e))?;

    let mut scripts = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| Error::staging(temp, e))?
    {
        let file_type = entry.file_type().await.map_err(|e| Error::staging(temp, e))?;
        if !file_type.is_dir() {
            continue;
        }

        let data_file = entry.path().join(DATA_FILE);
        if !tokio::fs::try_exists(&data_file).await.unwrap_or(false) {
            tracing::debug!("No {} in {}, skipping", DATA_FILE, entry.path().display());
            continue;
        }

        scripts.push((entry.file_name().to_string_lossy().into_owned(), data_file));
    }

    scripts.sort_by(|a, b| {
        a.0.to_lowercase()
            .cmp(&b.0.to_lowercase())
            .then_with(|| a.0.cmp(&b.0))
    });
    Ok(scripts)
}
