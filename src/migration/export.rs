// ABOUTME: Export pipeline from a live database to a package file
// ABOUTME: Connects, stages, scripts schema and per-table data, archives, cleans up

use crate::config::ExportSelection;
use crate::error::{Error, FailurePolicy, Outcome, Result};
use crate::package::{rename_no_clobber, run_blocking, Archiver, PackageLayout};
use crate::scripting::planner::as_scripting_error;
use crate::scripting::{Category, ObjectRef, SchemaProvider, SchemaScriptPlanner, ScriptOptions};
use crate::utils::{ensure_not_cancelled, sanitize_identifier};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio_util::sync::CancellationToken;

/// Progress of an export run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportState {
    Idle,
    Connected,
    Staged,
    SchemaWritten,
    DataWritten,
    Archived,
    Done,
    Failed,
    Cancelled,
}

/// Result of a completed export.
#[derive(Debug)]
pub struct ExportReport {
    pub package: PathBuf,
    /// False when compression failed leniently and no package was written
    pub archived: bool,
    /// Tables whose `data.sql` made it into the package
    pub tables_exported: Vec<String>,
    pub tables_ignored: Vec<String>,
    pub objects_scripted: usize,
    pub outcome: Outcome,
}

/// Exports one catalog through a [`SchemaProvider`] into a package file.
///
/// Fatal errors and cancellation leave the `_build` staging directory in
/// place so its partial contents can be inspected.
pub struct ExportPipeline<P, A> {
    provider: P,
    archiver: A,
    selection: ExportSelection,
    policy: FailurePolicy,
    cancel: CancellationToken,
    state: ExportState,
}

impl<P: SchemaProvider, A: Archiver + Clone + 'static> ExportPipeline<P, A> {
    pub fn new(provider: P, archiver: A) -> Self {
        Self {
            provider,
            archiver,
            selection: ExportSelection::default(),
            policy: FailurePolicy::default(),
            cancel: CancellationToken::new(),
            state: ExportState::Idle,
        }
    }

    pub fn with_selection(mut self, selection: ExportSelection) -> Self {
        self.selection = selection;
        self
    }

    pub fn with_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn state(&self) -> ExportState {
        self.state
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Export `catalog` to `package`.
    ///
    /// `catalog` must be the database the provider connects to. The package
    /// path must not exist yet.
    pub async fn export(
        &mut self,
        catalog: &str,
        package: impl AsRef<Path>,
    ) -> Result<ExportReport> {
        let result = self.run(catalog, package.as_ref()).await;
        self.state = match &result {
            Ok(_) => ExportState::Done,
            Err(Error::Cancelled) => ExportState::Cancelled,
            Err(_) => ExportState::Failed,
        };
        result
    }

    async fn run(&mut self, catalog: &str, package: &Path) -> Result<ExportReport> {
        let layout = PackageLayout::for_export(package)?;
        ensure_not_cancelled(&self.cancel)?;

        if package.exists() {
            return Err(Error::DestinationExists(package.to_path_buf()));
        }

        tracing::info!("Connecting to source database '{}'...", catalog);
        self.provider.connect().await?;
        self.state = ExportState::Connected;
        tracing::info!("✓ Connected to source");

        let mut outcome = Outcome::new(self.policy);
        let scripted = self.script_package(catalog, &layout, &mut outcome).await;

        if let Err(e) = self.provider.close().await {
            tracing::warn!("⚠ Failed to close source connection: {}", e);
        }
        let (objects_scripted, tables_exported, tables_ignored) = scripted?;

        ensure_not_cancelled(&self.cancel)?;
        self.archive(&layout, &mut outcome).await?;

        ensure_not_cancelled(&self.cancel)?;
        let staging = layout.staging_dir();
        let archived = self.state == ExportState::Archived;
        if archived {
            if let Err(e) = tokio::fs::remove_dir_all(staging).await {
                outcome.record(Error::staging(staging, e))?;
            }
            tracing::info!("✅ Export completed: {}", layout.package_path().display());
        } else {
            tracing::warn!(
                "⚠ Package {} was not written; staged files kept in {}",
                layout.package_path().display(),
                staging.display()
            );
        }

        Ok(ExportReport {
            package: layout.package_path().to_path_buf(),
            archived,
            tables_exported,
            tables_ignored,
            objects_scripted,
            outcome,
        })
    }

    async fn script_package(
        &mut self,
        catalog: &str,
        layout: &PackageLayout,
        outcome: &mut Outcome,
    ) -> Result<(usize, Vec<String>, Vec<String>)> {
        ensure_not_cancelled(&self.cancel)?;
        stage(layout.staging_dir()).await?;
        self.state = ExportState::Staged;

        tracing::info!("Step 1/2: Scripting schema...");
        let summary = SchemaScriptPlanner::new(&self.selection)
            .write_schema(
                &mut self.provider,
                catalog,
                &layout.schema_file_path(),
                &self.cancel,
                outcome,
            )
            .await?;
        self.state = ExportState::SchemaWritten;

        tracing::info!("Step 2/2: Scripting table data...");
        let (exported, ignored) = self.export_data(catalog, layout, outcome).await?;
        self.state = ExportState::DataWritten;

        Ok((summary.objects_scripted, exported, ignored))
    }

    async fn export_data(
        &mut self,
        catalog: &str,
        layout: &PackageLayout,
        outcome: &mut Outcome,
    ) -> Result<(Vec<String>, Vec<String>)> {
        let tables = self
            .provider
            .list_objects(catalog, Category::Tables)
            .await
            .map_err(|e| as_scripting_error(format!("tables of database {}", catalog), e))?;

        let options = ScriptOptions::data();
        let mut exported = Vec::new();
        let mut ignored = Vec::new();
        let mut used_dirs = HashSet::new();

        for table in tables.iter().filter(|t| !t.is_system) {
            ensure_not_cancelled(&self.cancel)?;
            let name = sanitize_identifier(&table.name);

            if self.selection.is_ignored(&table.name) {
                tracing::info!("Table {} is ignored", name);
                ignored.push(table.name.clone());
                continue;
            }

            if !used_dirs.insert(table.name.to_lowercase()) {
                outcome.record(Error::scripting(
                    format!("data of {}", table),
                    "another table already uses this directory name",
                ))?;
                continue;
            }

            tracing::info!("Exporting data - {}", name);
            match self.export_table(layout, table, &options).await {
                Ok(()) => exported.push(table.name.clone()),
                Err(e) => {
                    if let Ok(dir) = layout.table_dir(&table.name) {
                        if let Err(cleanup) = tokio::fs::remove_dir_all(&dir).await {
                            tracing::debug!("Could not remove {}: {}", dir.display(), cleanup);
                        }
                    }
                    outcome.record(as_scripting_error(format!("data of {}", table), e))?;
                }
            }
        }

        tracing::info!(
            "✓ Data exported for {} table(s), {} ignored",
            exported.len(),
            ignored.len()
        );
        Ok((exported, ignored))
    }

    async fn export_table(
        &mut self,
        layout: &PackageLayout,
        table: &ObjectRef,
        options: &ScriptOptions,
    ) -> Result<()> {
        let dir = layout.table_dir(&table.name)?;
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| Error::staging(&dir, e))?;

        let path = layout.table_data_path(&table.name)?;
        let file = tokio::fs::File::create(&path)
            .await
            .map_err(|e| Error::staging(&path, e))?;
        let mut writer = BufWriter::new(file);

        self.provider.write_data(table, options, &mut writer).await?;
        writer.flush().await.map_err(|e| Error::staging(&path, e))
    }

    async fn archive(&mut self, layout: &PackageLayout, outcome: &mut Outcome) -> Result<()> {
        tracing::info!("Compiling package...");
        let intermediate = layout.archive_intermediate_path();

        let source = layout.staging_dir().to_path_buf();
        let target = intermediate.clone();
        let compressed = run_blocking(&self.archiver, &intermediate, move |archiver| {
            archiver.compress_dir(&source, &target, true)
        })
        .await;
        if let Err(e) = compressed {
            return outcome.record(e);
        }
        tracing::debug!("Staging archived to {}", intermediate.display());

        match rename_no_clobber(&intermediate, layout.package_path()) {
            Ok(()) => {
                self.state = ExportState::Archived;
                Ok(())
            }
            Err(e @ Error::DestinationExists(_)) => {
                if let Err(cleanup) = std::fs::remove_file(&intermediate) {
                    tracing::debug!("Could not remove {}: {}", intermediate.display(), cleanup);
                }
                Err(e)
            }
            Err(e) => outcome.record(Error::archive(layout.package_path(), e)),
        }
    }
}

/// Delete and recreate the staging directory
async fn stage(staging: &Path) -> Result<()> {
    if tokio::fs::try_exists(staging).await.unwrap_or(false) {
        tracing::debug!("Removing stale staging directory {}", staging.display());
        tokio::fs::remove_dir_all(staging)
            .await
            .map_err(|e| Error::staging(staging, e))?;
    }
    tokio::fs::create_dir_all(staging)
        .await
        .map_err(|e| Error::staging(staging, e))
}
