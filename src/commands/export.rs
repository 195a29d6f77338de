// ABOUTME: Export command wiring the PostgreSQL provider into the export pipeline
// ABOUTME: Merges config file and flags, then writes one package file

use crate::config::{load_config_from_file, PackagerConfig};
use crate::error::FailurePolicy;
use crate::migration::ExportPipeline;
use crate::package::TarZstdArchiver;
use crate::postgres::PgSchemaProvider;
use crate::utils;
use anyhow::{Context, Result};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

/// Flags of the `export` subcommand.
#[derive(Debug, Clone, Default)]
pub struct ExportOptions {
    pub connection: String,
    pub output: PathBuf,
    /// Defaults to the database named in the connection string
    pub catalog: Option<String>,
    /// Appended to the config file's ignore-list
    pub ignore: Vec<String>,
    pub config_path: Option<PathBuf>,
    pub strict: bool,
}

pub async fn export(options: ExportOptions, cancel: CancellationToken) -> Result<()> {
    tracing::info!("Starting export...");

    let mut config = match &options.config_path {
        Some(path) => load_config_from_file(path)
            .with_context(|| format!("Failed to load config file {}", path.display()))?,
        None => PackagerConfig::default(),
    };
    if options.strict {
        config.failure_policy = FailurePolicy::Strict;
    }

    utils::validate_connection_string(&options.connection)
        .context("Invalid source connection string")?;
    let catalog = match options.catalog {
        Some(catalog) => catalog,
        None => utils::catalog_from_connection_string(&options.connection)
            .context("Cannot determine which database to export")?,
    };

    let selection = config.export.with_ignore_tables(options.ignore);
    if !selection.ignore_tables.is_empty() {
        tracing::info!("Ignoring data of: {}", selection.ignore_tables.join(", "));
    }

    let mut pipeline = ExportPipeline::new(
        PgSchemaProvider::new(options.connection),
        TarZstdArchiver::default(),
    )
    .with_selection(selection)
    .with_policy(config.failure_policy)
    .with_cancellation(cancel);

    let report = pipeline
        .export(&catalog, &options.output)
        .await
        .with_context(|| format!("Export of database '{}' failed", catalog))?;

    tracing::info!(
        "✓ {} object(s) scripted, data for {} table(s), {} ignored",
        report.objects_scripted,
        report.tables_exported.len(),
        report.tables_ignored.len()
    );
    super::summarize_outcome(&report.outcome);
    if report.archived {
        tracing::info!("✅ Package written to {}", report.package.display());
    } else {
        tracing::warn!("⚠ Package {} was not written", report.package.display());
    }
    Ok(())
}
