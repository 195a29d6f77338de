// ABOUTME: Import command replaying a package into a PostgreSQL database
// ABOUTME: Wires PgConnection and the archiver into the import pipeline

use crate::error::FailurePolicy;
use crate::migration::ImportPipeline;
use crate::package::TarZstdArchiver;
use crate::postgres::PgConnection;
use crate::utils;
use anyhow::{Context, Result};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

/// Flags of the `import` subcommand.
#[derive(Debug, Clone, Default)]
pub struct ImportOptions {
    pub connection: String,
    pub input: PathBuf,
    pub strict: bool,
}

pub async fn import(options: ImportOptions, cancel: CancellationToken) -> Result<()> {
    tracing::info!("Starting import of {}...", options.input.display());

    utils::validate_connection_string(&options.connection)
        .context("Invalid target connection string")?;

    let policy = if options.strict {
        FailurePolicy::Strict
    } else {
        FailurePolicy::Lenient
    };

    let mut pipeline = ImportPipeline::new(
        PgConnection::new(options.connection),
        TarZstdArchiver::default(),
    )
    .with_policy(policy)
    .with_cancellation(cancel);

    let report = pipeline
        .import(&options.input)
        .await
        .with_context(|| format!("Import of {} failed", options.input.display()))?;

    tracing::info!(
        "✓ Schema: {} batch(es) applied, {} failed",
        report.schema_batches.executed,
        report.schema_batches.failed
    );
    tracing::info!(
        "✓ Data: {} table(s), {} batch(es) applied, {} failed",
        report.tables.len(),
        report.data_batches.executed,
        report.data_batches.failed
    );
    super::summarize_outcome(&report.outcome);
    Ok(())
}
