// ABOUTME: Command implementations for the CLI subcommands
// ABOUTME: Exports the export and import commands

pub mod export;
pub mod import;

pub use export::{export, ExportOptions};
pub use import::{import, ImportOptions};

/// Warn about recorded non-fatal errors, one line each
fn summarize_outcome(outcome: &crate::error::Outcome) {
    if outcome.is_clean() {
        return;
    }
    tracing::warn!(
        "⚠ Completed with {} non-fatal error(s); see the log above for details:",
        outcome.errors().len()
    );
    for error in outcome.errors() {
        tracing::warn!("  - {}", error);
    }
}
