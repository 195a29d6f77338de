// ABOUTME: Export and import pipelines module
// ABOUTME: Handles package staging, SQL batch replay, and pipeline orchestration

pub mod batch;
pub mod export;
pub mod import;

pub use batch::{split_batches, BatchStats, SqlBatchExecutor, SqlConnection};
pub use export::{ExportPipeline, ExportReport, ExportState};
pub use import::{ImportPipeline, ImportReport, ImportState};
