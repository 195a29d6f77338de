// ABOUTME: Plans and writes schema.sql from the enabled object categories
// ABOUTME: Scripts categories in dependency-safe order through a SchemaProvider

use super::category::Category;
use super::provider::{ObjectRef, SchemaProvider, ScriptOptions};
use crate::config::ExportSelection;
use crate::error::{Error, Outcome, Result};
use crate::utils::ensure_not_cancelled;
use std::path::Path;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;

/// What a planner run wrote.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PlanSummary {
    pub categories: Vec<Category>,
    pub objects_scripted: usize,
    pub objects_failed: usize,
}

/// Writes `schema.sql` one category section at a time.
pub struct SchemaScriptPlanner<'a> {
    selection: &'a ExportSelection,
    options: ScriptOptions,
}

impl<'a> SchemaScriptPlanner<'a> {
    pub fn new(selection: &'a ExportSelection) -> Self {
        Self {
            selection,
            options: ScriptOptions::for_selection(selection),
        }
    }

    pub fn options(&self) -> &ScriptOptions {
        &self.options
    }

    /// Script every enabled category of `catalog` into `output`.
    ///
    /// `output` is truncated first, so it exists even when nothing is
    /// enabled. A failure to list a category's objects aborts the run;
    /// failures scripting a single object are recorded in `outcome`.
    pub async fn write_schema<P>(
        &self,
        provider: &mut P,
        catalog: &str,
        output: &Path,
        cancel: &CancellationToken,
        outcome: &mut Outcome,
    ) -> Result<PlanSummary>
    where
        P: SchemaProvider + ?Sized,
    {
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(output)
            .await
            .map_err(|e| Error::staging(output, e))?;

        let mut summary = PlanSummary::default();

        for category in Category::SCRIPT_ORDER {
            if !category.is_enabled(self.selection) {
                tracing::debug!("Skipping {} (disabled)", category);
                continue;
            }

            ensure_not_cancelled(cancel)?;
            tracing::info!("Scripting {} for database {}", category, catalog);

            let section = self
                .script_category(provider, catalog, category, &mut summary, outcome)
                .await?;
            file.write_all(section.as_bytes())
                .await
                .map_err(|e| Error::staging(output, e))?;
            summary.categories.push(category);
        }

        file.flush().await.map_err(|e| Error::staging(output, e))?;

        tracing::info!(
            "✓ Schema written: {} object(s) scripted, {} failed",
            summary.objects_scripted,
            summary.objects_failed
        );
        Ok(summary)
    }

    async fn script_category<P>(
        &self,
        provider: &mut P,
        catalog: &str,
        category: Category,
        summary: &mut PlanSummary,
        outcome: &mut Outcome,
    ) -> Result<String>
    where
        P: SchemaProvider + ?Sized,
    {
        let objects = provider
            .list_objects(catalog, category)
            .await
            .map_err(|e| {
                as_scripting_error(format!("{} of database {}", category.label(), catalog), e)
            })?;

        let mut section = category.banner();

        for object in objects.iter().filter(|o| category.in_scope(o)) {
            match provider.script(object, &self.options).await {
                Ok(Some(sql)) if !sql.trim().is_empty() => {
                    append_object(&mut section, object, &sql);
                    summary.objects_scripted += 1;
                }
                Ok(_) => {
                    tracing::debug!("Nothing to script for {}", object);
                }
                Err(e) => {
                    summary.objects_failed += 1;
                    let subject = format!("{} {}", category.object_kind(), object);
                    outcome.record(as_scripting_error(subject, e))?;
                }
            }
        }

        Ok(section)
    }
}

fn append_object(section: &mut String, object: &ObjectRef, sql: &str) {
    section.push('\n');
    section.push_str(&object.comment_line());
    section.push('\n');
    section.push_str(sql.trim_end());
    section.push_str("\nGO\n");
}

pub(crate) fn as_scripting_error(subject: String, error: Error) -> Error {
    match error {
        Error::Scripting { .. } | Error::Cancelled => error,
        other => Error::scripting(subject, other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FailurePolicy;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use tempfile::tempdir;

    #[derive(Default)]
    struct CannedProvider {
        objects: HashMap<Category, Vec<ObjectRef>>,
        failing_objects: Vec<String>,
        failing_category: Option<Category>,
        listed: Vec<Category>,
    }

    #[async_trait]
    impl SchemaProvider for CannedProvider {
        async fn connect(&mut self) -> Result<()> {
            Ok(())
        }

        async fn close(&mut self) -> Result<()> {
            Ok(())
        }

        async fn list_objects(
            &mut self,
            _catalog: &str,
            category: Category,
        ) -> Result<Vec<ObjectRef>> {
            self.listed.push(category);
            if self.failing_category == Some(category) {
                return Err(Error::Connection("catalog went away".to_string()));
            }
            Ok(self.objects.get(&category).cloned().unwrap_or_default())
        }

        async fn script(
            &mut self,
            object: &ObjectRef,
            _options: &ScriptOptions,
        ) -> Result<Option<String>> {
            if self.failing_objects.contains(&object.name) {
                return Err(Error::Connection("lost".to_string()));
            }
            Ok(Some(format!("CREATE {} {};", object.category.object_kind(), object.name)))
        }
    }

    fn provider() -> CannedProvider {
        let mut provider = CannedProvider::default();
        provider.objects.insert(
            Category::Tables,
            vec![
                ObjectRef::new(Category::Tables, "orders").with_schema("public"),
                ObjectRef {
                    is_system: true,
                    ..ObjectRef::new(Category::Tables, "pg_internal")
                },
            ],
        );
        provider.objects.insert(
            Category::Indexes,
            vec![
                ObjectRef {
                    is_clustered: true,
                    ..ObjectRef::new(Category::Indexes, "orders_pkey")
                },
                ObjectRef::new(Category::Indexes, "ix_orders_date"),
            ],
        );
        provider.objects.insert(
            Category::ForeignKeys,
            vec![ObjectRef::new(Category::ForeignKeys, "fk_orders_customer")],
        );
        provider
    }

    #[tokio::test]
    async fn test_categories_written_in_order_with_filters() {
        let dir = tempdir().unwrap();
        let output = dir.path().join("schema.sql");
        let selection = ExportSelection::default();
        let mut provider = provider();
        let mut outcome = Outcome::new(FailurePolicy::Lenient);

        let summary = SchemaScriptPlanner::new(&selection)
            .write_schema(&mut provider, "shop", &output, &CancellationToken::new(), &mut outcome)
            .await
            .unwrap();

        let script = std::fs::read_to_string(&output).unwrap();
        let tables = script.find("CREATE Table orders").unwrap();
        let index = script.find("CREATE Index ix_orders_date").unwrap();
        let fk = script.find("CREATE Foreign Key fk_orders_customer").unwrap();
        assert!(tables < index && index < fk);

        assert!(!script.contains("pg_internal"));
        assert!(!script.contains("orders_pkey"));
        assert!(script.contains("/******  Object:  Table [public].[orders]  ******/"));
        assert!(!script.contains("USERS"));

        assert_eq!(summary.objects_scripted, 3);
        assert_eq!(summary.categories.len(), 8);
        assert!(!provider.listed.contains(&Category::Users));
        assert!(outcome.is_clean());
    }

    #[tokio::test]
    async fn test_each_object_is_its_own_batch() {
        let dir = tempdir().unwrap();
        let output = dir.path().join("schema.sql");
        let selection = ExportSelection::default();
        let mut provider = provider();
        let mut outcome = Outcome::new(FailurePolicy::Lenient);

        SchemaScriptPlanner::new(&selection)
            .write_schema(&mut provider, "shop", &output, &CancellationToken::new(), &mut outcome)
            .await
            .unwrap();

        let script = std::fs::read_to_string(&output).unwrap();
        let separators = script.lines().filter(|l| l.trim() == "GO").count();
        assert_eq!(separators, 3);
    }

    #[tokio::test]
    async fn test_disabled_everything_still_creates_file() {
        let dir = tempdir().unwrap();
        let output = dir.path().join("schema.sql");
        std::fs::write(&output, "stale content").unwrap();

        let selection = ExportSelection {
            schemas: false,
            tables: false,
            indexes: false,
            foreign_keys: false,
            procedures: false,
            functions: false,
            views: false,
            triggers: false,
            users: false,
            ..ExportSelection::default()
        };
        let mut provider = provider();
        let mut outcome = Outcome::new(FailurePolicy::Lenient);

        let summary = SchemaScriptPlanner::new(&selection)
            .write_schema(&mut provider, "shop", &output, &CancellationToken::new(), &mut outcome)
            .await
            .unwrap();

        assert!(summary.categories.is_empty());
        assert_eq!(std::fs::read_to_string(&output).unwrap(), "");
    }

    #[tokio::test]
    async fn test_object_failure_is_recorded_not_fatal() {
        let dir = tempdir().unwrap();
        let output = dir.path().join("schema.sql");
        let selection = ExportSelection::default();
        let mut provider = provider();
        provider.failing_objects.push("ix_orders_date".to_string());
        let mut outcome = Outcome::new(FailurePolicy::Lenient);

        let summary = SchemaScriptPlanner::new(&selection)
            .write_schema(&mut provider, "shop", &output, &CancellationToken::new(), &mut outcome)
            .await
            .unwrap();

        assert_eq!(summary.objects_failed, 1);
        assert_eq!(outcome.errors().len(), 1);
        assert!(outcome.errors()[0].to_string().contains("ix_orders_date"));

        let script = std::fs::read_to_string(&output).unwrap();
        assert!(script.contains("fk_orders_customer"));
    }

    #[tokio::test]
    async fn test_category_failure_is_fatal() {
        let dir = tempdir().unwrap();
        let output = dir.path().join("schema.sql");
        let selection = ExportSelection::default();
        let mut provider = provider();
        provider.failing_category = Some(Category::Views);
        let mut outcome = Outcome::new(FailurePolicy::Lenient);

        let result = SchemaScriptPlanner::new(&selection)
            .write_schema(&mut provider, "shop", &output, &CancellationToken::new(), &mut outcome)
            .await;

        match result {
            Err(Error::Scripting { object, .. }) => assert!(object.contains("views")),
            other => panic!("expected scripting error, got {:?}", other),
        }
        assert!(!provider.listed.contains(&Category::Triggers));
    }

    #[tokio::test]
    async fn test_cancelled_before_first_category() {
        let dir = tempdir().unwrap();
        let output = dir.path().join("schema.sql");
        let selection = ExportSelection::default();
        let mut provider = provider();
        let mut outcome = Outcome::new(FailurePolicy::Lenient);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = SchemaScriptPlanner::new(&selection)
            .write_schema(&mut provider, "shop", &output, &cancel, &mut outcome)
            .await;

        assert!(matches!(result, Err(Error::Cancelled)));
        assert!(provider.listed.is_empty());
    }
}
