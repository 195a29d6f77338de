// ABOUTME: Shared test doubles for the pipeline integration tests
// ABOUTME: An in-memory source catalog and a fake target that counts rows per table

#![allow(dead_code)]

use async_trait::async_trait;
use pg_packager::error::{Error, Result};
use pg_packager::migration::SqlConnection;
use pg_packager::scripting::{Category, ObjectRef, SchemaProvider, ScriptMode, ScriptOptions};
use std::collections::BTreeMap;
use tokio_util::sync::CancellationToken;

pub const CATALOG: &str = "shop";

/// Source database made of tables with a known row count.
#[derive(Default)]
pub struct StubSource {
    pub tables: Vec<(String, usize)>,
    /// Data scripting fails for these tables
    pub failing_tables: Vec<String>,
    /// Cancelled once this table's data has been scripted
    pub cancel_after: Option<(String, CancellationToken)>,
    pub connects: usize,
    pub closes: usize,
}

impl StubSource {
    pub fn with_tables(tables: &[(&str, usize)]) -> Self {
        Self {
            tables: tables
                .iter()
                .map(|(name, rows)| (name.to_string(), *rows))
                .collect(),
            ..Default::default()
        }
    }

    fn rows(&self, table: &str) -> usize {
        self.tables
            .iter()
            .find(|(name, _)| name == table)
            .map(|(_, rows)| *rows)
            .unwrap_or(0)
    }
}

#[async_trait]
impl SchemaProvider for StubSource {
    async fn connect(&mut self) -> Result<()> {
        self.connects += 1;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.closes += 1;
        Ok(())
    }

    async fn list_objects(&mut self, catalog: &str, category: Category) -> Result<Vec<ObjectRef>> {
        if catalog != CATALOG {
            return Err(Error::scripting(format!("catalog {}", catalog), "unknown database"));
        }
        let objects = match category {
            Category::Schemas => vec![ObjectRef::new(Category::Schemas, "public")],
            Category::Tables => self
                .tables
                .iter()
                .map(|(name, _)| {
                    ObjectRef::new(Category::Tables, name.as_str()).with_schema("public")
                })
                .collect(),
            _ => Vec::new(),
        };
        Ok(objects)
    }

    async fn script(
        &mut self,
        object: &ObjectRef,
        options: &ScriptOptions,
    ) -> Result<Option<String>> {
        match (options.mode, object.category) {
            (ScriptMode::Schema, Category::Schemas) => {
                Ok(Some(format!("CREATE SCHEMA {};", object.name)))
            }
            (ScriptMode::Schema, Category::Tables) => {
                Ok(Some(format!("CREATE TABLE {};", object.name)))
            }
            (ScriptMode::Schema, _) => Ok(None),
            (ScriptMode::Data, _) => {
                if self.failing_tables.contains(&object.name) {
                    return Err(Error::Connection("read timed out".to_string()));
                }

                let mut script = String::new();
                for i in 0..self.rows(&object.name) {
                    if i > 0 && i % options.data_batch_rows == 0 {
                        script.push_str("GO\n");
                    }
                    script.push_str(&format!("INSERT INTO {} VALUES ({});\n", object.name, i));
                }

                if let Some((table, cancel)) = &self.cancel_after {
                    if *table == object.name {
                        cancel.cancel();
                    }
                }
                Ok(Some(script))
            }
        }
    }
}

/// Target database that understands `CREATE TABLE x;` and `INSERT INTO x ...` lines.
#[derive(Default)]
pub struct FakeTarget {
    pub open: bool,
    pub tables: BTreeMap<String, usize>,
    /// Table names in the order their first row arrived
    pub insert_order: Vec<String>,
    pub batches: Vec<String>,
    /// Batches containing this text fail
    pub fail_on: Option<String>,
}

impl FakeTarget {
    pub fn failing_on(text: &str) -> Self {
        Self {
            fail_on: Some(text.to_string()),
            ..Default::default()
        }
    }
}

#[async_trait]
impl SqlConnection for FakeTarget {
    fn is_open(&self) -> bool {
        self.open
    }

    async fn open(&mut self) -> Result<()> {
        self.open = true;
        Ok(())
    }

    async fn execute(&mut self, sql: &str) -> Result<()> {
        if !self.open {
            return Err(Error::Connection("not open".to_string()));
        }
        if let Some(text) = &self.fail_on {
            if sql.contains(text.as_str()) {
                return Err(Error::Connection(format!("syntax error near {}", text)));
            }
        }

        self.batches.push(sql.to_string());
        for line in sql.lines().map(str::trim) {
            if let Some(rest) = line.strip_prefix("CREATE TABLE ") {
                self.tables
                    .entry(rest.trim_end_matches(';').to_string())
                    .or_insert(0);
            } else if let Some(rest) = line.strip_prefix("INSERT INTO ") {
                let table = rest.split_whitespace().next().unwrap_or_default().to_string();
                if !self.insert_order.contains(&table) {
                    self.insert_order.push(table.clone());
                }
                *self.tables.entry(table).or_insert(0) += 1;
            }
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.open = false;
        Ok(())
    }
}
