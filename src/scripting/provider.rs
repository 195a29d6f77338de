// ABOUTME: Capability interface for schema introspection and SQL scripting
// ABOUTME: Defines object references and scripting options shared by providers

use super::category::Category;
use crate::config::ExportSelection;
use crate::error::Result;
use async_trait::async_trait;
use std::fmt;
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// A database object reported by a provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectRef {
    pub category: Category,
    pub schema: Option<String>,
    pub name: String,
    /// Owning table for indexes, foreign keys, and table triggers
    pub parent: Option<String>,
    /// Provider-assigned identity (an OID for PostgreSQL)
    pub object_id: Option<u32>,
    pub is_system: bool,
    pub is_clustered: bool,
}

impl ObjectRef {
    pub fn new(category: Category, name: impl Into<String>) -> Self {
        Self {
            category,
            schema: None,
            name: name.into(),
            parent: None,
            object_id: None,
            is_system: false,
            is_clustered: false,
        }
    }

    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    pub fn with_object_id(mut self, object_id: u32) -> Self {
        self.object_id = Some(object_id);
        self
    }

    /// Comment line prefixed to each scripted object
    pub fn comment_line(&self) -> String {
        format!(
            "/******  Object:  {} {}  ******/",
            self.category.object_kind(),
            self
        )
    }
}

impl fmt::Display for ObjectRef {
    /// `[schema].[name]`, or `[name]` when the object is not schema-scoped
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.schema {
            Some(schema) => write!(f, "[{}].[{}]", schema, self.name),
            None => write!(f, "[{}]", self.name),
        }
    }
}

/// Whether a script recreates an object's definition or its rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptMode {
    Schema,
    Data,
}

/// Toggles handed to the provider with each scripting request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptOptions {
    pub mode: ScriptMode,
    /// Guard each statement so replay over existing objects does not fail
    pub include_if_not_exists: bool,
    /// Qualify object references with their schema
    pub schema_qualify: bool,
    /// Emit the primary key inline with the table definition
    pub primary_keys: bool,
    /// Emit column defaults
    pub defaults: bool,
    /// Script user-defined types together with their schema
    pub user_defined_types: bool,
    /// Script extended statistics together with their table
    pub statistics: bool,
    /// INSERT statements per batch in data scripts
    pub data_batch_rows: usize,
}

impl ScriptOptions {
    pub fn schema() -> Self {
        Self {
            mode: ScriptMode::Schema,
            include_if_not_exists: true,
            schema_qualify: true,
            primary_keys: true,
            defaults: true,
            user_defined_types: true,
            statistics: false,
            data_batch_rows: 500,
        }
    }

    pub fn data() -> Self {
        Self {
            mode: ScriptMode::Data,
            ..Self::schema()
        }
    }

    /// Schema options carrying the selection's type and statistics toggles
    pub fn for_selection(selection: &ExportSelection) -> Self {
        Self {
            user_defined_types: selection.user_defined_types,
            statistics: selection.statistics,
            ..Self::schema()
        }
    }
}

/// Introspection and scripting capability the pipelines depend on.
///
/// Implementations own their database connection between `connect` and
/// `close`. `script` returns `None` when an object has nothing to emit.
#[async_trait]
pub trait SchemaProvider: Send {
    async fn connect(&mut self) -> Result<()>;

    async fn close(&mut self) -> Result<()>;

    /// Every object of `category` in `catalog`, system objects included and flagged
    async fn list_objects(&mut self, catalog: &str, category: Category) -> Result<Vec<ObjectRef>>;

    async fn script(&mut self, object: &ObjectRef, options: &ScriptOptions)
        -> Result<Option<String>>;

    /// Write `table`'s data script to `sink`.
    ///
    /// The default renders the whole script through [`SchemaProvider::script`];
    /// providers that can stream rows write it batch by batch instead.
    async fn write_data(
        &mut self,
        table: &ObjectRef,
        options: &ScriptOptions,
        sink: &mut (dyn AsyncWrite + Unpin + Send),
    ) -> Result<()> {
        let mut script = self.script(table, options).await?.unwrap_or_default();
        if !script.is_empty() && !script.ends_with('\n') {
            script.push('\n');
        }
        sink.write_all(script.as_bytes()).await?;
        Ok(())
    }
}
