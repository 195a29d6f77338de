// ABOUTME: Database object categories and their per-category scripting rules
// ABOUTME: Defines script order, banners, object labels, and scope filters

use super::provider::ObjectRef;
use crate::config::ExportSelection;
use std::fmt;

/// A class of database object scripted into `schema.sql`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Schemas,
    Tables,
    Indexes,
    ForeignKeys,
    StoredProcedures,
    Functions,
    Views,
    Triggers,
    Users,
}

impl Category {
    /// Order categories are written in. Foreign keys follow tables and
    /// indexes so their referenced keys exist when the script is replayed.
    pub const SCRIPT_ORDER: [Category; 9] = [
        Category::Schemas,
        Category::Tables,
        Category::Indexes,
        Category::ForeignKeys,
        Category::StoredProcedures,
        Category::Functions,
        Category::Views,
        Category::Triggers,
        Category::Users,
    ];

    /// Used in progress log lines
    pub fn label(self) -> &'static str {
        match self {
            Category::Schemas => "schema names",
            Category::Tables => "tables",
            Category::Indexes => "non-clustered indexes",
            Category::ForeignKeys => "foreign keys",
            Category::StoredProcedures => "stored procedures",
            Category::Functions => "user-defined functions",
            Category::Views => "views",
            Category::Triggers => "triggers",
            Category::Users => "users",
        }
    }

    pub fn banner_title(self) -> &'static str {
        match self {
            Category::Schemas => "SCHEMAS",
            Category::Tables => "TABLES",
            Category::Indexes => "INDEXES",
            Category::ForeignKeys => "FOREIGN KEYS",
            Category::StoredProcedures => "STORED PROCEDURES",
            Category::Functions => "USER-DEFINED FUNCTIONS",
            Category::Views => "VIEWS",
            Category::Triggers => "TRIGGERS",
            Category::Users => "USERS",
        }
    }

    /// Object kind named in per-object comments
    pub fn object_kind(self) -> &'static str {
        match self {
            Category::Schemas => "Schema",
            Category::Tables => "Table",
            Category::Indexes => "Index",
            Category::ForeignKeys => "Foreign Key",
            Category::StoredProcedures => "StoredProcedure",
            Category::Functions => "Function",
            Category::Views => "View",
            Category::Triggers => "Trigger",
            Category::Users => "User",
        }
    }

    pub fn is_enabled(self, selection: &ExportSelection) -> bool {
        match self {
            Category::Schemas => selection.schemas,
            Category::Tables => selection.tables,
            Category::Indexes => selection.indexes,
            Category::ForeignKeys => selection.foreign_keys,
            Category::StoredProcedures => selection.procedures,
            Category::Functions => selection.functions,
            Category::Views => selection.views,
            Category::Triggers => selection.triggers,
            Category::Users => selection.users,
        }
    }

    /// System objects are never scripted; clustered indexes come inline with their table.
    pub fn in_scope(self, object: &ObjectRef) -> bool {
        if object.is_system {
            return false;
        }
        match self {
            Category::Indexes => !object.is_clustered,
            _ => true,
        }
    }

    /// Comment block opening a category section
    pub fn banner(self) -> String {
        let rule = "*".repeat(77);
        format!(
            "\n/{rule}\n * {title:<74}*\n {stars}/\n",
            rule = rule,
            title = self.banner_title(),
            stars = "*".repeat(76),
        )
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
