// ABOUTME: SQL text rendering for the PostgreSQL scripting provider
// ABOUTME: Quoting, idempotency guards, table definitions, and row INSERT scripts

use crate::scripting::ScriptOptions;

/// Quote an identifier for use in generated SQL
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Quote a string literal (assumes `standard_conforming_strings = on`)
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// `"schema"."name"`, or just `"name"` when qualification is off
pub fn qualified_name(schema: Option<&str>, name: &str, schema_qualify: bool) -> String {
    match schema {
        Some(schema) if schema_qualify => format!("{}.{}", quote_ident(schema), quote_ident(name)),
        _ => quote_ident(name),
    }
}

/// Dollar-quote tag around guarded statements
const GUARD_TAG: &str = "$pgpkg$";

/// Wrap a statement so replaying it over an existing object is a no-op.
///
/// For statements without an `IF NOT EXISTS` form (constraints, triggers,
/// roles, types). The statement must not contain `$pgpkg$`.
pub fn guard_duplicate(statement: &str) -> String {
    format!(
        "DO {tag}\nBEGIN\n    {stmt};\nEXCEPTION\n    \
         WHEN duplicate_object OR duplicate_table THEN NULL;\nEND\n{tag};",
        tag = GUARD_TAG,
        stmt = statement.trim().trim_end_matches(';')
    )
}

/// Add `IF NOT EXISTS` to a `pg_get_indexdef` result
pub fn index_if_not_exists(definition: &str) -> String {
    for prefix in ["CREATE UNIQUE INDEX ", "CREATE INDEX "] {
        if let Some(rest) = definition.strip_prefix(prefix) {
            return format!("{}IF NOT EXISTS {}", prefix, rest);
        }
    }
    definition.to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Identity {
    Always,
    ByDefault,
}

impl Identity {
    /// From `pg_attribute.attidentity`
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "a" => Some(Identity::Always),
            "d" => Some(Identity::ByDefault),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDef {
    pub name: String,
    pub data_type: String,
    pub not_null: bool,
    /// Default expression, or the generation expression for generated columns
    pub default: Option<String>,
    pub identity: Option<Identity>,
    pub generated: bool,
    /// Owned sequence behind a serial column
    pub sequence: Option<String>,
}

impl ColumnDef {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            not_null: false,
            default: None,
            identity: None,
            generated: false,
            sequence: None,
        }
    }

    fn render(&self, options: &ScriptOptions) -> String {
        let mut column = format!("    {} {}", quote_ident(&self.name), self.data_type);

        if self.generated {
            if let Some(expression) = &self.default {
                column.push_str(&format!(" GENERATED ALWAYS AS ({}) STORED", expression));
            }
        } else if let Some(identity) = self.identity {
            column.push_str(match identity {
                Identity::Always => " GENERATED ALWAYS AS IDENTITY",
                Identity::ByDefault => " GENERATED BY DEFAULT AS IDENTITY",
            });
        } else if let (true, Some(default)) = (options.defaults, &self.default) {
            column.push_str(&format!(" DEFAULT {}", default));
        }

        if self.not_null {
            column.push_str(" NOT NULL");
        }
        column
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrimaryKey {
    pub constraint: String,
    pub columns: Vec<String>,
}

/// `CREATE TABLE` with columns and, when enabled, the primary key inline.
///
/// Sequences backing serial defaults are created first so the defaults resolve.
pub fn render_create_table(
    table: &str,
    columns: &[ColumnDef],
    primary_key: Option<&PrimaryKey>,
    options: &ScriptOptions,
) -> String {
    let mut script = String::new();

    if options.defaults {
        for sequence in columns
            .iter()
            .filter(|c| c.identity.is_none() && !c.generated)
            .filter_map(|c| c.sequence.as_deref())
        {
            script.push_str(&format!("CREATE SEQUENCE IF NOT EXISTS {};\n", sequence));
        }
    }

    let mut lines: Vec<String> = columns.iter().map(|c| c.render(options)).collect();
    if let (true, Some(pk)) = (options.primary_keys, primary_key) {
        let key_columns: Vec<String> = pk.columns.iter().map(|c| quote_ident(c)).collect();
        lines.push(format!(
            "    CONSTRAINT {} PRIMARY KEY ({})",
            quote_ident(&pk.constraint),
            key_columns.join(", ")
        ));
    }

    let guard = if options.include_if_not_exists {
        "IF NOT EXISTS "
    } else {
        ""
    };
    script.push_str(&format!(
        "CREATE TABLE {}{} (\n{}\n);",
        guard,
        table,
        lines.join(",\n")
    ));
    script
}

/// Incremental renderer for one table's data script.
///
/// Each row becomes an INSERT re-materialised with `json_populate_record`, so
/// every column type round-trips through its text form. A `GO` separator
/// starts every `batch_rows` rows. Generated columns are left out, and a
/// closing batch moves serial and identity sequences past the loaded rows.
#[derive(Debug)]
pub struct DataScript {
    table: String,
    column_list: String,
    sequence_columns: Vec<String>,
    batch_rows: usize,
    rows: usize,
}

impl DataScript {
    pub fn new(table: &str, columns: &[ColumnDef], batch_rows: usize) -> Self {
        let insertable: Vec<String> = columns
            .iter()
            .filter(|c| !c.generated)
            .map(|c| quote_ident(&c.name))
            .collect();
        let sequence_columns = columns
            .iter()
            .filter(|c| !c.generated && (c.identity.is_some() || c.sequence.is_some()))
            .map(|c| c.name.clone())
            .collect();

        Self {
            table: table.to_string(),
            column_list: insertable.join(", "),
            sequence_columns,
            batch_rows: batch_rows.max(1),
            rows: 0,
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    /// True when the next row opens a new batch
    pub fn at_batch_boundary(&self) -> bool {
        self.rows > 0 && self.rows % self.batch_rows == 0
    }

    /// Text for the next JSON-encoded row, with the header or a `GO` before it as needed
    pub fn row(&mut self, json: &str) -> String {
        let mut text = String::new();
        if self.rows == 0 {
            text.push_str("SET standard_conforming_strings = on;\n");
        } else if self.at_batch_boundary() {
            text.push_str("GO\n");
        }
        text.push_str(&format!(
            "INSERT INTO {table} ({cols}) OVERRIDING SYSTEM VALUE \
             SELECT {cols} FROM json_populate_record(NULL::{table}, {row});\n",
            table = self.table,
            cols = self.column_list,
            row = quote_literal(json),
        ));
        self.rows += 1;
        text
    }

    /// Closing sequence batch; empty for a table without rows
    pub fn finish(&self) -> String {
        if self.rows == 0 || self.sequence_columns.is_empty() {
            return String::new();
        }

        let mut text = String::from("GO\n");
        for column in &self.sequence_columns {
            text.push_str(&format!(
                "SELECT pg_catalog.setval(\
                 pg_catalog.pg_get_serial_sequence({table_name}, {column_name}), \
                 COALESCE(MAX({col}), 1), MAX({col}) IS NOT NULL) FROM {table};\n",
                table_name = quote_literal(&self.table),
                column_name = quote_literal(column),
                col = quote_ident(column),
                table = self.table,
            ));
        }
        text
    }
}

/// Whole data script for rows already in memory
pub fn render_data_script(
    table: &str,
    columns: &[ColumnDef],
    rows: &[String],
    batch_rows: usize,
) -> String {
    let mut data = DataScript::new(table, columns, batch_rows);
    let mut script = String::new();
    for row in rows {
        script.push_str(&data.row(row));
    }
    script.push_str(&data.finish());
    script
}

pub fn render_enum_type(type_name: &str, labels: &[String]) -> String {
    let labels: Vec<String> = labels.iter().map(|l| quote_literal(l)).collect();
    guard_duplicate(&format!(
        "CREATE TYPE {} AS ENUM ({})",
        type_name,
        labels.join(", ")
    ))
}

pub fn render_role(name: &str, can_login: bool) -> String {
    guard_duplicate(&format!(
        "CREATE ROLE {} WITH {}",
        quote_ident(name),
        if can_login { "LOGIN" } else { "NOLOGIN" }
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quoting() {
        assert_eq!(quote_ident("orders"), "\"orders\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
        assert_eq!(quote_literal("it's"), "'it''s'");
        assert_eq!(qualified_name(Some("sales"), "Orders", true), "\"sales\".\"Orders\"");
        assert_eq!(qualified_name(Some("sales"), "Orders", false), "\"Orders\"");
        assert_eq!(qualified_name(None, "Orders", true), "\"Orders\"");
    }

    #[test]
    fn test_guard_duplicate() {
        let guarded =
            guard_duplicate("ALTER TABLE a ADD CONSTRAINT fk FOREIGN KEY (b) REFERENCES b (id);");
        assert!(guarded.starts_with("DO $pgpkg$\nBEGIN"));
        assert!(guarded.contains("REFERENCES b (id);\nEXCEPTION"));
        assert!(guarded.contains("duplicate_object"));
        assert!(guarded.ends_with("END\n$pgpkg$;"));
    }

    #[test]
    fn test_guard_duplicate_keeps_plain_dollar_quotes() {
        let sql = render_enum_type("\"public\".\"price\"", &["$$".to_string(), "a$$b".to_string()]);
        assert!(sql.contains("AS ENUM ('$$', 'a$$b')"));
        assert_eq!(sql.matches("$pgpkg$").count(), 2);
    }

    #[test]
    fn test_index_if_not_exists() {
        assert_eq!(
            index_if_not_exists("CREATE INDEX ix ON public.t USING btree (a)"),
            "CREATE INDEX IF NOT EXISTS ix ON public.t USING btree (a)"
        );
        assert_eq!(
            index_if_not_exists("CREATE UNIQUE INDEX ux ON public.t USING btree (a)"),
            "CREATE UNIQUE INDEX IF NOT EXISTS ux ON public.t USING btree (a)"
        );
    }

    #[test]
    fn test_render_create_table() {
        let id = ColumnDef {
            not_null: true,
            default: Some("nextval('public.orders_id_seq'::regclass)".to_string()),
            sequence: Some("public.orders_id_seq".to_string()),
            ..ColumnDef::new("id", "integer")
        };
        let total = ColumnDef {
            generated: true,
            default: Some("(qty * price)".to_string()),
            ..ColumnDef::new("total", "numeric")
        };
        let code = ColumnDef {
            identity: Some(Identity::Always),
            not_null: true,
            ..ColumnDef::new("code", "bigint")
        };
        let pk = PrimaryKey {
            constraint: "orders_pkey".to_string(),
            columns: vec!["id".to_string()],
        };

        let sql = render_create_table(
            "\"public\".\"orders\"",
            &[id, total, code],
            Some(&pk),
            &ScriptOptions::schema(),
        );

        assert_eq!(
            sql,
            "CREATE SEQUENCE IF NOT EXISTS public.orders_id_seq;\n\
             CREATE TABLE IF NOT EXISTS \"public\".\"orders\" (\n    \
             \"id\" integer DEFAULT nextval('public.orders_id_seq'::regclass) NOT NULL,\n    \
             \"total\" numeric GENERATED ALWAYS AS ((qty * price)) STORED,\n    \
             \"code\" bigint GENERATED ALWAYS AS IDENTITY NOT NULL,\n    \
             CONSTRAINT \"orders_pkey\" PRIMARY KEY (\"id\")\n);"
        );
    }

    #[test]
    fn test_render_create_table_without_keys_or_defaults() {
        let options = ScriptOptions {
            primary_keys: false,
            defaults: false,
            include_if_not_exists: false,
            ..ScriptOptions::schema()
        };
        let id = ColumnDef {
            default: Some("0".to_string()),
            sequence: Some("s".to_string()),
            ..ColumnDef::new("id", "integer")
        };
        let pk = PrimaryKey {
            constraint: "pk".to_string(),
            columns: vec!["id".to_string()],
        };

        let sql = render_create_table("\"t\"", &[id], Some(&pk), &options);
        assert_eq!(sql, "CREATE TABLE \"t\" (\n    \"id\" integer\n);");
    }

    #[test]
    fn test_render_data_script_batches_rows() {
        let columns = vec![
            ColumnDef::new("id", "integer"),
            ColumnDef {
                generated: true,
                ..ColumnDef::new("doubled", "integer")
            },
        ];
        let rows: Vec<String> = (1..=5)
            .map(|i| format!("{{\"id\":{}, \"note\":\"it's\"}}", i))
            .collect();

        let script = render_data_script("\"public\".\"t\"", &columns, &rows, 2);
        let lines: Vec<&str> = script.lines().collect();

        assert_eq!(lines[0], "SET standard_conforming_strings = on;");
        assert_eq!(lines.iter().filter(|l| l.starts_with("INSERT INTO")).count(), 5);
        assert_eq!(lines.iter().filter(|l| **l == "GO").count(), 2);
        assert!(lines[1].contains("(\"id\") OVERRIDING SYSTEM VALUE SELECT \"id\" FROM"));
        assert!(lines[1].contains("'{\"id\":1, \"note\":\"it''s\"}'"));
        assert!(!script.contains("doubled"));
    }

    #[test]
    fn test_data_script_resets_sequences() {
        let columns = vec![
            ColumnDef {
                not_null: true,
                default: Some("nextval('public.orders_id_seq'::regclass)".to_string()),
                sequence: Some("public.orders_id_seq".to_string()),
                ..ColumnDef::new("id", "integer")
            },
            ColumnDef {
                identity: Some(Identity::Always),
                sequence: Some("public.orders_code_seq".to_string()),
                ..ColumnDef::new("code", "bigint")
            },
            ColumnDef::new("note", "text"),
        ];
        let rows = vec!["{\"id\":41,\"code\":7,\"note\":null}".to_string()];

        let script = render_data_script("\"public\".\"orders\"", &columns, &rows, 500);
        let lines: Vec<&str> = script.lines().collect();

        assert_eq!(lines.len(), 5);
        assert!(lines[1].starts_with("INSERT INTO \"public\".\"orders\""));
        assert_eq!(lines[2], "GO");
        assert_eq!(
            lines[3],
            "SELECT pg_catalog.setval(\
             pg_catalog.pg_get_serial_sequence('\"public\".\"orders\"', 'id'), \
             COALESCE(MAX(\"id\"), 1), MAX(\"id\") IS NOT NULL) FROM \"public\".\"orders\";"
        );
        assert!(lines[4].contains("pg_get_serial_sequence('\"public\".\"orders\"', 'code')"));
        assert!(!script.contains("'note'"));
    }

    #[test]
    fn test_data_script_renders_row_by_row() {
        let columns = vec![ColumnDef::new("id", "integer")];
        let mut data = DataScript::new("\"t\"", &columns, 2);

        let first = data.row("{\"id\":1}");
        assert!(first.starts_with("SET standard_conforming_strings = on;\nINSERT INTO"));
        assert!(!data.at_batch_boundary());

        let second = data.row("{\"id\":2}");
        assert!(second.starts_with("INSERT INTO"));
        assert!(data.at_batch_boundary());

        let third = data.row("{\"id\":3}");
        assert!(third.starts_with("GO\nINSERT INTO"));
        assert_eq!(data.rows(), 3);
        assert_eq!(data.finish(), "");
    }

    #[test]
    fn test_render_data_script_empty_table() {
        let columns = vec![ColumnDef::new("id", "integer")];
        assert_eq!(render_data_script("\"t\"", &columns, &[], 500), "");
    }

    #[test]
    fn test_render_enum_and_role() {
        let labels = vec!["happy".to_string(), "sad".to_string()];
        let sql = render_enum_type("\"public\".\"mood\"", &labels);
        assert!(sql.contains("CREATE TYPE \"public\".\"mood\" AS ENUM ('happy', 'sad')"));

        let sql = render_role("reporting", false);
        assert!(sql.contains("CREATE ROLE \"reporting\" WITH NOLOGIN"));
    }
}
