// ABOUTME: SchemaProvider backed by the PostgreSQL system catalogs
// ABOUTME: Lists objects per category and scripts their DDL or streams row INSERTs

use super::connection::{connect_with_retry, format_db_error};
use super::ddl::{self, ColumnDef, DataScript, Identity, PrimaryKey};
use crate::error::{Error, Result};
use crate::scripting::{Category, ObjectRef, SchemaProvider, ScriptMode, ScriptOptions};
use async_trait::async_trait;
use futures::{Stream, StreamExt, TryStreamExt};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio_postgres::types::ToSql;
use tokio_postgres::{Client, Row};

/// Schemas holding PostgreSQL's own objects
const SYSTEM_SCHEMA: &str = "(n.nspname IN ('pg_catalog', 'information_schema') \
     OR n.nspname LIKE 'pg\\_toast%' OR n.nspname LIKE 'pg\\_temp%')";

/// Introspects and scripts one PostgreSQL database.
///
/// The catalog passed to `list_objects` must be the database named by the
/// connection string; PostgreSQL sessions cannot see other databases.
///
/// Partitioned tables are scripted as plain tables holding all partition
/// rows. Partitions and the indexes, foreign keys and triggers cloned onto
/// them are not listed.
pub struct PgSchemaProvider {
    connection_string: String,
    client: Option<Client>,
    database: Option<String>,
}

impl PgSchemaProvider {
    pub fn new(connection_string: impl Into<String>) -> Self {
        Self {
            connection_string: connection_string.into(),
            client: None,
            database: None,
        }
    }

    fn client(&self) -> Result<&Client> {
        self.client
            .as_ref()
            .ok_or_else(|| Error::Connection("provider is not connected".to_string()))
    }

    async fn query(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> Result<Vec<Row>> {
        self.client()?
            .query(sql, params)
            .await
            .map_err(|e| Error::scripting("catalog query", format_db_error(&e)))
    }

    fn object_id(object: &ObjectRef) -> Result<u32> {
        object
            .object_id
            .ok_or_else(|| Error::scripting(object.to_string(), "object has no catalog id"))
    }

    fn table_name(object: &ObjectRef, options: &ScriptOptions) -> String {
        ddl::qualified_name(object.schema.as_deref(), &object.name, options.schema_qualify)
    }

    async fn list_query(&self, category: Category) -> Result<Vec<ObjectRef>> {
        let rows = self.query(&list_sql(category), &[]).await?;
        let objects = rows
            .iter()
            .map(|row| {
                let mut object = ObjectRef::new(category, row.get::<_, String>(1))
                    .with_object_id(row.get::<_, u32>(3));
                object.schema = row.get::<_, Option<String>>(0);
                object.parent = row.get::<_, Option<String>>(2);
                object.is_system = row.get::<_, bool>(4);
                object.is_clustered = row.get::<_, bool>(5);
                object
            })
            .collect();
        Ok(objects)
    }

    async fn table_columns(&self, table_id: u32) -> Result<Vec<ColumnDef>> {
        let rows = self
            .query(
                "SELECT a.attname::text,
                        pg_catalog.format_type(a.atttypid, a.atttypmod),
                        a.attnotnull,
                        pg_catalog.pg_get_expr(d.adbin, d.adrelid),
                        a.attidentity::text,
                        a.attgenerated::text,
                        pg_catalog.pg_get_serial_sequence(a.attrelid::regclass::text, a.attname)
                 FROM pg_catalog.pg_attribute a
                 LEFT JOIN pg_catalog.pg_attrdef d
                        ON d.adrelid = a.attrelid AND d.adnum = a.attnum
                 WHERE a.attrelid = $1 AND a.attnum > 0 AND NOT a.attisdropped
                 ORDER BY a.attnum",
                &[&table_id],
            )
            .await?;

        Ok(rows
            .iter()
            .map(|row| ColumnDef {
                name: row.get(0),
                data_type: row.get(1),
                not_null: row.get(2),
                default: row.get(3),
                identity: Identity::from_code(&row.get::<_, String>(4)),
                generated: !row.get::<_, String>(5).is_empty(),
                sequence: row.get(6),
            })
            .collect())
    }

    async fn primary_key(&self, table_id: u32) -> Result<Option<PrimaryKey>> {
        let rows = self
            .query(
                "SELECT con.conname::text, a.attname::text
                 FROM pg_catalog.pg_constraint con
                 CROSS JOIN LATERAL unnest(con.conkey) WITH ORDINALITY AS k(attnum, ord)
                 JOIN pg_catalog.pg_attribute a
                      ON a.attrelid = con.conrelid AND a.attnum = k.attnum
                 WHERE con.conrelid = $1 AND con.contype = 'p'
                 ORDER BY k.ord",
                &[&table_id],
            )
            .await?;

        let Some(first) = rows.first() else {
            return Ok(None);
        };
        Ok(Some(PrimaryKey {
            constraint: first.get(0),
            columns: rows.iter().map(|r| r.get(1)).collect(),
        }))
    }

    async fn script_table(&self, object: &ObjectRef, options: &ScriptOptions) -> Result<String> {
        let table_id = Self::object_id(object)?;
        let columns = self.table_columns(table_id).await?;
        let primary_key = self.primary_key(table_id).await?;
        let table = Self::table_name(object, options);

        let mut script =
            ddl::render_create_table(&table, &columns, primary_key.as_ref(), options);

        if options.statistics {
            let rows = self
                .query(
                    "SELECT pg_catalog.pg_get_statisticsobjdef(s.oid)
                     FROM pg_catalog.pg_statistic_ext s
                     WHERE s.stxrelid = $1 ORDER BY s.stxname",
                    &[&table_id],
                )
                .await?;
            for row in rows {
                let definition: String = row.get(0);
                script.push('\n');
                script.push_str(&ddl::guard_duplicate(&definition));
            }
        }
        Ok(script)
    }

    async fn script_schema(&self, object: &ObjectRef, options: &ScriptOptions) -> Result<String> {
        let guard = if options.include_if_not_exists {
            "IF NOT EXISTS "
        } else {
            ""
        };
        let mut script = format!("CREATE SCHEMA {}{};", guard, ddl::quote_ident(&object.name));
        if !options.user_defined_types {
            return Ok(script);
        }

        let rows = self
            .query(
                "SELECT t.typname::text,
                        array_agg(e.enumlabel::text ORDER BY e.enumsortorder)
                 FROM pg_catalog.pg_type t
                 JOIN pg_catalog.pg_enum e ON e.enumtypid = t.oid
                 WHERE t.typnamespace = $1
                 GROUP BY t.typname ORDER BY t.typname",
                &[&Self::object_id(object)?],
            )
            .await?;
        for row in rows {
            let type_name: String = row.get(0);
            let labels: Vec<String> = row.get(1);
            let type_name = ddl::qualified_name(Some(&object.name), &type_name, true);
            script.push('\n');
            script.push_str(&ddl::render_enum_type(&type_name, &labels));
        }
        Ok(script)
    }

    async fn script_schema_object(
        &self,
        object: &ObjectRef,
        options: &ScriptOptions,
    ) -> Result<Option<String>> {
        let id = Self::object_id(object)?;

        let script = match object.category {
            Category::Schemas => self.script_schema(object, options).await?,
            Category::Tables => self.script_table(object, options).await?,
            Category::Indexes => {
                let definition = self
                    .definition("SELECT pg_catalog.pg_get_indexdef($1)", id)
                    .await?;
                let definition = if options.include_if_not_exists {
                    ddl::index_if_not_exists(&definition)
                } else {
                    definition
                };
                format!("{};", definition)
            }
            Category::ForeignKeys => {
                let definition = self
                    .definition("SELECT pg_catalog.pg_get_constraintdef($1, true)", id)
                    .await?;
                let parent = object.parent.as_deref().unwrap_or_default();
                let statement = format!(
                    "ALTER TABLE {} ADD CONSTRAINT {} {}",
                    ddl::qualified_name(object.schema.as_deref(), parent, options.schema_qualify),
                    ddl::quote_ident(&object.name),
                    definition
                );
                if options.include_if_not_exists {
                    ddl::guard_duplicate(&statement)
                } else {
                    format!("{};", statement)
                }
            }
            Category::StoredProcedures | Category::Functions => {
                let definition = self
                    .definition("SELECT pg_catalog.pg_get_functiondef($1)", id)
                    .await?;
                format!("{};", definition.trim_end())
            }
            Category::Views => {
                let definition = self
                    .definition("SELECT pg_catalog.pg_get_viewdef($1, true)", id)
                    .await?;
                format!(
                    "CREATE OR REPLACE VIEW {} AS\n{}",
                    Self::table_name(object, options),
                    definition.trim_end()
                )
            }
            Category::Triggers => {
                let definition = self
                    .definition("SELECT pg_catalog.pg_get_triggerdef($1, true)", id)
                    .await?;
                if options.include_if_not_exists {
                    ddl::guard_duplicate(&definition)
                } else {
                    format!("{};", definition)
                }
            }
            Category::Users => {
                let rows = self
                    .query(
                        "SELECT rolcanlogin FROM pg_catalog.pg_roles WHERE oid = $1",
                        &[&id],
                    )
                    .await?;
                let can_login = rows.first().map(|r| r.get::<_, bool>(0)).unwrap_or(false);
                ddl::render_role(&object.name, can_login)
            }
        };

        Ok(Some(script))
    }

    async fn definition(&self, sql: &str, id: u32) -> Result<String> {
        let rows = self.query(sql, &[&id]).await?;
        rows.first()
            .and_then(|row| row.get::<_, Option<String>>(0))
            .ok_or_else(|| Error::scripting(format!("object {}", id), "definition not found"))
    }
}

/// Catalog query listing one category.
///
/// Columns: schema, name, parent, oid, is_system, is_clustered.
fn list_sql(category: Category) -> String {
    match category {
        Category::Schemas => format!(
            "SELECT NULL::text, n.nspname::text, NULL::text, n.oid, {sys}, false
             FROM pg_catalog.pg_namespace n ORDER BY n.nspname",
            sys = SYSTEM_SCHEMA
        ),
        Category::Tables => format!(
            "SELECT n.nspname::text, c.relname::text, NULL::text, c.oid, {sys}, false
             FROM pg_catalog.pg_class c
             JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
             WHERE c.relkind IN ('r', 'p') AND NOT c.relispartition
             ORDER BY n.nspname, c.relname",
            sys = SYSTEM_SCHEMA
        ),
        Category::Indexes => format!(
            "SELECT n.nspname::text, ic.relname::text, tc.relname::text, ic.oid, {sys},
                    i.indisprimary
             FROM pg_catalog.pg_index i
             JOIN pg_catalog.pg_class ic ON ic.oid = i.indexrelid
             JOIN pg_catalog.pg_class tc ON tc.oid = i.indrelid
             JOIN pg_catalog.pg_namespace n ON n.oid = tc.relnamespace
             WHERE tc.relkind IN ('r', 'p', 'm') AND NOT tc.relispartition
             ORDER BY n.nspname, tc.relname, ic.relname",
            sys = SYSTEM_SCHEMA
        ),
        Category::ForeignKeys => format!(
            "SELECT n.nspname::text, con.conname::text, c.relname::text, con.oid, {sys}, false
             FROM pg_catalog.pg_constraint con
             JOIN pg_catalog.pg_class c ON c.oid = con.conrelid
             JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
             WHERE con.contype = 'f' AND NOT c.relispartition
             ORDER BY n.nspname, c.relname, con.conname",
            sys = SYSTEM_SCHEMA
        ),
        Category::StoredProcedures | Category::Functions => format!(
            "SELECT n.nspname::text, p.proname::text, NULL::text, p.oid,
                    {sys} OR EXISTS (
                        SELECT 1 FROM pg_catalog.pg_depend d
                        WHERE d.classid = 'pg_catalog.pg_proc'::regclass
                          AND d.objid = p.oid AND d.deptype = 'e'
                    ),
                    false
             FROM pg_catalog.pg_proc p
             JOIN pg_catalog.pg_namespace n ON n.oid = p.pronamespace
             WHERE p.prokind = '{kind}'
             ORDER BY n.nspname, p.proname, p.oid",
            sys = SYSTEM_SCHEMA,
            kind = if category == Category::StoredProcedures {
                "p"
            } else {
                "f"
            }
        ),
        Category::Views => format!(
            "SELECT n.nspname::text, c.relname::text, NULL::text, c.oid, {sys}, false
             FROM pg_catalog.pg_class c
             JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
             WHERE c.relkind = 'v'
             ORDER BY n.nspname, c.relname",
            sys = SYSTEM_SCHEMA
        ),
        Category::Triggers => format!(
            "SELECT n.nspname::text, t.tgname::text, c.relname::text, t.oid, {sys}, false
             FROM pg_catalog.pg_trigger t
             JOIN pg_catalog.pg_class c ON c.oid = t.tgrelid
             JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
             WHERE NOT t.tgisinternal AND NOT c.relispartition
             ORDER BY n.nspname, c.relname, t.tgname",
            sys = SYSTEM_SCHEMA
        ),
        Category::Users => "SELECT NULL::text, r.rolname::text, NULL::text, r.oid,
                    r.rolname LIKE 'pg\\_%' OR r.rolsuper, false
             FROM pg_catalog.pg_roles r
             ORDER BY r.rolname"
            .to_string(),
    }
}

/// Render JSON rows into `sink`, one batch per write.
///
/// Only the current batch is held in memory. Returns the number of rows.
async fn stream_data_script<S>(
    rows: S,
    script: &mut DataScript,
    sink: &mut (dyn AsyncWrite + Unpin + Send),
) -> Result<usize>
where
    S: Stream<Item = Result<String>> + Send,
{
    futures::pin_mut!(rows);
    let mut batch = String::new();

    while let Some(row) = rows.try_next().await? {
        if script.at_batch_boundary() && !batch.is_empty() {
            sink.write_all(batch.as_bytes()).await?;
            batch.clear();
        }
        batch.push_str(&script.row(&row));
    }

    batch.push_str(&script.finish());
    if !batch.is_empty() {
        sink.write_all(batch.as_bytes()).await?;
    }
    Ok(script.rows())
}

#[async_trait]
impl SchemaProvider for PgSchemaProvider {
    async fn connect(&mut self) -> Result<()> {
        let client = connect_with_retry(&self.connection_string).await?;
        let row = client
            .query_one("SELECT current_database()::text", &[])
            .await
            .map_err(|e| Error::Connection(format_db_error(&e)))?;
        self.database = Some(row.get(0));
        self.client = Some(client);
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.client = None;
        Ok(())
    }

    async fn list_objects(&mut self, catalog: &str, category: Category) -> Result<Vec<ObjectRef>> {
        match self.database.as_deref() {
            Some(database) if database == catalog => {}
            Some(database) => {
                return Err(Error::scripting(
                    format!("catalog {}", catalog),
                    format!("connection is to database '{}'", database),
                ))
            }
            None => return Err(Error::Connection("provider is not connected".to_string())),
        }

        self.list_query(category).await
    }

    async fn script(
        &mut self,
        object: &ObjectRef,
        options: &ScriptOptions,
    ) -> Result<Option<String>> {
        match options.mode {
            ScriptMode::Data if object.category == Category::Tables => {
                let mut buffer = Vec::new();
                self.write_data(object, options, &mut buffer).await?;
                Ok(Some(String::from_utf8_lossy(&buffer).into_owned()))
            }
            ScriptMode::Data => Ok(None),
            ScriptMode::Schema => self.script_schema_object(object, options).await,
        }
    }

    async fn write_data(
        &mut self,
        table: &ObjectRef,
        options: &ScriptOptions,
        sink: &mut (dyn AsyncWrite + Unpin + Send),
    ) -> Result<()> {
        if table.category != Category::Tables {
            return Ok(());
        }

        let columns = self.table_columns(Self::object_id(table)?).await?;
        let name = ddl::qualified_name(table.schema.as_deref(), &table.name, true);
        let subject = format!("data of {}", table);

        let sql = format!("SELECT row_to_json(t)::text FROM {} t", name);
        let rows = self
            .client()?
            .query_raw(sql.as_str(), Vec::<String>::new())
            .await
            .map_err(|e| Error::scripting(subject.clone(), format_db_error(&e)))?
            .map(move |row| {
                row.and_then(|r| r.try_get::<_, String>(0))
                    .map_err(|e| Error::scripting(subject.clone(), format_db_error(&e)))
            });

        let mut script = DataScript::new(&name, &columns, options.data_batch_rows);
        let count = stream_data_script(rows, &mut script, sink).await?;
        tracing::debug!("{} row(s) scripted from {}", count, table);
        Ok(())
    }
}
