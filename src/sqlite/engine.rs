use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use rusqlite::types::ToSql;
use rusqlite::{params_from_iter, Connection};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::error::{Result, StoreError};
use crate::logging::{LineFormat, Loggers, TargetSettings};
use crate::session::Session;

use super::query::{
    count_sql, quote_identifier, CreateManyOperation, CreateOperation, CrudOperation,
    CrudOutcome, DeleteOperation, Query, ReadOperation, SqlQuery, UpdateOperation,
};
use super::schema::{
    ColumnDefinition, DataType, DefaultValue, ForeignKey, ForeignKeyAction, IndexDefinition,
    Schema, TableDefinition,
};
use super::value::{Row, Value};

/// Target the SQL echo is logged on
pub const ECHO_TARGET: &str = module_path!();

/// Delete a database file and its journal side files.
///
/// A missing file is not an error. Returns whether the main file existed.
pub fn reset_database(path: impl AsRef<Path>) -> Result<bool> {
    let path = path.as_ref();
    let removed = remove_if_exists(path)?;
    for suffix in ["-journal", "-wal", "-shm"] {
        let mut side = path.as_os_str().to_owned();
        side.push(suffix);
        remove_if_exists(Path::new(&side))?;
    }
    Ok(removed)
}

fn remove_if_exists(path: &Path) -> Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}

/// SQLite engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SqliteConfig {
    /// Path to the SQLite database file
    pub db_path: PathBuf,
    /// Schema definition for the database
    pub schema: Schema,
    /// Log every statement on [`ECHO_TARGET`]
    pub echo: bool,
    /// Enforce foreign key constraints
    pub foreign_keys: bool,
    /// Delete the database file before opening it
    pub reset_on_open: bool,
}

impl SqliteConfig {
    /// Create a new SQLite config with path and schema
    pub fn new(db_path: impl Into<PathBuf>, schema: Schema) -> Self {
        Self {
            db_path: db_path.into(),
            schema,
            echo: false,
            foreign_keys: true,
            reset_on_open: false,
        }
    }

    pub fn with_echo(mut self, echo: bool) -> Self {
        self.echo = echo;
        self
    }

    pub fn with_foreign_keys(mut self, enabled: bool) -> Self {
        self.foreign_keys = enabled;
        self
    }

    pub fn with_reset(mut self, reset: bool) -> Self {
        self.reset_on_open = reset;
        self
    }
}

/// Rows returned by a statement. The rows can be fetched once; afterwards
/// the result is closed.
#[derive(Debug)]
pub struct ResultSet {
    columns: Vec<String>,
    rows: Option<Vec<Row>>,
    rows_affected: usize,
}

impl ResultSet {
    fn new(columns: Vec<String>, rows: Vec<Row>) -> Self {
        Self {
            columns,
            rows: Some(rows),
            rows_affected: 0,
        }
    }

    fn affected(rows_affected: usize) -> Self {
        Self {
            columns: Vec::new(),
            rows: Some(Vec::new()),
            rows_affected,
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Rows changed by a statement that returns no rows
    pub fn rows_affected(&self) -> usize {
        self.rows_affected
    }

    pub fn is_closed(&self) -> bool {
        self.rows.is_none()
    }

    /// Take every row and close the result
    pub fn fetch_all(&mut self) -> Result<Vec<Row>> {
        self.rows.take().ok_or(StoreError::ResourceClosed)
    }

    /// Take the first row and close the result
    pub fn first(&mut self) -> Result<Option<Row>> {
        Ok(self.fetch_all()?.into_iter().next())
    }

    /// First column of the first row
    pub fn scalar(&mut self) -> Result<Option<Value>> {
        Ok(self
            .first()?
            .and_then(|row| row.values().first().cloned()))
    }
}

/// Handle to one SQLite database file.
pub struct SqliteEngine {
    config: SqliteConfig,
    connection: Connection,
}

impl SqliteEngine {
    /// Open the configured database and create its schema.
    ///
    /// With `echo` on, the engine's target gets its own handler in `loggers`
    /// (unless the target is already registered), so statements show up in
    /// the echo layout as well as through the root handler.
    #[instrument(name = "open", skip_all, fields(path = %config.db_path.display()))]
    pub fn open(config: SqliteConfig, loggers: &Loggers) -> Result<Self> {
        if config.reset_on_open {
            reset_database(&config.db_path)?;
        }
        if config.echo && loggers.settings(ECHO_TARGET).is_none() {
            loggers.register(ECHO_TARGET, TargetSettings::with_handler(LineFormat::Echo));
        }
        let connection = Connection::open(&config.db_path)?;
        connection.pragma_update(None, "foreign_keys", config.foreign_keys)?;
        let engine = Self { config, connection };
        debug!(driver = %engine.driver(), "database opened");
        engine.create_all(&engine.config.schema)?;
        Ok(engine)
    }

    pub fn config(&self) -> &SqliteConfig {
        &self.config
    }

    pub fn path(&self) -> &Path {
        &self.config.db_path
    }

    pub fn driver(&self) -> String {
        format!("rusqlite (SQLite {})", rusqlite::version())
    }

    /// Start a unit of work on this engine.
    ///
    /// Sessions share the engine's connection. A session that starts while
    /// another one holds the transaction writes into that transaction, and
    /// only the session that began it can commit or roll it back.
    pub fn session(&self) -> Session<'_> {
        Session::new(self)
    }

    /// Create every table and index of `schema` that does not exist yet
    #[instrument(skip_all)]
    pub fn create_all(&self, schema: &Schema) -> Result<()> {
        if schema.tables.is_empty() {
            return Ok(());
        }
        let statements = schema.to_sql()?;
        self.in_transaction_scope(|| {
            for sql in &statements {
                self.run(sql, &[])?;
            }
            Ok(())
        })
    }

    pub fn drop_table(&self, name: &str) -> Result<()> {
        self.run(&format!("DROP TABLE IF EXISTS {}", quote_identifier(name)?), &[])?;
        Ok(())
    }

    pub fn table_names(&self) -> Result<Vec<String>> {
        self.fetch(
            "SELECT name FROM sqlite_master WHERE type = 'table' \
             AND name NOT LIKE 'sqlite_%' ORDER BY name",
            &[],
        )?
        .fetch_all()?
        .iter()
        .map(|row| row.text("name"))
        .collect()
    }

    pub fn has_table(&self, name: &str) -> Result<bool> {
        Ok(self.table_names()?.iter().any(|t| t == name))
    }

    /// Read a table definition back from the database catalog
    #[instrument(skip(self))]
    pub fn reflect_table(&self, name: &str) -> Result<Option<TableDefinition>> {
        let table = [Value::from(name)];
        let column_rows = self
            .fetch("SELECT * FROM pragma_table_info(?1)", &table)?
            .fetch_all()?;
        if column_rows.is_empty() {
            return Ok(None);
        }

        let mut definition = TableDefinition::new(name);
        let mut primary_key = Vec::new();
        for row in &column_rows {
            let column_name = row.text("name")?;
            let declared = row.opt_text("type")?.unwrap_or_default();
            let mut column = ColumnDefinition::new(&column_name, DataType::from_declared(&declared));
            let pk_position = row.integer("pk")?;
            if pk_position > 0 {
                column = column.primary_key();
                primary_key.push((pk_position, column_name.clone()));
            }
            if row.integer("notnull")? != 0 {
                column = column.not_null();
            }
            if let Some(default) = row
                .opt_text("dflt_value")?
                .as_deref()
                .and_then(DefaultValue::parse)
            {
                column = column.default_value(default);
            }
            definition.columns.push(column);
        }
        primary_key.sort();
        definition.primary_key = primary_key.into_iter().map(|(_, name)| name).collect();

        for row in self
            .fetch("SELECT * FROM pragma_foreign_key_list(?1)", &table)?
            .fetch_all()?
        {
            let mut fk = ForeignKey::new(
                &row.text("from")?,
                &row.text("table")?,
                &row.opt_text("to")?.unwrap_or_else(|| "rowid".to_string()),
            );
            fk.on_delete = ForeignKeyAction::parse(&row.text("on_delete")?);
            fk.on_update = ForeignKeyAction::parse(&row.text("on_update")?);
            definition.foreign_keys.push(fk);
        }

        for row in self
            .fetch("SELECT * FROM pragma_index_list(?1)", &table)?
            .fetch_all()?
        {
            let index_name = row.text("name")?;
            let columns = self.index_columns(&index_name)?;
            match row.text("origin")?.as_str() {
                "c" => definition.indexes.push(IndexDefinition {
                    name: index_name,
                    columns,
                    unique: row.integer("unique")? != 0,
                }),
                "u" if columns.len() == 1 => {
                    if let Some(column) = definition
                        .columns
                        .iter_mut()
                        .find(|c| c.name == columns[0])
                    {
                        *column = column.clone().unique();
                    }
                }
                _ => {}
            }
        }

        Ok(Some(definition))
    }

    fn index_columns(&self, index: &str) -> Result<Vec<String>> {
        self.fetch("SELECT * FROM pragma_index_info(?1)", &[Value::from(index)])?
            .fetch_all()?
            .iter()
            .map(|row| row.text("name"))
            .collect()
    }

    /// Run text SQL with named placeholders
    #[instrument(skip_all)]
    pub fn execute_sql(&self, query: &SqlQuery) -> Result<ResultSet> {
        self.echo_named(&query.statement, query);
        let mut stmt = self.connection.prepare(&query.statement)?;
        for idx in 1..=stmt.parameter_count() {
            match stmt.parameter_name(idx) {
                Some(name) if query.params.values.contains_key(name) => {}
                Some(name) => return Err(StoreError::MissingParameter(name.to_string())),
                None => return Err(StoreError::MissingParameter(format!("?{idx}"))),
            }
        }
        let named: Vec<(&str, &dyn ToSql)> = query
            .params
            .values
            .iter()
            .map(|(name, value)| (name.as_str(), value as &dyn ToSql))
            .collect();

        if stmt.column_count() == 0 {
            let affected = stmt.execute(named.as_slice())?;
            return Ok(ResultSet::affected(affected));
        }
        let columns = column_names(&stmt);
        let mut rows = stmt.query(named.as_slice())?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            out.push(read_row(&columns, row)?);
        }
        Ok(ResultSet::new(columns, out))
    }

    /// Perform a CRUD operation (type-safe API)
    pub fn execute_crud(&self, op: CrudOperation) -> Result<CrudOutcome> {
        Ok(match op {
            CrudOperation::Create(op) => CrudOutcome::Inserted(vec![self.insert(&op)?]),
            CrudOperation::CreateMany(op) => CrudOutcome::Inserted(self.insert_many(&op)?),
            CrudOperation::Read(op) => CrudOutcome::Rows(self.select(&op)?),
            CrudOperation::Update(op) => CrudOutcome::Affected(self.update(&op)?),
            CrudOperation::Delete(op) => CrudOutcome::Affected(self.delete(&op)?),
        })
    }

    /// Insert one row, returning its rowid
    #[instrument(skip_all, fields(table = %op.table))]
    pub fn insert(&self, op: &CreateOperation) -> Result<i64> {
        let (sql, params) = op.to_sql()?;
        self.run(&sql, &params)?;
        Ok(self.connection.last_insert_rowid())
    }

    /// Insert every row in one transaction, returning their rowids
    #[instrument(skip_all, fields(table = %op.table, rows = op.rows.len()))]
    pub fn insert_many(&self, op: &CreateManyOperation) -> Result<Vec<i64>> {
        self.in_transaction_scope(|| {
            op.operations()
                .map(|insert| -> Result<i64> {
                    let (sql, params) = insert.to_sql()?;
                    self.run(&sql, &params)?;
                    Ok(self.connection.last_insert_rowid())
                })
                .collect()
        })
    }

    #[instrument(skip_all, fields(table = %op.table))]
    pub fn select(&self, op: &ReadOperation) -> Result<ResultSet> {
        let (sql, params) = op.to_sql()?;
        self.fetch(&sql, &params)
    }

    /// Returns the number of rows changed
    #[instrument(skip_all, fields(table = %op.table))]
    pub fn update(&self, op: &UpdateOperation) -> Result<usize> {
        let (sql, params) = op.to_sql()?;
        self.run(&sql, &params)
    }

    /// Returns the number of rows removed
    #[instrument(skip_all, fields(table = %op.table))]
    pub fn delete(&self, op: &DeleteOperation) -> Result<usize> {
        let (sql, params) = op.to_sql()?;
        self.run(&sql, &params)
    }

    pub fn count(&self, table: &str, query: &Query) -> Result<i64> {
        let (sql, params) = count_sql(table, query)?;
        self.fetch(&sql, &params)?
            .scalar()?
            .and_then(|v| v.as_integer())
            .ok_or_else(|| StoreError::conversion("count(*)", "an integer"))
    }

    pub fn in_transaction(&self) -> bool {
        !self.connection.is_autocommit()
    }

    pub(crate) fn begin(&self) -> Result<()> {
        self.echo_raw("BEGIN (implicit)");
        self.connection.execute_batch("BEGIN")?;
        Ok(())
    }

    pub(crate) fn commit(&self) -> Result<()> {
        self.echo_raw("COMMIT");
        self.connection.execute_batch("COMMIT")?;
        Ok(())
    }

    pub(crate) fn rollback(&self) -> Result<()> {
        self.echo_raw("ROLLBACK");
        self.connection.execute_batch("ROLLBACK")?;
        Ok(())
    }

    /// Run `f` inside a transaction unless one is already open
    fn in_transaction_scope<T>(&self, f: impl FnOnce() -> Result<T>) -> Result<T> {
        if self.in_transaction() {
            return f();
        }
        self.begin()?;
        f().and_then(|value| self.commit().map(|()| value))
            .map_err(|e| {
                self.abandon();
                e
            })
    }

    /// Roll back whatever is still open after a failed statement or COMMIT.
    /// A failing ROLLBACK is logged so the caller keeps the original error.
    pub(crate) fn abandon(&self) {
        if !self.in_transaction() {
            return;
        }
        if let Err(e) = self.rollback() {
            warn!(error = %e, "rollback after failure did not succeed");
        }
    }

    /// Execute a statement that returns no rows
    pub(crate) fn run(&self, sql: &str, params: &[Value]) -> Result<usize> {
        self.echo(sql, params);
        let mut stmt = self.connection.prepare_cached(sql)?;
        Ok(stmt.execute(params_from_iter(params.iter()))?)
    }

    /// Execute a query and collect its rows
    pub(crate) fn fetch(&self, sql: &str, params: &[Value]) -> Result<ResultSet> {
        self.echo(sql, params);
        let mut stmt = self.connection.prepare_cached(sql)?;
        let columns = column_names(&stmt);
        let mut rows = stmt.query(params_from_iter(params.iter()))?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            out.push(read_row(&columns, row)?);
        }
        Ok(ResultSet::new(columns, out))
    }

    fn echo_raw(&self, sql: &str) {
        if self.config.echo {
            info!(target: ECHO_TARGET, "{}", sql);
        }
    }

    fn echo(&self, sql: &str, params: &[Value]) {
        if !self.config.echo {
            return;
        }
        info!(target: ECHO_TARGET, "{}", sql);
        let rendered = params.iter().map(render_param).collect::<Vec<_>>();
        info!(target: ECHO_TARGET, "[generated] ({})", rendered.join(", "));
    }

    fn echo_named(&self, sql: &str, query: &SqlQuery) {
        if !self.config.echo {
            return;
        }
        info!(target: ECHO_TARGET, "{}", sql);
        let mut bound: Vec<_> = query
            .params
            .values
            .iter()
            .map(|(name, value)| format!("'{}': {}", name.trim_start_matches(':'), render_param(value)))
            .collect();
        bound.sort();
        info!(target: ECHO_TARGET, "[raw sql] {{{}}}", bound.join(", "));
    }
}

fn render_param(value: &Value) -> String {
    match value {
        Value::Text(s) => format!("'{s}'"),
        other => other.to_string(),
    }
}

fn column_names(stmt: &rusqlite::Statement<'_>) -> Vec<String> {
    stmt.column_names().into_iter().map(String::from).collect()
}

fn read_row(columns: &[String], row: &rusqlite::Row<'_>) -> Result<Row> {
    let mut out = Row::new();
    for (idx, column) in columns.iter().enumerate() {
        out.append(column, Value::from(row.get_ref(idx)?));
    }
    Ok(out)
}
