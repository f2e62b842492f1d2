use serde::{Deserialize, Serialize};

use crate::error::{Result, StoreError};

use super::query::quote_identifier;

/// Schema definition for the SQLite database
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    pub tables: Vec<TableDefinition>,
}

impl Schema {
    pub fn new() -> Self {
        Self { tables: Vec::new() }
    }

    pub fn add_table(mut self, table: TableDefinition) -> Self {
        self.tables.push(table);
        self
    }

    pub fn table(&self, name: &str) -> Option<&TableDefinition> {
        self.tables.iter().find(|t| t.name == name)
    }

    /// DDL statements in declaration order
    pub fn to_sql(&self) -> Result<Vec<String>> {
        let mut statements = Vec::new();
        for table in &self.tables {
            statements.push(table.create_sql()?);
            statements.extend(table.index_sql()?);
        }
        Ok(statements)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableDefinition {
    pub name: String,
    pub columns: Vec<ColumnDefinition>,
    pub primary_key: Vec<String>,
    pub foreign_keys: Vec<ForeignKey>,
    pub indexes: Vec<IndexDefinition>,
}

impl TableDefinition {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            columns: Vec::new(),
            primary_key: Vec::new(),
            foreign_keys: Vec::new(),
            indexes: Vec::new(),
        }
    }

    /// Add a column; a `PrimaryKey` constraint also records it in `primary_key`
    pub fn column(mut self, column: ColumnDefinition) -> Self {
        if column.constraints.contains(&ColumnConstraint::PrimaryKey) {
            self.primary_key.push(column.name.clone());
        }
        self.columns.push(column);
        self
    }

    pub fn foreign_key(mut self, fk: ForeignKey) -> Self {
        self.foreign_keys.push(fk);
        self
    }

    pub fn index(mut self, index: IndexDefinition) -> Self {
        self.indexes.push(index);
        self
    }

    pub fn column_def(&self, name: &str) -> Option<&ColumnDefinition> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn create_sql(&self) -> Result<String> {
        let composite_pk = self.primary_key.len() > 1;
        let mut parts = self
            .columns
            .iter()
            .map(|c| c.to_sql(composite_pk))
            .collect::<Result<Vec<_>>>()?;
        if composite_pk {
            parts.push(format!("PRIMARY KEY ({})", quote_list(&self.primary_key)?));
        }
        for fk in &self.foreign_keys {
            parts.push(fk.to_sql()?);
        }
        Ok(format!(
            "CREATE TABLE IF NOT EXISTS {} ({})",
            quote_identifier(&self.name)?,
            parts.join(", ")
        ))
    }

    pub fn index_sql(&self) -> Result<Vec<String>> {
        self.indexes
            .iter()
            .map(|index| {
                Ok(format!(
                    "CREATE {}INDEX IF NOT EXISTS {} ON {} ({})",
                    if index.unique { "UNIQUE " } else { "" },
                    quote_identifier(&index.name)?,
                    quote_identifier(&self.name)?,
                    quote_list(&index.columns)?
                ))
            })
            .collect()
    }
}

fn quote_list(names: &[String]) -> Result<String> {
    Ok(names
        .iter()
        .map(|n| quote_identifier(n))
        .collect::<Result<Vec<_>>>()?
        .join(", "))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDefinition {
    pub name: String,
    pub data_type: DataType,
    pub constraints: Vec<ColumnConstraint>,
    pub default_value: Option<DefaultValue>,
}

impl ColumnDefinition {
    pub fn new(name: &str, data_type: DataType) -> Self {
        Self {
            name: name.to_string(),
            data_type,
            constraints: Vec::new(),
            default_value: None,
        }
    }

    fn constrain(mut self, constraint: ColumnConstraint) -> Self {
        if !self.constraints.contains(&constraint) {
            self.constraints.push(constraint);
        }
        self
    }

    pub fn primary_key(self) -> Self {
        self.constrain(ColumnConstraint::PrimaryKey)
    }

    pub fn not_null(self) -> Self {
        self.constrain(ColumnConstraint::NotNull)
    }

    pub fn unique(self) -> Self {
        self.constrain(ColumnConstraint::Unique)
    }

    pub fn default_value(mut self, value: DefaultValue) -> Self {
        self.default_value = Some(value);
        self
    }

    pub fn is_nullable(&self) -> bool {
        !self.constraints.contains(&ColumnConstraint::NotNull)
    }

    fn to_sql(&self, composite_pk: bool) -> Result<String> {
        let mut sql = format!("{} {}", quote_identifier(&self.name)?, self.data_type.as_sql());
        for constraint in &self.constraints {
            match constraint {
                ColumnConstraint::PrimaryKey if composite_pk => {}
                ColumnConstraint::PrimaryKey => sql.push_str(" PRIMARY KEY"),
                ColumnConstraint::NotNull => sql.push_str(" NOT NULL"),
                ColumnConstraint::Unique => sql.push_str(" UNIQUE"),
            }
        }
        if let Some(default) = &self.default_value {
            sql.push_str(" DEFAULT ");
            sql.push_str(&default.to_sql()?);
        }
        Ok(sql)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataType {
    Integer,
    Text,
    Real,
    Blob,
}

impl DataType {
    pub fn as_sql(&self) -> &'static str {
        match self {
            DataType::Integer => "INTEGER",
            DataType::Text => "TEXT",
            DataType::Real => "REAL",
            DataType::Blob => "BLOB",
        }
    }

    /// Map a declared column type to its SQLite affinity
    pub fn from_declared(declared: &str) -> Self {
        let declared = declared.to_ascii_uppercase();
        if declared.contains("INT") {
            DataType::Integer
        } else if ["CHAR", "CLOB", "TEXT"].iter().any(|t| declared.contains(t)) {
            DataType::Text
        } else if declared.is_empty() || declared.contains("BLOB") {
            DataType::Blob
        } else {
            DataType::Real
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnConstraint {
    PrimaryKey,
    NotNull,
    Unique,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DefaultValue {
    Integer(i64),
    Text(String),
    Real(f64),
    Null,
    CurrentTimestamp,
}

impl DefaultValue {
    fn to_sql(&self) -> Result<String> {
        Ok(match self {
            DefaultValue::Integer(i) => i.to_string(),
            DefaultValue::Text(s) => format!("'{}'", s.replace('\'', "''")),
            DefaultValue::Real(r) if !r.is_finite() => {
                return Err(StoreError::InvalidDefault(r.to_string()))
            }
            DefaultValue::Real(r) => format!("{r:?}"),
            DefaultValue::Null => "NULL".to_string(),
            DefaultValue::CurrentTimestamp => "CURRENT_TIMESTAMP".to_string(),
        })
    }

    /// Parse the default expression reported by `PRAGMA table_info`
    pub fn parse(expr: &str) -> Option<Self> {
        let expr = expr.trim();
        if expr.eq_ignore_ascii_case("NULL") {
            Some(DefaultValue::Null)
        } else if expr.eq_ignore_ascii_case("CURRENT_TIMESTAMP") {
            Some(DefaultValue::CurrentTimestamp)
        } else if let Some(inner) = expr.strip_prefix('\'').and_then(|e| e.strip_suffix('\'')) {
            Some(DefaultValue::Text(inner.replace("''", "'")))
        } else if let Ok(i) = expr.parse::<i64>() {
            Some(DefaultValue::Integer(i))
        } else {
            expr.parse::<f64>()
                .ok()
                .filter(|r| r.is_finite())
                .map(DefaultValue::Real)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForeignKey {
    pub column: String,
    pub foreign_table: String,
    pub foreign_column: String,
    pub on_delete: ForeignKeyAction,
    pub on_update: ForeignKeyAction,
}

impl ForeignKey {
    pub fn new(column: &str, foreign_table: &str, foreign_column: &str) -> Self {
        Self {
            column: column.to_string(),
            foreign_table: foreign_table.to_string(),
            foreign_column: foreign_column.to_string(),
            on_delete: ForeignKeyAction::NoAction,
            on_update: ForeignKeyAction::NoAction,
        }
    }

    pub fn on_delete(mut self, action: ForeignKeyAction) -> Self {
        self.on_delete = action;
        self
    }

    fn to_sql(&self) -> Result<String> {
        Ok(format!(
            "FOREIGN KEY ({}) REFERENCES {} ({}) ON DELETE {} ON UPDATE {}",
            quote_identifier(&self.column)?,
            quote_identifier(&self.foreign_table)?,
            quote_identifier(&self.foreign_column)?,
            self.on_delete.as_sql(),
            self.on_update.as_sql()
        ))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ForeignKeyAction {
    NoAction,
    Cascade,
    SetNull,
    SetDefault,
    Restrict,
}

impl ForeignKeyAction {
    pub fn as_sql(&self) -> &'static str {
        match self {
            ForeignKeyAction::NoAction => "NO ACTION",
            ForeignKeyAction::Cascade => "CASCADE",
            ForeignKeyAction::SetNull => "SET NULL",
            ForeignKeyAction::SetDefault => "SET DEFAULT",
            ForeignKeyAction::Restrict => "RESTRICT",
        }
    }

    pub fn parse(action: &str) -> Self {
        match action.to_ascii_uppercase().as_str() {
            "CASCADE" => ForeignKeyAction::Cascade,
            "SET NULL" => ForeignKeyAction::SetNull,
            "SET DEFAULT" => ForeignKeyAction::SetDefault,
            "RESTRICT" => ForeignKeyAction::Restrict,
            _ => ForeignKeyAction::NoAction,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexDefinition {
    pub name: String,
    pub columns: Vec<String>,
    pub unique: bool,
}

impl IndexDefinition {
    pub fn new(name: &str, columns: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
            unique: false,
        }
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_sql_renders_constraints_and_foreign_keys() {
        let table = TableDefinition::new("invoices")
            .column(ColumnDefinition::new("id", DataType::Integer).primary_key())
            .column(ColumnDefinition::new("custid", DataType::Integer))
            .column(
                ColumnDefinition::new("amount", DataType::Integer)
                    .not_null()
                    .default_value(DefaultValue::Integer(0)),
            )
            .foreign_key(ForeignKey::new("custid", "customers", "id"));
        assert_eq!(table.primary_key, vec!["id".to_string()]);
        assert_eq!(
            table.create_sql().unwrap(),
            "CREATE TABLE IF NOT EXISTS \"invoices\" (\"id\" INTEGER PRIMARY KEY, \
             \"custid\" INTEGER, \"amount\" INTEGER NOT NULL DEFAULT 0, \
             FOREIGN KEY (\"custid\") REFERENCES \"customers\" (\"id\") \
             ON DELETE NO ACTION ON UPDATE NO ACTION)"
        );
    }

    #[test]
    fn composite_primary_key_moves_to_table_level() {
        let table = TableDefinition::new("enrolments")
            .column(ColumnDefinition::new("student", DataType::Integer).primary_key())
            .column(ColumnDefinition::new("course", DataType::Text).primary_key());
        let sql = table.create_sql().unwrap();
        assert!(sql.ends_with("PRIMARY KEY (\"student\", \"course\"))"));
        assert!(!sql.contains("INTEGER PRIMARY KEY"));
    }

    #[test]
    fn declared_types_follow_sqlite_affinity() {
        assert_eq!(DataType::from_declared("BIGINT"), DataType::Integer);
        assert_eq!(DataType::from_declared("VARCHAR(40)"), DataType::Text);
        assert_eq!(DataType::from_declared(""), DataType::Blob);
        assert_eq!(DataType::from_declared("DOUBLE"), DataType::Real);
    }

    #[test]
    fn default_expressions_parse() {
        assert_eq!(DefaultValue::parse("'it''s'"), Some(DefaultValue::Text("it's".into())));
        assert_eq!(DefaultValue::parse("42"), Some(DefaultValue::Integer(42)));
        assert_eq!(DefaultValue::parse("current_timestamp"), Some(DefaultValue::CurrentTimestamp));
        assert_eq!(DefaultValue::parse("inf"), None);
    }

    #[test]
    fn non_finite_real_defaults_are_rejected() {
        for value in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let table = TableDefinition::new("readings").column(
                ColumnDefinition::new("level", DataType::Real)
                    .default_value(DefaultValue::Real(value)),
            );
            assert!(matches!(table.create_sql(), Err(StoreError::InvalidDefault(_))));
        }

        let table = TableDefinition::new("readings").column(
            ColumnDefinition::new("level", DataType::Real).default_value(DefaultValue::Real(1.5)),
        );
        assert!(table.create_sql().unwrap().ends_with("DEFAULT 1.5)"));
    }
}
