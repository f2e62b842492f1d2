use std::collections::HashMap;
use std::fmt;

use rusqlite::types::{ToSql, ToSqlOutput, Value as SqlValue, ValueRef};
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};

use crate::error::{Result, StoreError};

/// Core value types for SQLite operations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
    Boolean(bool),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            Value::Boolean(b) => Some(*b as i64),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.pad("None"),
            Value::Integer(i) => fmt::Display::fmt(i, f),
            Value::Real(r) => fmt::Display::fmt(r, f),
            Value::Text(s) => f.pad(s),
            Value::Blob(b) => f.pad(&format!("<{} bytes>", b.len())),
            Value::Boolean(b) => f.pad(if *b { "True" } else { "False" }),
        }
    }
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Value::Null => ToSqlOutput::Owned(SqlValue::Null),
            Value::Integer(i) => ToSqlOutput::Owned(SqlValue::Integer(*i)),
            Value::Real(r) => ToSqlOutput::Owned(SqlValue::Real(*r)),
            Value::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
            Value::Blob(b) => ToSqlOutput::Borrowed(ValueRef::Blob(b)),
            Value::Boolean(b) => ToSqlOutput::Owned(SqlValue::Integer(*b as i64)),
        })
    }
}

impl From<ValueRef<'_>> for Value {
    fn from(value: ValueRef<'_>) -> Self {
        match value {
            ValueRef::Null => Value::Null,
            ValueRef::Integer(i) => Value::Integer(i),
            ValueRef::Real(r) => Value::Real(r),
            ValueRef::Text(t) => Value::Text(String::from_utf8_lossy(t).into_owned()),
            ValueRef::Blob(b) => Value::Blob(b.to_vec()),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(v.into())
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Real(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Blob(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

/// A single result row: column names in select order with their values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    columns: Vec<String>,
    values: Vec<Value>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a column, builder style
    pub fn with(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.push(column, value);
        self
    }

    /// Append a column, replacing an existing one with the same name
    pub fn push(&mut self, column: &str, value: impl Into<Value>) {
        let value = value.into();
        match self.columns.iter().position(|c| c == column) {
            Some(idx) => self.values[idx] = value,
            None => {
                self.columns.push(column.to_string());
                self.values.push(value);
            }
        }
    }

    /// Append without replacing; result rows may repeat a column name
    pub(crate) fn append(&mut self, column: &str, value: Value) {
        self.columns.push(column.to_string());
        self.values.push(value);
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns
            .iter()
            .position(|c| c == column)
            .map(|idx| &self.values[idx])
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.columns
            .iter()
            .map(String::as_str)
            .zip(self.values.iter())
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    fn require(&self, column: &str) -> Result<&Value> {
        self.get(column)
            .ok_or_else(|| StoreError::unknown_column(column))
    }

    pub fn integer(&self, column: &str) -> Result<i64> {
        self.opt_integer(column)?
            .ok_or_else(|| StoreError::conversion(column, "an integer"))
    }

    pub fn opt_integer(&self, column: &str) -> Result<Option<i64>> {
        match self.require(column)? {
            Value::Null => Ok(None),
            other => other
                .as_integer()
                .map(Some)
                .ok_or_else(|| StoreError::conversion(column, "an integer")),
        }
    }

    pub fn text(&self, column: &str) -> Result<String> {
        self.opt_text(column)?
            .ok_or_else(|| StoreError::conversion(column, "text"))
    }

    pub fn opt_text(&self, column: &str) -> Result<Option<String>> {
        match self.require(column)? {
            Value::Null => Ok(None),
            Value::Text(s) => Ok(Some(s.clone())),
            _ => Err(StoreError::conversion(column, "text")),
        }
    }
}

impl Serialize for Row {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.len()))?;
        for (column, value) in self.iter() {
            map.serialize_entry(column, value)?;
        }
        map.end()
    }
}

/// Parameter bindings for SQL queries
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Params {
    pub values: HashMap<String, Value>,
}

impl Params {
    /// Create a new Params object
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a named value; the `:` prefix is optional
    pub fn with_value(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.values.insert(placeholder(name), value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

fn placeholder(name: &str) -> String {
    if name.starts_with([':', '@', '$']) {
        name.to_string()
    } else {
        format!(":{name}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholder_prefix_is_added_once() {
        let params = Params::new().with_value("x", 1).with_value(":y", 2);
        assert!(params.values.contains_key(":x"));
        assert!(params.values.contains_key(":y"));
        assert_eq!(params.values.len(), 2);
    }

    #[test]
    fn row_push_replaces_existing_column() {
        let mut row = Row::new().with("id", 1).with("name", "Fab");
        row.push("name", "JD");
        assert_eq!(row.len(), 2);
        assert_eq!(row.text("name").unwrap(), "JD");
    }

    #[test]
    fn typed_accessors_report_mismatches() {
        let row = Row::new()
            .with("id", 1)
            .with("email", Value::Null)
            .with("name", "robb");
        assert_eq!(row.integer("id").unwrap(), 1);
        assert_eq!(row.opt_text("email").unwrap(), None);
        assert!(matches!(
            row.integer("name"),
            Err(StoreError::Conversion { .. })
        ));
        assert!(matches!(
            row.text("missing"),
            Err(StoreError::UnknownColumn { .. })
        ));
    }

    #[test]
    fn row_serializes_as_ordered_object() {
        let row = Row::new()
            .with("id", 2)
            .with("name", "robb")
            .with("address", Value::Null);
        let json = serde_json::to_string(&row).unwrap();
        assert_eq!(json, r#"{"id":2,"name":"robb","address":null}"#);
    }
}
