use crate::error::{Result, StoreError};

use super::engine::ResultSet;
use super::value::{Params, Row, Value};

/// SQL Query with typed parameters
#[derive(Debug, Clone, PartialEq)]
pub struct SqlQuery {
    pub statement: String,
    pub params: Params,
}

impl SqlQuery {
    pub fn new(statement: &str) -> Self {
        Self {
            statement: statement.to_string(),
            params: Params::new(),
        }
    }

    pub fn with_params(mut self, params: Params) -> Self {
        self.params = params;
        self
    }

    /// Bind a single named parameter
    pub fn bind(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.params = self.params.with_value(name, value);
        self
    }
}

/// Query operators for building advanced queries
#[derive(Debug, Clone, PartialEq)]
pub enum QueryOperator {
    Equal(Value),
    NotEqual(Value),
    GreaterThan(Value),
    GreaterThanOrEqual(Value),
    LessThan(Value),
    LessThanOrEqual(Value),
    Like(String),
    In(Vec<Value>),
    NotIn(Vec<Value>),
    Between(Value, Value),
    IsNull,
    IsNotNull,
}

impl QueryOperator {
    fn render(&self, column: &str, params: &mut Vec<Value>) -> String {
        let binary = |op: &str, value: &Value, params: &mut Vec<Value>| {
            params.push(value.clone());
            format!("{column} {op} ?")
        };
        match self {
            QueryOperator::Equal(v) => binary("=", v, params),
            QueryOperator::NotEqual(v) => binary("!=", v, params),
            QueryOperator::GreaterThan(v) => binary(">", v, params),
            QueryOperator::GreaterThanOrEqual(v) => binary(">=", v, params),
            QueryOperator::LessThan(v) => binary("<", v, params),
            QueryOperator::LessThanOrEqual(v) => binary("<=", v, params),
            QueryOperator::Like(pattern) => {
                params.push(Value::Text(pattern.clone()));
                format!("{column} LIKE ?")
            }
            // an empty IN list matches nothing, an empty NOT IN matches everything
            QueryOperator::In(values) if values.is_empty() => "1 != 1".to_string(),
            QueryOperator::NotIn(values) if values.is_empty() => "1 = 1".to_string(),
            QueryOperator::In(values) => {
                params.extend(values.iter().cloned());
                format!("{column} IN ({})", placeholders(values.len()))
            }
            QueryOperator::NotIn(values) => {
                params.extend(values.iter().cloned());
                format!("{column} NOT IN ({})", placeholders(values.len()))
            }
            QueryOperator::Between(low, high) => {
                params.push(low.clone());
                params.push(high.clone());
                format!("{column} BETWEEN ? AND ?")
            }
            QueryOperator::IsNull => format!("{column} IS NULL"),
            QueryOperator::IsNotNull => format!("{column} IS NOT NULL"),
        }
    }
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

/// How the conditions of a [`Query`] are combined
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum Conjunction {
    #[default]
    All,
    Any,
}

/// Query builder for composable, immutable queries
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Query {
    pub conditions: Vec<(String, QueryOperator)>,
    pub conjunction: Conjunction,
}

impl Query {
    /// Conditions joined with AND
    pub fn new() -> Self {
        Self::default()
    }

    /// Conditions joined with OR
    pub fn any() -> Self {
        Self {
            conditions: Vec::new(),
            conjunction: Conjunction::Any,
        }
    }

    pub fn with_condition(mut self, field: &str, op: QueryOperator) -> Self {
        self.conditions.push((field.to_string(), op));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    /// Render the WHERE clause (without the keyword), appending bound values
    pub fn to_sql(&self, params: &mut Vec<Value>) -> Result<Option<String>> {
        if self.conditions.is_empty() {
            return Ok(None);
        }
        let joiner = match self.conjunction {
            Conjunction::All => " AND ",
            Conjunction::Any => " OR ",
        };
        let parts = self
            .conditions
            .iter()
            .map(|(field, op)| Ok(op.render(&quote_identifier(field)?, params)))
            .collect::<Result<Vec<_>>>()?;
        Ok(Some(parts.join(joiner)))
    }
}

fn where_clause(query: &Query, params: &mut Vec<Value>) -> Result<String> {
    Ok(match query.to_sql(params)? {
        Some(clause) => format!(" WHERE {clause}"),
        None => String::new(),
    })
}

/// Quote a table or column name, rejecting anything that is not a plain identifier
pub fn quote_identifier(name: &str) -> Result<String> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(first) => {
            (first.is_ascii_alphabetic() || first == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        None => false,
    };
    if valid {
        Ok(format!("\"{name}\""))
    } else {
        Err(StoreError::InvalidIdentifier(name.to_string()))
    }
}

/// CRUD operation types
#[derive(Debug, Clone, PartialEq)]
pub struct CreateOperation {
    pub table: String,
    pub data: Row,
}

impl CreateOperation {
    pub fn new(table: &str) -> Self {
        Self {
            table: table.to_string(),
            data: Row::new(),
        }
    }

    pub fn with_value(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.data.push(column, value);
        self
    }

    pub fn from_row(table: &str, data: Row) -> Self {
        Self {
            table: table.to_string(),
            data,
        }
    }

    pub fn to_sql(&self) -> Result<(String, Vec<Value>)> {
        let table = quote_identifier(&self.table)?;
        if self.data.is_empty() {
            return Ok((format!("INSERT INTO {table} DEFAULT VALUES"), Vec::new()));
        }
        let columns = self
            .data
            .columns()
            .iter()
            .map(|c| quote_identifier(c))
            .collect::<Result<Vec<_>>>()?;
        let sql = format!(
            "INSERT INTO {table} ({}) VALUES ({})",
            columns.join(", "),
            placeholders(columns.len())
        );
        Ok((sql, self.data.values().to_vec()))
    }
}

/// Several inserts into one table, executed in a single transaction
#[derive(Debug, Clone, PartialEq)]
pub struct CreateManyOperation {
    pub table: String,
    pub rows: Vec<Row>,
}

impl CreateManyOperation {
    pub fn new(table: &str, rows: Vec<Row>) -> Self {
        Self {
            table: table.to_string(),
            rows,
        }
    }

    pub fn operations(&self) -> impl Iterator<Item = CreateOperation> + '_ {
        self.rows
            .iter()
            .map(|row| CreateOperation::from_row(&self.table, row.clone()))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReadOperation {
    pub table: String,
    pub query: Query,
    pub fields: Option<Vec<String>>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
    pub order_by: Option<Vec<(String, bool)>>, // (field, is_ascending)
}

impl ReadOperation {
    pub fn new(table: &str) -> Self {
        Self {
            table: table.to_string(),
            query: Query::new(),
            fields: None,
            limit: None,
            offset: None,
            order_by: None,
        }
    }

    pub fn with_query(mut self, query: Query) -> Self {
        self.query = query;
        self
    }

    pub fn with_fields(mut self, fields: &[&str]) -> Self {
        self.fields = Some(fields.iter().map(|f| f.to_string()).collect());
        self
    }

    pub fn order_by(mut self, field: &str, ascending: bool) -> Self {
        self.order_by
            .get_or_insert_with(Vec::new)
            .push((field.to_string(), ascending));
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u32) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn to_sql(&self) -> Result<(String, Vec<Value>)> {
        let mut params = Vec::new();
        let fields = match &self.fields {
            Some(fields) if !fields.is_empty() => fields
                .iter()
                .map(|f| quote_identifier(f))
                .collect::<Result<Vec<_>>>()?
                .join(", "),
            _ => "*".to_string(),
        };
        let mut sql = format!(
            "SELECT {fields} FROM {}{}",
            quote_identifier(&self.table)?,
            where_clause(&self.query, &mut params)?
        );
        if let Some(order_by) = self.order_by.as_ref().filter(|o| !o.is_empty()) {
            let terms = order_by
                .iter()
                .map(|(field, asc)| {
                    Ok(format!(
                        "{} {}",
                        quote_identifier(field)?,
                        if *asc { "ASC" } else { "DESC" }
                    ))
                })
                .collect::<Result<Vec<_>>>()?;
            sql.push_str(&format!(" ORDER BY {}", terms.join(", ")));
        }
        match (self.limit, self.offset) {
            (Some(limit), Some(offset)) => sql.push_str(&format!(" LIMIT {limit} OFFSET {offset}")),
            (Some(limit), None) => sql.push_str(&format!(" LIMIT {limit}")),
            // SQLite only accepts OFFSET after a LIMIT
            (None, Some(offset)) => sql.push_str(&format!(" LIMIT -1 OFFSET {offset}")),
            (None, None) => {}
        }
        Ok((sql, params))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpdateOperation {
    pub table: String,
    pub query: Query,
    pub updates: Row,
}

impl UpdateOperation {
    pub fn new(table: &str, query: Query) -> Self {
        Self {
            table: table.to_string(),
            query,
            updates: Row::new(),
        }
    }

    pub fn set(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.updates.push(column, value);
        self
    }

    pub fn to_sql(&self) -> Result<(String, Vec<Value>)> {
        if self.updates.is_empty() {
            return Err(StoreError::EmptyUpdate(self.table.clone()));
        }
        let mut params = Vec::new();
        let assignments = self
            .updates
            .iter()
            .map(|(column, value)| {
                params.push(value.clone());
                Ok(format!("{} = ?", quote_identifier(column)?))
            })
            .collect::<Result<Vec<_>>>()?;
        let sql = format!(
            "UPDATE {} SET {}{}",
            quote_identifier(&self.table)?,
            assignments.join(", "),
            where_clause(&self.query, &mut params)?
        );
        Ok((sql, params))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeleteOperation {
    pub table: String,
    pub query: Query,
}

impl DeleteOperation {
    pub fn new(table: &str, query: Query) -> Self {
        Self {
            table: table.to_string(),
            query,
        }
    }

    pub fn to_sql(&self) -> Result<(String, Vec<Value>)> {
        let mut params = Vec::new();
        let sql = format!(
            "DELETE FROM {}{}",
            quote_identifier(&self.table)?,
            where_clause(&self.query, &mut params)?
        );
        Ok((sql, params))
    }
}

/// Render `SELECT count(*)` for a table and filter
pub fn count_sql(table: &str, query: &Query) -> Result<(String, Vec<Value>)> {
    let mut params = Vec::new();
    let sql = format!(
        "SELECT count(*) FROM {}{}",
        quote_identifier(table)?,
        where_clause(query, &mut params)?
    );
    Ok((sql, params))
}

#[derive(Debug, Clone, PartialEq)]
pub enum CrudOperation {
    Create(CreateOperation),
    CreateMany(CreateManyOperation),
    Read(ReadOperation),
    Update(UpdateOperation),
    Delete(DeleteOperation),
}

/// Outcome of [`CrudOperation`] execution
#[derive(Debug)]
pub enum CrudOutcome {
    /// Row ids assigned to inserted records
    Inserted(Vec<i64>),
    Rows(ResultSet),
    /// Number of rows touched by an update or delete
    Affected(usize),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_renders_filters_order_and_paging() {
        let op = ReadOperation::new("students")
            .with_fields(&["id", "name"])
            .with_query(
                Query::new()
                    .with_condition("id", QueryOperator::GreaterThan(Value::Integer(2)))
                    .with_condition("lastname", QueryOperator::Like("K%".into())),
            )
            .order_by("name", false)
            .offset(5);
        let (sql, params) = op.to_sql().unwrap();
        assert_eq!(
            sql,
            "SELECT \"id\", \"name\" FROM \"students\" WHERE \"id\" > ? AND \"lastname\" LIKE ? \
             ORDER BY \"name\" DESC LIMIT -1 OFFSET 5"
        );
        assert_eq!(params, vec![Value::Integer(2), Value::Text("K%".into())]);
    }

    #[test]
    fn any_query_joins_with_or() {
        let query = Query::any()
            .with_condition("name", QueryOperator::Equal("Ravi".into()))
            .with_condition("id", QueryOperator::Between(1.into(), 3.into()));
        let mut params = Vec::new();
        let clause = query.to_sql(&mut params).unwrap().unwrap();
        assert_eq!(clause, "\"name\" = ? OR \"id\" BETWEEN ? AND ?");
        assert_eq!(params.len(), 3);
    }

    #[test]
    fn empty_in_list_matches_nothing() {
        let query = Query::new().with_condition("id", QueryOperator::In(vec![]));
        let mut params = Vec::new();
        assert_eq!(query.to_sql(&mut params).unwrap().unwrap(), "1 != 1");
        assert!(params.is_empty());
    }

    #[test]
    fn update_without_assignments_is_rejected() {
        let op = UpdateOperation::new("students", Query::new());
        assert!(matches!(op.to_sql(), Err(StoreError::EmptyUpdate(_))));
    }

    #[test]
    fn identifiers_are_validated() {
        assert_eq!(quote_identifier("custid").unwrap(), "\"custid\"");
        assert!(quote_identifier("name; DROP TABLE x").is_err());
        assert!(quote_identifier("1abc").is_err());
        assert!(quote_identifier("").is_err());
    }

    #[test]
    fn insert_without_values_uses_defaults() {
        let (sql, params) = CreateOperation::new("customers").to_sql().unwrap();
        assert_eq!(sql, "INSERT INTO \"customers\" DEFAULT VALUES");
        assert!(params.is_empty());
    }
}
