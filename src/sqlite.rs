//! SQLite access: values and rows, query and CRUD operation types, schema
//! definitions and the engine that executes them through `rusqlite`.

mod engine;
mod query;
mod schema;
mod value;

pub use engine::{reset_database, ResultSet, SqliteConfig, SqliteEngine, ECHO_TARGET};
pub use query::{
    count_sql, quote_identifier, Conjunction, CreateManyOperation, CreateOperation,
    CrudOperation, CrudOutcome, DeleteOperation, Query, QueryOperator, ReadOperation, SqlQuery,
    UpdateOperation,
};
pub use schema::{
    ColumnConstraint, ColumnDefinition, DataType, DefaultValue, ForeignKey, ForeignKeyAction,
    IndexDefinition, Schema, TableDefinition,
};
pub use value::{Params, Row, Value};
