//! Record types used by the walkthroughs.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::session::{BelongsTo, Entity, Session};
use crate::sqlite::{
    ColumnDefinition, DataType, ForeignKey, IndexDefinition, Row, Schema, TableDefinition,
};

/// `students` table, declared with table and column objects only
pub fn students_table() -> TableDefinition {
    TableDefinition::new("students")
        .column(ColumnDefinition::new("id", DataType::Integer).primary_key())
        .column(ColumnDefinition::new("name", DataType::Text).not_null())
        .column(ColumnDefinition::new("lastname", DataType::Text))
        .column(ColumnDefinition::new("address", DataType::Text))
        .column(ColumnDefinition::new("email", DataType::Text))
        .index(IndexDefinition::new("ix_students_lastname", &["lastname"]))
}

/// Schema of `college.db`
pub fn college_schema() -> Schema {
    Schema::new().add_table(students_table())
}

/// Schema of `sales.db`
pub fn sales_schema() -> Schema {
    Schema::new()
        .add_table(Customer::definition())
        .add_table(Invoice::definition())
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Customer {
    pub id: Option<i64>,
    pub name: String,
    pub address: Option<String>,
    pub email: Option<String>,
}

impl Customer {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }

    pub fn with_address(mut self, address: &str) -> Self {
        self.address = Some(address.to_string());
        self
    }

    pub fn with_email(mut self, email: &str) -> Self {
        self.email = Some(email.to_string());
        self
    }

    /// Invoices of this customer, ordered by invoice id
    pub fn invoices(&self, session: &mut Session<'_>) -> Result<Vec<Invoice>> {
        session.children(self)
    }
}

impl Entity for Customer {
    const TABLE: &'static str = "customers";

    fn definition() -> TableDefinition {
        TableDefinition::new(Self::TABLE)
            .column(ColumnDefinition::new("id", DataType::Integer).primary_key())
            .column(ColumnDefinition::new("name", DataType::Text).not_null())
            .column(ColumnDefinition::new("address", DataType::Text))
            .column(ColumnDefinition::new("email", DataType::Text))
    }

    fn id(&self) -> Option<i64> {
        self.id
    }

    fn set_id(&mut self, id: i64) {
        self.id = Some(id);
    }

    fn to_row(&self) -> Row {
        Row::new()
            .with("name", self.name.as_str())
            .with("address", self.address.clone())
            .with("email", self.email.clone())
    }

    fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            id: Some(row.integer("id")?),
            name: row.text("name")?,
            address: row.opt_text("address")?,
            email: row.opt_text("email")?,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Invoice {
    pub id: Option<i64>,
    pub custid: Option<i64>,
    pub invno: i64,
    pub amount: i64,
}

impl Invoice {
    pub fn new(invno: i64, amount: i64) -> Self {
        Self {
            invno,
            amount,
            ..Self::default()
        }
    }

    pub fn customer(&self, session: &mut Session<'_>) -> Result<Option<Customer>> {
        session.parent(self)
    }
}

impl Entity for Invoice {
    const TABLE: &'static str = "invoices";

    fn definition() -> TableDefinition {
        TableDefinition::new(Self::TABLE)
            .column(ColumnDefinition::new("id", DataType::Integer).primary_key())
            .column(ColumnDefinition::new("custid", DataType::Integer))
            .column(ColumnDefinition::new("invno", DataType::Integer).not_null())
            .column(ColumnDefinition::new("amount", DataType::Integer).not_null())
            .foreign_key(ForeignKey::new("custid", Customer::TABLE, "id"))
    }

    fn id(&self) -> Option<i64> {
        self.id
    }

    fn set_id(&mut self, id: i64) {
        self.id = Some(id);
    }

    fn to_row(&self) -> Row {
        Row::new()
            .with("custid", self.custid)
            .with("invno", self.invno)
            .with("amount", self.amount)
    }

    fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            id: Some(row.integer("id")?),
            custid: row.opt_integer("custid")?,
            invno: row.integer("invno")?,
            amount: row.integer("amount")?,
        })
    }
}

impl BelongsTo<Customer> for Invoice {
    const FOREIGN_KEY: &'static str = "custid";

    fn parent_id(&self) -> Option<i64> {
        self.custid
    }

    fn set_parent_id(&mut self, id: i64) {
        self.custid = Some(id);
    }
}
