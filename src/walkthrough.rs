//! Scripted runs over the engine and the session API.
//!
//! Each walkthrough expects an engine opened on a fresh database and logs
//! every step and result through `tracing`.

use anyhow::{Context, Result};
use tracing::{info, instrument};

use crate::models::{college_schema, sales_schema, Customer, Invoice};
use crate::printer::{log_row, log_rows, print_result};
use crate::sqlite::{
    CreateManyOperation, CreateOperation, DeleteOperation, Query, QueryOperator, ReadOperation,
    Row, Schema, SqlQuery, SqliteEngine, UpdateOperation, Value,
};

/// Target of the walkthrough log lines
pub const LOG_TARGET: &str = module_path!();

/// Table, insert, select, text SQL, update, delete and reflection using
/// table objects and CRUD operations only.
#[instrument(name = "core", skip_all)]
pub fn core(engine: &SqliteEngine) -> Result<()> {
    info!("driver: {}", engine.driver());
    info!("tables before create_all: {:?}", engine.table_names()?);
    engine
        .create_all(&college_schema())
        .context("creating college schema")?;
    info!("tables after create_all: {:?}", engine.table_names()?);

    info!("INSERT ONE");
    let id = engine.insert(
        &CreateOperation::new("students")
            .with_value("name", "Ravi")
            .with_value("lastname", "Kapoor"),
    )?;
    info!("inserted id {}", id);

    info!("INSERT MANY");
    let students = [
        ("Rajiv", "Khanna"),
        ("Komal", "Bhandari"),
        ("Abdul", "Sattar"),
        ("Priya", "Rajhans"),
    ]
    .iter()
    .map(|(name, lastname)| Row::new().with("name", *name).with("lastname", *lastname))
    .collect();
    let ids = engine.insert_many(&CreateManyOperation::new("students", students))?;
    info!("inserted ids {:?}", ids);

    info!("SELECT ALL");
    let mut all = engine.select(&ReadOperation::new("students"))?;
    print_result(&mut all)?;
    // the rows are gone now; printing again logs nothing
    print_result(&mut all)?;

    info!("SELECT WHERE id > 2");
    let mut filtered = engine.select(
        &ReadOperation::new("students")
            .with_fields(&["id", "name", "lastname"])
            .with_query(Query::new().with_condition("id", QueryOperator::GreaterThan(2.into()))),
    )?;
    print_result(&mut filtered)?;

    info!("TEXT SQL");
    let mut between = engine.execute_sql(
        &SqlQuery::new(
            "SELECT students.name, students.lastname FROM students \
             WHERE students.name BETWEEN :x AND :y ORDER BY students.name",
        )
        .bind("x", "A")
        .bind("y", "L"),
    )?;
    print_result(&mut between)?;

    info!("UPDATE lastname Khanna -> Kapoor");
    let updated = engine.update(
        &UpdateOperation::new(
            "students",
            Query::new().with_condition("lastname", QueryOperator::Equal("Khanna".into())),
        )
        .set("lastname", "Kapoor"),
    )?;
    info!("updated {} rows", updated);
    let mut kapoors = engine.select(
        &ReadOperation::new("students")
            .with_query(Query::new().with_condition("lastname", QueryOperator::Equal("Kapoor".into()))),
    )?;
    print_result(&mut kapoors)?;

    info!("DELETE lastname = Kapoor");
    let deleted = engine.delete(&DeleteOperation::new(
        "students",
        Query::new().with_condition("lastname", QueryOperator::Equal("Kapoor".into())),
    ))?;
    info!("deleted {} rows", deleted);
    info!("remaining: {}", engine.count("students", &Query::new())?);

    info!("REFLECT");
    let reflected = engine
        .reflect_table("students")?
        .context("students table missing after create_all")?;
    info!("students columns: {:?}", reflected.column_names());
    Ok(())
}

/// Customers through the session: add, query, get, update, edit and rollback.
#[instrument(name = "declarative", skip_all)]
pub fn declarative(engine: &SqliteEngine) -> Result<()> {
    info!("create_all");
    engine.create_all(&sales_schema())?;

    let mut session = engine.session();
    let mut customer = Customer::new("Fab")
        .with_address("meow street 9")
        .with_email("fab@meow.com");
    session.add(&mut customer)?;
    session.commit()?;

    info!("add records");
    session.add_all(&mut [
        Customer::new("robb")
            .with_address("here")
            .with_email("email@gmail.com"),
        Customer::new("frank")
            .with_address("castiglione")
            .with_email("punisher@gmail.com"),
    ])?;
    session.commit()?;

    info!("QUERY ALL");
    let customers = session.all::<Customer>()?;
    log_rows(&customers);

    info!("QUERY.GET");
    let mut row = session
        .get::<Customer>(2)?
        .context("customer 2 missing")?;
    log_row(&row);
    info!("UPDATE");
    row.address = Some("flamingo road".to_string());
    session.save(&row)?;
    session.commit()?;

    info!("GET FIRST");
    let mut row = session
        .first::<Customer>()?
        .context("customers table is empty")?;
    log_row(&row);
    info!("EDIT NAME");
    row.name = "JD".to_string();
    session.save(&row)?;
    log_row(&row);
    info!("ROLLBACK");
    session.rollback()?;
    session.refresh(&mut row)?;
    log_row(&row);
    session.close()?;
    Ok(())
}

/// Customers with invoices. With `schema_only` the run stops once the tables exist.
#[instrument(name = "relations", skip_all)]
pub fn relations(engine: &SqliteEngine, schema_only: bool) -> Result<()> {
    info!("create_all");
    engine.create_all(&sales_schema())?;
    if schema_only {
        info!("tables: {:?}", engine.table_names()?);
        return Ok(());
    }

    let mut session = engine.session();
    let mut customer = Customer::new("Gopal Krishna")
        .with_address("Bank Street Hydarebad")
        .with_email("gk@gmail.com");
    let mut invoices = [Invoice::new(10, 15000), Invoice::new(14, 3850)];
    session.add_with_children(&mut customer, &mut invoices)?;
    session.commit()?;

    info!("INVOICES OF CUSTOMER");
    log_row(&customer);
    let loaded = customer.invoices(&mut session)?;
    log_rows(&loaded);

    info!("CUSTOMER OF INVOICE");
    for invoice in &loaded {
        let owner = invoice
            .customer(&mut session)?
            .context("invoice without customer")?;
        log_row(&owner);
    }

    info!("JOIN");
    let mut joined = engine.execute_sql(
        &SqlQuery::new(
            "SELECT customers.name, invoices.invno, invoices.amount FROM customers \
             JOIN invoices ON invoices.custid = customers.id \
             WHERE invoices.amount > :min ORDER BY invoices.invno",
        )
        .bind("min", Value::Integer(1000)),
    )?;
    print_result(&mut joined)?;
    session.close()?;
    Ok(())
}

/// Driver, table names and reflected definitions of every table
#[instrument(name = "inspect", skip_all)]
pub fn inspect(engine: &SqliteEngine) -> Result<Schema> {
    info!("driver: {}", engine.driver());
    let names = engine.table_names()?;
    info!("tables: {:?}", names);
    let mut schema = Schema::new();
    for name in &names {
        if let Some(table) = engine.reflect_table(name)? {
            info!("{}: {:?}", name, table.column_names());
            schema = schema.add_table(table);
        }
    }
    Ok(schema)
}
