use sqlite_playground::logging::Loggers;
use sqlite_playground::models::{sales_schema, Customer, Invoice};
use sqlite_playground::sqlite::{Query, QueryOperator, SqlQuery, SqliteConfig, SqliteEngine};
use sqlite_playground::{Result, StoreError};
use tempfile::TempDir;

fn create_sales_db() -> Result<(SqliteEngine, TempDir)> {
    let dir = tempfile::tempdir()?;
    let config = SqliteConfig::new(dir.path().join("sales.db"), sales_schema());
    let engine = SqliteEngine::open(config, &Loggers::default())?;
    Ok((engine, dir))
}

fn seed_customers(engine: &SqliteEngine) -> Result<()> {
    let mut session = engine.session();
    session.add_all(&mut [
        Customer::new("Fab")
            .with_address("meow street 9")
            .with_email("fab@meow.com"),
        Customer::new("robb")
            .with_address("here")
            .with_email("email@gmail.com"),
        Customer::new("frank")
            .with_address("castiglione")
            .with_email("punisher@gmail.com"),
    ])?;
    session.commit()
}

#[test]
fn test_add_assigns_ids_and_commit_persists() {
    test_add_assigns_ids_and_commit_persists_impl().unwrap();
}

fn test_add_assigns_ids_and_commit_persists_impl() -> Result<()> {
    let (engine, _dir) = create_sales_db()?;
    let mut customer = Customer::new("Fab").with_email("fab@meow.com");

    let mut session = engine.session();
    assert_eq!(session.add(&mut customer)?, 1);
    assert_eq!(customer.id, Some(1));
    assert!(session.is_active());
    session.commit()?;
    assert!(!session.is_active());
    session.close()?;

    let mut session = engine.session();
    let loaded = session.get::<Customer>(1)?.expect("customer persisted");
    assert_eq!(loaded, customer);
    assert_eq!(loaded.address, None);
    Ok(())
}

#[test]
fn test_edit_then_rollback_restores_persisted_value() {
    test_edit_then_rollback_impl().unwrap();
}

fn test_edit_then_rollback_impl() -> Result<()> {
    let (engine, _dir) = create_sales_db()?;
    seed_customers(&engine)?;

    let mut session = engine.session();
    let mut row = session.first::<Customer>()?.expect("first customer");
    assert_eq!(row.name, "Fab");

    row.name = "JD".to_string();
    assert!(session.is_dirty(&row));
    assert!(session.save(&row)?);
    // the flushed change is visible inside the open transaction
    assert_eq!(session.get::<Customer>(1)?.unwrap().name, "JD");

    session.rollback()?;
    assert_eq!(session.get::<Customer>(1)?.unwrap().name, "Fab");
    session.refresh(&mut row)?;
    assert_eq!(row.name, "Fab");
    assert!(!session.is_dirty(&row));
    Ok(())
}

#[test]
fn test_update_then_commit() {
    test_update_then_commit_impl().unwrap();
}

fn test_update_then_commit_impl() -> Result<()> {
    let (engine, _dir) = create_sales_db()?;
    seed_customers(&engine)?;

    let mut session = engine.session();
    let mut row = session.get::<Customer>(2)?.expect("customer 2");
    assert!(!session.save(&row)?);

    row.address = Some("flamingo road".to_string());
    assert!(session.save(&row)?);
    assert!(!session.save(&row)?);
    session.commit()?;
    drop(session);

    let mut session = engine.session();
    let customers = session.all::<Customer>()?;
    let addresses: Vec<_> = customers.iter().map(|c| c.address.as_deref()).collect();
    assert_eq!(
        addresses,
        vec![Some("meow street 9"), Some("flamingo road"), Some("castiglione")]
    );
    Ok(())
}

#[test]
fn test_drop_without_commit_rolls_back() {
    test_drop_without_commit_impl().unwrap();
}

fn test_drop_without_commit_impl() -> Result<()> {
    let (engine, _dir) = create_sales_db()?;
    {
        let mut session = engine.session();
        session.add(&mut Customer::new("ghost"))?;
        assert_eq!(session.count::<Customer>(&Query::new())?, 1);
    }
    assert!(!engine.in_transaction());
    assert_eq!(engine.count("customers", &Query::new())?, 0);
    Ok(())
}

#[test]
fn test_filter_and_delete() {
    test_filter_and_delete_impl().unwrap();
}

fn test_filter_and_delete_impl() -> Result<()> {
    let (engine, _dir) = create_sales_db()?;
    seed_customers(&engine)?;

    let mut session = engine.session();
    let gmail = session.filter::<Customer>(
        Query::new().with_condition("email", QueryOperator::Like("%@gmail.com".into())),
    )?;
    let names: Vec<_> = gmail.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["robb", "frank"]);

    assert!(session.delete(&gmail[0])?);
    assert!(!session.delete(&gmail[0])?);
    session.commit()?;
    assert_eq!(engine.count("customers", &Query::new())?, 2);
    Ok(())
}

#[test]
fn test_unsaved_entities_are_rejected() {
    let (engine, _dir) = create_sales_db().unwrap();
    let mut session = engine.session();
    let customer = Customer::new("nobody");
    assert!(matches!(
        session.save(&customer),
        Err(StoreError::NotPersisted("customers"))
    ));
    assert!(matches!(
        session.delete(&customer),
        Err(StoreError::NotPersisted("customers"))
    ));

    let mut missing = Customer::new("gone");
    missing.id = Some(42);
    assert!(matches!(
        session.refresh(&mut missing),
        Err(StoreError::NotFound { table: "customers", id: 42 })
    ));
}

#[test]
fn test_relationship_traversal() {
    test_relationship_traversal_impl().unwrap();
}

fn test_relationship_traversal_impl() -> Result<()> {
    let (engine, _dir) = create_sales_db()?;
    let mut session = engine.session();
    let mut customer = Customer::new("Gopal Krishna").with_email("gk@gmail.com");
    let mut invoices = [Invoice::new(10, 15000), Invoice::new(14, 3850)];
    session.add_with_children(&mut customer, &mut invoices)?;
    session.commit()?;

    assert!(invoices.iter().all(|i| i.custid == customer.id));

    let loaded = customer.invoices(&mut session)?;
    assert_eq!(loaded.len(), 2);
    assert_eq!(loaded[0].invno, 10);
    assert_eq!(loaded[1].amount, 3850);

    for invoice in &loaded {
        let owner = invoice.customer(&mut session)?.expect("invoice owner");
        assert_eq!(owner, customer);
    }

    let orphan = Invoice::new(99, 1);
    assert_eq!(orphan.customer(&mut session)?, None);
    Ok(())
}

#[test]
fn test_foreign_keys_enforced() {
    let (engine, _dir) = create_sales_db().unwrap();
    let mut session = engine.session();
    let mut invoice = Invoice::new(1, 100);
    invoice.custid = Some(999);
    assert!(matches!(session.add(&mut invoice), Err(StoreError::Sqlite(_))));
}

#[test]
fn test_failed_commit_rolls_back() {
    test_failed_commit_rolls_back_impl().unwrap();
}

fn test_failed_commit_rolls_back_impl() -> Result<()> {
    let (engine, _dir) = create_sales_db()?;
    let mut session = engine.session();
    assert_eq!(session.count::<Invoice>(&Query::new())?, 0);
    // deferred checks only apply to the open transaction and fire at COMMIT
    engine.execute_sql(&SqlQuery::new("PRAGMA defer_foreign_keys = ON"))?;

    let mut invoice = Invoice::new(1, 100);
    invoice.custid = Some(999);
    session.add(&mut invoice)?;
    assert!(matches!(session.commit(), Err(StoreError::Sqlite(_))));
    assert!(!session.is_active());
    assert!(!engine.in_transaction());
    drop(session);

    let mut session = engine.session();
    assert_eq!(session.count::<Invoice>(&Query::new())?, 0);
    session.add(&mut Customer::new("after"))?;
    session.commit()?;
    assert_eq!(engine.count("customers", &Query::new())?, 1);
    Ok(())
}

#[test]
fn test_second_session_joins_open_transaction() {
    test_second_session_joins_impl().unwrap();
}

fn test_second_session_joins_impl() -> Result<()> {
    let (engine, _dir) = create_sales_db()?;
    let mut outer = engine.session();
    outer.add(&mut Customer::new("outer"))?;

    let mut inner = engine.session();
    inner.add(&mut Customer::new("inner"))?;
    assert!(!inner.is_active());
    // only the session that began the transaction ends it
    inner.commit()?;
    assert!(engine.in_transaction());
    drop(inner);
    assert!(engine.in_transaction());

    outer.commit()?;
    assert!(!engine.in_transaction());
    assert_eq!(engine.count("customers", &Query::new())?, 2);
    Ok(())
}
