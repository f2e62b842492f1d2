//! Unit of work over a [`SqliteEngine`].
//!
//! A [`Session`] opens a transaction on first use and keeps it open until
//! [`Session::commit`] or [`Session::rollback`]. Writes are flushed to the
//! open transaction immediately, so later reads in the same session see
//! them. The identity map holds the last state read from or written to the
//! database for every loaded entity; [`Session::save`] compares against it
//! and only writes changed columns.

use std::collections::HashMap;

use tracing::debug;

use crate::error::{Result, StoreError};
use crate::sqlite::{
    CreateOperation, DeleteOperation, Query, QueryOperator, ReadOperation, Row, SqliteEngine,
    TableDefinition, UpdateOperation, Value,
};

/// A record type with an explicit table description and row mapping.
pub trait Entity: Sized {
    /// Table the entity is stored in
    const TABLE: &'static str;
    /// Integer primary key column
    const PRIMARY_KEY: &'static str = "id";

    fn definition() -> TableDefinition;

    fn id(&self) -> Option<i64>;

    fn set_id(&mut self, id: i64);

    /// Persisted columns, primary key excluded
    fn to_row(&self) -> Row;

    fn from_row(row: &Row) -> Result<Self>;
}

/// Many-to-one link from `Self` to `P` through a foreign key column.
pub trait BelongsTo<P: Entity>: Entity {
    const FOREIGN_KEY: &'static str;

    fn parent_id(&self) -> Option<i64>;

    fn set_parent_id(&mut self, id: i64);
}

type IdentityKey = (&'static str, i64);

pub struct Session<'e> {
    engine: &'e SqliteEngine,
    identity: HashMap<IdentityKey, Row>,
    active: bool,
}

impl<'e> Session<'e> {
    pub(crate) fn new(engine: &'e SqliteEngine) -> Self {
        Self {
            engine,
            identity: HashMap::new(),
            active: false,
        }
    }

    pub fn engine(&self) -> &'e SqliteEngine {
        self.engine
    }

    /// Whether a transaction is open
    pub fn is_active(&self) -> bool {
        self.active
    }

    fn begin(&mut self) -> Result<()> {
        if !self.active && !self.engine.in_transaction() {
            self.engine.begin()?;
            self.active = true;
        }
        Ok(())
    }

    fn remember<E: Entity>(&mut self, entity: &E) {
        if let Some(id) = entity.id() {
            self.identity.insert((E::TABLE, id), entity.to_row());
        }
    }

    /// Insert the entity and assign its id
    pub fn add<E: Entity>(&mut self, entity: &mut E) -> Result<i64> {
        self.begin()?;
        let mut op = CreateOperation::from_row(E::TABLE, entity.to_row());
        if let Some(id) = entity.id() {
            op = op.with_value(E::PRIMARY_KEY, id);
        }
        let id = self.engine.insert(&op)?;
        entity.set_id(id);
        self.remember(entity);
        Ok(id)
    }

    pub fn add_all<E: Entity>(&mut self, entities: &mut [E]) -> Result<Vec<i64>> {
        entities.iter_mut().map(|e| self.add(e)).collect()
    }

    /// Insert a parent and its children, pointing each child at the parent
    pub fn add_with_children<P, C>(&mut self, parent: &mut P, children: &mut [C]) -> Result<()>
    where
        P: Entity,
        C: BelongsTo<P>,
    {
        let parent_id = match parent.id() {
            Some(id) if self.get::<P>(id)?.is_some() => id,
            _ => self.add(parent)?,
        };
        for child in children.iter_mut() {
            child.set_parent_id(parent_id);
            self.add(child)?;
        }
        Ok(())
    }

    fn load<E: Entity>(&mut self, op: ReadOperation) -> Result<Vec<E>> {
        self.begin()?;
        let rows = self.engine.select(&op)?.fetch_all()?;
        let entities = rows
            .iter()
            .map(E::from_row)
            .collect::<Result<Vec<_>>>()?;
        for entity in &entities {
            self.remember(entity);
        }
        Ok(entities)
    }

    fn by_id<E: Entity>(id: i64) -> Query {
        Query::new().with_condition(E::PRIMARY_KEY, QueryOperator::Equal(Value::Integer(id)))
    }

    pub fn get<E: Entity>(&mut self, id: i64) -> Result<Option<E>> {
        let op = ReadOperation::new(E::TABLE).with_query(Self::by_id::<E>(id));
        Ok(self.load(op)?.into_iter().next())
    }

    /// Every row, ordered by primary key
    pub fn all<E: Entity>(&mut self) -> Result<Vec<E>> {
        self.filter(Query::new())
    }

    pub fn filter<E: Entity>(&mut self, query: Query) -> Result<Vec<E>> {
        let op = ReadOperation::new(E::TABLE)
            .with_query(query)
            .order_by(E::PRIMARY_KEY, true);
        self.load(op)
    }

    /// Lowest primary key first
    pub fn first<E: Entity>(&mut self) -> Result<Option<E>> {
        let op = ReadOperation::new(E::TABLE)
            .order_by(E::PRIMARY_KEY, true)
            .limit(1);
        Ok(self.load(op)?.into_iter().next())
    }

    pub fn count<E: Entity>(&mut self, query: &Query) -> Result<i64> {
        self.begin()?;
        self.engine.count(E::TABLE, query)
    }

    /// Whether the entity differs from the state last seen by this session.
    /// Entities the session has not loaded count as dirty.
    pub fn is_dirty<E: Entity>(&self, entity: &E) -> bool {
        match entity.id() {
            Some(id) => self.identity.get(&(E::TABLE, id)) != Some(&entity.to_row()),
            None => true,
        }
    }

    /// Write the columns that changed since the entity was loaded.
    /// Returns whether anything was written.
    pub fn save<E: Entity>(&mut self, entity: &E) -> Result<bool> {
        let id = entity.id().ok_or(StoreError::NotPersisted(E::TABLE))?;
        let snapshot = match self.identity.get(&(E::TABLE, id)) {
            Some(row) => row.clone(),
            None => self
                .get::<E>(id)?
                .ok_or(StoreError::NotFound { table: E::TABLE, id })?
                .to_row(),
        };

        let current = entity.to_row();
        let mut op = UpdateOperation::new(E::TABLE, Self::by_id::<E>(id));
        let mut changed = false;
        for (column, value) in current.iter() {
            if snapshot.get(column) != Some(value) {
                op = op.set(column, value.clone());
                changed = true;
            }
        }
        if !changed {
            return Ok(false);
        }

        self.begin()?;
        if self.engine.update(&op)? == 0 {
            return Err(StoreError::NotFound { table: E::TABLE, id });
        }
        self.identity.insert((E::TABLE, id), current);
        Ok(true)
    }

    /// Returns whether a row was removed
    pub fn delete<E: Entity>(&mut self, entity: &E) -> Result<bool> {
        let id = entity.id().ok_or(StoreError::NotPersisted(E::TABLE))?;
        self.begin()?;
        let removed = self
            .engine
            .delete(&DeleteOperation::new(E::TABLE, Self::by_id::<E>(id)))?;
        self.identity.remove(&(E::TABLE, id));
        Ok(removed > 0)
    }

    /// Overwrite the entity with its current database state
    pub fn refresh<E: Entity>(&mut self, entity: &mut E) -> Result<()> {
        let id = entity.id().ok_or(StoreError::NotPersisted(E::TABLE))?;
        *entity = self
            .get::<E>(id)?
            .ok_or(StoreError::NotFound { table: E::TABLE, id })?;
        Ok(())
    }

    /// Children of `parent`, ordered by primary key
    pub fn children<P, C>(&mut self, parent: &P) -> Result<Vec<C>>
    where
        P: Entity,
        C: BelongsTo<P>,
    {
        let id = parent.id().ok_or(StoreError::NotPersisted(P::TABLE))?;
        self.filter(Query::new().with_condition(C::FOREIGN_KEY, QueryOperator::Equal(id.into())))
    }

    pub fn parent<P, C>(&mut self, child: &C) -> Result<Option<P>>
    where
        P: Entity,
        C: BelongsTo<P>,
    {
        match child.parent_id() {
            Some(id) => self.get::<P>(id),
            None => Ok(None),
        }
    }

    /// Commit the open transaction. When COMMIT fails (a deferred constraint,
    /// for instance) the transaction is rolled back and the error returned.
    pub fn commit(&mut self) -> Result<()> {
        if !self.active {
            return Ok(());
        }
        if let Err(e) = self.engine.commit() {
            self.identity.clear();
            self.engine.abandon();
            self.active = self.engine.in_transaction();
            return Err(e);
        }
        self.active = false;
        Ok(())
    }

    /// Discard everything written since the last commit and forget loaded state
    pub fn rollback(&mut self) -> Result<()> {
        self.identity.clear();
        if !self.active {
            return Ok(());
        }
        let result = self.engine.rollback();
        self.active = self.engine.in_transaction();
        result
    }

    /// Roll back anything uncommitted and end the session
    pub fn close(mut self) -> Result<()> {
        self.rollback()
    }
}

impl Drop for Session<'_> {
    fn drop(&mut self) {
        if self.active {
            debug!("session dropped with an open transaction, rolling back");
            let _ = self.engine.rollback();
        }
    }
}
