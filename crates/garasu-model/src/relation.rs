//! Lazily loaded relations.
//!
//! A many-to-one link is held as [`Related`]: the local foreign key value(s)
//! plus a slot filled on first load. A one-to-many link is held as
//! [`RelatedMany`]: the remote column that points back and this entity's key.
//! Both load through a [`RelationLoader`], which the session implements.
//! Once loaded, a relation stays loaded for the lifetime of the value.

use std::fmt;
use std::sync::OnceLock;

use garasu_core::{Entity, Error, Result, Row, Value};

use crate::serialize::{Attr, Serializable, SerializeContext};

/// Source of rows for relation loading.
pub trait RelationLoader {
    /// Row of `table` whose primary key equals `key`.
    fn load_by_key(&self, table: &str, key: &[Value]) -> Result<Option<Row>>;

    /// Rows of `table` whose `column` equals `value`, in storage order.
    fn load_by_column(&self, table: &str, column: &str, value: &Value) -> Result<Vec<Row>>;
}

fn require_loader<'a>(
    ctx: &SerializeContext<'a>,
    table: &str,
) -> Result<&'a dyn RelationLoader> {
    ctx.loader().ok_or_else(|| {
        Error::Storage(format!(
            "relation to '{table}' is not loaded and no session is available to load it"
        ))
    })
}

/// A many-to-one relation to `T`.
pub struct Related<T> {
    key: Vec<Value>,
    slot: OnceLock<Option<T>>,
}

impl<T: Entity> Related<T> {
    /// Unloaded relation pointing at the row whose primary key is `key`.
    /// A key made only of NULLs is already loaded as "no related row".
    pub fn new(key: Vec<Value>) -> Self {
        let relation = Self {
            key,
            slot: OnceLock::new(),
        };
        if relation.key.iter().all(Value::is_null) {
            let _ = relation.slot.set(None);
        }
        relation
    }

    /// Relation whose target is already in memory.
    pub fn loaded(value: Option<T>) -> Self {
        let key = value.as_ref().map(Entity::primary_key_value).unwrap_or_default();
        Self {
            key,
            slot: OnceLock::from(value),
        }
    }

    /// Foreign key value(s) this relation points at.
    pub fn key(&self) -> &[Value] {
        &self.key
    }

    pub fn is_loaded(&self) -> bool {
        self.slot.get().is_some()
    }

    /// The related entity, if loaded and present.
    pub fn get(&self) -> Option<&T> {
        self.slot.get().and_then(Option::as_ref)
    }

    /// Load the related entity through `loader` unless already loaded.
    pub fn load(&self, loader: &dyn RelationLoader) -> Result<Option<&T>> {
        if let Some(value) = self.slot.get() {
            return Ok(value.as_ref());
        }
        let fetched = match loader.load_by_key(T::TABLE_NAME, &self.key)? {
            Some(row) => Some(T::from_row(&row)?),
            None => None,
        };
        tracing::trace!(table = T::TABLE_NAME, found = fetched.is_some(), "Relation loaded");
        Ok(self.slot.get_or_init(|| fetched).as_ref())
    }

    /// [`Related::load`] using the context's loader.
    pub fn load_in(&self, ctx: &SerializeContext<'_>) -> Result<Option<&T>> {
        if self.is_loaded() {
            return Ok(self.get());
        }
        self.load(require_loader(ctx, T::TABLE_NAME)?)
    }
}

impl<T: Entity + Serializable> Related<T> {
    /// The relation as an attribute, or `None` while unloaded.
    pub fn attr(&self) -> Option<Attr<'_>> {
        self.slot.get().map(|value| match value {
            Some(entity) => Attr::One(entity),
            None => Attr::Null,
        })
    }
}

impl<T> fmt::Debug for Related<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Related")
            .field("key", &self.key)
            .field("loaded", &self.slot.get().is_some())
            .finish()
    }
}

/// A one-to-many relation to `T`.
pub struct RelatedMany<T> {
    remote_column: &'static str,
    parent_key: Value,
    slot: OnceLock<Vec<T>>,
}

impl<T: Entity> RelatedMany<T> {
    /// Unloaded collection of `T` rows whose `remote_column` equals
    /// `parent_key`.
    pub fn new(remote_column: &'static str, parent_key: impl Into<Value>) -> Self {
        Self {
            remote_column,
            parent_key: parent_key.into(),
            slot: OnceLock::new(),
        }
    }

    /// Collection already in memory.
    pub fn loaded(remote_column: &'static str, parent_key: impl Into<Value>, items: Vec<T>) -> Self {
        Self {
            remote_column,
            parent_key: parent_key.into(),
            slot: OnceLock::from(items),
        }
    }

    pub fn remote_column(&self) -> &'static str {
        self.remote_column
    }

    pub fn is_loaded(&self) -> bool {
        self.slot.get().is_some()
    }

    pub fn get(&self) -> Option<&[T]> {
        self.slot.get().map(Vec::as_slice)
    }

    /// Load the collection through `loader` unless already loaded.
    pub fn load(&self, loader: &dyn RelationLoader) -> Result<&[T]> {
        if let Some(items) = self.slot.get() {
            return Ok(items);
        }
        let items = loader
            .load_by_column(T::TABLE_NAME, self.remote_column, &self.parent_key)?
            .iter()
            .map(T::from_row)
            .collect::<Result<Vec<_>>>()?;
        tracing::trace!(table = T::TABLE_NAME, count = items.len(), "Collection loaded");
        Ok(self.slot.get_or_init(|| items))
    }

    /// [`RelatedMany::load`] using the context's loader.
    pub fn load_in(&self, ctx: &SerializeContext<'_>) -> Result<&[T]> {
        if let Some(items) = self.get() {
            return Ok(items);
        }
        self.load(require_loader(ctx, T::TABLE_NAME)?)
    }
}

impl<T: Entity + Serializable> RelatedMany<T> {
    /// The collection as an attribute, or `None` while unloaded.
    pub fn attr(&self) -> Option<Attr<'_>> {
        self.slot
            .get()
            .map(|items| Attr::Many(items.iter().map(|i| i as &dyn Serializable).collect()))
    }
}

impl<T> fmt::Debug for RelatedMany<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelatedMany")
            .field("remote_column", &self.remote_column)
            .field("parent_key", &self.parent_key)
            .field("loaded", &self.slot.get().map(Vec::len))
            .finish()
    }
}
