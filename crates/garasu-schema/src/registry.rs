//! The schema registry: the catalog of every table known to a process.
//!
//! A registry goes through two phases:
//!
//! 1. **Declaration** (single-threaded, `&mut self`): entities are registered,
//!    tables are attached and listeners such as the timestamp injector run.
//! 2. **Frozen**: after [`SchemaRegistry::freeze`] no table can be attached or
//!    altered. The registry is then shared read-only, typically behind an
//!    `Arc`, by session factories and engine binding.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use garasu_core::{Entity, Error, Result};

use crate::events::{RegistryId, TableEvents};
use crate::table::Table;

/// Catalog of tables and of the entities mapped onto them.
#[derive(Debug)]
pub struct SchemaRegistry {
    id: RegistryId,
    events: Arc<TableEvents>,
    tables: Vec<Table>,
    entities: BTreeMap<String, String>,
    frozen: bool,
}

impl Default for SchemaRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SchemaRegistry {
    /// Create a registry with its own, empty event hub.
    pub fn new() -> Self {
        Self::with_events(TableEvents::new())
    }

    /// Create a registry that dispatches attach events to a shared hub.
    pub fn with_events(events: Arc<TableEvents>) -> Self {
        Self {
            id: RegistryId::next(),
            events,
            tables: Vec::new(),
            entities: BTreeMap::new(),
            frozen: false,
        }
    }

    pub fn id(&self) -> RegistryId {
        self.id
    }

    pub fn events(&self) -> &Arc<TableEvents> {
        &self.events
    }

    /// Attach a table, running every attach listener on it first.
    #[tracing::instrument(level = "debug", skip(self, table), fields(registry = %self.id, table = %table.name))]
    pub fn attach(&mut self, mut table: Table) -> Result<&Table> {
        self.ensure_mutable("attach a table")?;
        if self.table(&table.name).is_some() {
            return Err(Error::config(format!(
                "table '{}' is already defined in {}",
                table.name, self.id
            )));
        }

        self.events.dispatch_attach(self.id, &mut table);

        tracing::debug!(columns = table.columns.len(), "Table attached");
        let idx = self.tables.len();
        self.tables.push(table);
        Ok(&self.tables[idx])
    }

    /// Register entity `E`: build its table from [`Entity::columns`], attach
    /// it and record `E::ENTITY_NAME` in the entity catalog.
    pub fn register_entity<E: Entity>(&mut self) -> Result<&Table> {
        self.register_entity_table(E::ENTITY_NAME, Table::new(E::TABLE_NAME, E::columns()))
    }

    /// Register an entity name against an explicit table definition.
    pub fn register_entity_table(&mut self, entity: &str, table: Table) -> Result<&Table> {
        self.ensure_mutable("register an entity")?;
        if let Some(existing) = self.entities.get(entity) {
            return Err(Error::config(format!(
                "entity '{}' is already registered (table '{}')",
                entity, existing
            )));
        }
        let table_name = table.name.clone();
        self.attach(table)?;
        self.entities.insert(entity.to_string(), table_name.clone());
        tracing::info!(entity, table = %table_name, "Entity registered");
        self.table(&table_name)
            .ok_or_else(|| Error::config(format!("table '{table_name}' vanished")))
    }

    /// Look up a table by name.
    pub fn table(&self, name: &str) -> Option<&Table> {
        self.tables.iter().find(|t| t.name == name)
    }

    pub(crate) fn table_mut(&mut self, name: &str) -> Result<&mut Table> {
        self.ensure_mutable("alter a table")?;
        self.tables
            .iter_mut()
            .find(|t| t.name == name)
            .ok_or_else(|| Error::config(format!("table '{name}' is not defined")))
    }

    /// Table name registered for an entity.
    pub fn entity_table_name(&self, entity: &str) -> Option<&str> {
        self.entities.get(entity).map(String::as_str)
    }

    /// Table registered for an entity.
    pub fn table_for_entity(&self, entity: &str) -> Option<&Table> {
        self.entity_table_name(entity).and_then(|t| self.table(t))
    }

    /// All tables in attach order.
    pub fn tables(&self) -> &[Table] {
        &self.tables
    }

    /// Registered entity names.
    pub fn entity_names(&self) -> impl Iterator<Item = &str> {
        self.entities.keys().map(String::as_str)
    }

    /// Tables ordered so that every table comes after the tables it
    /// references. Tables caught in a reference cycle keep attach order.
    pub fn sorted_tables(&self) -> Vec<&Table> {
        let mut done: HashSet<&str> = HashSet::new();
        let mut out: Vec<&Table> = Vec::with_capacity(self.tables.len());

        loop {
            let before = out.len();
            for table in &self.tables {
                if done.contains(table.name.as_str()) {
                    continue;
                }
                let ready = table
                    .referenced_tables()
                    .iter()
                    .all(|dep| done.contains(dep) || self.table(dep).is_none());
                if ready {
                    done.insert(table.name.as_str());
                    out.push(table);
                }
            }
            if out.len() == self.tables.len() {
                break;
            }
            if out.len() == before {
                let cyclic: Vec<&str> = self
                    .tables
                    .iter()
                    .filter(|t| !done.contains(t.name.as_str()))
                    .map(|t| t.name.as_str())
                    .collect();
                tracing::warn!(tables = ?cyclic, "Reference cycle between tables; keeping attach order");
                for table in &self.tables {
                    if done.insert(table.name.as_str()) {
                        out.push(table);
                    }
                }
                break;
            }
        }
        out
    }

    /// Make the registry read-only. Freezing twice is a no-op.
    pub fn freeze(&mut self) {
        if !self.frozen {
            tracing::info!(registry = %self.id, tables = self.tables.len(), "Schema registry frozen");
            self.frozen = true;
        }
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    fn ensure_mutable(&self, action: &str) -> Result<()> {
        if self.frozen {
            return Err(Error::config(format!(
                "cannot {action}: {} is frozen",
                self.id
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::ForeignKeyConstraint;
    use garasu_core::{Column, SqlType};

    fn table(name: &str) -> Table {
        Table::new(name, vec![Column::new("id", SqlType::Integer).primary_key()])
    }

    #[test]
    fn test_attach_and_lookup() {
        let mut registry = SchemaRegistry::new();
        registry.attach(table("a")).unwrap();
        assert!(registry.table("a").is_some());
        assert!(registry.table("b").is_none());
    }

    #[test]
    fn test_duplicate_table_is_configuration_error() {
        let mut registry = SchemaRegistry::new();
        registry.attach(table("a")).unwrap();
        let err = registry.attach(table("a")).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_entity_catalog() {
        let mut registry = SchemaRegistry::new();
        registry.register_entity_table("Customer", table("customer")).unwrap();
        assert_eq!(registry.entity_table_name("Customer"), Some("customer"));
        assert!(registry.table_for_entity("Customer").is_some());
        assert!(registry.table_for_entity("Order").is_none());
        assert!(
            registry
                .register_entity_table("Customer", table("customer2"))
                .unwrap_err()
                .is_configuration()
        );
    }

    #[test]
    fn test_frozen_registry_rejects_changes() {
        let mut registry = SchemaRegistry::new();
        registry.freeze();
        registry.freeze();
        assert!(registry.is_frozen());
        assert!(registry.attach(table("a")).unwrap_err().is_configuration());
        assert!(registry.table_mut("a").unwrap_err().is_configuration());
    }

    #[test]
    fn test_sorted_tables_puts_referenced_first() {
        let mut registry = SchemaRegistry::new();
        let mut order = table("order");
        order.foreign_keys.push(ForeignKeyConstraint::new(
            vec!["customer_id".into()],
            "customer",
            vec!["id".into()],
        ));
        registry.attach(order).unwrap();
        registry.attach(table("customer")).unwrap();

        let names: Vec<&str> = registry
            .sorted_tables()
            .iter()
            .map(|t| t.name.as_str())
            .collect();
        assert_eq!(names, vec!["customer", "order"]);
    }

    #[test]
    fn test_sorted_tables_tolerates_cycles() {
        let mut registry = SchemaRegistry::new();
        let mut a = table("a");
        a.foreign_keys
            .push(ForeignKeyConstraint::new(vec!["b_id".into()], "b", vec!["id".into()]));
        let mut b = table("b");
        b.foreign_keys
            .push(ForeignKeyConstraint::new(vec!["a_id".into()], "a", vec!["id".into()]));
        registry.attach(a).unwrap();
        registry.attach(b).unwrap();
        registry.attach(table("c")).unwrap();

        let names: Vec<&str> = registry
            .sorted_tables()
            .iter()
            .map(|t| t.name.as_str())
            .collect();
        assert_eq!(names, vec!["c", "a", "b"]);
    }
}
