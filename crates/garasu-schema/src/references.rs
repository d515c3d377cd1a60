//! Deferred foreign-key resolution.
//!
//! Entities may reference each other in any declaration order, including
//! mutually. Instead of resolving a reference when it is declared (which
//! fails on forward references), every `(local, remote)` pair is recorded
//! here and resolved in one pass once all entities are known.
//!
//! For a pair `(Order, Customer)` where `customer` has primary key `id`,
//! resolution adds the column `customer_id` to `order` and one foreign key
//! constraint `(customer_id) -> customer(id)`. Composite primary keys produce
//! one column per key column and a single composite constraint.

use garasu_core::{Column, Error, Result, reference_column_name};

use crate::registry::SchemaRegistry;
use crate::table::ForeignKeyConstraint;

/// A reference recorded before schema finalization.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PendingReference {
    /// Entity that will hold the foreign key columns.
    pub local: String,
    /// Entity being referenced.
    pub remote: String,
}

/// What one resolution pass produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolveReport {
    /// Pairs consumed.
    pub resolved: usize,
    /// `(table, column)` for every column added.
    pub columns_added: Vec<(String, String)>,
    /// Constraints added.
    pub constraints_added: usize,
}

/// Accumulates pending references until the schema is finalized.
///
/// Mutation is expected only during the single-threaded configuration
/// phase; the registry takes `&mut self` and does no locking.
#[derive(Debug, Default)]
pub struct ReferenceRegistry {
    pending: Vec<PendingReference>,
}

impl ReferenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `local` references `remote`. Neither entity needs to be
    /// registered yet. Declaring the same pair twice keeps one entry.
    pub fn declare(&mut self, local: impl Into<String>, remote: impl Into<String>) {
        let reference = PendingReference {
            local: local.into(),
            remote: remote.into(),
        };
        if !self.pending.contains(&reference) {
            tracing::debug!(local = %reference.local, remote = %reference.remote, "Reference declared");
            self.pending.push(reference);
        }
    }

    /// Pending pairs, in declaration order.
    pub fn pending(&self) -> &[PendingReference] {
        &self.pending
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Clear without resolving (used to reset between test cases).
    pub fn clear(&mut self) {
        self.pending.clear();
    }

    /// Resolve every pending pair against `schema` and clear the pending set.
    ///
    /// Must run after all participating entities are registered. The pending
    /// set is cleared even when resolution fails, so a failed pass is never
    /// replayed. Running again with nothing pending changes nothing, and
    /// columns or constraints that already exist are not added twice.
    ///
    /// # Errors
    ///
    /// [`Error::Configuration`] if either entity of a pair was never
    /// registered, if the remote table has no primary key, or if `schema`
    /// is already frozen.
    #[tracing::instrument(level = "debug", skip_all, fields(pending = self.pending.len()))]
    pub fn resolve_all(&mut self, schema: &mut SchemaRegistry) -> Result<ResolveReport> {
        let pending = std::mem::take(&mut self.pending);
        let mut report = ResolveReport::default();

        if pending.is_empty() {
            return Ok(report);
        }
        if schema.is_frozen() {
            return Err(Error::config(format!(
                "cannot resolve {} pending reference(s): {} is frozen",
                pending.len(),
                schema.id()
            )));
        }

        for reference in &pending {
            resolve_one(schema, reference, &mut report)?;
            report.resolved += 1;
        }

        tracing::info!(
            resolved = report.resolved,
            columns = report.columns_added.len(),
            constraints = report.constraints_added,
            "References resolved"
        );
        Ok(report)
    }
}

fn resolve_one(
    schema: &mut SchemaRegistry,
    reference: &PendingReference,
    report: &mut ResolveReport,
) -> Result<()> {
    let remote = schema.table_for_entity(&reference.remote).ok_or_else(|| {
        Error::config(format!(
            "'{}' references undeclared entity '{}'",
            reference.local, reference.remote
        ))
    })?;
    let remote_table = remote.name.clone();
    let remote_pk: Vec<Column> = remote.primary_key().into_iter().cloned().collect();
    if remote_pk.is_empty() {
        return Err(Error::config(format!(
            "'{}' references '{}', but table '{}' has no primary key",
            reference.local, reference.remote, remote_table
        )));
    }

    let local_table = schema
        .entity_table_name(&reference.local)
        .ok_or_else(|| {
            Error::config(format!(
                "reference from undeclared entity '{}' to '{}'",
                reference.local, reference.remote
            ))
        })?
        .to_string();
    let local = schema.table_mut(&local_table)?;

    let mut local_columns = Vec::with_capacity(remote_pk.len());
    let mut remote_columns = Vec::with_capacity(remote_pk.len());
    for pk in &remote_pk {
        let name = reference_column_name(&remote_table, &pk.name);
        if local.append_column(Column::new(name.clone(), pk.sql_type)) {
            tracing::trace!(table = %local_table, column = %name, "Foreign key column added");
            report.columns_added.push((local_table.clone(), name.clone()));
        }
        local_columns.push(name);
        remote_columns.push(pk.name.clone());
    }

    if local.append_foreign_key(ForeignKeyConstraint::new(
        local_columns,
        remote_table,
        remote_columns,
    )) {
        report.constraints_added += 1;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::Table;
    use garasu_core::SqlType;

    fn schema_with(tables: &[(&str, Table)]) -> SchemaRegistry {
        let mut schema = SchemaRegistry::new();
        for (entity, table) in tables {
            schema.register_entity_table(entity, table.clone()).unwrap();
        }
        schema
    }

    fn simple(name: &str) -> Table {
        Table::new(name, vec![Column::new("id", SqlType::Char(10)).primary_key()])
    }

    #[test]
    fn test_order_references_customer() {
        let mut refs = ReferenceRegistry::new();
        // Declared before either entity exists.
        refs.declare("Order", "Customer");

        let mut schema = schema_with(&[("Order", simple("order")), ("Customer", simple("customer"))]);
        let report = refs.resolve_all(&mut schema).unwrap();

        let order = schema.table("order").unwrap();
        let col = order.column("customer_id").unwrap();
        assert_eq!(col.sql_type, SqlType::Char(10));
        assert!(col.nullable);
        assert_eq!(order.foreign_keys.len(), 1);
        let fk = &order.foreign_keys[0];
        assert_eq!(fk.columns, vec!["customer_id"]);
        assert_eq!(fk.referred_table, "customer");
        assert_eq!(fk.referred_columns, vec!["id"]);

        assert_eq!(report.resolved, 1);
        assert_eq!(report.constraints_added, 1);
        assert!(refs.is_empty());
    }

    #[test]
    fn test_composite_primary_key_gives_one_constraint() {
        let region = Table::new(
            "region",
            vec![
                Column::new("country", SqlType::Char(2)).primary_key(),
                Column::new("code", SqlType::Integer).primary_key(),
                Column::new("label", SqlType::Text),
            ],
        );
        let mut schema = schema_with(&[("Store", simple("store")), ("Region", region)]);
        let mut refs = ReferenceRegistry::new();
        refs.declare("Store", "Region");
        refs.resolve_all(&mut schema).unwrap();

        let store = schema.table("store").unwrap();
        assert!(store.has_column("region_country"));
        assert!(store.has_column("region_code"));
        assert!(!store.has_column("region_label"));
        assert_eq!(store.foreign_keys.len(), 1);
        assert_eq!(
            store.foreign_keys[0].columns,
            vec!["region_country", "region_code"]
        );
        assert_eq!(store.foreign_keys[0].referred_columns, vec!["country", "code"]);
    }

    #[test]
    fn test_resolve_twice_is_idempotent() {
        let mut schema = schema_with(&[("Order", simple("order")), ("Customer", simple("customer"))]);
        let mut refs = ReferenceRegistry::new();
        refs.declare("Order", "Customer");
        refs.resolve_all(&mut schema).unwrap();
        let columns_before = schema.table("order").unwrap().columns.len();

        let second = refs.resolve_all(&mut schema).unwrap();
        assert_eq!(second, ResolveReport::default());

        // Re-declaring the same pair must not duplicate anything either.
        refs.declare("Order", "Customer");
        let third = refs.resolve_all(&mut schema).unwrap();
        assert!(third.columns_added.is_empty());
        assert_eq!(third.constraints_added, 0);

        let order = schema.table("order").unwrap();
        assert_eq!(order.columns.len(), columns_before);
        assert_eq!(order.foreign_keys.len(), 1);
    }

    #[test]
    fn test_mutual_references() {
        let mut refs = ReferenceRegistry::new();
        refs.declare("Employee", "Department");
        refs.declare("Department", "Employee");
        let mut schema = schema_with(&[
            ("Employee", simple("employee")),
            ("Department", simple("department")),
        ]);
        refs.resolve_all(&mut schema).unwrap();

        assert!(schema.table("employee").unwrap().has_column("department_id"));
        assert!(schema.table("department").unwrap().has_column("employee_id"));
    }

    #[test]
    fn test_undeclared_remote_is_configuration_error() {
        let mut schema = schema_with(&[("Order", simple("order"))]);
        let mut refs = ReferenceRegistry::new();
        refs.declare("Order", "Customer");
        let err = refs.resolve_all(&mut schema).unwrap_err();
        assert!(err.is_configuration());
        assert!(err.to_string().contains("Customer"));
        // The failed pass is not kept around for replay.
        assert!(refs.is_empty());
    }

    #[test]
    fn test_undeclared_local_is_configuration_error() {
        let mut schema = schema_with(&[("Customer", simple("customer"))]);
        let mut refs = ReferenceRegistry::new();
        refs.declare("Order", "Customer");
        assert!(refs.resolve_all(&mut schema).unwrap_err().is_configuration());
    }

    #[test]
    fn test_frozen_schema_rejects_resolution() {
        let mut schema = schema_with(&[("Order", simple("order")), ("Customer", simple("customer"))]);
        schema.freeze();
        let mut refs = ReferenceRegistry::new();
        refs.declare("Order", "Customer");
        assert!(refs.resolve_all(&mut schema).unwrap_err().is_configuration());
    }

    #[test]
    fn test_declare_deduplicates() {
        let mut refs = ReferenceRegistry::new();
        refs.declare("Order", "Customer");
        refs.declare("Order", "Customer");
        refs.declare("Order", "Product");
        assert_eq!(refs.pending().len(), 2);
        refs.clear();
        assert!(refs.is_empty());
    }
}
