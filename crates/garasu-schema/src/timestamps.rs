//! Automatic `created` / `modified` columns.
//!
//! The injector listens for tables attached to one target registry and
//! appends two non-null datetime columns whose defaults are
//! [`SqlExpr::UtcNow`], an expression the engine evaluates (so concurrent
//! writers share the database clock). `modified` also re-evaluates it on
//! every update. Entities that must not get these columns belong in a
//! different registry.

use std::sync::Arc;

use garasu_core::{Column, ColumnDefault, SqlExpr, SqlType};

use crate::events::{RegistryId, TableListener};
use crate::registry::SchemaRegistry;
use crate::table::Table;

/// Column set once, when the row is inserted.
pub const CREATED_COLUMN: &str = "created";
/// Column reset on every update.
pub const MODIFIED_COLUMN: &str = "modified";

/// The `created` column definition.
pub fn created_column() -> Column {
    utc_datetime_column(CREATED_COLUMN)
}

/// The `modified` column definition.
pub fn modified_column() -> Column {
    utc_datetime_column(MODIFIED_COLUMN).onupdate(ColumnDefault::Expr(SqlExpr::UtcNow))
}

fn utc_datetime_column(name: &str) -> Column {
    Column::new(name, SqlType::DateTime)
        .nullable(false)
        .server_default(SqlExpr::CurrentTimestamp)
        .default(ColumnDefault::Expr(SqlExpr::UtcNow))
}

/// Appends the timestamp pair to tables of one registry.
#[derive(Debug, Clone, Copy)]
pub struct TimestampInjector {
    target: RegistryId,
}

impl TimestampInjector {
    /// Injector for tables attached to `target` only.
    pub fn new(target: RegistryId) -> Self {
        Self { target }
    }

    /// Create an injector for `registry` and register it on the registry's
    /// event hub. Tables attached afterwards receive the timestamp columns;
    /// tables already attached are left as they are.
    pub fn install(registry: &SchemaRegistry) -> Arc<Self> {
        let injector = Arc::new(Self::new(registry.id()));
        registry.events().listen(injector.clone());
        tracing::debug!(registry = %registry.id(), "Timestamp injector installed");
        injector
    }

    pub fn target(&self) -> RegistryId {
        self.target
    }
}

impl TableListener for TimestampInjector {
    fn after_attach(&self, registry: RegistryId, table: &mut Table) {
        if registry != self.target {
            return;
        }
        let created = table.append_column(created_column());
        let modified = table.append_column(modified_column());
        tracing::trace!(table = %table.name, created, modified, "Timestamp columns injected");
    }
}
