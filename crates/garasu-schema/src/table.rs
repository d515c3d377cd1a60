//! Table and constraint definitions.

use garasu_core::{Column, ReferentialAction};

/// A multi-column foreign key constraint.
///
/// `columns[i]` on the owning table references `referred_columns[i]` on
/// `referred_table`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKeyConstraint {
    /// Explicit constraint name.
    pub name: Option<String>,
    /// Local columns, in order.
    pub columns: Vec<String>,
    /// Referenced table.
    pub referred_table: String,
    /// Referenced columns, in the same order as `columns`.
    pub referred_columns: Vec<String>,
    /// ON DELETE action.
    pub on_delete: ReferentialAction,
}

impl ForeignKeyConstraint {
    /// Create a constraint with no explicit name and `NO ACTION` on delete.
    pub fn new(
        columns: Vec<String>,
        referred_table: impl Into<String>,
        referred_columns: Vec<String>,
    ) -> Self {
        Self {
            name: None,
            columns,
            referred_table: referred_table.into(),
            referred_columns,
            on_delete: ReferentialAction::NoAction,
        }
    }

    /// Name used in DDL: the explicit name, or `fk_<table>_<columns>`.
    pub fn effective_name(&self, table: &str) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| format!("fk_{}_{}", table, self.columns.join("_")))
    }
}

/// A table definition.
#[derive(Debug, Clone)]
pub struct Table {
    /// Table name.
    pub name: String,
    /// Columns in declaration order.
    pub columns: Vec<Column>,
    /// Foreign key constraints.
    pub foreign_keys: Vec<ForeignKeyConstraint>,
}

impl Table {
    pub fn new(name: impl Into<String>, columns: Vec<Column>) -> Self {
        Self {
            name: name.into(),
            columns,
            foreign_keys: Vec::new(),
        }
    }

    /// Look up a column by name.
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    /// Append a column. Returns `false` (and leaves the table unchanged) if a
    /// column with that name already exists.
    pub fn append_column(&mut self, column: Column) -> bool {
        if self.has_column(&column.name) {
            return false;
        }
        self.columns.push(column);
        true
    }

    /// Append a foreign key constraint. Returns `false` if an identical
    /// constraint is already present.
    pub fn append_foreign_key(&mut self, fk: ForeignKeyConstraint) -> bool {
        if self.foreign_keys.contains(&fk) {
            return false;
        }
        self.foreign_keys.push(fk);
        true
    }

    /// Primary key columns in declaration order.
    pub fn primary_key(&self) -> Vec<&Column> {
        self.columns.iter().filter(|c| c.primary_key).collect()
    }

    /// Primary key column names in declaration order.
    pub fn primary_key_names(&self) -> Vec<String> {
        self.primary_key().iter().map(|c| c.name.clone()).collect()
    }

    /// Names of the tables this table references (excluding itself).
    pub fn referenced_tables(&self) -> Vec<&str> {
        let mut out: Vec<&str> = Vec::new();
        for fk in &self.foreign_keys {
            let t = fk.referred_table.as_str();
            if t != self.name && !out.contains(&t) {
                out.push(t);
            }
        }
        out
    }
}
