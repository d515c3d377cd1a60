//! The entity contract.
//!
//! An entity is a Rust type mapped to one table. Instead of attaching columns
//! to a class at runtime, each entity returns an explicit list of [`Column`]s;
//! reusable building blocks ("mixins" such as a surrogate key or a slug)
//! contribute their columns by being concatenated into that list.

use crate::error::Result;
use crate::field::Column;
use crate::row::Row;
use crate::value::Value;

/// Trait implemented by every mapped entity type.
///
/// # Example
///
/// ```ignore
/// struct Customer { id: String, name: String }
///
/// impl Entity for Customer {
///     const ENTITY_NAME: &'static str = "Customer";
///     const TABLE_NAME: &'static str = "customer";
///
///     fn columns() -> Vec<Column> {
///         let mut cols = SurrogatePk::columns();
///         cols.push(Column::new("name", SqlType::Text).nullable(false));
///         cols
///     }
///
///     fn to_row(&self) -> Row {
///         Row::new().with("id", &self.id).with("name", &self.name)
///     }
///
///     fn from_row(row: &Row) -> Result<Self> {
///         Ok(Self { id: row.get_named("id")?, name: row.get_named("name")? })
///     }
/// }
/// ```
pub trait Entity: Sized + Send + Sync + 'static {
    /// Name other entities use to reference this one.
    const ENTITY_NAME: &'static str;

    /// Table this entity is stored in.
    const TABLE_NAME: &'static str;

    /// Declarative column description, primary key first by convention.
    fn columns() -> Vec<Column>;

    /// Entities this one holds a foreign key to, by [`Entity::ENTITY_NAME`].
    ///
    /// The referenced entities do not need to be declared yet; the link is
    /// resolved when the schema is finalized.
    fn references() -> &'static [&'static str] {
        &[]
    }

    /// Convert to a row. Columns left out (or NULL) receive their defaults.
    fn to_row(&self) -> Row;

    /// Build an instance from a stored row.
    fn from_row(row: &Row) -> Result<Self>;

    /// Primary key column names, in declaration order.
    fn primary_key_columns() -> Vec<String> {
        Self::columns()
            .into_iter()
            .filter(|c| c.primary_key)
            .map(|c| c.name)
            .collect()
    }

    /// Primary key value(s) of this instance.
    fn primary_key_value(&self) -> Vec<Value> {
        let row = self.to_row();
        Self::primary_key_columns()
            .iter()
            .map(|c| row.get(c).cloned().unwrap_or(Value::Null))
            .collect()
    }
}

/// Name of the local column that references `remote_column` of `remote_table`.
///
/// ```
/// assert_eq!(garasu_core::reference_column_name("customer", "id"), "customer_id");
/// ```
pub fn reference_column_name(remote_table: &str, remote_column: &str) -> String {
    format!("{remote_table}_{remote_column}")
}
