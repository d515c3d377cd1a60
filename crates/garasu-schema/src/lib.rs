//! Schema definition for garasu.
//!
//! This crate owns the process-wide catalog of tables and the two mechanisms
//! that run when the schema is finalized:
//!
//! - [`ReferenceRegistry`] collects `(local, remote)` entity references in any
//!   order and turns them into foreign key columns and constraints in a
//!   single pass.
//! - [`TimestampInjector`] adds `created` / `modified` columns to every table
//!   attached to its target registry.
//!
//! [`ddl`] renders tables and row statements for a concrete dialect.

pub mod ddl;
pub mod events;
pub mod references;
pub mod registry;
pub mod table;
pub mod timestamps;

pub use events::{RegistryId, TableEvents, TableListener};
pub use references::{PendingReference, ReferenceRegistry, ResolveReport};
pub use registry::SchemaRegistry;
pub use table::{ForeignKeyConstraint, Table};
pub use timestamps::{
    CREATED_COLUMN, MODIFIED_COLUMN, TimestampInjector, created_column, modified_column,
};
