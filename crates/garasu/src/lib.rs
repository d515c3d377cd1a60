//! garasu: entity building blocks, deferred references and unit-of-work
//! sessions for relational models.
//!
//! # Role In The Architecture
//!
//! This is the **facade crate**. It re-exports the public surface of the
//! workspace and adds the startup sequence ([`Configurator`]) and the
//! per-request accessor ([`UnitOfWork::db`]).
//!
//! - `garasu-core`: values, rows, columns, the [`Entity`] contract and
//!   [`Error`].
//! - `garasu-schema`: tables, [`ReferenceRegistry`], [`TimestampInjector`].
//! - `garasu-model`: [`SurrogatePk`], [`Slug`], [`Followers`] and the
//!   [`Serializable`] engine.
//! - `garasu-session`: engines, [`Session`] and the transaction coordinator.
//!
//! # Example
//!
//! ```ignore
//! use garasu::prelude::*;
//!
//! let mut config = Configurator::new(Settings::new().should_create_all(true));
//! config.add_entity::<Order>()?.add_entity::<Customer>()?;
//! let app = config.commit()?;
//!
//! app.run(|uow| {
//!     let customer = uow.db().add(Customer::new("Ada Lovelace"))?;
//!     uow.db().add(Order::for_customer(&customer, 42))?;
//!     Ok(())
//! })?;
//! ```

pub mod config;
pub mod prelude;

pub use config::{App, Configurator, Stage, Startup, UnitOfWork};

pub use garasu_core::{
    Column, ColumnDefault, Dialect, Entity, Error, FromValue, ReferentialAction, Result, Row,
    SqlExpr, SqlType, Value, reference_column_name,
};
pub use garasu_model::{
    Attr, Followers, GUID_LENGTH, ID_COLUMN, MAX_DEPTH, RESERVED_PREFIX, Related, RelatedMany,
    RelationLoader, SLUG_COLUMN, SLUG_MAX_LENGTH, Serializable, SerializeContext, Slug,
    SurrogatePk, as_utc, guid, guid_unique_by, render_json, serialize, slugify, utc_tz,
};
pub use garasu_schema::{
    CREATED_COLUMN, ForeignKeyConstraint, MODIFIED_COLUMN, PendingReference, ReferenceRegistry,
    ResolveReport, SchemaRegistry, Table, TimestampInjector, ddl,
};
pub use garasu_session::{
    BindOptions, BindReport, Engine, MemoryEngine, ObjectState, Participant, Session,
    SessionConfig, SessionFactory, Settings, TransactionManager, TransactionStatus, TxId,
    bind_schema, build_session_factory, engine_from_config, get_unit_of_work_session,
};
