//! Commonly used items.
//!
//! ```ignore
//! use garasu::prelude::*;
//! ```

pub use crate::config::{App, Configurator, Stage, Startup, UnitOfWork};
pub use garasu_core::{
    Column, ColumnDefault, Entity, Error, ReferentialAction, Result, Row, SqlExpr, SqlType, Value,
};
pub use garasu_model::{
    Attr, Followers, Related, RelatedMany, RelationLoader, Serializable, SerializeContext, Slug,
    SurrogatePk, render_json, serialize, slugify,
};
pub use garasu_session::{Session, Settings, TransactionManager};
