//! Core types and traits for garasu.
//!
//! `garasu-core` is the **foundation layer** of the workspace. It defines the
//! data types every other crate exchanges and the contract implemented by
//! user entities.
//!
//! # Role In The Architecture
//!
//! - **Contract layer**: [`Entity`] is implemented by every mapped type.
//! - **Data model**: [`Row`], [`Value`], [`SqlType`] and [`Column`] describe
//!   stored data and its shape.
//! - **Dialects**: [`Dialect`] and [`SqlExpr`] keep backend-specific SQL out of
//!   column declarations.
//! - **Errors**: the single [`Error`] taxonomy used across the workspace.
//!
//! # Who Uses This Crate
//!
//! - `garasu-schema` turns entity columns into tables, resolves references and
//!   injects timestamps.
//! - `garasu-model` provides the reusable entity building blocks and the
//!   serialization engine.
//! - `garasu-session` stores and loads rows through engines inside units of
//!   work.
//!
//! Most applications should use the `garasu` facade.

pub mod dialect;
pub mod error;
pub mod field;
pub mod model;
pub mod row;
pub mod types;
pub mod value;

pub use dialect::{Dialect, quote_ident};
pub use error::{Error, Result};
pub use field::{Column, ColumnDefault, ReferentialAction, SqlExpr};
pub use model::{Entity, reference_column_name};
pub use row::{FromValue, Row};
pub use types::SqlType;
pub use value::Value;
