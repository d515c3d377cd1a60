//! Engines, sessions and the unit-of-work lifecycle for garasu.
//!
//! `garasu-session` is the **runtime layer** of the workspace:
//!
//! - [`Engine`] is the storage seam, with transactions; [`MemoryEngine`] is
//!   the in-process implementation selected by `memory://` URLs.
//! - [`Session`] is the unit of work: identity map, change tracking, an
//!   atomic [`flush`](Session::flush) into its engine transaction, and
//!   commit/rollback of that transaction.
//! - [`TransactionManager`] coordinates commit and abort for one unit of work
//!   and retries it on transient storage failures.
//! - [`build_session_factory`], [`bind_schema`] and
//!   [`get_unit_of_work_session`] tie the three together at startup and per
//!   request.
//!
//! Applications normally reach this crate through the `garasu` facade.

pub mod engine;
pub mod lifecycle;
pub mod memory;
pub mod session;
pub mod settings;
pub mod transaction;

pub use engine::{Batch, Engine, MEMORY_SCHEME, Op, TxId, engine_from_config};
pub use lifecycle::{
    BindOptions, BindReport, bind_schema, build_session_factory, get_unit_of_work_session,
    session_config,
};
pub use memory::MemoryEngine;
pub use session::{
    FactoryId, ObjectKey, ObjectState, Session, SessionConfig, SessionDebugInfo, SessionFactory,
};
pub use settings::{DEFAULT_DATABASE_URL, DEFAULT_RETRY_ATTEMPTS, Settings, asbool};
pub use transaction::{Participant, TransactionManager, TransactionStatus};
