//! The storage engine seam.
//!
//! Sessions never talk to storage directly: they collect their pending work
//! into a [`Batch`] and hand it to an [`Engine`], which applies it
//! atomically inside an engine transaction. Work applied in a transaction is
//! visible to reads made through that transaction and to nobody else until
//! [`Engine::commit`]. Engines own their copy of every table definition they were
//! asked to create and evaluate engine-side defaults (such as
//! [`garasu_core::SqlExpr::UtcNow`]) themselves.

use std::fmt;
use std::sync::Arc;

use garasu_core::{Dialect, Error, Result, Row, Value};
use garasu_schema::Table;

use crate::memory::MemoryEngine;
use crate::settings::Settings;

/// URL scheme of the in-process engine.
pub const MEMORY_SCHEME: &str = "memory://";

/// One write operation.
#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    /// Insert `row`. Missing columns receive their defaults.
    Insert { table: String, row: Row },
    /// Set the columns of `changes` on the row whose primary key is `key`.
    Update {
        table: String,
        key: Vec<Value>,
        changes: Row,
    },
    /// Delete the row whose primary key is `key`.
    Delete { table: String, key: Vec<Value> },
}

impl Op {
    pub fn table(&self) -> &str {
        match self {
            Op::Insert { table, .. } | Op::Update { table, .. } | Op::Delete { table, .. } => table,
        }
    }

    pub const fn kind(&self) -> &'static str {
        match self {
            Op::Insert { .. } => "insert",
            Op::Update { .. } => "update",
            Op::Delete { .. } => "delete",
        }
    }
}

/// Operations applied all-or-nothing, in order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Batch {
    ops: Vec<Op>,
}

impl Batch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, op: Op) {
        self.ops.push(op);
    }

    pub fn ops(&self) -> &[Op] {
        &self.ops
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

impl From<Vec<Op>> for Batch {
    fn from(ops: Vec<Op>) -> Self {
        Self { ops }
    }
}

/// Handle of an open engine transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TxId(u64);

impl TxId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tx#{}", self.0)
    }
}

/// A storage backend.
///
/// Implementations must be shareable across threads: one engine serves every
/// session of the process.
pub trait Engine: Send + Sync + fmt::Debug {
    /// Dialect used to render statements for this engine.
    fn dialect(&self) -> Dialect;

    /// URL the engine was built from.
    fn url(&self) -> &str;

    /// Create `table` unless it exists. Returns whether it was created.
    fn create_table(&self, table: &Table) -> Result<bool>;

    /// Drop table `name` if it exists. Returns whether it was dropped.
    fn drop_table(&self, name: &str) -> Result<bool>;

    fn has_table(&self, name: &str) -> bool;

    /// Open a transaction.
    fn begin(&self) -> Result<TxId>;

    /// Apply `batch` atomically inside `tx`.
    ///
    /// Returns the stored row for every insert and update, in batch order,
    /// with engine-side defaults filled in. Constraint violations are
    /// [`Error::Integrity`]; nothing is applied when any operation fails and
    /// `tx` stays open with its earlier work.
    fn apply_in(&self, tx: TxId, batch: &Batch) -> Result<Vec<Row>>;

    /// Publish the work of `tx`. The transaction is closed whether or not
    /// this succeeds.
    fn commit(&self, tx: TxId) -> Result<()>;

    /// Discard the work of `tx` and close it.
    fn rollback(&self, tx: TxId) -> Result<()>;

    /// Row of `table` whose primary key equals `key`, as seen by `tx`, or
    /// the committed row when `tx` is `None`.
    fn fetch_in(&self, tx: Option<TxId>, table: &str, key: &[Value]) -> Result<Option<Row>>;

    /// Rows of `table` whose `column` equals `value`, in insertion order, as
    /// seen by `tx`.
    fn select_in(
        &self,
        tx: Option<TxId>,
        table: &str,
        column: &str,
        value: &Value,
    ) -> Result<Vec<Row>>;

    /// Apply `batch` in a transaction of its own and commit it.
    fn apply(&self, batch: &Batch) -> Result<Vec<Row>> {
        let tx = self.begin()?;
        match self.apply_in(tx, batch) {
            Ok(rows) => {
                self.commit(tx)?;
                Ok(rows)
            }
            Err(err) => {
                if let Err(rollback_err) = self.rollback(tx) {
                    tracing::warn!(
                        %tx,
                        error = %rollback_err,
                        "Rollback after failed batch also failed"
                    );
                }
                Err(err)
            }
        }
    }

    /// Committed row of `table` whose primary key equals `key`.
    fn fetch(&self, table: &str, key: &[Value]) -> Result<Option<Row>> {
        self.fetch_in(None, table, key)
    }

    /// Committed rows of `table` whose `column` equals `value`.
    fn select_by(&self, table: &str, column: &str, value: &Value) -> Result<Vec<Row>> {
        self.select_in(None, table, column, value)
    }
}

/// Build the engine named by `settings.database_url`.
///
/// `memory://` selects the in-process engine; an optional dialect name
/// after the scheme (`memory://sqlite`, `memory://postgresql`,
/// `memory://mysql`) chooses how its statements are rendered.
///
/// # Errors
///
/// [`Error::Configuration`] for any other scheme or an unknown dialect.
pub fn engine_from_config(settings: &Settings) -> Result<Arc<dyn Engine>> {
    let url = settings.database_url.trim();
    let Some(rest) = url.strip_prefix(MEMORY_SCHEME) else {
        return Err(Error::config(format!(
            "unsupported database url '{url}': only {MEMORY_SCHEME} engines are available"
        )));
    };
    let dialect_name = rest.trim_end_matches('/');
    let dialect = Dialect::from_name(dialect_name).ok_or_else(|| {
        Error::config(format!("unknown dialect '{dialect_name}' in database url '{url}'"))
    })?;

    tracing::info!(url, dialect = %dialect, "Engine created");
    Ok(Arc::new(MemoryEngine::with_url(url, dialect)))
}
