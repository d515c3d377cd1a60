//! In-process engine.
//!
//! Rows live in memory, per table, in insertion order. A transaction works
//! on its own copy of the store taken at [`Engine::begin`]. Every batch is
//! applied to a copy of that view and kept only when all operations and the
//! foreign key check at the end succeed, so a failed batch leaves no trace.
//! Commit replays the transaction's resolved operations on the committed
//! store, checks foreign keys again and swaps the result in. The engine
//! enforces primary key, `UNIQUE`, `NOT NULL` and
//! foreign key constraints and reports violations as
//! [`Error::Integrity`].

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use chrono::Utc;
use garasu_core::{
    ColumnDefault, Dialect, Error, ReferentialAction, Result, Row, SqlExpr, Value,
};
use garasu_schema::{Table, ddl};
use parking_lot::{Mutex, RwLock};

use crate::engine::{Batch, Engine, MEMORY_SCHEME, Op, TxId};

#[derive(Debug, Clone)]
struct StoredTable {
    def: Table,
    rows: Vec<Row>,
}

impl StoredTable {
    fn position(&self, key: &[Value]) -> Option<usize> {
        let pk = self.def.primary_key_names();
        self.rows.iter().position(|row| matches_key(row, &pk, key))
    }
}

fn matches_key(row: &Row, columns: &[String], key: &[Value]) -> bool {
    columns.len() == key.len()
        && columns
            .iter()
            .zip(key)
            .all(|(c, v)| row.get(c).unwrap_or(&Value::Null) == v)
}

type Store = BTreeMap<String, StoredTable>;

#[derive(Debug)]
struct OpenTransaction {
    /// Committed store as of `begin`, with this transaction's work applied.
    view: Store,
    /// Operations to replay on the committed store, with every default and
    /// `onupdate` value already evaluated.
    log: Vec<Op>,
}

/// Engine keeping every table in process memory.
#[derive(Debug)]
pub struct MemoryEngine {
    url: String,
    dialect: Dialect,
    tables: RwLock<Store>,
    transactions: Mutex<HashMap<TxId, OpenTransaction>>,
    next_tx: AtomicU64,
    injected_failures: AtomicUsize,
}

impl Default for MemoryEngine {
    fn default() -> Self {
        Self::new(Dialect::Generic)
    }
}

impl MemoryEngine {
    pub fn new(dialect: Dialect) -> Self {
        let url = match dialect {
            Dialect::Generic => MEMORY_SCHEME.to_string(),
            other => format!("{MEMORY_SCHEME}{}", other.name()),
        };
        Self::with_url(url, dialect)
    }

    pub(crate) fn with_url(url: impl Into<String>, dialect: Dialect) -> Self {
        Self {
            url: url.into(),
            dialect,
            tables: RwLock::new(BTreeMap::new()),
            transactions: Mutex::new(HashMap::new()),
            next_tx: AtomicU64::new(1),
            injected_failures: AtomicUsize::new(0),
        }
    }

    /// Make the next `count` calls to [`Engine::apply_in`] fail with
    /// [`Error::TransientStorage`] without touching the store.
    pub fn inject_transient_failures(&self, count: usize) {
        self.injected_failures.store(count, Ordering::SeqCst);
    }

    /// Number of transactions begun and not yet committed or rolled back.
    pub fn open_transaction_count(&self) -> usize {
        self.transactions.lock().len()
    }

    /// Number of committed rows in `table`.
    pub fn row_count(&self, table: &str) -> usize {
        self.tables.read().get(table).map_or(0, |t| t.rows.len())
    }

    /// Names of the existing tables.
    pub fn table_names(&self) -> Vec<String> {
        self.tables.read().keys().cloned().collect()
    }

    fn take_injected_failure(&self) -> bool {
        self.injected_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    /// Run `batch` against `store`. Returns the stored rows of inserts and
    /// updates and the operations that reproduce the batch without
    /// evaluating anything again.
    fn run_batch(&self, store: &mut Store, batch: &Batch) -> Result<(Vec<Row>, Vec<Op>)> {
        let mut stored = Vec::new();
        let mut resolved = Vec::with_capacity(batch.len());
        for op in batch.ops() {
            match op {
                Op::Insert { table, row } => {
                    let full = self.insert(store, table, row)?;
                    resolved.push(Op::Insert {
                        table: table.clone(),
                        row: full.clone(),
                    });
                    stored.push(full);
                }
                Op::Update {
                    table,
                    key,
                    changes,
                } => {
                    let updated = self.update(store, table, key, changes)?;
                    resolved.push(Op::Update {
                        table: table.clone(),
                        key: key.clone(),
                        changes: settled_changes(store, table, changes, &updated),
                    });
                    stored.push(updated);
                }
                Op::Delete { table, key } => {
                    self.delete(store, table, key)?;
                    resolved.push(op.clone());
                }
            }
        }
        check_foreign_keys(store)?;
        Ok((stored, resolved))
    }

    /// Run `read` against the view of `tx`, or the committed store.
    fn read<T>(&self, tx: Option<TxId>, read: impl FnOnce(&Store) -> Result<T>) -> Result<T> {
        match tx {
            Some(tx) => {
                let transactions = self.transactions.lock();
                let open = transactions.get(&tx).ok_or_else(|| unknown_transaction(tx))?;
                read(&open.view)
            }
            None => read(&self.tables.read()),
        }
    }

    fn evaluate(&self, expr: &SqlExpr, table: &str, column: &str) -> Result<Value> {
        match expr {
            SqlExpr::UtcNow | SqlExpr::CurrentTimestamp => {
                Ok(Value::Timestamp(Utc::now().naive_utc()))
            }
            SqlExpr::Raw(sql) => Err(Error::Storage(format!(
                "cannot evaluate expression '{sql}' for {table}.{column} in memory"
            ))),
        }
    }

    fn insert(&self, store: &mut Store, table: &str, row: &Row) -> Result<Row> {
        let stored = stored_table(store, table)?;
        let mut full = Row::new();
        for column in &stored.def.columns {
            let provided = row.get(&column.name).filter(|v| !v.is_null()).cloned();
            let value = match (provided, &column.default, &column.server_default) {
                (Some(v), _, _) => v,
                (None, Some(ColumnDefault::Expr(expr)), _) => {
                    self.evaluate(expr, table, &column.name)?
                }
                (None, Some(default), _) if default.is_client_side() => {
                    default.client_value().unwrap_or_default()
                }
                (None, _, Some(expr)) => self.evaluate(expr, table, &column.name)?,
                (None, _, None) => Value::Null,
            };
            full.set(column.name.clone(), value);
        }
        check_row(stored, &full, None)?;

        let provided: Vec<&str> = row.columns().collect();
        tracing::trace!(sql = %ddl::insert_sql(&stored.def, &provided, self.dialect), "insert");
        stored.rows.push(full.clone());
        Ok(full)
    }

    fn update(&self, store: &mut Store, table: &str, key: &[Value], changes: &Row) -> Result<Row> {
        let stored = stored_table(store, table)?;
        let idx = stored.position(key).ok_or_else(|| {
            Error::Storage(format!("update of missing row {key:?} in '{table}'"))
        })?;

        let mut updated = stored.rows[idx].clone();
        for (column, value) in changes.iter() {
            if stored.def.column(column).is_none() {
                return Err(Error::Storage(format!("no such column: {table}.{column}")));
            }
            updated.set(column, value.clone());
        }
        for column in &stored.def.columns {
            if changes.contains(&column.name) {
                continue;
            }
            if let Some(ColumnDefault::Expr(expr)) = &column.onupdate {
                updated.set(column.name.clone(), self.evaluate(expr, table, &column.name)?);
            }
        }
        check_row(stored, &updated, Some(idx))?;

        let changed: Vec<&str> = changes.columns().collect();
        tracing::trace!(sql = %ddl::update_sql(&stored.def, &changed, self.dialect), "update");
        stored.rows[idx] = updated.clone();
        Ok(updated)
    }

    fn delete(&self, store: &mut Store, table: &str, key: &[Value]) -> Result<()> {
        let stored = stored_table(store, table)?;
        tracing::trace!(sql = %ddl::delete_sql(&stored.def, self.dialect), "delete");
        let Some(idx) = stored.position(key) else {
            return Ok(());
        };
        let removed = stored.rows.remove(idx);
        cascade_delete(store, table, removed);
        Ok(())
    }
}

fn unknown_transaction(tx: TxId) -> Error {
    Error::Storage(format!("no open transaction {tx}"))
}

/// `changes` plus the `onupdate` columns the update evaluated.
fn settled_changes(store: &Store, table: &str, changes: &Row, updated: &Row) -> Row {
    let mut settled = changes.clone();
    let Some(stored) = store.get(table) else {
        return settled;
    };
    for column in &stored.def.columns {
        if column.onupdate.is_none() || changes.contains(&column.name) {
            continue;
        }
        if let Some(value) = updated.get(&column.name) {
            settled.set(column.name.clone(), value.clone());
        }
    }
    settled
}

fn find_row(store: &Store, table: &str, key: &[Value]) -> Result<Option<Row>> {
    let stored = store
        .get(table)
        .ok_or_else(|| Error::Storage(format!("no such table: {table}")))?;
    Ok(stored.position(key).map(|idx| stored.rows[idx].clone()))
}

fn select_rows(store: &Store, table: &str, column: &str, value: &Value) -> Result<Vec<Row>> {
    let stored = store
        .get(table)
        .ok_or_else(|| Error::Storage(format!("no such table: {table}")))?;
    if stored.def.column(column).is_none() {
        return Err(Error::Storage(format!("no such column: {table}.{column}")));
    }
    Ok(stored
        .rows
        .iter()
        .filter(|r| r.get(column) == Some(value))
        .cloned()
        .collect())
}

fn stored_table<'a>(store: &'a mut Store, table: &str) -> Result<&'a mut StoredTable> {
    store
        .get_mut(table)
        .ok_or_else(|| Error::Storage(format!("no such table: {table}")))
}

/// Primary key, `NOT NULL` and `UNIQUE` checks of `row` against the other
/// rows of `stored`. `skip` is the row's own index when updating.
fn check_row(stored: &StoredTable, row: &Row, skip: Option<usize>) -> Result<()> {
    let table = &stored.def.name;
    for column in &stored.def.columns {
        if !column.nullable && row.get(&column.name).is_none_or(Value::is_null) {
            return Err(Error::integrity(
                table,
                format!("NOT NULL constraint failed: {table}.{}", column.name),
            ));
        }
    }

    let others = stored
        .rows
        .iter()
        .enumerate()
        .filter(|(i, _)| Some(*i) != skip)
        .map(|(_, r)| r);

    let pk = stored.def.primary_key_names();
    let key: Vec<Value> = pk
        .iter()
        .map(|c| row.get(c).cloned().unwrap_or_default())
        .collect();
    let unique: Vec<&str> = stored
        .def
        .columns
        .iter()
        .filter(|c| c.unique && !c.primary_key)
        .map(|c| c.name.as_str())
        .collect();

    for other in others {
        if !pk.is_empty() && matches_key(other, &pk, &key) {
            return Err(Error::integrity(
                table,
                format!("UNIQUE constraint failed: {table}.{}", pk.join(", ")),
            ));
        }
        for column in &unique {
            let value = row.get(column).unwrap_or(&Value::Null);
            if !value.is_null() && other.get(column) == Some(value) {
                return Err(Error::integrity(
                    table,
                    format!("UNIQUE constraint failed: {table}.{column}"),
                ));
            }
        }
    }
    Ok(())
}

/// Apply `ON DELETE` actions of foreign keys pointing at `removed`.
fn cascade_delete(store: &mut Store, table: &str, removed: Row) {
    let mut pending: Vec<(String, Row)> = vec![(table.to_string(), removed)];

    while let Some((parent, parent_row)) = pending.pop() {
        for child in store.values_mut() {
            for fk in &child.def.foreign_keys {
                if fk.referred_table != parent {
                    continue;
                }
                let target: Vec<Value> = fk
                    .referred_columns
                    .iter()
                    .map(|c| parent_row.get(c).cloned().unwrap_or_default())
                    .collect();
                match fk.on_delete {
                    ReferentialAction::Cascade => {
                        let (gone, kept): (Vec<Row>, Vec<Row>) = child
                            .rows
                            .drain(..)
                            .partition(|r| matches_key(r, &fk.columns, &target));
                        child.rows = kept;
                        for row in gone {
                            pending.push((child.def.name.clone(), row));
                        }
                    }
                    ReferentialAction::SetNull => {
                        for row in &mut child.rows {
                            if matches_key(row, &fk.columns, &target) {
                                for column in &fk.columns {
                                    row.set(column.clone(), Value::Null);
                                }
                            }
                        }
                    }
                    _ => {}
                }
            }
        }
    }
}

/// Every non-null foreign key value must match a row of the referred table.
fn check_foreign_keys(store: &Store) -> Result<()> {
    for stored in store.values() {
        for fk in &stored.def.foreign_keys {
            let name = fk.effective_name(&stored.def.name);
            for row in &stored.rows {
                let values: Vec<Value> = fk
                    .columns
                    .iter()
                    .map(|c| row.get(c).cloned().unwrap_or_default())
                    .collect();
                if values.iter().any(Value::is_null) {
                    continue;
                }
                let found = store.get(&fk.referred_table).is_some_and(|referred| {
                    referred
                        .rows
                        .iter()
                        .any(|r| matches_key(r, &fk.referred_columns, &values))
                });
                if !found {
                    return Err(Error::integrity(
                        &stored.def.name,
                        format!("FOREIGN KEY constraint failed: {name}"),
                    ));
                }
            }
        }
    }
    Ok(())
}

impl Engine for MemoryEngine {
    fn dialect(&self) -> Dialect {
        self.dialect
    }

    fn url(&self) -> &str {
        &self.url
    }

    fn create_table(&self, table: &Table) -> Result<bool> {
        let mut tables = self.tables.write();
        if tables.contains_key(&table.name) {
            return Ok(false);
        }
        tracing::debug!(sql = %ddl::create_table_sql(table, self.dialect), "Creating table");
        tables.insert(
            table.name.clone(),
            StoredTable {
                def: table.clone(),
                rows: Vec::new(),
            },
        );
        Ok(true)
    }

    fn drop_table(&self, name: &str) -> Result<bool> {
        tracing::debug!(sql = %ddl::drop_table_sql(name, self.dialect), "Dropping table");
        Ok(self.tables.write().remove(name).is_some())
    }

    fn has_table(&self, name: &str) -> bool {
        self.tables.read().contains_key(name)
    }

    fn begin(&self) -> Result<TxId> {
        let view = self.tables.read().clone();
        let tx = TxId::new(self.next_tx.fetch_add(1, Ordering::Relaxed));
        self.transactions.lock().insert(
            tx,
            OpenTransaction {
                view,
                log: Vec::new(),
            },
        );
        tracing::debug!(%tx, "Transaction started");
        Ok(tx)
    }

    #[tracing::instrument(level = "debug", skip_all, fields(tx = %tx, ops = batch.len()))]
    fn apply_in(&self, tx: TxId, batch: &Batch) -> Result<Vec<Row>> {
        if self.take_injected_failure() {
            tracing::debug!("Injected transient failure");
            return Err(Error::TransientStorage(
                "connection reset by peer (injected)".to_string(),
            ));
        }

        let mut transactions = self.transactions.lock();
        let open = transactions
            .get_mut(&tx)
            .ok_or_else(|| unknown_transaction(tx))?;
        let mut work = open.view.clone();
        let (stored, resolved) = self.run_batch(&mut work, batch)?;
        open.view = work;
        open.log.extend(resolved);
        Ok(stored)
    }

    #[tracing::instrument(level = "debug", skip(self))]
    fn commit(&self, tx: TxId) -> Result<()> {
        let open = self
            .transactions
            .lock()
            .remove(&tx)
            .ok_or_else(|| unknown_transaction(tx))?;
        if open.log.is_empty() {
            return Ok(());
        }

        let mut tables = self.tables.write();
        let mut work = tables.clone();
        self.run_batch(&mut work, &Batch::from(open.log))?;
        *tables = work;
        tracing::debug!("Transaction committed");
        Ok(())
    }

    #[tracing::instrument(level = "debug", skip(self))]
    fn rollback(&self, tx: TxId) -> Result<()> {
        let open = self
            .transactions
            .lock()
            .remove(&tx)
            .ok_or_else(|| unknown_transaction(tx))?;
        tracing::debug!(discarded = open.log.len(), "Transaction rolled back");
        Ok(())
    }

    fn fetch_in(&self, tx: Option<TxId>, table: &str, key: &[Value]) -> Result<Option<Row>> {
        self.read(tx, |store| find_row(store, table, key))
    }

    fn select_in(
        &self,
        tx: Option<TxId>,
        table: &str,
        column: &str,
        value: &Value,
    ) -> Result<Vec<Row>> {
        self.read(tx, |store| select_rows(store, table, column, value))
    }
}
