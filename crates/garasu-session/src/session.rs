//! Session and unit of work.
//!
//! A [`Session`] tracks the entities one unit of work reads and writes and
//! sends the accumulated changes to its engine on [`Session::flush`].
//!
//! # Design
//!
//! - **Row snapshots**: the identity map stores rows, not entity values, so
//!   one session tracks any number of entity types. Entities are converted
//!   at the boundary with [`Entity::to_row`] / [`Entity::from_row`].
//! - **Keys known early**: client-side defaults (such as the surrogate key)
//!   are applied by [`Session::add`], so an added entity can be referenced
//!   before the first flush.
//! - **Atomic flush**: deletes, inserts and updates go to the engine as one
//!   [`Batch`], inside an engine transaction opened by the first flush. When
//!   the engine rejects it, the pending work stays queued.
//! - **Nothing published before commit**: flushed work is only visible to
//!   this session until [`Session::commit`] commits the engine transaction.
//!   [`Session::rollback`] rolls it back, so a unit of work that fails after
//!   flushing leaves storage as it was.
//! - **Shared handle**: sessions are handed out as `Arc<Session>` by the
//!   transaction coordinator, so every method takes `&self` and state lives
//!   behind a mutex. A session still belongs to one unit of work.
//!
//! # Example
//!
//! ```ignore
//! let session = factory.open();
//! let customer = session.add(Customer::new("Ada"))?;
//! session.flush()?;
//! let again = session.get::<Customer>(customer.id.clone())?;
//! session.commit()?;
//! ```

use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use garasu_core::{Entity, Error, Result, Row, Value};
use garasu_model::RelationLoader;
use garasu_schema::{SchemaRegistry, Table};
use parking_lot::Mutex;

use crate::engine::{Batch, Engine, Op, TxId};

// ============================================================================
// Session Configuration
// ============================================================================

/// Configuration for Session behavior.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Flush pending changes before every lookup.
    pub auto_flush: bool,
    /// Expire tracked objects after commit (reload on next access).
    pub expire_on_commit: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            auto_flush: false,
            expire_on_commit: true,
        }
    }
}

// ============================================================================
// Object Key and State
// ============================================================================

/// Unique key for an object in the identity map.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectKey {
    table: String,
    pk_hash: u64,
}

impl ObjectKey {
    /// Key of an entity instance.
    pub fn from_entity<E: Entity>(entity: &E) -> Self {
        Self::from_pk(E::TABLE_NAME, &entity.primary_key_value())
    }

    /// Key of the row of `table` with primary key `pk`.
    pub fn from_pk(table: &str, pk: &[Value]) -> Self {
        Self {
            table: table.to_string(),
            pk_hash: hash_values(pk),
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }
}

/// Hash a slice of values for use as a primary key hash.
fn hash_values(values: &[Value]) -> u64 {
    let mut hasher = DefaultHasher::new();
    values.len().hash(&mut hasher);
    for v in values {
        match v {
            Value::Null => 0u8.hash(&mut hasher),
            Value::Bool(b) => {
                1u8.hash(&mut hasher);
                b.hash(&mut hasher);
            }
            Value::Int(i) => {
                2u8.hash(&mut hasher);
                i.hash(&mut hasher);
            }
            Value::Double(f) => {
                3u8.hash(&mut hasher);
                f.to_bits().hash(&mut hasher);
            }
            Value::Text(s) => {
                4u8.hash(&mut hasher);
                s.hash(&mut hasher);
            }
            Value::Bytes(b) => {
                5u8.hash(&mut hasher);
                b.hash(&mut hasher);
            }
            Value::Date(d) => {
                6u8.hash(&mut hasher);
                d.hash(&mut hasher);
            }
            Value::Time(t) => {
                7u8.hash(&mut hasher);
                t.hash(&mut hasher);
            }
            Value::Timestamp(ts) => {
                8u8.hash(&mut hasher);
                ts.hash(&mut hasher);
            }
            Value::Json(j) => {
                9u8.hash(&mut hasher);
                j.to_string().hash(&mut hasher);
            }
        }
    }
    hasher.finish()
}

/// State of a tracked object in the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectState {
    /// New object, needs INSERT on flush.
    New,
    /// Persistent object loaded from or written to storage.
    Persistent,
    /// Object marked for deletion, needs DELETE on flush.
    Deleted,
    /// Object detached from session.
    Detached,
    /// Object expired, reloaded from storage on next access.
    Expired,
}

#[derive(Debug)]
struct TrackedObject {
    table: String,
    /// Primary key in storage (or to be used on insert).
    key: Vec<Value>,
    /// Current row, including unflushed changes.
    row: Row,
    /// Row as last seen in storage; `None` until first flushed.
    original: Option<Row>,
    state: ObjectState,
}

impl TrackedObject {
    fn persistent(table: &str, key: Vec<Value>, row: Row) -> Self {
        Self {
            table: table.to_string(),
            key,
            original: Some(row.clone()),
            row,
            state: ObjectState::Persistent,
        }
    }
}

/// Engine transaction holding the flushed work of the current transaction.
#[derive(Debug)]
struct EngineTx {
    id: TxId,
    /// Objects inserted by flushes through this transaction.
    inserted: Vec<ObjectKey>,
    wrote: bool,
}

#[derive(Debug, Default)]
struct SessionState {
    in_transaction: bool,
    tx: Option<EngineTx>,
    identity_map: HashMap<ObjectKey, TrackedObject>,
    pending_new: Vec<ObjectKey>,
    pending_delete: Vec<ObjectKey>,
    pending_dirty: Vec<ObjectKey>,
}

impl SessionState {
    fn begin(&mut self) {
        if !self.in_transaction {
            tracing::info!("Beginning transaction");
            self.in_transaction = true;
        }
    }

    fn mark_dirty(&mut self, key: &ObjectKey) {
        if !self.pending_dirty.contains(key) {
            self.pending_dirty.push(key.clone());
        }
    }

    fn has_pending(&self) -> bool {
        !(self.pending_new.is_empty()
            && self.pending_delete.is_empty()
            && self.pending_dirty.is_empty())
    }

    fn tx_id(&self) -> Option<TxId> {
        self.tx.as_ref().map(|open| open.id)
    }

    /// Forget pending work and everything `tx` wrote.
    ///
    /// Objects inserted through `tx` or never flushed are dropped. The rest
    /// get their stored row back; when `tx` wrote anything they are expired,
    /// since that row may only have existed inside `tx`.
    fn discard(&mut self, tx: Option<&EngineTx>) {
        self.in_transaction = false;
        self.pending_new.clear();
        self.pending_delete.clear();
        self.pending_dirty.clear();

        let (inserted, wrote) = tx.map_or((&[][..], false), |open| {
            (open.inserted.as_slice(), open.wrote)
        });
        self.identity_map.retain(|key, tracked| {
            let Some(original) = &tracked.original else {
                return false;
            };
            if inserted.contains(key) {
                return false;
            }
            tracked.row = original.clone();
            tracked.state = match tracked.state {
                ObjectState::Detached => ObjectState::Detached,
                _ if wrote => ObjectState::Expired,
                ObjectState::Deleted => ObjectState::Persistent,
                other => other,
            };
            true
        });
    }
}

// ============================================================================
// Session Factory
// ============================================================================

/// Identity of a session factory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FactoryId(u64);

impl FactoryId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// Produces sessions bound to one engine and one frozen schema.
///
/// Cheap to clone and safe to share between threads.
#[derive(Debug, Clone)]
pub struct SessionFactory {
    id: FactoryId,
    engine: Arc<dyn Engine>,
    registry: Arc<SchemaRegistry>,
    config: SessionConfig,
}

impl SessionFactory {
    pub fn new(engine: Arc<dyn Engine>, registry: Arc<SchemaRegistry>) -> Self {
        Self {
            id: FactoryId::next(),
            engine,
            registry,
            config: SessionConfig::default(),
        }
    }

    /// A factory for the same engine and schema whose sessions use
    /// `config`.
    ///
    /// The result is a distinct factory: a unit of work keeps separate
    /// sessions for it and for `self`.
    pub fn with_config(mut self, config: SessionConfig) -> Self {
        self.id = FactoryId::next();
        self.config = config;
        self
    }

    pub fn id(&self) -> FactoryId {
        self.id
    }

    pub fn engine(&self) -> &Arc<dyn Engine> {
        &self.engine
    }

    pub fn registry(&self) -> &Arc<SchemaRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Open a new, empty session.
    pub fn open(&self) -> Session {
        tracing::debug!(engine = self.engine.url(), "Opening session");
        Session {
            engine: Arc::clone(&self.engine),
            registry: Arc::clone(&self.registry),
            config: self.config.clone(),
            state: Mutex::new(SessionState::default()),
        }
    }
}

// ============================================================================
// Session
// ============================================================================

/// The unit-of-work manager.
#[derive(Debug)]
pub struct Session {
    engine: Arc<dyn Engine>,
    registry: Arc<SchemaRegistry>,
    config: SessionConfig,
    state: Mutex<SessionState>,
}

impl Session {
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn engine(&self) -> &Arc<dyn Engine> {
        &self.engine
    }

    fn table(&self, name: &str) -> Result<&Table> {
        self.registry
            .table(name)
            .ok_or_else(|| Error::config(format!("table '{name}' is not part of the schema")))
    }

    // ========================================================================
    // Object Tracking
    // ========================================================================

    /// Add an entity to the session.
    ///
    /// Client-side column defaults are applied immediately and the entity is
    /// returned with them. New entities are INSERTed on the next flush;
    /// entities already tracked are updated (or un-deleted).
    #[tracing::instrument(level = "debug", skip(self, entity), fields(table = E::TABLE_NAME))]
    pub fn add<E: Entity>(&self, entity: E) -> Result<E> {
        let table = self.table(E::TABLE_NAME)?;
        let given = entity.to_row();
        let mut row = given.clone();
        apply_client_defaults(table, &mut row);
        let key = primary_key_of(table, &row)?;
        let okey = ObjectKey::from_pk(E::TABLE_NAME, &key);

        tracing::info!(entity = E::ENTITY_NAME, table = E::TABLE_NAME, "Adding object to session");

        let mut state = self.state.lock();
        state.begin();
        let row = match state.identity_map.get_mut(&okey) {
            Some(tracked) => {
                // Stored rows keep columns the entity does not carry.
                let incoming = if tracked.original.is_some() { &given } else { &row };
                tracked.row = overlay(&tracked.row, incoming);
                let row = tracked.row.clone();
                let is_new = tracked.original.is_none();
                let prior = tracked.state;
                tracked.state = if is_new {
                    ObjectState::New
                } else {
                    ObjectState::Persistent
                };
                match (prior, is_new) {
                    (ObjectState::Deleted, _) => {
                        state.pending_delete.retain(|k| k != &okey);
                        if !is_new {
                            state.mark_dirty(&okey);
                        }
                    }
                    (ObjectState::Detached, true) => state.pending_new.push(okey.clone()),
                    (_, false) => state.mark_dirty(&okey),
                    (_, true) => {}
                }
                row
            }
            None => {
                state.identity_map.insert(
                    okey.clone(),
                    TrackedObject {
                        table: E::TABLE_NAME.to_string(),
                        key,
                        row: row.clone(),
                        original: None,
                        state: ObjectState::New,
                    },
                );
                state.pending_new.push(okey);
                row
            }
        };
        E::from_row(&row)
    }

    /// Copy the state of `entity` into the session.
    ///
    /// An untracked entity that exists in storage is loaded first and
    /// updated; one that does not is added as new.
    #[tracing::instrument(level = "debug", skip(self, entity), fields(table = E::TABLE_NAME))]
    pub fn merge<E: Entity>(&self, entity: E) -> Result<E> {
        let key = entity.primary_key_value();
        if !key.iter().any(Value::is_null) {
            let mut state = self.state.lock();
            self.load_row(&mut state, E::TABLE_NAME, &key)?;
        }
        self.add(entity)
    }

    /// Mark an entity for deletion on the next flush.
    #[tracing::instrument(level = "debug", skip(self, entity), fields(table = E::TABLE_NAME))]
    pub fn delete<E: Entity>(&self, entity: &E) -> Result<()> {
        let table = self.table(E::TABLE_NAME)?;
        let row = entity.to_row();
        let key = primary_key_of(table, &row)?;
        let okey = ObjectKey::from_pk(E::TABLE_NAME, &key);

        tracing::info!(entity = E::ENTITY_NAME, table = E::TABLE_NAME, "Marking object for deletion");

        let mut state = self.state.lock();
        state.begin();
        match state.identity_map.get(&okey).map(|t| t.state) {
            Some(ObjectState::New) => {
                state.identity_map.remove(&okey);
                state.pending_new.retain(|k| k != &okey);
            }
            Some(ObjectState::Persistent | ObjectState::Expired) => {
                if let Some(tracked) = state.identity_map.get_mut(&okey) {
                    tracked.state = ObjectState::Deleted;
                }
                state.pending_dirty.retain(|k| k != &okey);
                state.pending_delete.push(okey);
            }
            Some(ObjectState::Deleted | ObjectState::Detached) => {}
            None => {
                let mut tracked = TrackedObject::persistent(E::TABLE_NAME, key, row);
                tracked.state = ObjectState::Deleted;
                state.identity_map.insert(okey.clone(), tracked);
                state.pending_delete.push(okey);
            }
        }
        Ok(())
    }

    /// Get an entity by single-column primary key.
    pub fn get<E: Entity>(&self, pk: impl Into<Value>) -> Result<Option<E>> {
        self.get_by_key(&[pk.into()])
    }

    /// Get an entity by primary key.
    ///
    /// Checks the identity map first and queries the engine otherwise.
    /// Entities pending deletion are not returned.
    #[tracing::instrument(level = "debug", skip(self, key), fields(table = E::TABLE_NAME))]
    pub fn get_by_key<E: Entity>(&self, key: &[Value]) -> Result<Option<E>> {
        let mut state = self.state.lock();
        if self.config.auto_flush {
            self.flush_locked(&mut state)?;
        }
        self.load_row(&mut state, E::TABLE_NAME, key)?
            .map(|row| E::from_row(&row))
            .transpose()
    }

    /// Entities whose `column` equals `value`.
    #[tracing::instrument(level = "debug", skip(self, value), fields(table = E::TABLE_NAME))]
    pub fn find_by<E: Entity>(&self, column: &str, value: impl Into<Value>) -> Result<Vec<E>> {
        let value = value.into();
        let mut state = self.state.lock();
        if self.config.auto_flush {
            self.flush_locked(&mut state)?;
        }
        self.rows_by_column(&mut state, E::TABLE_NAME, column, &value)?
            .iter()
            .map(E::from_row)
            .collect()
    }

    fn load_row(&self, state: &mut SessionState, table: &str, key: &[Value]) -> Result<Option<Row>> {
        let okey = ObjectKey::from_pk(table, key);
        if let Some(tracked) = state.identity_map.get(&okey) {
            match tracked.state {
                ObjectState::New | ObjectState::Persistent => return Ok(Some(tracked.row.clone())),
                ObjectState::Deleted => return Ok(None),
                ObjectState::Detached | ObjectState::Expired => {}
            }
        }

        tracing::debug!(table, "Loading row from engine");
        let Some(row) = self.engine.fetch_in(state.tx_id(), table, key)? else {
            return Ok(None);
        };
        state.begin();
        state
            .identity_map
            .insert(okey, TrackedObject::persistent(table, key.to_vec(), row.clone()));
        Ok(Some(row))
    }

    fn rows_by_column(
        &self,
        state: &mut SessionState,
        table: &str,
        column: &str,
        value: &Value,
    ) -> Result<Vec<Row>> {
        let def = self.table(table)?;
        let stored = self.engine.select_in(state.tx_id(), table, column, value)?;
        state.begin();

        let mut out = Vec::with_capacity(stored.len());
        let mut seen = Vec::with_capacity(stored.len());
        for row in stored {
            let key = primary_key_of(def, &row)?;
            let okey = ObjectKey::from_pk(table, &key);
            match state.identity_map.get(&okey).map(|t| t.state) {
                Some(ObjectState::Deleted) => {}
                Some(ObjectState::New | ObjectState::Persistent) => {
                    if let Some(tracked) = state.identity_map.get(&okey) {
                        out.push(tracked.row.clone());
                    }
                }
                _ => {
                    state
                        .identity_map
                        .insert(okey.clone(), TrackedObject::persistent(table, key, row.clone()));
                    out.push(row);
                }
            }
            seen.push(okey);
        }

        for okey in &state.pending_new {
            if seen.contains(okey) {
                continue;
            }
            if let Some(tracked) = state.identity_map.get(okey) {
                if tracked.table == table && tracked.row.get(column) == Some(value) {
                    out.push(tracked.row.clone());
                }
            }
        }
        Ok(out)
    }

    /// Check if an entity is tracked by this session.
    pub fn contains<E: Entity>(&self, entity: &E) -> bool {
        let key = ObjectKey::from_entity(entity);
        self.state
            .lock()
            .identity_map
            .get(&key)
            .is_some_and(|t| t.state != ObjectState::Detached)
    }

    /// State of a tracked entity.
    pub fn state_of<E: Entity>(&self, entity: &E) -> Option<ObjectState> {
        let key = ObjectKey::from_entity(entity);
        self.state.lock().identity_map.get(&key).map(|t| t.state)
    }

    /// Detach an entity from the session.
    pub fn expunge<E: Entity>(&self, entity: &E) {
        let key = ObjectKey::from_entity(entity);
        let mut state = self.state.lock();
        if let Some(tracked) = state.identity_map.get_mut(&key) {
            tracked.state = ObjectState::Detached;
        }
        state.pending_new.retain(|k| k != &key);
        state.pending_delete.retain(|k| k != &key);
        state.pending_dirty.retain(|k| k != &key);
    }

    /// Detach all objects from the session.
    pub fn expunge_all(&self) {
        let mut state = self.state.lock();
        for tracked in state.identity_map.values_mut() {
            tracked.state = ObjectState::Detached;
        }
        state.pending_new.clear();
        state.pending_delete.clear();
        state.pending_dirty.clear();
    }

    // ========================================================================
    // Transaction Management
    // ========================================================================

    /// Flush pending changes to the engine.
    ///
    /// This writes inside the session's engine transaction but does not
    /// commit it: other sessions see the changes only after
    /// [`commit`](Self::commit).
    pub fn flush(&self) -> Result<()> {
        let mut state = self.state.lock();
        self.flush_locked(&mut state)
    }

    #[tracing::instrument(level = "debug", skip_all)]
    fn flush_locked(&self, state: &mut SessionState) -> Result<()> {
        if !state.has_pending() {
            return Ok(());
        }
        let start = std::time::Instant::now();

        tracing::info!(
            inserts = state.pending_new.len(),
            updates = state.pending_dirty.len(),
            deletes = state.pending_delete.len(),
            "Starting flush"
        );

        let mut batch = Batch::new();
        let mut written: Vec<ObjectKey> = Vec::new();
        let mut inserted: Vec<ObjectKey> = Vec::new();

        // 1. DELETEs first, then INSERTs, then UPDATEs.
        for okey in &state.pending_delete {
            if let Some(tracked) = state.identity_map.get(okey) {
                batch.push(Op::Delete {
                    table: tracked.table.clone(),
                    key: tracked.key.clone(),
                });
            }
        }
        for okey in &state.pending_new {
            if let Some(tracked) = state.identity_map.get(okey) {
                batch.push(Op::Insert {
                    table: tracked.table.clone(),
                    row: tracked.row.clone(),
                });
                written.push(okey.clone());
                inserted.push(okey.clone());
            }
        }
        for okey in &state.pending_dirty {
            let Some(tracked) = state.identity_map.get(okey) else {
                continue;
            };
            if !matches!(tracked.state, ObjectState::Persistent | ObjectState::Expired) {
                continue;
            }
            let changes = match &tracked.original {
                Some(original) => changed_columns(original, &tracked.row),
                None => tracked.row.clone(),
            };
            if changes.is_empty() {
                continue;
            }
            batch.push(Op::Update {
                table: tracked.table.clone(),
                key: tracked.key.clone(),
                changes,
            });
            written.push(okey.clone());
        }

        if !batch.is_empty() {
            let tx = self.engine_tx(state)?;
            // On failure the pending lists are left as they were.
            let stored = self.engine.apply_in(tx, &batch)?;
            if let Some(open) = state.tx.as_mut() {
                open.wrote = true;
                open.inserted.extend(inserted);
            }
            for (okey, row) in written.iter().zip(stored) {
                if let Some(tracked) = state.identity_map.get_mut(okey) {
                    tracked.original = Some(row.clone());
                    tracked.row = row;
                    tracked.state = ObjectState::Persistent;
                }
            }
        }

        for okey in std::mem::take(&mut state.pending_delete) {
            state.identity_map.remove(&okey);
        }
        state.pending_new.clear();
        state.pending_dirty.clear();

        tracing::info!(
            ops = batch.len(),
            elapsed_ms = start.elapsed().as_millis(),
            "Flush completed"
        );
        Ok(())
    }

    /// The open engine transaction, begun on first use.
    fn engine_tx(&self, state: &mut SessionState) -> Result<TxId> {
        if let Some(open) = &state.tx {
            return Ok(open.id);
        }
        let id = self.engine.begin()?;
        tracing::debug!(tx = %id, "Engine transaction started");
        state.tx = Some(EngineTx {
            id,
            inserted: Vec::new(),
            wrote: false,
        });
        Ok(id)
    }

    /// Flush and commit the current transaction.
    ///
    /// When the engine refuses the commit, the session is left as after a
    /// [`rollback`](Self::rollback).
    #[tracing::instrument(level = "debug", skip(self))]
    pub fn commit(&self) -> Result<()> {
        tracing::info!("Committing transaction");
        let mut state = self.state.lock();
        self.flush_locked(&mut state)?;
        if let Some(open) = state.tx.take() {
            if let Err(err) = self.engine.commit(open.id) {
                state.discard(Some(&open));
                return Err(err);
            }
        }
        state.in_transaction = false;

        if self.config.expire_on_commit {
            for tracked in state.identity_map.values_mut() {
                if tracked.state == ObjectState::Persistent {
                    tracked.state = ObjectState::Expired;
                }
            }
        }
        Ok(())
    }

    /// Discard pending and flushed changes and end the current transaction.
    #[tracing::instrument(level = "debug", skip(self))]
    pub fn rollback(&self) -> Result<()> {
        tracing::info!("Rolling back transaction");
        let mut state = self.state.lock();
        let open = state.tx.take();
        let result = open
            .as_ref()
            .map_or(Ok(()), |open| self.engine.rollback(open.id));
        state.discard(open.as_ref());
        result
    }

    // ========================================================================
    // Debug Diagnostics
    // ========================================================================

    /// Get count of objects pending INSERT.
    pub fn pending_new_count(&self) -> usize {
        self.state.lock().pending_new.len()
    }

    /// Get count of objects pending DELETE.
    pub fn pending_delete_count(&self) -> usize {
        self.state.lock().pending_delete.len()
    }

    /// Get count of dirty objects pending UPDATE.
    pub fn pending_dirty_count(&self) -> usize {
        self.state.lock().pending_dirty.len()
    }

    /// Get total tracked object count.
    pub fn tracked_count(&self) -> usize {
        self.state.lock().identity_map.len()
    }

    /// Whether we're in a transaction.
    pub fn in_transaction(&self) -> bool {
        self.state.lock().in_transaction
    }

    /// Dump session state for debugging.
    pub fn debug_state(&self) -> SessionDebugInfo {
        let state = self.state.lock();
        SessionDebugInfo {
            tracked: state.identity_map.len(),
            pending_new: state.pending_new.len(),
            pending_delete: state.pending_delete.len(),
            pending_dirty: state.pending_dirty.len(),
            in_transaction: state.in_transaction,
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Some(open) = self.state.get_mut().tx.take() {
            tracing::debug!(tx = %open.id, "Rolling back transaction of dropped session");
            if let Err(err) = self.engine.rollback(open.id) {
                tracing::warn!(tx = %open.id, error = %err, "Rollback of dropped session failed");
            }
        }
    }
}

impl RelationLoader for Session {
    fn load_by_key(&self, table: &str, key: &[Value]) -> Result<Option<Row>> {
        let mut state = self.state.lock();
        self.load_row(&mut state, table, key)
    }

    fn load_by_column(&self, table: &str, column: &str, value: &Value) -> Result<Vec<Row>> {
        let mut state = self.state.lock();
        self.rows_by_column(&mut state, table, column, value)
    }
}

/// Debug information about session state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionDebugInfo {
    /// Total tracked objects.
    pub tracked: usize,
    /// Objects pending INSERT.
    pub pending_new: usize,
    /// Objects pending DELETE.
    pub pending_delete: usize,
    /// Objects pending UPDATE.
    pub pending_dirty: usize,
    /// Whether in a transaction.
    pub in_transaction: bool,
}

fn apply_client_defaults(table: &Table, row: &mut Row) {
    for column in &table.columns {
        if row.get(&column.name).is_some_and(|v| !v.is_null()) {
            continue;
        }
        if let Some(value) = column.default.as_ref().and_then(|d| d.client_value()) {
            row.set(column.name.clone(), value);
        }
    }
}

fn primary_key_of(table: &Table, row: &Row) -> Result<Vec<Value>> {
    let names = table.primary_key_names();
    if names.is_empty() {
        return Err(Error::config(format!(
            "table '{}' has no primary key",
            table.name
        )));
    }
    let mut key = Vec::with_capacity(names.len());
    for name in &names {
        match row.get(name) {
            Some(v) if !v.is_null() => key.push(v.clone()),
            _ => {
                return Err(Error::integrity(
                    &table.name,
                    format!("NOT NULL constraint failed: {}.{name}", table.name),
                ));
            }
        }
    }
    Ok(key)
}

/// `base` with every column of `top` written over it.
fn overlay(base: &Row, top: &Row) -> Row {
    let mut out = base.clone();
    for (column, value) in top.iter() {
        out.set(column, value.clone());
    }
    out
}

/// Columns of `current` whose value differs from `original`.
fn changed_columns(original: &Row, current: &Row) -> Row {
    let mut changes = Row::new();
    for (column, value) in current.iter() {
        if original.get(column) != Some(value) {
            changes.set(column, value.clone());
        }
    }
    changes
}

// ============================================================================
// Unit Tests
// ============================================================================
