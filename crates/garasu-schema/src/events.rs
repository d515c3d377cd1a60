//! Table attach events.
//!
//! Listeners are registered on a [`TableEvents`] hub that can be shared by
//! several registries, so a listener sees every table attached anywhere and
//! decides for itself (by [`RegistryId`]) whether to act.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;

use crate::table::Table;

/// Identity of a schema registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegistryId(u64);

impl RegistryId {
    /// Allocate a process-unique id.
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for RegistryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "registry#{}", self.0)
    }
}

/// Reacts to tables being attached to a registry.
pub trait TableListener: Send + Sync {
    /// Called after `table` is attached to `registry`, before the registry
    /// stores it. The listener may add columns or constraints.
    fn after_attach(&self, registry: RegistryId, table: &mut Table);
}

/// A shared set of [`TableListener`]s.
#[derive(Default)]
pub struct TableEvents {
    listeners: RwLock<Vec<Arc<dyn TableListener>>>,
}

impl TableEvents {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register a listener. Listeners run in registration order.
    pub fn listen(&self, listener: Arc<dyn TableListener>) {
        self.listeners.write().push(listener);
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }

    pub(crate) fn dispatch_attach(&self, registry: RegistryId, table: &mut Table) {
        for listener in self.listeners.read().iter() {
            listener.after_attach(registry, table);
        }
    }
}

impl fmt::Debug for TableEvents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TableEvents")
            .field("listeners", &self.listener_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use garasu_core::{Column, SqlType};

    struct AddMarker;

    impl TableListener for AddMarker {
        fn after_attach(&self, _registry: RegistryId, table: &mut Table) {
            table.append_column(Column::new("marker", SqlType::Boolean));
        }
    }

    #[test]
    fn test_registry_ids_are_unique() {
        assert_ne!(RegistryId::next(), RegistryId::next());
    }

    #[test]
    fn test_dispatch_runs_listeners() {
        let events = TableEvents::new();
        events.listen(Arc::new(AddMarker));
        let mut table = Table::new("t", vec![]);
        events.dispatch_attach(RegistryId::next(), &mut table);
        assert!(table.has_column("marker"));
        assert_eq!(events.listener_count(), 1);
    }
}
