//! Session factory construction, schema binding and per-unit-of-work
//! session lookup.

use std::sync::Arc;

use garasu_core::{Error, Result};
use garasu_schema::SchemaRegistry;

use crate::engine::Engine;
use crate::session::{Session, SessionConfig, SessionFactory};
use crate::settings::Settings;
use crate::transaction::TransactionManager;

/// Build the process-wide session factory for `engine`.
pub fn build_session_factory(
    engine: Arc<dyn Engine>,
    registry: Arc<SchemaRegistry>,
) -> SessionFactory {
    tracing::info!(
        engine = engine.url(),
        tables = registry.tables().len(),
        "Session factory built"
    );
    SessionFactory::new(engine, registry)
}

/// Session settings derived from application settings.
pub fn session_config(settings: &Settings) -> SessionConfig {
    SessionConfig {
        expire_on_commit: settings.expire_on_commit,
        ..SessionConfig::default()
    }
}

/// What [`bind_schema`] does to the tables of the registry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BindOptions {
    /// Create every table that does not exist.
    pub create: bool,
    /// Drop every table first.
    pub drop: bool,
}

impl BindOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            create: settings.should_create_all,
            drop: settings.should_drop_all,
        }
    }
}

/// Tables touched by [`bind_schema`], in the order they were processed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BindReport {
    pub dropped: Vec<String>,
    pub created: Vec<String>,
}

/// Bind `engine` to the finalized schema.
///
/// Drops (when requested) in reverse dependency order, then creates (when
/// requested) in dependency order. Tables that are already absent or
/// present are skipped.
///
/// # Errors
///
/// [`Error::Configuration`] when the registry has not been frozen yet.
#[tracing::instrument(level = "debug", skip(engine, registry))]
pub fn bind_schema(
    engine: &dyn Engine,
    registry: &SchemaRegistry,
    options: BindOptions,
) -> Result<BindReport> {
    if !registry.is_frozen() {
        return Err(Error::config(
            "the schema must be finalized before it is bound to an engine",
        ));
    }

    let order = registry.sorted_tables();
    let mut report = BindReport::default();

    if options.drop {
        for table in order.iter().rev() {
            if engine.drop_table(&table.name)? {
                report.dropped.push(table.name.clone());
            }
        }
    }
    if options.create {
        for table in &order {
            if engine.create_table(table)? {
                report.created.push(table.name.clone());
            }
        }
    }

    tracing::info!(
        engine = engine.url(),
        dropped = report.dropped.len(),
        created = report.created.len(),
        "Schema bound"
    );
    Ok(report)
}

/// The session of `factory` for the unit of work run by `coordinator`.
///
/// The first call opens a session and joins it to the coordinator, so the
/// coordinator's commit and abort drive the session's commit and rollback.
/// Later calls with the same coordinator return that same session.
pub fn get_unit_of_work_session(
    factory: &SessionFactory,
    coordinator: &TransactionManager,
) -> Arc<Session> {
    coordinator.session_for(factory)
}
