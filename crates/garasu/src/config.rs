//! Application configuration and units of work.
//!
//! A [`Configurator`] collects entities and startup actions. [`Configurator::commit`]
//! runs the startup sequence as one ordered list of steps:
//!
//! 1. host actions registered for [`Stage::Configure`], which may still add
//!    entities and references;
//! 2. `resolve_references`, then `freeze_schema`;
//! 3. host actions for [`Stage::Resolved`];
//! 4. `bind_engine` (drop, then create, per settings);
//! 5. host actions for [`Stage::Bound`].
//!
//! Within a stage, host actions run in registration order. Schema resolution
//! always precedes engine binding. The resulting [`App`] hands out one
//! [`UnitOfWork`] per request.

use std::fmt;
use std::sync::Arc;

use garasu_core::{Entity, Error, Result};
use garasu_model::{Serializable, SerializeContext, render_json, serialize};
use garasu_schema::{ReferenceRegistry, ResolveReport, SchemaRegistry, TimestampInjector};
use garasu_session::{
    BindOptions, BindReport, Engine, Session, SessionFactory, Settings, TransactionManager,
    bind_schema, build_session_factory, engine_from_config, get_unit_of_work_session,
    session_config,
};
use serde_json::Value as JsonValue;

/// Point of the startup sequence at which a host action runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    /// Before references are resolved. The schema is still open.
    Configure,
    /// References resolved and schema frozen, engine not bound yet.
    Resolved,
    /// Engine bound.
    Bound,
}

type StartupAction = Box<dyn FnOnce(&mut Startup) -> Result<()> + Send>;

struct StartupStep {
    name: String,
    stage: Stage,
    /// Built-in steps open their stage, ahead of host actions.
    builtin: bool,
    action: StartupAction,
}

impl fmt::Debug for StartupStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StartupStep")
            .field("name", &self.name)
            .field("stage", &self.stage)
            .field("builtin", &self.builtin)
            .finish_non_exhaustive()
    }
}

impl StartupStep {
    fn builtin(name: &str, stage: Stage, action: fn(&mut Startup) -> Result<()>) -> Self {
        Self {
            name: name.to_string(),
            stage,
            builtin: true,
            action: Box::new(action),
        }
    }
}

/// State seen by startup actions while [`Configurator::commit`] runs.
#[derive(Debug)]
pub struct Startup {
    settings: Settings,
    registry: SchemaRegistry,
    references: ReferenceRegistry,
    resolved: ResolveReport,
    engine: Option<Arc<dyn Engine>>,
    bound: BindReport,
    completed: Vec<String>,
}

impl Startup {
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    /// Register entity `E`. Only possible before `freeze_schema`.
    pub fn add_entity<E: Entity>(&mut self) -> Result<()> {
        self.registry.register_entity::<E>()?;
        for remote in E::references() {
            self.references.declare(E::ENTITY_NAME, *remote);
        }
        Ok(())
    }

    /// The bound engine, from [`Stage::Bound`] on.
    pub fn engine(&self) -> Option<&Arc<dyn Engine>> {
        self.engine.as_ref()
    }

    /// Names of the steps that already ran, in order.
    pub fn completed(&self) -> &[String] {
        &self.completed
    }
}

fn resolve_references(startup: &mut Startup) -> Result<()> {
    startup.resolved = startup.references.resolve_all(&mut startup.registry)?;
    Ok(())
}

fn freeze_schema(startup: &mut Startup) -> Result<()> {
    startup.registry.freeze();
    Ok(())
}

fn bind_engine(startup: &mut Startup) -> Result<()> {
    let engine = match startup.engine.take() {
        Some(engine) => engine,
        None => engine_from_config(&startup.settings)?,
    };
    startup.bound = bind_schema(
        engine.as_ref(),
        &startup.registry,
        BindOptions::from_settings(&startup.settings),
    )?;
    startup.engine = Some(engine);
    Ok(())
}

/// Startup-phase configuration.
///
/// Every table attached to the configurator's registry receives the
/// `created` / `modified` timestamp columns.
#[derive(Debug)]
pub struct Configurator {
    settings: Settings,
    registry: Option<SchemaRegistry>,
    references: ReferenceRegistry,
    actions: Vec<StartupStep>,
}

impl Configurator {
    pub fn new(settings: Settings) -> Self {
        let registry = SchemaRegistry::new();
        TimestampInjector::install(&registry);
        Self {
            settings,
            registry: Some(registry),
            references: ReferenceRegistry::new(),
            actions: Vec::new(),
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// The schema being built, until [`commit`](Self::commit) takes it.
    pub fn registry(&self) -> Option<&SchemaRegistry> {
        self.registry.as_ref()
    }

    /// References declared but not yet resolved.
    pub fn references(&self) -> &ReferenceRegistry {
        &self.references
    }

    fn registry_mut(&mut self) -> Result<&mut SchemaRegistry> {
        self.registry
            .as_mut()
            .ok_or_else(|| Error::config("the configuration has already been committed"))
    }

    /// Register entity `E` and declare every reference it names.
    ///
    /// Referenced entities may be added later, in any order.
    pub fn add_entity<E: Entity>(&mut self) -> Result<&mut Self> {
        self.registry_mut()?.register_entity::<E>()?;
        for remote in E::references() {
            self.references.declare(E::ENTITY_NAME, *remote);
        }
        Ok(self)
    }

    /// Declare that `local` holds a foreign key to `remote`.
    pub fn declare_reference(
        &mut self,
        local: impl Into<String>,
        remote: impl Into<String>,
    ) -> &mut Self {
        self.references.declare(local, remote);
        self
    }

    /// Queue `action` to run at `stage` of the startup sequence.
    pub fn on_startup<F>(&mut self, stage: Stage, name: impl Into<String>, action: F) -> &mut Self
    where
        F: FnOnce(&mut Startup) -> Result<()> + Send + 'static,
    {
        self.actions.push(StartupStep {
            name: name.into(),
            stage,
            builtin: false,
            action: Box::new(action),
        });
        self
    }

    /// Names of the startup steps in the order [`commit`](Self::commit)
    /// will run them.
    pub fn startup_sequence(&self) -> Vec<String> {
        let mut names: Vec<(Stage, bool, &str)> = builtin_steps()
            .iter()
            .map(|(name, stage, _)| (*stage, false, *name))
            .chain(
                self.actions
                    .iter()
                    .map(|step| (step.stage, true, step.name.as_str())),
            )
            .collect();
        names.sort_by_key(|(stage, host, _)| (*stage, *host));
        names.into_iter().map(|(_, _, name)| name.to_string()).collect()
    }

    /// Run the startup sequence and bind the engine named by the settings.
    ///
    /// The configurator is spent afterwards, also when one of the steps
    /// fails.
    ///
    /// # Errors
    ///
    /// [`Error::Configuration`] for an undeclared referenced entity, invalid
    /// settings, an unsupported database URL, or a second commit. Errors of
    /// host actions are returned as they are.
    pub fn commit(&mut self) -> Result<App> {
        self.finalize(None)
    }

    /// [`commit`](Self::commit), binding `engine` instead of building one
    /// from `database_url`.
    pub fn commit_with_engine(&mut self, engine: Arc<dyn Engine>) -> Result<App> {
        self.finalize(Some(engine))
    }

    #[tracing::instrument(level = "debug", skip_all)]
    fn finalize(&mut self, engine: Option<Arc<dyn Engine>>) -> Result<App> {
        let registry = self
            .registry
            .take()
            .ok_or_else(|| Error::config("the configuration has already been committed"))?;
        self.settings.validate()?;

        let mut steps: Vec<StartupStep> = builtin_steps()
            .into_iter()
            .map(|(name, stage, action)| StartupStep::builtin(name, stage, action))
            .chain(self.actions.drain(..))
            .collect();
        steps.sort_by_key(|step| (step.stage, !step.builtin));

        let mut startup = Startup {
            settings: self.settings.clone(),
            registry,
            references: std::mem::take(&mut self.references),
            resolved: ResolveReport::default(),
            engine,
            bound: BindReport::default(),
            completed: Vec::with_capacity(steps.len()),
        };
        for step in steps {
            tracing::debug!(step = %step.name, stage = ?step.stage, "Running startup step");
            (step.action)(&mut startup)?;
            startup.completed.push(step.name);
        }

        let Startup {
            settings,
            registry,
            resolved,
            engine,
            bound,
            completed,
            ..
        } = startup;
        let engine = engine.ok_or_else(|| Error::config("startup finished without an engine"))?;
        let factory = build_session_factory(engine, Arc::new(registry))
            .with_config(session_config(&settings));

        tracing::info!(
            tables = factory.registry().tables().len(),
            references = resolved.resolved,
            steps = completed.len(),
            "Configuration committed"
        );
        Ok(App {
            settings: Arc::new(settings),
            factory,
            references: resolved,
            bound,
            startup: completed,
        })
    }
}

type BuiltinStep = (&'static str, Stage, fn(&mut Startup) -> Result<()>);

fn builtin_steps() -> [BuiltinStep; 3] {
    [
        ("resolve_references", Stage::Resolved, resolve_references),
        ("freeze_schema", Stage::Resolved, freeze_schema),
        ("bind_engine", Stage::Bound, bind_engine),
    ]
}

/// A configured application.
#[derive(Debug, Clone)]
pub struct App {
    settings: Arc<Settings>,
    factory: SessionFactory,
    references: ResolveReport,
    bound: BindReport,
    startup: Vec<String>,
}

impl App {
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn factory(&self) -> &SessionFactory {
        &self.factory
    }

    pub fn engine(&self) -> &Arc<dyn Engine> {
        self.factory.engine()
    }

    pub fn registry(&self) -> &SchemaRegistry {
        self.factory.registry()
    }

    /// What reference resolution added at commit.
    pub fn resolve_report(&self) -> &ResolveReport {
        &self.references
    }

    /// Tables dropped and created at commit.
    pub fn bind_report(&self) -> &BindReport {
        &self.bound
    }

    /// Startup steps that ran at commit, in order.
    pub fn startup_steps(&self) -> &[String] {
        &self.startup
    }

    /// Start a unit of work with its own transaction coordinator.
    pub fn unit_of_work(&self) -> UnitOfWork {
        UnitOfWork {
            factory: self.factory.clone(),
            coordinator: TransactionManager::from_settings(&self.settings),
        }
    }

    /// Run `work` in a fresh unit of work, committing on success and
    /// retrying transient storage failures.
    pub fn run<T, F>(&self, mut work: F) -> Result<T>
    where
        F: FnMut(&UnitOfWork) -> Result<T>,
    {
        let uow = self.unit_of_work();
        uow.coordinator.run(|_| work(&uow))
    }
}

/// One unit of work, typically one request.
#[derive(Debug)]
pub struct UnitOfWork {
    factory: SessionFactory,
    coordinator: TransactionManager,
}

impl UnitOfWork {
    /// The session of this unit of work, opened on first access.
    pub fn db(&self) -> Arc<Session> {
        get_unit_of_work_session(&self.factory, &self.coordinator)
    }

    pub fn coordinator(&self) -> &TransactionManager {
        &self.coordinator
    }

    pub fn commit(&self) -> Result<()> {
        self.coordinator.commit()
    }

    pub fn abort(&self) -> Result<()> {
        self.coordinator.abort()
    }

    /// Run `work` with commit, abort and retry handled by the coordinator.
    pub fn run<T, F>(&self, mut work: F) -> Result<T>
    where
        F: FnMut(&Self) -> Result<T>,
    {
        self.coordinator.run(|_| work(self))
    }

    /// Serialize `entity`, loading relations through this unit's session.
    pub fn serialize<S: Serializable + ?Sized>(&self, entity: &S) -> Result<JsonValue> {
        let db = self.db();
        serialize(entity, &SerializeContext::new(db.as_ref()))
    }

    /// [`serialize`](Self::serialize) rendered as JSON text.
    pub fn render_json<S: Serializable + ?Sized>(&self, entity: &S) -> Result<String> {
        let db = self.db();
        render_json(entity, &SerializeContext::new(db.as_ref()))
    }
}
