//! Recursive conversion of entities into JSON.
//!
//! An entity exposes itself through [`Serializable`]: which relations to
//! force-load, which fields to hide, and a snapshot of its loaded fields as
//! [`Attr`] values. [`serialize`] turns that snapshot into a JSON object:
//!
//! - fields in either blacklist, and fields whose name starts with `_`, are
//!   skipped;
//! - dates and times become ISO-8601 strings;
//! - relations named in [`Serializable::eager_load`] are serialized
//!   recursively (a single entity becomes an object, a collection becomes an
//!   array in source order); anything else under an eager name is an
//!   [`Error::Unserializable`];
//! - numbers and booleans pass through, `Null` becomes `null`, and every
//!   other value is rendered as text. NaN and infinite floats have no JSON
//!   form and are an [`Error::Unserializable`]. Relations outside the eager set are
//!   rendered by [`Serializable::describe`].

use std::borrow::Cow;
use std::cell::Cell;
use std::collections::HashSet;
use std::fmt;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use garasu_core::{Error, Result, Value};
use serde_json::{Map, Number, Value as JsonValue};

use crate::relation::RelationLoader;

/// Field names starting with this prefix are never serialized.
pub const RESERVED_PREFIX: &str = "_";

/// Deepest nesting of eager relations before serialization gives up.
pub const MAX_DEPTH: usize = 32;

/// A field value as seen by the serializer.
pub enum Attr<'a> {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(Cow<'a, str>),
    Date(NaiveDate),
    Time(NaiveTime),
    /// Naive timestamp, UTC by convention.
    DateTime(NaiveDateTime),
    DateTimeTz(DateTime<FixedOffset>),
    /// Any other value; serialized through its `Display` text.
    Opaque(&'a dyn fmt::Display),
    /// A loaded related entity.
    One(&'a dyn Serializable),
    /// A loaded collection of related entities.
    Many(Vec<&'a dyn Serializable>),
}

impl<'a> Attr<'a> {
    /// View a stored column value as an attribute.
    pub fn from_value(value: &'a Value) -> Self {
        match value {
            Value::Null => Attr::Null,
            Value::Bool(b) => Attr::Bool(*b),
            Value::Int(i) => Attr::Int(*i),
            Value::Double(f) => Attr::Float(*f),
            Value::Text(s) => Attr::Text(Cow::Borrowed(s)),
            Value::Date(d) => Attr::Date(*d),
            Value::Time(t) => Attr::Time(*t),
            Value::Timestamp(ts) => Attr::DateTime(*ts),
            Value::Bytes(_) | Value::Json(_) => Attr::Opaque(value),
        }
    }

    pub fn text(value: &'a str) -> Self {
        Attr::Text(Cow::Borrowed(value))
    }

    /// `Text` for `Some`, `Null` for `None`.
    pub fn opt_text(value: Option<&'a str>) -> Self {
        value.map_or(Attr::Null, Attr::text)
    }

    pub const fn is_null(&self) -> bool {
        matches!(self, Attr::Null)
    }

    fn kind(&self) -> &'static str {
        match self {
            Attr::Null => "null",
            Attr::Bool(_) => "bool",
            Attr::Int(_) => "int",
            Attr::Float(_) => "float",
            Attr::Text(_) => "text",
            Attr::Date(_) => "date",
            Attr::Time(_) => "time",
            Attr::DateTime(_) | Attr::DateTimeTz(_) => "datetime",
            Attr::Opaque(_) => "opaque value",
            Attr::One(_) => "entity",
            Attr::Many(_) => "entity collection",
        }
    }
}

impl fmt::Debug for Attr<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Attr::One(e) => write!(f, "One({})", e.describe()),
            Attr::Many(es) => write!(f, "Many({} item(s))", es.len()),
            Attr::Opaque(d) => write!(f, "Opaque({d})"),
            Attr::Text(s) => write!(f, "Text({s:?})"),
            other => f.write_str(other.kind()),
        }
    }
}

/// State shared by one serialization pass.
///
/// Holds the loader used to materialize lazy relations (normally the unit
/// of work's session) and tracks recursion depth.
#[derive(Default)]
pub struct SerializeContext<'a> {
    loader: Option<&'a dyn RelationLoader>,
    depth: Cell<usize>,
}

impl<'a> SerializeContext<'a> {
    /// Context that loads relations through `loader`.
    pub fn new(loader: &'a dyn RelationLoader) -> Self {
        Self {
            loader: Some(loader),
            depth: Cell::new(0),
        }
    }

    /// Context without a loader: only already-loaded relations serialize.
    pub fn detached() -> Self {
        Self::default()
    }

    pub fn loader(&self) -> Option<&'a dyn RelationLoader> {
        self.loader
    }

    pub fn depth(&self) -> usize {
        self.depth.get()
    }
}

impl fmt::Debug for SerializeContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SerializeContext")
            .field("has_loader", &self.loader.is_some())
            .field("depth", &self.depth.get())
            .finish()
    }
}

/// The serialization capability.
///
/// Every entity that can appear in serialized output implements this; the
/// serializer only recurses into values that do.
pub trait Serializable {
    /// Name used in error messages and descriptions.
    fn entity_name(&self) -> &'static str;

    /// Loaded fields, in output order. Lazy relations that have not been
    /// loaded are left out.
    fn attributes(&self) -> Vec<(&'static str, Attr<'_>)>;

    /// Relations to load and serialize recursively.
    fn eager_load(&self) -> &'static [&'static str] {
        &[]
    }

    /// Fields hidden by the entity's base type.
    fn base_blacklist(&self) -> &'static [&'static str] {
        &[]
    }

    /// Fields hidden from serialized output only.
    fn serialization_blacklist(&self) -> &'static [&'static str] {
        &[]
    }

    /// Make sure relation `field` is loaded. Unknown names are ignored.
    fn load(&self, field: &str, ctx: &SerializeContext<'_>) -> Result<()> {
        let _ = (field, ctx);
        Ok(())
    }

    /// Short text used where the entity appears outside the eager set.
    fn describe(&self) -> String {
        format!("<{}>", self.entity_name())
    }

    fn to_json(&self, ctx: &SerializeContext<'_>) -> Result<JsonValue> {
        serialize(self, ctx)
    }
}

/// Serialize `entity` into a JSON object.
pub fn serialize<S: Serializable + ?Sized>(entity: &S, ctx: &SerializeContext<'_>) -> Result<JsonValue> {
    let depth = ctx.depth.get();
    if depth >= MAX_DEPTH {
        return Err(Error::Unserializable {
            entity: entity.entity_name().to_string(),
            field: String::new(),
            detail: format!("eager relations nest deeper than {MAX_DEPTH} levels"),
        });
    }

    let eager = entity.eager_load();
    for name in eager {
        entity.load(name, ctx)?;
    }

    let excluded: HashSet<&str> = entity
        .base_blacklist()
        .iter()
        .chain(entity.serialization_blacklist())
        .copied()
        .collect();

    ctx.depth.set(depth + 1);
    let result = entity
        .attributes()
        .into_iter()
        .filter(|(name, _)| !excluded.contains(name) && !name.starts_with(RESERVED_PREFIX))
        .map(|(name, attr)| {
            let value = convert(entity.entity_name(), name, attr, eager.contains(&name), ctx)?;
            Ok((name.to_string(), value))
        })
        .collect::<Result<Map<String, JsonValue>>>();
    ctx.depth.set(depth);

    result.map(JsonValue::Object)
}

/// Serialize `entity` to a JSON string.
pub fn render_json<S: Serializable + ?Sized>(entity: &S, ctx: &SerializeContext<'_>) -> Result<String> {
    let value = entity.to_json(ctx)?;
    serde_json::to_string(&value).map_err(|e| Error::Storage(format!("JSON encoding failed: {e}")))
}

fn convert(
    entity: &str,
    field: &str,
    attr: Attr<'_>,
    eager: bool,
    ctx: &SerializeContext<'_>,
) -> Result<JsonValue> {
    match attr {
        Attr::Null => Ok(JsonValue::Null),
        Attr::Date(d) => Ok(JsonValue::String(d.format("%Y-%m-%d").to_string())),
        Attr::Time(t) => Ok(JsonValue::String(iso_time(t))),
        Attr::DateTime(dt) => Ok(JsonValue::String(iso_datetime(dt))),
        Attr::DateTimeTz(dt) => Ok(JsonValue::String(format!(
            "{}{}",
            iso_datetime(dt.naive_local()),
            dt.format("%:z")
        ))),
        Attr::One(child) if eager => child.to_json(ctx),
        Attr::Many(children) if eager => children
            .into_iter()
            .map(|child| child.to_json(ctx))
            .collect::<Result<Vec<_>>>()
            .map(JsonValue::Array),
        other if eager => Err(Error::Unserializable {
            entity: entity.to_string(),
            field: field.to_string(),
            detail: format!("eager field holds {:?}, not an entity", other),
        }),
        Attr::Bool(b) => Ok(JsonValue::Bool(b)),
        Attr::Int(i) => Ok(JsonValue::Number(i.into())),
        Attr::Float(f) => Number::from_f64(f)
            .map(JsonValue::Number)
            .ok_or_else(|| Error::Unserializable {
                entity: entity.to_string(),
                field: field.to_string(),
                detail: format!("{f} has no JSON representation"),
            }),
        Attr::Text(s) => Ok(JsonValue::String(s.into_owned())),
        Attr::Opaque(d) => Ok(JsonValue::String(d.to_string())),
        Attr::One(child) => Ok(JsonValue::String(child.describe())),
        Attr::Many(children) => Ok(JsonValue::Array(
            children
                .into_iter()
                .map(|c| JsonValue::String(c.describe()))
                .collect(),
        )),
    }
}

fn micros(nanos: u32) -> u32 {
    nanos % 1_000_000_000 / 1_000
}

/// `HH:MM:SS`, with `.ffffff` only when there are microseconds.
pub fn iso_time(t: NaiveTime) -> String {
    let base = t.format("%H:%M:%S").to_string();
    match micros(t.nanosecond()) {
        0 => base,
        us => format!("{base}.{us:06}"),
    }
}

/// `YYYY-MM-DDTHH:MM:SS`, with `.ffffff` only when there are microseconds.
pub fn iso_datetime(dt: NaiveDateTime) -> String {
    format!("{}T{}", dt.format("%Y-%m-%d"), iso_time(dt.time()))
}
