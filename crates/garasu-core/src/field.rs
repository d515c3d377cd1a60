//! Column definitions and default-value expressions.

use std::fmt;

use crate::dialect::Dialect;
use crate::types::SqlType;
use crate::value::Value;

/// Referential action for foreign key constraints (ON DELETE / ON UPDATE).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReferentialAction {
    /// No action - raise error if any references exist.
    #[default]
    NoAction,
    Restrict,
    Cascade,
    SetNull,
    SetDefault,
}

impl ReferentialAction {
    /// Get the SQL representation of this action.
    pub const fn as_sql(&self) -> &'static str {
        match self {
            ReferentialAction::NoAction => "NO ACTION",
            ReferentialAction::Restrict => "RESTRICT",
            ReferentialAction::Cascade => "CASCADE",
            ReferentialAction::SetNull => "SET NULL",
            ReferentialAction::SetDefault => "SET DEFAULT",
        }
    }
}

/// A SQL expression evaluated by the storage engine.
///
/// The expression is only turned into text when a statement is compiled for
/// a concrete [`Dialect`]; declaring a column never fixes the SQL fragment.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SqlExpr {
    /// The current time in UTC.
    ///
    /// There is no portable SQL spelling for this, so every dialect gets its
    /// own rendering. The generic rendering `utcnow()` is not valid SQL and
    /// only appears in dialect-agnostic output such as tests.
    UtcNow,
    /// The engine's `CURRENT_TIMESTAMP` (used for server-side defaults).
    CurrentTimestamp,
    /// A literal SQL fragment, emitted verbatim.
    Raw(String),
}

impl SqlExpr {
    /// Render this expression for `dialect`.
    pub fn compile(&self, dialect: Dialect) -> String {
        match (self, dialect) {
            (SqlExpr::UtcNow, Dialect::Generic) => "utcnow()".to_string(),
            (SqlExpr::UtcNow, Dialect::Sqlite) => "(CURRENT_TIMESTAMP)".to_string(),
            (SqlExpr::UtcNow, Dialect::Postgres) => "TIMEZONE('utc', CURRENT_TIMESTAMP)".to_string(),
            (SqlExpr::UtcNow, Dialect::Mysql) => "UTC_TIMESTAMP()".to_string(),
            (SqlExpr::CurrentTimestamp, Dialect::Postgres) => "now()".to_string(),
            (SqlExpr::CurrentTimestamp, _) => "CURRENT_TIMESTAMP".to_string(),
            (SqlExpr::Raw(sql), _) => sql.clone(),
        }
    }
}

/// How a column gets a value when the application does not provide one.
#[derive(Clone)]
pub enum ColumnDefault {
    /// A constant value.
    Value(Value),
    /// An expression the engine evaluates at statement time.
    Expr(SqlExpr),
    /// A value produced by application code before the row is sent.
    Generated(fn() -> Value),
}

impl ColumnDefault {
    /// Whether the session must produce this default itself.
    pub const fn is_client_side(&self) -> bool {
        matches!(self, ColumnDefault::Value(_) | ColumnDefault::Generated(_))
    }

    /// Produce the client-side value, if this default has one.
    pub fn client_value(&self) -> Option<Value> {
        match self {
            ColumnDefault::Value(v) => Some(v.clone()),
            ColumnDefault::Generated(f) => Some(f()),
            ColumnDefault::Expr(_) => None,
        }
    }
}

impl fmt::Debug for ColumnDefault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnDefault::Value(v) => f.debug_tuple("Value").field(v).finish(),
            ColumnDefault::Expr(e) => f.debug_tuple("Expr").field(e).finish(),
            ColumnDefault::Generated(_) => f.write_str("Generated(..)"),
        }
    }
}

/// A column definition.
///
/// Entities describe their columns with these; the schema registry turns them
/// into tables. Columns are nullable unless marked otherwise or part of the
/// primary key.
#[derive(Debug, Clone)]
pub struct Column {
    /// Database column name.
    pub name: String,
    /// SQL type.
    pub sql_type: SqlType,
    /// Whether NULL is accepted.
    pub nullable: bool,
    /// Whether the column is part of the primary key.
    pub primary_key: bool,
    /// Whether the column carries a UNIQUE constraint.
    pub unique: bool,
    /// Default applied on INSERT when no value is given.
    pub default: Option<ColumnDefault>,
    /// Default rendered into DDL (`DEFAULT ...`).
    pub server_default: Option<SqlExpr>,
    /// Value applied on every UPDATE of the row.
    pub onupdate: Option<ColumnDefault>,
}

impl Column {
    /// Create a nullable column with no defaults.
    pub fn new(name: impl Into<String>, sql_type: SqlType) -> Self {
        Self {
            name: name.into(),
            sql_type,
            nullable: true,
            primary_key: false,
            unique: false,
            default: None,
            server_default: None,
            onupdate: None,
        }
    }

    /// Mark as primary key (implies NOT NULL).
    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self.nullable = false;
        self
    }

    /// Set nullable flag.
    pub fn nullable(mut self, value: bool) -> Self {
        self.nullable = value;
        self
    }

    /// Set unique flag.
    pub fn unique(mut self, value: bool) -> Self {
        self.unique = value;
        self
    }

    /// Set the INSERT default.
    pub fn default(mut self, default: ColumnDefault) -> Self {
        self.default = Some(default);
        self
    }

    /// Set the DDL server default.
    pub fn server_default(mut self, expr: SqlExpr) -> Self {
        self.server_default = Some(expr);
        self
    }

    /// Set the UPDATE default.
    pub fn onupdate(mut self, default: ColumnDefault) -> Self {
        self.onupdate = Some(default);
        self
    }
}
