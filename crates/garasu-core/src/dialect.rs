//! SQL dialects and identifier quoting.

use std::fmt;

/// The SQL dialect an engine speaks.
///
/// Dialect-sensitive expressions (see [`crate::field::SqlExpr`]) are rendered
/// against a dialect at compile time, never when the column is declared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Dialect {
    /// Dialect-agnostic rendering, used in tests and diagnostics.
    #[default]
    Generic,
    Sqlite,
    Postgres,
    Mysql,
}

impl Dialect {
    /// Parse a dialect name as found in database URLs.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "" | "generic" | "default" => Some(Dialect::Generic),
            "sqlite" => Some(Dialect::Sqlite),
            "postgres" | "postgresql" | "pg" => Some(Dialect::Postgres),
            "mysql" | "mariadb" => Some(Dialect::Mysql),
            _ => None,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Dialect::Generic => "generic",
            Dialect::Sqlite => "sqlite",
            Dialect::Postgres => "postgresql",
            Dialect::Mysql => "mysql",
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Quote an identifier for `dialect`, doubling any embedded quote character.
pub fn quote_ident(name: &str, dialect: Dialect) -> String {
    match dialect {
        Dialect::Mysql => format!("`{}`", name.replace('`', "``")),
        _ => format!("\"{}\"", name.replace('"', "\"\"")),
    }
}
