//! SQL column types.

use crate::dialect::Dialect;

/// Column type as declared on an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SqlType {
    Integer,
    BigInt,
    Float,
    Boolean,
    Text,
    /// Variable-length unicode text with a maximum width.
    Unicode(u32),
    /// Fixed-width character column.
    Char(u32),
    Date,
    Time,
    DateTime,
    Blob,
    Json,
}

impl SqlType {
    /// Type name used in DDL for `dialect`.
    pub fn sql_name(self, dialect: Dialect) -> String {
        match (self, dialect) {
            (SqlType::Integer, _) => "INTEGER".to_string(),
            (SqlType::BigInt, _) => "BIGINT".to_string(),
            (SqlType::Float, Dialect::Postgres) => "DOUBLE PRECISION".to_string(),
            (SqlType::Float, _) => "FLOAT".to_string(),
            (SqlType::Boolean, _) => "BOOLEAN".to_string(),
            (SqlType::Text, _) => "TEXT".to_string(),
            (SqlType::Unicode(len), _) => format!("VARCHAR({len})"),
            (SqlType::Char(len), _) => format!("CHAR({len})"),
            (SqlType::Date, _) => "DATE".to_string(),
            (SqlType::Time, _) => "TIME".to_string(),
            (SqlType::DateTime, Dialect::Postgres) => "TIMESTAMP WITHOUT TIME ZONE".to_string(),
            (SqlType::DateTime, _) => "DATETIME".to_string(),
            (SqlType::Blob, Dialect::Postgres) => "BYTEA".to_string(),
            (SqlType::Blob, _) => "BLOB".to_string(),
            (SqlType::Json, Dialect::Postgres) => "JSONB".to_string(),
            (SqlType::Json, Dialect::Sqlite) => "TEXT".to_string(),
            (SqlType::Json, _) => "JSON".to_string(),
        }
    }

    /// Maximum character width, for length-bounded text types.
    pub const fn max_length(self) -> Option<u32> {
        match self {
            SqlType::Unicode(len) | SqlType::Char(len) => Some(len),
            _ => None,
        }
    }
}
