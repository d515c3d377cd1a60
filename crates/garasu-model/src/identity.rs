//! Short surrogate identifiers.
//!
//! Identifiers are the first [`GUID_LENGTH`] hex characters of an MD5 digest
//! over the current time, two random numbers and optional caller context.
//! That is 40 bits of digest: collisions are unlikely but possible, and
//! nothing here checks for them. A duplicate key is reported by storage as
//! [`Error::Integrity`] when the row is flushed.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use garasu_core::{Column, ColumnDefault, Error, Result, SqlType, Value};
use rand::Rng;

/// Length of every generated identifier.
pub const GUID_LENGTH: usize = 10;

/// Name of the surrogate primary-key column.
pub const ID_COLUMN: &str = "id";

const RANDOM_SPAN: f64 = 1e13;

/// Generate a 10-character lowercase hex identifier.
///
/// `context` values are stringified and mixed into the digest input; they
/// only add entropy and may be empty.
pub fn guid(context: &[&dyn fmt::Display]) -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64() * 1000.0)
        .unwrap_or_default();
    let mut rng = rand::thread_rng();
    let r: f64 = rng.gen_range(0.0..RANDOM_SPAN);
    let a: f64 = rng.gen_range(0.0..RANDOM_SPAN);
    let args: Vec<String> = context.iter().map(ToString::to_string).collect();

    let data = format!("{millis} {r} {a} {}", args.join(" "));
    let digest = format!("{:x}", md5::compute(data.as_bytes()));
    digest[..GUID_LENGTH].to_string()
}

/// Generate an identifier that `is_taken` rejects at most `max_attempts - 1`
/// times.
///
/// Use this where a lookup is cheap and a failed flush is not; plain
/// [`guid`] is what the surrogate key column uses.
///
/// # Errors
///
/// [`Error::Integrity`] if every candidate was taken.
pub fn guid_unique_by<F>(table: &str, max_attempts: usize, mut is_taken: F) -> Result<String>
where
    F: FnMut(&str) -> bool,
{
    for attempt in 1..=max_attempts.max(1) {
        let candidate = guid(&[&table, &attempt]);
        if !is_taken(&candidate) {
            return Ok(candidate);
        }
        tracing::debug!(table, attempt, "Generated identifier already taken");
    }
    Err(Error::integrity(
        table,
        format!("no free identifier after {max_attempts} attempt(s)"),
    ))
}

fn generated_id() -> Value {
    Value::Text(guid(&[]))
}

/// Surrogate primary key building block.
///
/// Entities concatenate [`SurrogatePk::columns`] into their own column list
/// and store the key in an `Option<String>` field written as NULL while
/// unset. The session fills it in when the entity is added, so the key is
/// known before the first flush.
#[derive(Debug, Clone, Copy, Default)]
pub struct SurrogatePk;

impl SurrogatePk {
    /// The `id CHAR(10)` primary-key column with a generated default.
    pub fn columns() -> Vec<Column> {
        vec![
            Column::new(ID_COLUMN, SqlType::Char(GUID_LENGTH as u32))
                .primary_key()
                .default(ColumnDefault::Generated(generated_id)),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_guid_shape() {
        let id = guid(&[]);
        assert_eq!(id.len(), GUID_LENGTH);
        assert!(id.chars().all(|c| matches!(c, '0'..='9' | 'a'..='f')));
    }

    #[test]
    fn test_guid_with_context() {
        let id = guid(&[&"customer", &42]);
        assert_eq!(id.len(), GUID_LENGTH);
    }

    #[test]
    fn test_hundred_thousand_guids_are_distinct() {
        let ids: HashSet<String> = (0..100_000).map(|_| guid(&[])).collect();
        assert_eq!(ids.len(), 100_000);
    }

    #[test]
    fn test_guid_unique_by_retries() {
        let mut calls = 0;
        let id = guid_unique_by("customer", 3, |_| {
            calls += 1;
            calls < 3
        })
        .unwrap();
        assert_eq!(id.len(), GUID_LENGTH);
        assert_eq!(calls, 3);
    }

    #[test]
    fn test_guid_unique_by_gives_up() {
        let err = guid_unique_by("customer", 2, |_| true).unwrap_err();
        assert!(matches!(err, Error::Integrity { .. }));
    }

    #[test]
    fn test_surrogate_pk_column() {
        let cols = SurrogatePk::columns();
        assert_eq!(cols.len(), 1);
        let id = &cols[0];
        assert_eq!(id.name, ID_COLUMN);
        assert_eq!(id.sql_type, SqlType::Char(10));
        assert!(id.primary_key);
        assert!(!id.nullable);
        let value = id.default.as_ref().and_then(ColumnDefault::client_value).unwrap();
        assert_eq!(value.as_str().map(str::len), Some(GUID_LENGTH));
    }
}
