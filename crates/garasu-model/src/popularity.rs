//! View and rating counters shared by content-like entities.

use garasu_core::{Column, ColumnDefault, Result, Row, SqlType, Value};

use crate::serialize::Attr;

pub const VIEWED_COLUMN: &str = "viewed";
pub const RATING_COLUMN: &str = "rating";
pub const VOTES_COLUMN: &str = "votes";
pub const RANK_COLUMN: &str = "rank";

/// Popularity counters. All four start at zero.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Followers {
    pub viewed: i64,
    pub rating: f64,
    pub votes: i64,
    pub rank: i64,
}

impl Followers {
    /// Column definitions, each non-null with a zero default.
    pub fn columns() -> Vec<Column> {
        vec![
            counter(VIEWED_COLUMN, SqlType::Integer, Value::Int(0)),
            counter(RATING_COLUMN, SqlType::Float, Value::Double(0.0)),
            counter(VOTES_COLUMN, SqlType::Integer, Value::Int(0)),
            counter(RANK_COLUMN, SqlType::Integer, Value::Int(0)),
        ]
    }

    /// Count one view.
    pub fn record_view(&mut self) {
        self.viewed += 1;
    }

    /// Fold one vote of `score` into the running average.
    pub fn rate(&mut self, score: f64) {
        let total = self.rating * self.votes as f64 + score;
        self.votes += 1;
        self.rating = total / self.votes as f64;
    }

    pub fn write_to(&self, row: &mut Row) {
        row.set(VIEWED_COLUMN, self.viewed);
        row.set(RATING_COLUMN, self.rating);
        row.set(VOTES_COLUMN, self.votes);
        row.set(RANK_COLUMN, self.rank);
    }

    /// Read the counters back. Missing or NULL columns read as zero.
    pub fn read_from(row: &Row) -> Result<Self> {
        Ok(Self {
            viewed: row.get_named::<Option<i64>>(VIEWED_COLUMN)?.unwrap_or_default(),
            rating: row.get_named::<Option<f64>>(RATING_COLUMN)?.unwrap_or_default(),
            votes: row.get_named::<Option<i64>>(VOTES_COLUMN)?.unwrap_or_default(),
            rank: row.get_named::<Option<i64>>(RANK_COLUMN)?.unwrap_or_default(),
        })
    }

    /// Serializable attributes, for entities that embed the counters.
    pub fn attributes(&self) -> Vec<(&'static str, Attr<'_>)> {
        vec![
            (VIEWED_COLUMN, Attr::Int(self.viewed)),
            (RATING_COLUMN, Attr::Float(self.rating)),
            (VOTES_COLUMN, Attr::Int(self.votes)),
            (RANK_COLUMN, Attr::Int(self.rank)),
        ]
    }
}

fn counter(name: &str, sql_type: SqlType, zero: Value) -> Column {
    Column::new(name, sql_type)
        .nullable(false)
        .default(ColumnDefault::Value(zero))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_columns_default_to_zero() {
        let cols = Followers::columns();
        let names: Vec<&str> = cols.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["viewed", "rating", "votes", "rank"]);
        for col in &cols {
            assert!(!col.nullable);
            let zero = col.default.as_ref().and_then(ColumnDefault::client_value).unwrap();
            assert!(matches!(zero, Value::Int(0)) || zero == Value::Double(0.0));
        }
    }

    #[test]
    fn test_rate_keeps_running_average() {
        let mut f = Followers::default();
        f.rate(4.0);
        f.rate(2.0);
        assert_eq!(f.votes, 2);
        assert!((f.rating - 3.0).abs() < f64::EPSILON);
        f.record_view();
        assert_eq!(f.viewed, 1);
    }

    #[test]
    fn test_row_round_trip_and_missing_columns() {
        let mut f = Followers::default();
        f.viewed = 7;
        f.rank = 2;
        let mut row = Row::new();
        f.write_to(&mut row);
        assert_eq!(Followers::read_from(&row).unwrap(), f);

        let empty = Followers::read_from(&Row::new()).unwrap();
        assert_eq!(empty, Followers::default());
    }
}
