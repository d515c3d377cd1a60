//! URL-safe slugs derived from free text.

use std::sync::OnceLock;

use garasu_core::{Column, Result, Row, SqlType, Value};
use deunicode::deunicode;
use regex::Regex;
use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

/// Backing column of a [`Slug`].
pub const SLUG_COLUMN: &str = "slug";

/// Longest slug [`slugify`] produces, in characters.
pub const SLUG_MAX_LENGTH: usize = 64;

/// Declared width of the backing column.
pub const SLUG_COLUMN_WIDTH: u32 = 200;

fn separator_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^a-z0-9]+").expect("separator pattern is valid"))
}

/// Normalize `text` into a slug.
///
/// Accents are stripped (NFKD, combining marks dropped) and any remaining
/// non-ASCII text is transliterated, so non-Latin titles still yield a
/// usable slug. The text is lowercased, and every run of characters
/// outside `[a-z0-9]` becomes a single `-`. Leading and trailing separators
/// are trimmed. Output longer than [`SLUG_MAX_LENGTH`] is cut at the last
/// separator that fits, or hard cut when the first word alone is too long.
///
/// ```
/// use garasu_model::slugify;
/// assert_eq!(slugify("Hello, World!"), "hello-world");
/// assert_eq!(slugify("Crème Brûlée"), "creme-brulee");
/// assert_eq!(slugify("Москва"), "moskva");
/// ```
pub fn slugify(text: &str) -> String {
    let folded: String = text.nfkd().filter(|c| !is_combining_mark(*c)).collect();
    let ascii = deunicode(&folded).to_lowercase();
    let slug = separator_regex().replace_all(&ascii, "-");
    truncate_at_word(slug.trim_matches('-'), SLUG_MAX_LENGTH)
}

fn truncate_at_word(slug: &str, max: usize) -> String {
    // Slugs are ASCII here, so byte and char lengths agree.
    if slug.len() <= max {
        return slug.to_string();
    }
    let head = &slug[..max];
    let cut = if slug.as_bytes()[max] == b'-' {
        head
    } else {
        match head.rfind('-') {
            Some(idx) => &head[..idx],
            None => head,
        }
    };
    cut.trim_end_matches('-').to_string()
}

/// A slug value stored in the `slug` column.
///
/// Assigning through [`Slug::set`] always re-derives the stored value;
/// reading returns what is stored, without re-deriving it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Slug {
    stored: Option<String>,
}

impl Slug {
    /// A slug derived from `source`.
    pub fn from_source(source: &str) -> Self {
        let mut slug = Self::default();
        slug.set(source);
        slug
    }

    /// A slug read back from storage, taken as-is.
    pub fn from_stored(stored: Option<String>) -> Self {
        Self { stored }
    }

    /// Replace the stored value with `slugify(source)`.
    pub fn set(&mut self, source: &str) {
        self.stored = Some(slugify(source));
    }

    /// Stored value, if any.
    pub fn get(&self) -> Option<&str> {
        self.stored.as_deref()
    }

    pub fn clear(&mut self) {
        self.stored = None;
    }

    /// Value written to the backing column.
    pub fn to_value(&self) -> Value {
        self.stored.clone().into()
    }

    /// Add the backing column to `row`.
    pub fn write_to(&self, row: &mut Row) {
        row.set(SLUG_COLUMN, self.to_value());
    }

    /// Read the backing column from `row`.
    pub fn read_from(row: &Row) -> Result<Self> {
        Ok(Self::from_stored(row.get_named(SLUG_COLUMN)?))
    }

    /// The backing column, unique.
    pub fn columns() -> Vec<Column> {
        Self::columns_with(true)
    }

    /// The backing column, with uniqueness chosen by the entity.
    pub fn columns_with(unique: bool) -> Vec<Column> {
        vec![Column::new(SLUG_COLUMN, SqlType::Unicode(SLUG_COLUMN_WIDTH)).unique(unique)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slugify_basic() {
        assert_eq!(slugify("Hello, World!"), "hello-world");
        assert_eq!(slugify("  --Rust  2024-- "), "rust-2024");
        assert_eq!(slugify("a___b...c"), "a-b-c");
    }

    #[test]
    fn test_slugify_strips_accents() {
        assert_eq!(slugify("Crème Brûlée"), "creme-brulee");
        assert_eq!(slugify("Ångström"), "angstrom");
    }

    #[test]
    fn test_slugify_empty_and_symbols() {
        assert_eq!(slugify(""), "");
        assert_eq!(slugify("!!!"), "");
    }

    #[test]
    fn test_slugify_transliterates_other_scripts() {
        assert_eq!(slugify("Москва"), "moskva");

        let tokyo = slugify("東京タワー");
        let beijing = slugify("北京");
        for slug in [&tokyo, &beijing] {
            assert!(!slug.is_empty());
            assert!(slug.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-'));
        }
        assert_ne!(slugify("東京"), beijing);
    }

    #[test]
    fn test_slugify_truncates_at_word_boundary() {
        let text = "word ".repeat(30);
        let slug = slugify(&text);
        assert!(slug.len() <= SLUG_MAX_LENGTH);
        assert!(slug.ends_with("word"));
        assert!(!slug.ends_with('-'));

        let long_word = "x".repeat(100);
        assert_eq!(slugify(&long_word).len(), SLUG_MAX_LENGTH);
    }

    #[test]
    fn test_truncate_on_exact_boundary() {
        // "aaaa-bbbb" cut at 4 lands right before a separator.
        assert_eq!(truncate_at_word("aaaa-bbbb", 4), "aaaa");
        assert_eq!(truncate_at_word("aaaa-bbbb", 6), "aaaa");
        assert_eq!(truncate_at_word("aaaa-bbbb", 9), "aaaa-bbbb");
    }

    #[test]
    fn test_set_always_rederives() {
        let mut slug = Slug::from_source("First Title");
        assert_eq!(slug.get(), Some("first-title"));
        slug.set("Second   Title");
        assert_eq!(slug.get(), Some("second-title"));
        slug.clear();
        assert_eq!(slug.get(), None);
        assert_eq!(slug.to_value(), Value::Null);
    }

    #[test]
    fn test_stored_value_is_not_rederived() {
        let slug = Slug::from_stored(Some("Legacy Value".into()));
        assert_eq!(slug.get(), Some("Legacy Value"));
    }

    #[test]
    fn test_row_round_trip() {
        let mut row = Row::new();
        Slug::from_source("Blue Widget").write_to(&mut row);
        assert_eq!(row.get(SLUG_COLUMN), Some(&Value::Text("blue-widget".into())));
        assert_eq!(Slug::read_from(&row).unwrap().get(), Some("blue-widget"));
    }

    #[test]
    fn test_column_definition() {
        let cols = Slug::columns();
        assert_eq!(cols[0].name, SLUG_COLUMN);
        assert_eq!(cols[0].sql_type, SqlType::Unicode(200));
        assert!(cols[0].unique);
        assert!(!Slug::columns_with(false)[0].unique);
    }
}
