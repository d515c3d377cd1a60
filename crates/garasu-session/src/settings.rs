//! Application settings consumed by the session layer.

use serde::{Deserialize, Serialize};

use garasu_core::{Error, Result};

/// Default number of attempts for a unit of work.
pub const DEFAULT_RETRY_ATTEMPTS: usize = 3;

/// Default database URL.
pub const DEFAULT_DATABASE_URL: &str = "memory://";

/// Settings for engine binding and unit-of-work behavior.
///
/// Deserializable from any serde format; missing keys take their defaults.
///
/// # Example
///
/// ```
/// use garasu_session::Settings;
///
/// let settings = Settings::new()
///     .database_url("memory://sqlite")
///     .should_create_all(true)
///     .retry_attempts(5);
/// assert_eq!(settings.retry_attempts, 5);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Engine URL, see [`crate::engine_from_config`].
    pub database_url: String,
    /// Create every table when the schema is bound.
    pub should_create_all: bool,
    /// Drop every table when the schema is bound (before creating).
    pub should_drop_all: bool,
    /// Attempts per unit of work when storage fails transiently.
    pub retry_attempts: usize,
    /// Expire tracked objects after commit.
    pub expire_on_commit: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            should_create_all: false,
            should_drop_all: false,
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
            expire_on_commit: true,
        }
    }
}

impl Settings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse string key/value pairs, as found in an ini-style config file.
    ///
    /// Boolean values accept `true/false`, `yes/no`, `on/off`, `y/n`,
    /// `t/f` and `1/0` in any case. Unknown keys are ignored.
    pub fn from_pairs<I, K, V>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut settings = Self::default();
        for (key, value) in pairs {
            let (key, value) = (key.as_ref().trim(), value.as_ref().trim());
            match key {
                "database_url" => settings.database_url = value.to_string(),
                "should_create_all" => settings.should_create_all = asbool(key, value)?,
                "should_drop_all" => settings.should_drop_all = asbool(key, value)?,
                "expire_on_commit" => settings.expire_on_commit = asbool(key, value)?,
                "retry_attempts" => {
                    settings.retry_attempts = value.parse().map_err(|_| {
                        Error::config(format!("retry_attempts must be a number, got '{value}'"))
                    })?;
                }
                other => tracing::debug!(key = other, "Ignoring unknown setting"),
            }
        }
        settings.validate()?;
        Ok(settings)
    }

    /// Parse settings from a JSON document.
    pub fn from_json(text: &str) -> Result<Self> {
        let settings: Self = serde_json::from_str(text)
            .map_err(|e| Error::config(format!("invalid settings: {e}")))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Check invariants that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.retry_attempts == 0 {
            return Err(Error::config("retry_attempts must be at least 1"));
        }
        Ok(())
    }

    /// Set the database URL.
    pub fn database_url(mut self, url: impl Into<String>) -> Self {
        self.database_url = url.into();
        self
    }

    /// Create tables when the schema is bound.
    pub fn should_create_all(mut self, value: bool) -> Self {
        self.should_create_all = value;
        self
    }

    /// Drop tables when the schema is bound.
    pub fn should_drop_all(mut self, value: bool) -> Self {
        self.should_drop_all = value;
        self
    }

    /// Set the attempt limit for transient failures.
    pub fn retry_attempts(mut self, attempts: usize) -> Self {
        self.retry_attempts = attempts;
        self
    }

    /// Expire tracked objects after commit.
    pub fn expire_on_commit(mut self, value: bool) -> Self {
        self.expire_on_commit = value;
        self
    }
}

/// Interpret a configuration string as a boolean.
pub fn asbool(key: &str, value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "y" | "t" | "1" => Ok(true),
        "false" | "no" | "off" | "n" | "f" | "0" | "" => Ok(false),
        _ => Err(Error::config(format!(
            "{key} must be a boolean, got '{value}'"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.database_url, "memory://");
        assert!(!settings.should_create_all);
        assert!(!settings.should_drop_all);
        assert_eq!(settings.retry_attempts, 3);
        assert!(settings.expire_on_commit);
    }

    #[test]
    fn test_from_pairs() {
        let settings = Settings::from_pairs([
            ("should_create_all", "true"),
            ("should_drop_all", "Off"),
            ("retry_attempts", "5"),
            ("database_url", "memory://sqlite"),
            ("templates.reload", "true"),
        ])
        .unwrap();
        assert!(settings.should_create_all);
        assert!(!settings.should_drop_all);
        assert_eq!(settings.retry_attempts, 5);
        assert_eq!(settings.database_url, "memory://sqlite");
    }

    #[test]
    fn test_from_pairs_rejects_bad_values() {
        assert!(Settings::from_pairs([("should_create_all", "maybe")]).unwrap_err().is_configuration());
        assert!(Settings::from_pairs([("retry_attempts", "three")]).unwrap_err().is_configuration());
        assert!(Settings::from_pairs([("retry_attempts", "0")]).unwrap_err().is_configuration());
    }

    #[test]
    fn test_from_json_with_defaults() {
        let settings = Settings::from_json(r#"{"should_drop_all": true}"#).unwrap();
        assert!(settings.should_drop_all);
        assert_eq!(settings.retry_attempts, DEFAULT_RETRY_ATTEMPTS);
        assert!(Settings::from_json("{").is_err());
    }

    #[test]
    fn test_asbool() {
        assert!(asbool("k", "YES").unwrap());
        assert!(!asbool("k", "").unwrap());
        assert!(asbool("k", "2").is_err());
    }
}
