//! Driver options passed to the client at connect time

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Key for the error reporting mode
pub const ERROR_MODE: &str = "error_mode";
/// Key for the row shape returned by fetches
pub const FETCH_MODE: &str = "fetch_mode";
/// Key controlling whether preparation is deferred to execution
pub const EMULATE_PREPARES: &str = "emulate_prepares";
/// Key for the connect timeout, in seconds
pub const CONNECT_TIMEOUT: &str = "connect_timeout";

/// A single driver option value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OptionValue {
    /// Boolean flag
    Bool(bool),
    /// Integer setting
    Int(i64),
    /// Free-form text setting
    Text(String),
}

impl From<bool> for OptionValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for OptionValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for OptionValue {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<&str> for OptionValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for OptionValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

/// How drivers report errors in addition to returning them
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorMode {
    /// Errors are returned to the caller
    #[default]
    Exception,
    /// Errors are returned and also logged at warn level
    Warning,
    /// Errors are returned without any logging
    Silent,
}

impl ErrorMode {
    fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "exception" => Some(Self::Exception),
            "warning" => Some(Self::Warning),
            "silent" => Some(Self::Silent),
            _ => None,
        }
    }
}

/// Shape of fetched rows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchMode {
    /// Rows keyed by column name
    #[default]
    Assoc,
    /// Rows as positional arrays
    Num,
}

impl FetchMode {
    fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "assoc" => Some(Self::Assoc),
            "num" => Some(Self::Num),
            _ => None,
        }
    }
}

/// Ordered, mergeable driver options
///
/// Unknown keys are kept and handed to the driver as-is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DriverOptions(BTreeMap<String, OptionValue>);

impl Default for DriverOptions {
    fn default() -> Self {
        let mut options = BTreeMap::new();
        options.insert(ERROR_MODE.to_string(), OptionValue::from("exception"));
        options.insert(FETCH_MODE.to_string(), OptionValue::from("assoc"));
        options.insert(EMULATE_PREPARES.to_string(), OptionValue::Bool(false));
        Self(options)
    }
}

impl DriverOptions {
    /// Options with no keys set, not even the defaults
    #[must_use]
    pub fn empty() -> Self {
        Self(BTreeMap::new())
    }

    /// Set a single option, replacing any previous value
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<OptionValue>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Merge `other` into these options; keys in `other` win
    pub fn merge(&mut self, other: Self) {
        self.0.extend(other.0);
    }

    /// Look up a raw option value
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&OptionValue> {
        self.0.get(key)
    }

    /// Iterate over all options in key order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &OptionValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of options set
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no options are set
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Error reporting mode; unrecognised values fall back to the default
    #[must_use]
    pub fn error_mode(&self) -> ErrorMode {
        match self.get(ERROR_MODE) {
            Some(OptionValue::Text(mode)) => ErrorMode::parse(mode).unwrap_or_default(),
            _ => ErrorMode::default(),
        }
    }

    /// Row shape for fetched results
    #[must_use]
    pub fn fetch_mode(&self) -> FetchMode {
        match self.get(FETCH_MODE) {
            Some(OptionValue::Text(mode)) => FetchMode::parse(mode).unwrap_or_default(),
            _ => FetchMode::default(),
        }
    }

    /// Whether server-side preparation is deferred until execution
    #[must_use]
    pub fn emulate_prepares(&self) -> bool {
        match self.get(EMULATE_PREPARES) {
            Some(OptionValue::Bool(flag)) => *flag,
            Some(OptionValue::Int(n)) => *n != 0,
            _ => false,
        }
    }

    /// Connect timeout, if a positive number of seconds is configured
    #[must_use]
    pub fn connect_timeout(&self) -> Option<Duration> {
        match self.get(CONNECT_TIMEOUT) {
            Some(OptionValue::Int(secs)) if *secs > 0 => {
                Some(Duration::from_secs(secs.unsigned_abs()))
            }
            _ => None,
        }
    }
}

impl<K: Into<String>, V: Into<OptionValue>> FromIterator<(K, V)> for DriverOptions {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = DriverOptions::default();
        assert_eq!(options.len(), 3);
        assert_eq!(options.error_mode(), ErrorMode::Exception);
        assert_eq!(options.fetch_mode(), FetchMode::Assoc);
        assert!(!options.emulate_prepares());
        assert_eq!(options.connect_timeout(), None);
    }

    #[test]
    fn test_merge_adds_and_overwrites() {
        let mut options = DriverOptions::empty().with("a", 1);
        options.merge(DriverOptions::empty().with("b", 2));
        assert_eq!(options.get("a"), Some(&OptionValue::Int(1)));
        assert_eq!(options.get("b"), Some(&OptionValue::Int(2)));

        options.merge(DriverOptions::empty().with("a", 2));
        assert_eq!(options.get("a"), Some(&OptionValue::Int(2)));
        assert_eq!(options.len(), 2);
    }

    #[test]
    fn test_typed_accessors() {
        let options = DriverOptions::default()
            .with(ERROR_MODE, "WARNING")
            .with(FETCH_MODE, "num")
            .with(EMULATE_PREPARES, true)
            .with(CONNECT_TIMEOUT, 5);
        assert_eq!(options.error_mode(), ErrorMode::Warning);
        assert_eq!(options.fetch_mode(), FetchMode::Num);
        assert!(options.emulate_prepares());
        assert_eq!(options.connect_timeout(), Some(Duration::from_secs(5)));
    }

    #[test]
    fn test_unknown_values_fall_back() {
        let options = DriverOptions::empty()
            .with(ERROR_MODE, "loud")
            .with(CONNECT_TIMEOUT, -3);
        assert_eq!(options.error_mode(), ErrorMode::Exception);
        assert_eq!(options.connect_timeout(), None);
    }

    #[test]
    fn test_deserialize_from_toml() {
        let options: DriverOptions =
            toml::from_str("error_mode = \"silent\"\nconnect_timeout = 3\nemulate_prepares = true")
                .unwrap();
        assert_eq!(options.error_mode(), ErrorMode::Silent);
        assert_eq!(options.connect_timeout(), Some(Duration::from_secs(3)));
        assert!(options.emulate_prepares());
    }
}
