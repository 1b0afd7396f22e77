//! Connection descriptors
//!
//! A descriptor is the connection string handed to a driver, in the form
//! `mysql:host=db.local;port=3306;dbname=app;charset=utf8mb4`. It carries
//! only addressing information; credentials travel separately.

use std::fmt;

/// A protocol identifier followed by ordered `key=value` segments
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Descriptor {
    protocol: String,
    segments: Vec<(String, String)>,
}

impl Descriptor {
    /// Start a descriptor for the given protocol with no segments
    #[must_use]
    pub fn new(protocol: impl Into<String>) -> Self {
        Self {
            protocol: protocol.into(),
            segments: Vec::new(),
        }
    }

    /// Append a segment unconditionally
    pub fn push(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.segments.push((key.into(), value.into()));
    }

    /// Append a segment only when `value` is non-empty
    pub fn push_non_empty(&mut self, key: &str, value: &str) {
        if !value.is_empty() {
            self.push(key, value);
        }
    }

    /// Protocol identifier, e.g. `mysql`
    #[must_use]
    pub fn protocol(&self) -> &str {
        &self.protocol
    }

    /// First value for `key`, if present
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.segments
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

impl fmt::Display for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:", self.protocol)?;
        for (i, (key, value)) in self.segments.iter().enumerate() {
            if i > 0 {
                f.write_str(";")?;
            }
            write!(f, "{key}={value}")?;
        }
        Ok(())
    }
}
