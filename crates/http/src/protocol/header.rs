//! Case-insensitive, order-preserving header storage.
//!
//! [`HeaderBag`] keys every header by its lowercase name but remembers the casing the
//! name was first stored with, so serialized output looks the way application code
//! wrote it. Repeated headers keep their values in insertion order, which matters for
//! headers such as `Set-Cookie` that must be emitted as separate lines.
//!
//! Names and values are validated on the way in: anything that could terminate a
//! header line early (CR, LF, NUL and the other control bytes) is rejected with a
//! [`HeaderError`] instead of being silently stripped.

use http::{HeaderName, HeaderValue};
use indexmap::IndexMap;

use crate::ensure;
use crate::protocol::HeaderError;

/// A single header name with every value stored under it.
#[derive(Debug, Clone, PartialEq, Eq)]
struct HeaderEntry {
    name: String,
    values: Vec<String>,
}

/// Multi-value header container with case-insensitive lookups.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderBag {
    entries: IndexMap<String, HeaderEntry>,
}

impl HeaderBag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self { entries: IndexMap::with_capacity(capacity) }
    }

    /// Stores `value` under `name`, replacing any values already stored there.
    ///
    /// # Errors
    ///
    /// Returns [`HeaderError`] if the name is not a valid token or the value contains
    /// control characters.
    pub fn set(&mut self, name: &str, value: &str) -> Result<(), HeaderError> {
        self.insert(name, value, false)
    }

    /// Adds `value` after the values already stored under `name`.
    ///
    /// # Errors
    ///
    /// Same as [`HeaderBag::set`].
    pub fn append(&mut self, name: &str, value: &str) -> Result<(), HeaderError> {
        self.insert(name, value, true)
    }

    fn insert(&mut self, name: &str, value: &str, append: bool) -> Result<(), HeaderError> {
        validate_name(name)?;
        validate_value(name, value)?;

        let entry = self
            .entries
            .entry(name.to_ascii_lowercase())
            .or_insert_with(|| HeaderEntry { name: name.to_string(), values: Vec::with_capacity(1) });

        if !append {
            entry.values.clear();
        }
        entry.values.push(value.to_string());
        Ok(())
    }

    /// Returns the first value stored under `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.lookup(name).and_then(|entry| entry.values.first()).map(String::as_str)
    }

    /// Returns every value stored under `name`, in insertion order.
    pub fn get_all(&self, name: &str) -> &[String] {
        self.lookup(name).map(|entry| entry.values.as_slice()).unwrap_or_default()
    }

    pub fn has(&self, name: &str) -> bool {
        self.lookup(name).is_some()
    }

    /// Removes `name` and returns the values it held.
    pub fn remove(&mut self, name: &str) -> Option<Vec<String>> {
        self.entries.shift_remove(&name.to_ascii_lowercase()).map(|entry| entry.values)
    }

    /// Returns the stored casing of `name`, as first assigned.
    pub fn original_name(&self, name: &str) -> Option<&str> {
        self.lookup(name).map(|entry| entry.name.as_str())
    }

    /// Number of distinct header names.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Iterates `(name, value)` pairs, one per stored value, in insertion order.
    ///
    /// Names are yielded with their preserved casing.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .values()
            .flat_map(|entry| entry.values.iter().map(move |value| (entry.name.as_str(), value.as_str())))
    }

    fn lookup(&self, name: &str) -> Option<&HeaderEntry> {
        // fast path: most lookups already use lowercase names
        if !name.bytes().any(|b| b.is_ascii_uppercase()) {
            return self.entries.get(name);
        }
        self.entries.get(&name.to_ascii_lowercase())
    }
}

fn validate_name(name: &str) -> Result<(), HeaderError> {
    ensure!(HeaderName::from_bytes(name.as_bytes()).is_ok(), HeaderError::invalid_name(name));
    Ok(())
}

fn validate_value(name: &str, value: &str) -> Result<(), HeaderError> {
    // `HeaderValue` rejects every control byte except horizontal tab
    ensure!(HeaderValue::from_bytes(value.as_bytes()).is_ok(), HeaderError::invalid_value(name));
    Ok(())
}
