//! Free-form transport properties (`"k1:v1,k2:v2"`)
//!
//! Malformed entries never fail startup: they are logged and skipped.

use std::collections::BTreeMap;
use std::str::FromStr;

use tracing::warn;

/// Parsed properties plus the entries that were skipped
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Properties {
    entries: BTreeMap<String, String>,
    malformed: Vec<String>,
}

impl Properties {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// Parse a typed value; unparsable values are logged and ignored
    pub fn parse_value<T: FromStr>(&self, key: &str) -> Option<T> {
        let raw = self.get(key)?;
        match raw.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(key, value = raw, "Ignoring property with unparsable value");
                None
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn malformed(&self) -> &[String] {
        &self.malformed
    }
}

/// Split on `,`, then each entry on its first `:`
///
/// Later duplicates overwrite earlier ones.
pub fn parse_properties(raw: &str) -> Properties {
    let mut properties = Properties::default();

    for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        match entry.split_once(':') {
            Some((key, value)) if !key.trim().is_empty() => {
                properties
                    .entries
                    .insert(key.trim().to_string(), value.trim().to_string());
            }
            _ => {
                warn!(entry, "Skipping malformed property, expected 'key:value'");
                properties.malformed.push(entry.to_string());
            }
        }
    }

    properties
}
