//! Flat parameter file loading.
//!
//! The parameter file is a list of shell-style `KEY=value` definitions. Some
//! values carry JSON written with single quotes (`{'env': 'prod'}`); those are
//! rewritten into valid JSON text before they reach the output document.

use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;

/// Immutable key/value view of the parameter file. Keys are lower-cased.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParameterSet {
    values: BTreeMap<String, String>,
}

impl ParameterSet {
    /// Load a parameter file. A missing or unreadable file yields an empty set.
    pub fn load(path: &Path) -> Self {
        let iter = match dotenvy::from_path_iter(path) {
            Ok(iter) => iter,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "parameter file unavailable, using empty defaults");
                return Self::default();
            }
        };

        let mut values = BTreeMap::new();
        for item in iter {
            match item {
                Ok((key, value)) => {
                    values.insert(key.to_ascii_lowercase(), value);
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "skipping malformed parameter line");
                }
            }
        }

        tracing::debug!(path = %path.display(), count = values.len(), "loaded parameters");
        Self { values }
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        Self {
            values: pairs
                .into_iter()
                .map(|(k, v)| (k.as_ref().to_ascii_lowercase(), v.into()))
                .collect(),
        }
    }

    /// Rewrite the named fields into valid JSON text.
    pub fn normalized(mut self, json_fields: &[String]) -> Self {
        for field in json_fields {
            let key = field.to_ascii_lowercase();
            if let Some(value) = self.values.get_mut(&key) {
                *value = normalize_json_like(value);
            }
        }
        self
    }

    /// Value for `key`, or the empty string when absent.
    pub fn get(&self, key: &str) -> &str {
        self.values
            .get(&key.to_ascii_lowercase())
            .map(String::as_str)
            .unwrap_or("")
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(&key.to_ascii_lowercase())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Convert single-quoted JSON-like text into valid JSON.
///
/// Single-quoted literals become double-quoted with embedded `"` escaped.
/// Double-quoted literals pass through untouched. If the rewrite still does
/// not parse, the trimmed input is returned unchanged.
pub fn normalize_json_like(value: &str) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return String::new();
    }

    let converted = requote(trimmed);
    if serde_json::from_str::<Value>(&converted).is_ok() {
        converted
    } else {
        tracing::warn!(value = trimmed, "value is not valid JSON after normalization, keeping as-is");
        trimmed.to_string()
    }
}

fn requote(input: &str) -> String {
    let mut out = String::with_capacity(input.len() + 8);
    let mut chars = input.chars();

    while let Some(c) = chars.next() {
        match c {
            '\'' => {
                out.push('"');
                while let Some(inner) = chars.next() {
                    match inner {
                        '\\' => match chars.next() {
                            Some('\'') => out.push('\''),
                            Some(escaped) => {
                                out.push('\\');
                                out.push(escaped);
                            }
                            None => out.push_str("\\\\"),
                        },
                        '"' => out.push_str("\\\""),
                        '\'' => {
                            out.push('"');
                            break;
                        }
                        other => out.push(other),
                    }
                }
            }
            '"' => {
                out.push('"');
                while let Some(inner) = chars.next() {
                    out.push(inner);
                    match inner {
                        '\\' => {
                            if let Some(escaped) = chars.next() {
                                out.push(escaped);
                            }
                        }
                        '"' => break,
                        _ => {}
                    }
                }
            }
            other => out.push(other),
        }
    }

    out
}
