use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde_json::Value;

use crate::error::AliasError;

use super::resolver::normalize;

/// One canonical key and its aliases, with normalized forms precomputed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AliasEntry {
    key: String,
    aliases: Vec<String>,
    normalized_key: String,
    normalized_aliases: Vec<String>,
}

impl AliasEntry {
    pub fn new<I, S>(key: impl Into<String>, aliases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let key = key.into();
        let aliases: Vec<String> = aliases.into_iter().map(Into::into).collect();
        let normalized_key = normalize(&key);
        let normalized_aliases = aliases.iter().map(|alias| normalize(alias)).collect();
        Self {
            key,
            aliases,
            normalized_key,
            normalized_aliases,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn aliases(&self) -> &[String] {
        &self.aliases
    }

    pub(crate) fn normalized_key(&self) -> &str {
        &self.normalized_key
    }

    pub(crate) fn normalized_aliases(&self) -> &[String] {
        &self.normalized_aliases
    }

    /// Normalized key followed by normalized aliases.
    pub(crate) fn variants(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.normalized_key.as_str())
            .chain(self.normalized_aliases.iter().map(String::as_str))
    }

    /// `(prefix, suffix)` for keys shaped `prefix(suffix)`, normalized.
    pub(crate) fn bracket_parts(&self) -> Option<(&str, &str)> {
        let inner = self.normalized_key.strip_suffix(')')?;
        let open = inner.rfind('(')?;
        let prefix = inner[..open].trim_end();
        let suffix = inner[open + 1..].trim();
        if prefix.is_empty() || suffix.is_empty() {
            return None;
        }
        Some((prefix, suffix))
    }
}

/// Ordered alias table. Entry order is the tie-break for ambiguous matches.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AliasTable {
    entries: Vec<AliasEntry>,
    by_key: HashMap<String, usize>,
    by_normalized_key: HashMap<String, usize>,
    suffix_aliases: HashMap<String, Vec<String>>,
}

impl AliasTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entry, or replace the aliases of an existing key in place.
    ///
    /// Keys are compared verbatim, so `Mika` and `mika` are two entries and
    /// table order decides between them.
    pub fn insert<I, S>(&mut self, key: impl Into<String>, aliases: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let entry = AliasEntry::new(key, aliases);
        match self.by_key.get(entry.key()) {
            Some(&index) => self.entries[index] = entry,
            None => {
                let index = self.entries.len();
                self.by_key.insert(entry.key().to_string(), index);
                self.by_normalized_key
                    .entry(entry.normalized_key().to_string())
                    .or_insert(index);
                self.entries.push(entry);
            }
        }
    }

    pub fn with_entry<I, S>(mut self, key: impl Into<String>, aliases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.insert(key, aliases);
        self
    }

    /// Register alternate spellings for a bracketed suffix, e.g. `泳装` → `水着`.
    pub fn insert_suffix_aliases<I, S>(&mut self, suffix: &str, aliases: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let normalized: Vec<String> = aliases
            .into_iter()
            .map(|alias| {
                let alias: String = alias.into();
                normalize(&alias)
            })
            .filter(|alias| !alias.is_empty())
            .collect();
        self.suffix_aliases
            .entry(normalize(suffix))
            .or_default()
            .extend(normalized);
    }

    pub fn with_suffix_aliases<I, S>(mut self, suffix: &str, aliases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.insert_suffix_aliases(suffix, aliases);
        self
    }

    /// Parse `{"Key": ["alias", ...] | "alias", ...}`, keeping document order.
    pub fn from_json_str(json: &str) -> Result<Self, AliasError> {
        let value: Value = serde_json::from_str(json)?;
        Self::from_value(&value)
    }

    pub fn from_value(value: &Value) -> Result<Self, AliasError> {
        let mut table = Self::new();
        for (key, aliases) in object_entries(value)? {
            table.insert(key, aliases);
        }
        Ok(table)
    }

    /// Read a JSON alias table from disk.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, AliasError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|source| AliasError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let table = Self::from_json_str(&raw)?;
        tracing::debug!(path = %path.display(), entries = table.len(), "loaded alias table");
        Ok(table)
    }

    /// Merge suffix aliases from a JSON object shaped like an alias table.
    pub fn load_suffix_aliases(&mut self, value: &Value) -> Result<(), AliasError> {
        for (suffix, aliases) in object_entries(value)? {
            self.insert_suffix_aliases(&suffix, aliases);
        }
        Ok(())
    }

    pub fn entries(&self) -> &[AliasEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// True when `key` matches a canonical key of this table after normalization.
    pub fn contains_key(&self, key: &str) -> bool {
        self.by_normalized_key.contains_key(&normalize(key))
    }

    /// First entry in table order whose key normalizes to `normalized`.
    pub(crate) fn entry_by_normalized_key(&self, normalized: &str) -> Option<&AliasEntry> {
        self.by_normalized_key.get(normalized).map(|&index| &self.entries[index])
    }

    pub(crate) fn suffix_variants<'a>(&'a self, suffix: &'a str) -> impl Iterator<Item = &'a str> {
        std::iter::once(suffix).chain(
            self.suffix_aliases
                .get(suffix)
                .into_iter()
                .flatten()
                .map(String::as_str),
        )
    }
}

fn object_entries(value: &Value) -> Result<Vec<(String, Vec<String>)>, AliasError> {
    let object = value.as_object().ok_or(AliasError::NotAnObject {
        found: json_kind(value),
    })?;

    object
        .iter()
        .map(|(key, aliases)| {
            let aliases = match aliases {
                Value::String(alias) => vec![alias.clone()],
                Value::Array(items) => items
                    .iter()
                    .map(|item| item.as_str().map(str::to_string))
                    .collect::<Option<Vec<_>>>()
                    .ok_or_else(|| AliasError::InvalidEntry { key: key.clone() })?,
                Value::Null => Vec::new(),
                _ => return Err(AliasError::InvalidEntry { key: key.clone() }),
            };
            Ok((key.clone(), aliases))
        })
        .collect()
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
