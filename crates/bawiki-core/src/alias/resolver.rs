use serde::Serialize;

use super::table::{AliasEntry, AliasTable};

/// Which matching tier produced a [`Resolution`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Exact,
    Composite,
    Fuzzy,
    Fallback,
}

/// Resolved key plus the tier that matched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Resolution {
    pub key: String,
    pub tier: Tier,
}

impl Resolution {
    pub fn is_match(&self) -> bool {
        self.tier != Tier::Fallback
    }

    /// Run every tier against `table`.
    pub fn of(input: &str, table: &AliasTable) -> Self {
        let normalized = normalize(input);

        let matched = exact(&normalized, table)
            .map(|entry| (entry, Tier::Exact))
            .or_else(|| composite(&normalized, table).map(|entry| (entry, Tier::Composite)))
            .or_else(|| fuzzy(&normalized, table).map(|entry| (entry, Tier::Fuzzy)));

        match matched {
            Some((entry, tier)) => {
                tracing::trace!(input, key = entry.key(), ?tier, "alias resolved");
                Self {
                    key: entry.key().to_string(),
                    tier,
                }
            }
            None => Self {
                key: normalized,
                tier: Tier::Fallback,
            },
        }
    }
}

/// Trim, map full-width brackets to ASCII, lower-case.
pub fn normalize(input: &str) -> String {
    input
        .trim()
        .replace('（', "(")
        .replace('）', ")")
        .to_lowercase()
}

/// Canonical key for `input`, or the normalized input when nothing matches.
pub fn resolve(input: &str, table: &AliasTable) -> String {
    Resolution::of(input, table).key
}

/// Canonical key for `input`, or `None` when only the fallback tier applies.
pub fn resolve_known(input: &str, table: &AliasTable) -> Option<String> {
    let resolution = Resolution::of(input, table);
    resolution.is_match().then_some(resolution.key)
}

fn exact<'t>(input: &str, table: &'t AliasTable) -> Option<&'t AliasEntry> {
    table
        .entries()
        .iter()
        .find(|entry| entry.variants().any(|variant| variant == input))
}

fn composite<'t>(input: &str, table: &'t AliasTable) -> Option<&'t AliasEntry> {
    table.entries().iter().find(|entry| {
        let Some((prefix, suffix)) = entry.bracket_parts() else {
            return false;
        };

        let prefix_aliases = table
            .entry_by_normalized_key(prefix)
            .map(AliasEntry::normalized_aliases)
            .unwrap_or_default();
        let prefixes = || std::iter::once(prefix).chain(prefix_aliases.iter().map(String::as_str));

        prefixes().any(|p| {
            table.suffix_variants(suffix).any(|s| {
                input.len() == p.len() + s.len()
                    && ((input.starts_with(p) && input.ends_with(s))
                        || (input.starts_with(s) && input.ends_with(p)))
            })
        })
    })
}

fn fuzzy<'t>(input: &str, table: &'t AliasTable) -> Option<&'t AliasEntry> {
    let input = strip_spaces(input);
    if input.is_empty() {
        return None;
    }

    table.entries().iter().find(|entry| {
        entry
            .variants()
            .map(strip_spaces)
            .filter(|variant| !variant.is_empty())
            .any(|variant| variant.contains(&input) || input.contains(&variant))
    })
}

fn strip_spaces(value: &str) -> String {
    value.chars().filter(|c| !c.is_whitespace()).collect()
}
