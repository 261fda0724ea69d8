//! # Alias Resolution
//!
//! Maps free-form user text to canonical entity keys.
//!
//! ## Tiers
//!
//! | Tier | Rule |
//! |------|------|
//! | exact | normalized input equals a key or one of its aliases |
//! | composite | input is `prefix+suffix` or `suffix+prefix` for a `prefix(suffix)` key |
//! | fuzzy | space-stripped substring match, first entry in table order wins |
//! | fallback | normalized input returned unchanged |
//!
//! Normalization trims, maps full-width brackets to ASCII, and lower-cases.
//! Resolution never fails; use [`resolve_known`] to tell a miss from a hit.
//!
//! ```rust,ignore
//! use bawiki_core::{resolve, AliasTable};
//!
//! let table = AliasTable::from_json_str(r#"{"Shiroko": ["白子", "shiroko"]}"#)?;
//! assert_eq!(resolve(" ShiroKo ", &table), "Shiroko");
//! ```

mod registry;
mod resolver;
mod table;

pub use registry::AliasRegistry;
pub use resolver::{normalize, resolve, resolve_known, Resolution, Tier};
pub use table::{AliasEntry, AliasTable};
