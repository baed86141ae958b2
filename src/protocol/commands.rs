//! Command synonym table.
//!
//! Maps raw lower-cased command tokens (numeric replies, aliases) to the
//! canonical names handlers register under. Lookups fall back to the
//! token itself.

use serde::Deserialize;
use std::collections::HashMap;

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(from = "HashMap<String, String>")]
pub struct CommandTable {
    synonyms: HashMap<String, String>,
}

impl CommandTable {
    /// Create an empty table (every command maps to itself).
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a synonym. Both sides are stored lower-cased.
    pub fn insert(&mut self, raw: &str, canonical: &str) {
        self.synonyms
            .insert(raw.to_lowercase(), canonical.to_lowercase());
    }

    /// Canonical name for a lower-cased command token.
    pub fn canonical<'a>(&'a self, raw: &'a str) -> &'a str {
        self.synonyms.get(raw).map(String::as_str).unwrap_or(raw)
    }

    pub fn is_empty(&self) -> bool {
        self.synonyms.is_empty()
    }
}

impl From<HashMap<String, String>> for CommandTable {
    fn from(map: HashMap<String, String>) -> Self {
        let mut table = Self::new();
        for (raw, canonical) in &map {
            table.insert(raw, canonical);
        }
        table
    }
}

impl<'a> FromIterator<(&'a str, &'a str)> for CommandTable {
    fn from_iter<I: IntoIterator<Item = (&'a str, &'a str)>>(iter: I) -> Self {
        let mut table = Self::new();
        for (raw, canonical) in iter {
            table.insert(raw, canonical);
        }
        table
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_fallback() {
        let table = CommandTable::new();
        assert_eq!(table.canonical("ping"), "ping");
        assert!(table.is_empty());
    }

    #[test]
    fn test_insert_lowercases() {
        let mut table = CommandTable::new();
        table.insert("RPL_WELCOME", "Welcome");
        assert_eq!(table.canonical("rpl_welcome"), "welcome");
        assert!(!table.is_empty());
    }

    #[test]
    fn test_deserialize_from_toml_table() {
        #[derive(Deserialize)]
        struct Wrapper {
            commands: CommandTable,
        }

        let wrapper: Wrapper = toml::from_str(
            r#"
            [commands]
            "001" = "welcome"
            "376" = "EndOfMotd"
        "#,
        )
        .unwrap();

        assert_eq!(wrapper.commands.canonical("001"), "welcome");
        assert_eq!(wrapper.commands.canonical("376"), "endofmotd");
        assert_eq!(wrapper.commands.canonical("join"), "join");
    }
}
