// ── Model resolver ──
//
// Maps free-text vendor model strings onto canonical device codes using
// an ordered table. Exact matches win outright; otherwise the first entry
// whose key and input overlap (either direction) decides, which is why
// more specific keys must come first.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

pub const UNKNOWN_PREFIX: &str = "UNKNOWN_";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelEntry {
    pub key: String,
    pub code: String,
}

#[derive(Debug, Clone)]
pub struct ModelMappingTable {
    entries: Vec<ModelEntry>,
    display_names: IndexMap<String, String>,
}

fn normalize_key(raw: &str) -> String {
    raw.trim().to_uppercase()
}

impl ModelMappingTable {
    /// Build a table, rejecting any entry that a more general earlier
    /// entry would shadow.
    pub fn new<I, K, C>(entries: I) -> Result<Self, CoreError>
    where
        I: IntoIterator<Item = (K, C)>,
        K: AsRef<str>,
        C: Into<String>,
    {
        let entries: Vec<ModelEntry> = entries
            .into_iter()
            .map(|(k, c)| ModelEntry {
                key: normalize_key(k.as_ref()),
                code: c.into(),
            })
            .filter(|e| !e.key.is_empty())
            .collect();

        for (i, later) in entries.iter().enumerate() {
            let shadowing = entries[..i]
                .iter()
                .find(|earlier| later.key.contains(&earlier.key) && later.code != earlier.code);
            if let Some(earlier) = shadowing {
                return Err(CoreError::TableOrdering {
                    earlier: earlier.key.clone(),
                    later: later.key.clone(),
                });
            }
        }

        Ok(Self {
            entries,
            display_names: IndexMap::new(),
        })
    }

    pub fn with_display_names<I, C, N>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = (C, N)>,
        C: Into<String>,
        N: Into<String>,
    {
        self.display_names = names
            .into_iter()
            .map(|(c, n)| (c.into(), n.into()))
            .collect();
        self
    }

    /// The shipped table, most specific keys first.
    pub fn builtin() -> Self {
        let entries = [
            ("HUAWEI ECHOLIFE HG8145V5 SMALL", "MOD005"),
            ("ECHOLIFE HG8145V5 SMALL", "MOD005"),
            ("HG8145V5 SMALL", "MOD005"),
            ("HUAWEI ECHOLIFE HG8145V5", "MOD004"),
            ("ECHOLIFE HG8145V5", "MOD004"),
            ("HUAWEI HG8145V5", "MOD004"),
            ("HG8145V5", "MOD004"),
            ("HUAWEI HG8145X6-10", "MOD003"),
            ("HG8145X6-10", "MOD003"),
            // firmware reports the hyphen as a literal escape
            ("HG8145X6\\x2d10", "MOD003"),
            ("HUAWEI HG8145X6", "MOD007"),
            ("HG8145X6", "MOD007"),
            ("ZTE ZXHN F670L", "MOD002"),
            ("ZXHN F670L", "MOD002"),
            ("ZTE F670L", "MOD002"),
            ("F670L", "MOD002"),
            ("HG6145F1", "MOD008"),
            ("FIBERHOME HG6145F", "MOD001"),
            ("HG6145F", "MOD001"),
            ("GRANDSTREAM HT818", "MOD006"),
            ("GS-HT818", "MOD006"),
            ("HT818", "MOD006"),
        ];
        let display = [
            ("MOD001", "HG6145F"),
            ("MOD002", "F670L"),
            ("MOD003", "HG8145X6-10"),
            ("MOD004", "HG8145V5"),
            ("MOD005", "HG8145V5 SMALL"),
            ("MOD006", "HT818"),
            ("MOD007", "HG8145X6"),
            ("MOD008", "HG6145F1"),
        ];

        let entries = entries
            .iter()
            .map(|(k, c)| ModelEntry {
                key: normalize_key(k),
                code: (*c).to_owned(),
            })
            .collect();
        Self {
            entries,
            display_names: IndexMap::new(),
        }
        .with_display_names(display)
    }

    pub fn entries(&self) -> &[ModelEntry] {
        &self.entries
    }

    /// Resolve a raw model string to a canonical code, or `UNKNOWN_<raw>`.
    pub fn resolve(&self, raw: &str) -> String {
        let input = normalize_key(raw);
        if input.is_empty() {
            return UNKNOWN_PREFIX.to_owned();
        }

        if let Some(entry) = self.entries.iter().find(|e| e.key == input) {
            return entry.code.clone();
        }

        self.entries
            .iter()
            .find(|e| input.contains(&e.key) || e.key.contains(&input))
            .map_or_else(
                || format!("{UNKNOWN_PREFIX}{}", raw.trim()),
                |e| e.code.clone(),
            )
    }

    pub fn display_name(&self, code: &str) -> Option<&str> {
        self.display_names.get(code).map(String::as_str)
    }
}

impl Default for ModelMappingTable {
    fn default() -> Self {
        Self::builtin()
    }
}

pub fn is_unknown(code: &str) -> bool {
    code.starts_with(UNKNOWN_PREFIX)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn builtin_table_passes_its_own_validation() {
        let table = ModelMappingTable::builtin();
        let pairs: Vec<(String, String)> = table
            .entries()
            .iter()
            .map(|e| (e.key.clone(), e.code.clone()))
            .collect();
        assert!(ModelMappingTable::new(pairs).is_ok());
    }

    #[test]
    fn every_key_resolves_to_its_own_code() {
        let table = ModelMappingTable::builtin();
        for entry in table.entries() {
            assert_eq!(table.resolve(&entry.key), entry.code, "key {}", entry.key);
        }
    }

    #[test]
    fn specific_variant_beats_family() {
        let table = ModelMappingTable::builtin();
        assert_eq!(table.resolve("HUAWEI HG8145X6-10"), "MOD003");
        assert_eq!(table.resolve("hg8145x6"), "MOD007");
        assert_eq!(table.resolve("HG8145X6\\x2d10"), "MOD003");
        assert_eq!(table.resolve("EchoLife HG8145V5 Small rev2"), "MOD005");
        assert_eq!(table.resolve("HG6145F1"), "MOD008");
        assert_eq!(table.resolve("  F670L "), "MOD002");
        assert_eq!(table.resolve("ht818"), "MOD006");
    }

    #[test]
    fn unknown_inputs_keep_raw_text() {
        let table = ModelMappingTable::builtin();
        assert_eq!(table.resolve(""), "UNKNOWN_");
        assert_eq!(table.resolve("   "), "UNKNOWN_");
        assert_eq!(table.resolve("FOO-9999"), "UNKNOWN_FOO-9999");
        assert!(is_unknown(&table.resolve("Nokia G-240W")));
    }

    #[test]
    fn shadowed_entry_is_rejected() {
        let err = ModelMappingTable::new([("HG8145X6", "MOD007"), ("HG8145X6-10", "MOD003")])
            .unwrap_err();
        assert!(
            matches!(err, CoreError::TableOrdering { ref earlier, .. } if earlier == "HG8145X6"),
            "got {err:?}"
        );
    }

    #[test]
    fn same_code_overlap_is_allowed() {
        assert!(ModelMappingTable::new([("F670L", "MOD002"), ("ZTE F670L", "MOD002")]).is_ok());
    }

    #[test]
    fn display_names_cover_known_codes() {
        let table = ModelMappingTable::builtin();
        assert_eq!(table.display_name("MOD003"), Some("HG8145X6-10"));
        assert_eq!(table.display_name("UNKNOWN_X"), None);
    }
}
