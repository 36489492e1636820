// ── Normalized records ──
//
// The one shape every adapter returns: sections of scalars, single
// mappings or ordered lists of mappings, plus a device error block.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// A node of the normalized value tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Int(i64),
    Text(String),
    Map(IndexMap<String, Value>),
    List(Vec<Value>),
}

impl Value {
    /// Scalar from raw text. All-digit strings become integers when they
    /// fit; everything else stays text.
    pub fn scalar(raw: &str) -> Self {
        let trimmed = raw.trim();
        if !trimmed.is_empty() && trimmed.bytes().all(|b| b.is_ascii_digit()) {
            if let Ok(n) = trimmed.parse::<i64>() {
                return Self::Int(n);
            }
        }
        Self::Text(trimmed.to_owned())
    }

    pub fn as_map(&self) -> Option<&IndexMap<String, Value>> {
        match self {
            Self::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Self::List(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(n) => Some(*n),
            Self::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Render a scalar as text; `None` for containers and blank strings.
    pub fn as_text(&self) -> Option<String> {
        match self {
            Self::Int(n) => Some(n.to_string()),
            Self::Text(s) if !s.trim().is_empty() => Some(s.trim().to_owned()),
            _ => None,
        }
    }

    /// Mappings held by this node: itself, or each mapping in a list.
    pub fn maps(&self) -> Vec<&IndexMap<String, Value>> {
        match self {
            Self::Map(m) => vec![m],
            Self::List(items) => items.iter().filter_map(Value::as_map).collect(),
            _ => Vec::new(),
        }
    }

    /// Convert decoded JSON into the same tree the markup normalizer emits.
    /// Nulls vanish, booleans become 0/1, numeric strings are cast.
    pub fn from_json(json: &serde_json::Value) -> Option<Self> {
        match json {
            serde_json::Value::Null => None,
            serde_json::Value::Bool(b) => Some(Self::Int(i64::from(*b))),
            serde_json::Value::Number(n) => Some(
                n.as_i64()
                    .map_or_else(|| Self::Text(n.to_string()), Self::Int),
            ),
            serde_json::Value::String(s) => Some(Self::scalar(s)),
            serde_json::Value::Array(items) => {
                Some(Self::List(items.iter().filter_map(Self::from_json).collect()))
            }
            serde_json::Value::Object(obj) => Some(Self::Map(
                obj.iter()
                    .filter_map(|(k, v)| Some((k.clone(), Self::from_json(v)?)))
                    .collect(),
            )),
        }
    }
}

/// Device-reported error block. Always present; fields are `None` when
/// the device sent nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBlock {
    pub param: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    #[serde(rename = "string")]
    pub message: Option<String>,
    pub id: Option<String>,
}

impl ErrorBlock {
    pub fn is_empty(&self) -> bool {
        self.param.is_none() && self.kind.is_none() && self.message.is_none() && self.id.is_none()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedRecord {
    pub sections: IndexMap<String, Value>,
    pub error: ErrorBlock,
}

impl NormalizedRecord {
    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    pub fn section(&self, name: &str) -> Option<&Value> {
        self.sections.get(name)
    }

    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        self.sections.insert(name.into(), value);
    }

    /// Fold another record in. Later sections with the same name replace
    /// earlier ones; the first non-empty error block wins.
    pub fn merge(&mut self, other: NormalizedRecord) {
        self.sections.extend(other.sections);
        if self.error.is_empty() {
            self.error = other.error;
        }
    }

    /// First scalar found under any of `keys`, searching sections in order
    /// and, within list sections, entries in order.
    pub fn find_text(&self, keys: &[&str]) -> Option<String> {
        keys.iter().find_map(|key| {
            self.sections.iter().find_map(|(name, value)| {
                if name == key {
                    if let Some(text) = value.as_text() {
                        return Some(text);
                    }
                }
                value
                    .maps()
                    .into_iter()
                    .find_map(|m| m.get(*key).and_then(Value::as_text))
            })
        })
    }

    /// Every mapping in every section, in order.
    pub fn all_maps(&self) -> Vec<&IndexMap<String, Value>> {
        self.sections.values().flat_map(Value::maps).collect()
    }
}
