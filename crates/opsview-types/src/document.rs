//! Tagged-variant entity documents.
//!
//! Entity state arrives from the orchestration API as loosely-typed JSON.
//! [`Document`] models it as a closed set of variants so the delta engine
//! can express every change with a small, fixed set of patch operations.
//!
//! Documents serialize to and from plain JSON. Map keys are kept in
//! [`BTreeMap`] order, so two documents with the same content always
//! serialize identically.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};

/// A nested, ordered-key document describing one entity's state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Document {
    /// JSON `null`.
    #[default]
    Null,
    /// A boolean scalar.
    Bool(bool),
    /// A numeric scalar, kept in its exact JSON representation.
    Number(Number),
    /// A string scalar.
    String(String),
    /// An ordered sequence of documents.
    Sequence(Vec<Document>),
    /// A map from string keys to documents, ordered by key.
    Map(BTreeMap<String, Document>),
}

impl Document {
    /// Build a map document from key/value pairs.
    pub fn map<K, I>(entries: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Self)>,
    {
        Self::Map(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Short name of the variant, used in error messages.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Number(_) => "number",
            Self::String(_) => "string",
            Self::Sequence(_) => "sequence",
            Self::Map(_) => "map",
        }
    }

    /// Look up a key when this document is a map.
    pub fn get(&self, key: &str) -> Option<&Self> {
        match self {
            Self::Map(entries) => entries.get(key),
            _ => None,
        }
    }

    /// Return the string value when this document is a string scalar.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Return the value as `i64` when this document is an integral number.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Number(n) => n.as_i64(),
            _ => None,
        }
    }
}

impl From<bool> for Document {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for Document {
    fn from(value: i64) -> Self {
        Self::Number(value.into())
    }
}

impl From<u64> for Document {
    fn from(value: u64) -> Self {
        Self::Number(value.into())
    }
}

impl From<&str> for Document {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

impl From<String> for Document {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<Vec<Self>> for Document {
    fn from(value: Vec<Self>) -> Self {
        Self::Sequence(value)
    }
}

impl From<BTreeMap<String, Self>> for Document {
    fn from(value: BTreeMap<String, Self>) -> Self {
        Self::Map(value)
    }
}

impl From<Value> for Document {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Bool(b),
            Value::Number(n) => Self::Number(n),
            Value::String(s) => Self::String(s),
            Value::Array(items) => Self::Sequence(items.into_iter().map(Self::from).collect()),
            Value::Object(entries) => {
                Self::Map(entries.into_iter().map(|(k, v)| (k, Self::from(v))).collect())
            }
        }
    }
}

impl From<Document> for Value {
    fn from(doc: Document) -> Self {
        match doc {
            Document::Null => Self::Null,
            Document::Bool(b) => Self::Bool(b),
            Document::Number(n) => Self::Number(n),
            Document::String(s) => Self::String(s),
            Document::Sequence(items) => Self::Array(items.into_iter().map(Self::from).collect()),
            Document::Map(entries) => {
                Self::Object(entries.into_iter().map(|(k, v)| (k, Self::from(v))).collect())
            }
        }
    }
}
