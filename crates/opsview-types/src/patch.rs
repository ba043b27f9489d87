//! Patch operations describing the change between two documents.
//!
//! A [`Patch`] is an ordered list of [`PatchOp`]s. Each operation addresses
//! a node by its path from the document root and applies one of five
//! structural edits. Operations must be applied in order: earlier edits
//! can shift the indices later edits refer to.
//!
//! # Wire format
//!
//! ```json
//! [
//!   {"op": "replace", "path": ["nodes"], "value": 4},
//!   {"op": "set_key", "path": [], "key": "region", "value": "eu"},
//!   {"op": "remove_at", "path": ["pods"], "index": 2}
//! ]
//! ```

use serde::{Deserialize, Serialize};

use crate::document::Document;

/// One step in a path from the document root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathSegment {
    /// A key inside a map.
    Key(String),
    /// A position inside a sequence.
    Index(usize),
}

impl From<&str> for PathSegment {
    fn from(key: &str) -> Self {
        Self::Key(key.to_owned())
    }
}

impl From<usize> for PathSegment {
    fn from(index: usize) -> Self {
        Self::Index(index)
    }
}

/// A single structural edit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum PatchOp {
    /// Insert or overwrite `key` in the map at `path`.
    SetKey {
        /// Path to the map.
        path: Vec<PathSegment>,
        /// Key to set.
        key: String,
        /// New value.
        value: Document,
    },
    /// Remove `key` from the map at `path`.
    DeleteKey {
        /// Path to the map.
        path: Vec<PathSegment>,
        /// Key to remove.
        key: String,
    },
    /// Insert `value` at `index` in the sequence at `path`.
    InsertAt {
        /// Path to the sequence.
        path: Vec<PathSegment>,
        /// Insert position (may equal the sequence length).
        index: usize,
        /// Inserted value.
        value: Document,
    },
    /// Remove the element at `index` from the sequence at `path`.
    RemoveAt {
        /// Path to the sequence.
        path: Vec<PathSegment>,
        /// Position to remove.
        index: usize,
    },
    /// Replace the node at `path` (the whole document when `path` is empty).
    Replace {
        /// Path to the replaced node.
        path: Vec<PathSegment>,
        /// Replacement value.
        value: Document,
    },
}

impl PatchOp {
    /// The path this operation addresses.
    pub fn path(&self) -> &[PathSegment] {
        match self {
            Self::SetKey { path, .. }
            | Self::DeleteKey { path, .. }
            | Self::InsertAt { path, .. }
            | Self::RemoveAt { path, .. }
            | Self::Replace { path, .. } => path,
        }
    }
}

/// An ordered list of edits. The empty patch is the no-op patch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Patch {
    ops: Vec<PatchOp>,
}

impl Patch {
    /// Create an empty patch.
    pub const fn new() -> Self {
        Self { ops: Vec::new() }
    }

    /// Append an operation.
    pub fn push(&mut self, op: PatchOp) {
        self.ops.push(op);
    }

    /// The operations in application order.
    pub fn ops(&self) -> &[PatchOp] {
        &self.ops
    }

    /// Number of operations.
    pub const fn len(&self) -> usize {
        self.ops.len()
    }

    /// Whether this patch changes nothing.
    pub const fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

impl From<Vec<PatchOp>> for Patch {
    fn from(ops: Vec<PatchOp>) -> Self {
        Self { ops }
    }
}

impl<'a> IntoIterator for &'a Patch {
    type Item = &'a PatchOp;
    type IntoIter = std::slice::Iter<'a, PatchOp>;

    fn into_iter(self) -> Self::IntoIter {
        self.ops.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ops_serialize_with_op_tag() {
        let patch = Patch::from(vec![
            PatchOp::Replace {
                path: vec!["nodes".into()],
                value: Document::from(4_i64),
            },
            PatchOp::RemoveAt {
                path: vec!["pods".into()],
                index: 2,
            },
        ]);

        let json = serde_json::to_value(&patch).unwrap_or_default();
        assert_eq!(json[0]["op"], "replace");
        assert_eq!(json[0]["path"][0], "nodes");
        assert_eq!(json[0]["value"], 4);
        assert_eq!(json[1]["op"], "remove_at");
        assert_eq!(json[1]["index"], 2);
    }

    #[test]
    fn mixed_paths_deserialize() {
        let json = r#"[{"op":"delete_key","path":["nodes",0],"key":"labels"}]"#;
        let patch: Patch = serde_json::from_str(json).unwrap_or_default();
        assert_eq!(patch.len(), 1);
        assert_eq!(
            patch.ops().first().map(PatchOp::path),
            Some(&[PathSegment::Key("nodes".to_owned()), PathSegment::Index(0)][..])
        );
    }

    #[test]
    fn empty_patch_is_empty_array() {
        let json = serde_json::to_string(&Patch::new()).unwrap_or_default();
        assert_eq!(json, "[]");
    }
}
