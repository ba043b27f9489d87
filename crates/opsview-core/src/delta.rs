//! Structural diff and patch application over [`Document`]s.
//!
//! [`diff`] walks both documents once and emits the smallest edits it can
//! find without searching for moves: maps are compared key by key and
//! sequences position by position, so the cost is linear in document size.
//! Applying the result to the old document with [`apply`] reproduces the
//! new one exactly.
//!
//! # Op ordering
//!
//! Within one map, deletions come first (ascending key order), then
//! insertions and nested edits in the new document's key order. Within
//! one sequence, positional edits over the common prefix come first, then
//! removals from the tail in descending index order, then appends in
//! ascending order. This keeps every index valid at the moment its op is
//! applied.

use opsview_types::{Document, Patch, PatchOp, PathSegment};

/// Errors raised when a patch does not fit the document it is applied to.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PatchError {
    /// A path segment does not exist in the document.
    #[error("path {path} does not exist")]
    MissingPath {
        /// Rendered path, e.g. `/nodes/0`.
        path: String,
    },

    /// The node at a path is not of the kind the op expects.
    #[error("expected {expected} at {path}, found {found}")]
    KindMismatch {
        /// Rendered path.
        path: String,
        /// Kind the op needs.
        expected: &'static str,
        /// Kind actually present.
        found: &'static str,
    },

    /// A sequence index is outside the sequence.
    #[error("index {index} out of range at {path} (length {len})")]
    IndexOutOfRange {
        /// Rendered path of the sequence.
        path: String,
        /// Offending index.
        index: usize,
        /// Sequence length.
        len: usize,
    },
}

/// Compute the patch that turns `old` into `new`.
pub fn diff(old: &Document, new: &Document) -> Patch {
    let mut patch = Patch::new();
    let mut path = Vec::new();
    diff_into(old, new, &mut path, &mut patch);
    patch
}

fn diff_into(old: &Document, new: &Document, path: &mut Vec<PathSegment>, patch: &mut Patch) {
    match (old, new) {
        (Document::Map(before), Document::Map(after)) => {
            for key in before.keys().filter(|k| !after.contains_key(*k)) {
                patch.push(PatchOp::DeleteKey {
                    path: path.clone(),
                    key: key.clone(),
                });
            }
            for (key, value) in after {
                if let Some(previous) = before.get(key) {
                    path.push(PathSegment::Key(key.clone()));
                    diff_into(previous, value, path, patch);
                    path.pop();
                } else {
                    patch.push(PatchOp::SetKey {
                        path: path.clone(),
                        key: key.clone(),
                        value: value.clone(),
                    });
                }
            }
        }
        (Document::Sequence(before), Document::Sequence(after)) => {
            for (index, (previous, value)) in before.iter().zip(after).enumerate() {
                path.push(PathSegment::Index(index));
                diff_into(previous, value, path, patch);
                path.pop();
            }
            for index in (after.len()..before.len()).rev() {
                patch.push(PatchOp::RemoveAt {
                    path: path.clone(),
                    index,
                });
            }
            for (index, value) in after.iter().enumerate().skip(before.len()) {
                patch.push(PatchOp::InsertAt {
                    path: path.clone(),
                    index,
                    value: value.clone(),
                });
            }
        }
        _ if old == new => {}
        _ => patch.push(PatchOp::Replace {
            path: path.clone(),
            value: new.clone(),
        }),
    }
}

/// Apply `patch` to `doc` in place.
///
/// On error `doc` may have been partially modified; callers that need
/// all-or-nothing semantics should apply to a clone.
pub fn apply(doc: &mut Document, patch: &Patch) -> Result<(), PatchError> {
    for op in patch {
        apply_op(doc, op)?;
    }
    Ok(())
}

fn apply_op(doc: &mut Document, op: &PatchOp) -> Result<(), PatchError> {
    match op {
        PatchOp::Replace { path, value } => {
            *resolve(doc, path)? = value.clone();
        }
        PatchOp::SetKey { path, key, value } => {
            expect_map(resolve(doc, path)?, path)?.insert(key.clone(), value.clone());
        }
        PatchOp::DeleteKey { path, key } => {
            if expect_map(resolve(doc, path)?, path)?.remove(key).is_none() {
                let mut full = path.clone();
                full.push(PathSegment::Key(key.clone()));
                return Err(PatchError::MissingPath {
                    path: render(&full),
                });
            }
        }
        PatchOp::InsertAt { path, index, value } => {
            let items = expect_sequence(resolve(doc, path)?, path)?;
            if *index > items.len() {
                return Err(PatchError::IndexOutOfRange {
                    path: render(path),
                    index: *index,
                    len: items.len(),
                });
            }
            items.insert(*index, value.clone());
        }
        PatchOp::RemoveAt { path, index } => {
            let items = expect_sequence(resolve(doc, path)?, path)?;
            if *index >= items.len() {
                return Err(PatchError::IndexOutOfRange {
                    path: render(path),
                    index: *index,
                    len: items.len(),
                });
            }
            items.remove(*index);
        }
    }
    Ok(())
}

fn resolve<'a>(doc: &'a mut Document, path: &[PathSegment]) -> Result<&'a mut Document, PatchError> {
    let mut node = doc;
    for (depth, segment) in path.iter().enumerate() {
        let here = || render(path.get(..=depth).unwrap_or(path));
        node = match (node, segment) {
            (Document::Map(entries), PathSegment::Key(key)) => entries
                .get_mut(key)
                .ok_or_else(|| PatchError::MissingPath { path: here() })?,
            (Document::Sequence(items), PathSegment::Index(index)) => items
                .get_mut(*index)
                .ok_or_else(|| PatchError::MissingPath { path: here() })?,
            (other, PathSegment::Key(_)) => {
                return Err(PatchError::KindMismatch {
                    path: here(),
                    expected: "map",
                    found: other.kind(),
                });
            }
            (other, PathSegment::Index(_)) => {
                return Err(PatchError::KindMismatch {
                    path: here(),
                    expected: "sequence",
                    found: other.kind(),
                });
            }
        };
    }
    Ok(node)
}

fn expect_map<'a>(
    node: &'a mut Document,
    path: &[PathSegment],
) -> Result<&'a mut std::collections::BTreeMap<String, Document>, PatchError> {
    match node {
        Document::Map(entries) => Ok(entries),
        other => Err(PatchError::KindMismatch {
            path: render(path),
            expected: "map",
            found: other.kind(),
        }),
    }
}

fn expect_sequence<'a>(
    node: &'a mut Document,
    path: &[PathSegment],
) -> Result<&'a mut Vec<Document>, PatchError> {
    match node {
        Document::Sequence(items) => Ok(items),
        other => Err(PatchError::KindMismatch {
            path: render(path),
            expected: "sequence",
            found: other.kind(),
        }),
    }
}

/// Render a path as `/a/0/b` (`/` for the root).
fn render(path: &[PathSegment]) -> String {
    if path.is_empty() {
        return "/".to_owned();
    }
    path.iter().fold(String::new(), |mut out, segment| {
        out.push('/');
        match segment {
            PathSegment::Key(key) => out.push_str(key),
            PathSegment::Index(index) => out.push_str(&index.to_string()),
        }
        out
    })
}
