//! Sibling ordering.
//!
//! Siblings sort ascending on `(index, is_leaf, name)`: numeric index
//! first, nodes before leaves at equal index, then name.

use std::cmp::Ordering;

use crate::document::{Document, NodeId};
use crate::project::Project;

/// Sort key of a linked document.
pub fn sort_key(doc: &Document) -> (i32, bool, &str) {
    (doc.index, doc.is_leaf(), doc.name.as_str())
}

pub fn compare(a: &Document, b: &Document) -> Ordering {
    sort_key(a).cmp(&sort_key(b))
}

/// Return `siblings` in their canonical order. The result depends only
/// on the keys, never on input order, as long as keys are distinct.
pub fn order_documents(project: &Project, siblings: &[NodeId]) -> Vec<NodeId> {
    let mut ordered = siblings.to_vec();
    ordered.sort_by(|a, b| compare(&project[*a], &project[*b]));
    ordered
}
