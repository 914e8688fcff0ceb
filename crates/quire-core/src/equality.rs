//! Structural comparison of project trees, used to check round trips.

use crate::document::NodeId;
use crate::project::Project;

/// How strictly two trees are compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    /// Identifiers and indices must match too.
    Strict,
    /// At least one side was loaded without metadata: names, bodies,
    /// ordering flags and shape only.
    IgnoreMetadata,
}

/// Whether `a` and `b` hold the same tree. Children match as a multiset
/// by name, not by position.
pub fn equal(a: &Project, b: &Project, mode: Comparison) -> bool {
    a.owner() == b.owner() && nodes_equal(a, a.root(), b, b.root(), mode)
}

fn nodes_equal(a: &Project, x: NodeId, b: &Project, y: NodeId, mode: Comparison) -> bool {
    let (dx, dy) = (&a[x], &b[y]);
    let body = |c: &Option<String>| c.clone().filter(|c| !c.is_empty());

    if dx.name != dy.name
        || dx.is_leaf() != dy.is_leaf()
        || body(&dx.content) != body(&dy.content)
        || dx.index_nodes != dy.index_nodes
        || dx.index_leaves != dy.index_leaves
    {
        return false;
    }
    if mode == Comparison::Strict && (dx.id != dy.id || dx.index != dy.index) {
        return false;
    }

    let (cx, cy) = (a.children(x), b.children(y));
    cx.len() == cy.len()
        && cx.iter().all(|c| unique_match(a, *c, b, cy, mode))
        && cy.iter().all(|c| unique_match(b, *c, a, cx, mode))
}

fn unique_match(
    from: &Project,
    node: NodeId,
    other: &Project,
    candidates: &[NodeId],
    mode: Comparison,
) -> bool {
    let name = &from[node].name;
    candidates
        .iter()
        .filter(|c| other[**c].name == *name)
        .filter(|c| nodes_equal(from, node, other, **c, mode))
        .count()
        == 1
}
