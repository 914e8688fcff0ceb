//! Metadata descriptor registry.
//!
//! Every codec reads and writes per-document metadata by walking
//! [`METADATA`] in order; no codec names a field directly.

use std::collections::HashMap;

use tracing::warn;

use crate::document::Document;

/// One persisted metadata field.
pub struct MetadataField {
    /// Front-matter key, lower case.
    pub key: &'static str,
    /// Current value, `None` when unset.
    pub get: fn(&Document) -> Option<String>,
    /// Assign from the raw stored string.
    pub set: fn(&mut Document, &str),
    /// The value a document would hold without writing this field, given
    /// its parent (`None` at the project root). `None` means no default.
    pub default: fn(Option<&Document>) -> Option<String>,
}

impl MetadataField {
    /// Whether `doc` holds a value that must be persisted for this field.
    pub fn is_set(&self, doc: &Document, parent: Option<&Document>) -> bool {
        match (self.get)(doc) {
            Some(value) => Some(value) != (self.default)(parent),
            None => false,
        }
    }
}

/// The registry, in front-matter order.
pub static METADATA: [MetadataField; 4] = [
    MetadataField {
        key: "id",
        get: |doc| Some(doc.id.clone()).filter(|id| !id.is_empty()),
        set: |doc, value| {
            if !value.is_empty() {
                doc.id = value.to_string();
            }
        },
        default: |_| None,
    },
    MetadataField {
        key: "repo",
        get: |doc| doc.repo.clone(),
        set: |doc, value| {
            doc.repo = Some(value.to_string()).filter(|v| !v.is_empty());
        },
        default: |_| None,
    },
    MetadataField {
        key: "index.nodes",
        get: |doc| doc.index_nodes.map(|v| v.to_string()),
        set: |doc, value| {
            if let Some(flag) = parse_flag("index.nodes", value) {
                doc.index_nodes = Some(flag);
            }
        },
        default: |parent| {
            let inherited = parent.and_then(|p| p.index_nodes);
            Some(inherited.unwrap_or(DEFAULT_INDEX_NODES).to_string())
        },
    },
    MetadataField {
        key: "index.leaves",
        get: |doc| doc.index_leaves.map(|v| v.to_string()),
        set: |doc, value| {
            if let Some(flag) = parse_flag("index.leaves", value) {
                doc.index_leaves = Some(flag);
            }
        },
        default: |parent| {
            let inherited = parent.and_then(|p| p.index_leaves);
            Some(inherited.unwrap_or(DEFAULT_INDEX_LEAVES).to_string())
        },
    },
];

/// Root fallback for `index.nodes`.
pub const DEFAULT_INDEX_NODES: bool = false;
/// Root fallback for `index.leaves`.
pub const DEFAULT_INDEX_LEAVES: bool = true;

fn parse_flag(key: &str, value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "1" => Some(true),
        "false" | "no" | "0" => Some(false),
        other => {
            warn!(key, value = other, "ignoring unparsable metadata flag");
            None
        }
    }
}

/// Apply parsed `key -> value` pairs to `doc`. Unknown keys are ignored.
pub fn apply(doc: &mut Document, values: &HashMap<String, String>) {
    for field in &METADATA {
        if let Some(value) = values.get(field.key) {
            (field.set)(doc, value);
        }
    }
}

/// Fields of `doc` holding non-default values, in registry order.
pub fn non_default(doc: &Document, parent: Option<&Document>) -> Vec<(&'static str, String)> {
    METADATA
        .iter()
        .filter(|field| field.is_set(doc, parent))
        .filter_map(|field| (field.get)(doc).map(|value| (field.key, value)))
        .collect()
}

/// Whether a document deserves its own physical record: it has a body, or
/// more than one non-default field (a bare `id` is not enough).
pub fn needs_record(doc: &Document, parent: Option<&Document>) -> bool {
    let has_body = doc.content.as_deref().is_some_and(|c| !c.is_empty());
    has_body || non_default(doc, parent).len() > 1
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn registry_order_is_fixed() {
        let keys: Vec<_> = METADATA.iter().map(|f| f.key).collect();
        assert_eq!(keys, ["id", "repo", "index.nodes", "index.leaves"]);
    }

    #[test]
    fn apply_sets_known_fields_and_ignores_unknown() {
        let mut doc = Document::new("chars", false);
        apply(
            &mut doc,
            &values(&[
                ("id", "abc"),
                ("index.leaves", "true"),
                ("colour", "blue"),
                ("index.nodes", "maybe"),
            ]),
        );
        assert_eq!(doc.id, "abc");
        assert_eq!(doc.index_leaves, Some(true));
        assert_eq!(doc.index_nodes, None);
        assert_eq!(doc.repo, None);
    }

    #[test]
    fn defaults_follow_the_parent() {
        let mut parent = Document::new("notes", false);
        parent.index_nodes = Some(true);
        parent.index_leaves = Some(false);

        let mut child = Document::new("chars", false);
        child.index_nodes = Some(true);
        child.index_leaves = Some(true);

        let fields = non_default(&child, Some(&parent));
        let keys: Vec<_> = fields.iter().map(|(k, _)| *k).collect();
        assert_eq!(keys, ["id", "index.leaves"]);

        // At the root the static fallbacks apply.
        let fields = non_default(&child, None);
        let keys: Vec<_> = fields.iter().map(|(k, _)| *k).collect();
        assert_eq!(keys, ["id", "index.nodes"]);
    }

    #[test]
    fn bare_id_does_not_need_a_record() {
        let mut doc = Document::new("plain", true);
        doc.index_nodes = Some(DEFAULT_INDEX_NODES);
        doc.index_leaves = Some(DEFAULT_INDEX_LEAVES);
        assert!(!needs_record(&doc, None));

        doc.content = Some("text".into());
        assert!(needs_record(&doc, None));

        doc.content = None;
        doc.repo = Some("origin-repo".into());
        assert!(needs_record(&doc, None));
    }
}
