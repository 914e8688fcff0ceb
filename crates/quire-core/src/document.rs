//! Documents: the nodes and leaves of a project tree.

use serde::{Deserialize, Serialize};

use crate::error::{QuireError, Result};

/// Handle to a document inside a [`crate::Project`] arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) usize);

/// A single entry of a project tree. Directories ("nodes") carry a
/// children list, possibly empty; text files ("leaves") carry none.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    // === Identity ===
    /// Changed through [`crate::Project::set_id`] once attached, so the
    /// project's id lookup stays in step.
    #[serde(default = "new_id")]
    pub(crate) id: String,
    pub name: String,
    #[serde(default)]
    pub index: i32,

    // === Ordering configuration (unset means inherited) ===
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index_nodes: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index_leaves: Option<bool>,

    // === Body ===
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,

    /// Remote repository identifier, project root only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo: Option<String>,

    // === Tree linkage, maintained by the owning project ===
    #[serde(skip)]
    pub(crate) parent: Option<NodeId>,
    #[serde(skip)]
    pub(crate) children: Option<Vec<NodeId>>,
}

/// Reject names that cannot be stored as a single visible path segment
/// or record key: empty, hidden (leading `.`), or containing a separator.
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() || name.starts_with('.') || name.contains(['/', '\\', '\0']) {
        return Err(QuireError::InvalidName(name.to_string()));
    }
    Ok(())
}

/// Generate a fresh document identifier.
pub fn new_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

impl Document {
    /// A detached document with a generated id. `leaf` decides whether it
    /// can ever own children.
    pub fn new(name: impl Into<String>, leaf: bool) -> Self {
        Self {
            id: new_id(),
            name: name.into(),
            index: 0,
            index_nodes: None,
            index_leaves: None,
            content: None,
            repo: None,
            parent: None,
            children: if leaf { None } else { Some(Vec::new()) },
        }
    }

    /// The same detached document under another id.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_none()
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Children handles in sibling order; empty for leaves.
    pub fn children(&self) -> &[NodeId] {
        self.children.as_deref().unwrap_or(&[])
    }
}

/// Owned, nested form of a document and its descendants.
///
/// This is what codecs produce before linkage and what the JSON codec
/// serializes. `children` present means node, absent means leaf.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentTree {
    #[serde(flatten)]
    pub document: Document,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<DocumentTree>>,
}

impl DocumentTree {
    pub fn node(document: Document, children: Vec<DocumentTree>) -> Self {
        Self {
            document,
            children: Some(children),
        }
    }

    pub fn leaf(document: Document) -> Self {
        Self {
            document,
            children: None,
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_none()
    }
}
