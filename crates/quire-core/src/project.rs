//! The project arena owning a document tree.
//!
//! Documents refer to their parent by [`NodeId`] handle; the project owns
//! every document and keeps the `id -> handle` lookup for the whole tree.
//! Attaching through [`Project::set_parent`] is the only way a document
//! gains a parent, inherits ordering flags, and becomes findable by id.

use std::collections::HashMap;
use std::ops::{Index, IndexMut};

use tracing::warn;

use crate::document::{new_id, Document, DocumentTree, NodeId};
use crate::error::{QuireError, Result};
use crate::metadata::{DEFAULT_INDEX_LEAVES, DEFAULT_INDEX_NODES};
use crate::ordering::order_documents;

/// A user's document tree.
#[derive(Debug, Clone)]
pub struct Project {
    owner: String,
    nodes: Vec<Option<Document>>,
    free: Vec<usize>,
    root: NodeId,
    all_documents: HashMap<String, NodeId>,
    /// Set when the last git-backed save could not reach its remote.
    pub disconnected: bool,
}

impl Project {
    /// An empty project: a root node named after the project.
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self::with_root(owner.into(), Document::new(name, false))
    }

    fn with_root(owner: String, mut root: Document) -> Self {
        root.parent = None;
        root.children.get_or_insert_with(Vec::new);
        root.index_nodes.get_or_insert(DEFAULT_INDEX_NODES);
        root.index_leaves.get_or_insert(DEFAULT_INDEX_LEAVES);
        let mut project = Self {
            owner,
            nodes: vec![Some(root)],
            free: Vec::new(),
            root: NodeId(0),
            all_documents: HashMap::new(),
            disconnected: false,
        };
        project.register(NodeId(0));
        project
    }

    /// Link a bulk-constructed tree: allocate every document, wire parents
    /// top-down, propagate ordering flags, and sort each sibling list.
    pub fn build(owner: impl Into<String>, tree: DocumentTree) -> Self {
        let DocumentTree { document, children } = tree;
        let mut project = Self::with_root(owner.into(), document);
        let root = project.root;
        for child in children.unwrap_or_default() {
            project.build_subtree(root, child);
        }
        project.sort_recursive(root);
        project
    }

    fn build_subtree(&mut self, parent: NodeId, tree: DocumentTree) {
        let DocumentTree {
            mut document,
            children,
        } = tree;
        document.children = children.as_ref().map(|_| Vec::new());
        let id = self.alloc(document);
        self.link(id, parent);
        for child in children.unwrap_or_default() {
            self.build_subtree(id, child);
        }
    }

    fn sort_recursive(&mut self, node: NodeId) {
        self.sort_children(node);
        for child in self[node].children().to_vec() {
            self.sort_recursive(child);
        }
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Project name, i.e. the root document's name.
    pub fn name(&self) -> &str {
        &self[self.root].name
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn get(&self, id: NodeId) -> Option<&Document> {
        self.nodes.get(id.0).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut Document> {
        self.nodes.get_mut(id.0).and_then(Option::as_mut)
    }

    /// Look a linked document up by its stable identifier.
    pub fn find(&self, id: &str) -> Option<NodeId> {
        self.all_documents.get(id).copied()
    }

    /// Every linked document, keyed by identifier. Includes the root.
    pub fn all_documents(&self) -> &HashMap<String, NodeId> {
        &self.all_documents
    }

    pub fn children(&self, node: NodeId) -> &[NodeId] {
        self[node].children()
    }

    /// Resolve a `/`-free name path from the root.
    pub fn find_path(&self, names: &[&str]) -> Option<NodeId> {
        names.iter().try_fold(self.root, |current, name| {
            self.children(current)
                .iter()
                .copied()
                .find(|child| self[*child].name == *name)
        })
    }

    /// Pre-order walk of `node` and everything below it.
    pub fn descendants(&self, node: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![node];
        while let Some(current) = stack.pop() {
            out.push(current);
            stack.extend(self.children(current).iter().rev().copied());
        }
        out
    }

    /// Create a document and attach it under `parent`.
    pub fn create_document(
        &mut self,
        parent: NodeId,
        name: impl Into<String>,
        leaf: bool,
    ) -> Result<NodeId> {
        self.insert(parent, Document::new(name, leaf))
    }

    /// Attach a prepared document under `parent`.
    pub fn insert(&mut self, parent: NodeId, mut document: Document) -> Result<NodeId> {
        document.parent = None;
        if let Some(children) = document.children.as_mut() {
            children.clear();
        }
        let id = self.alloc(document);
        if let Err(err) = self.set_parent(id, Some(parent)) {
            self.release(id);
            return Err(err);
        }
        Ok(id)
    }

    /// Move `node` under `parent`, or detach it when `parent` is `None`.
    ///
    /// Unset ordering flags are copied from the new parent at this point;
    /// later changes to the parent do not reach already attached children.
    pub fn set_parent(&mut self, node: NodeId, parent: Option<NodeId>) -> Result<()> {
        let Some(parent) = parent else {
            self.detach(node);
            return Ok(());
        };
        if node == self.root {
            return Err(QuireError::Malformed("the project root cannot be moved".into()));
        }
        if self.get(parent).is_none_or(Document::is_leaf) {
            return Err(QuireError::Malformed(format!(
                "cannot attach '{}' below a leaf",
                self[node].name
            )));
        }
        if self.descendants(node).contains(&parent) {
            return Err(QuireError::Malformed(format!(
                "cannot attach '{}' below itself",
                self[node].name
            )));
        }
        if self[node].parent.is_some() {
            self.detach(node);
        }
        self.link(node, parent);
        self.sort_children(parent);
        Ok(())
    }

    fn link(&mut self, node: NodeId, parent: NodeId) {
        if let Some(children) = self[parent].children.as_mut() {
            children.push(node);
        }
        self[node].parent = Some(parent);
        for current in self.descendants(node) {
            self.inherit_flags(current);
            self.register(current);
        }
    }

    fn inherit_flags(&mut self, node: NodeId) {
        let Some(parent) = self[node].parent else {
            return;
        };
        let (nodes, leaves) = (self[parent].index_nodes, self[parent].index_leaves);
        let doc = &mut self[node];
        if doc.index_nodes.is_none() {
            doc.index_nodes = nodes;
        }
        if doc.index_leaves.is_none() {
            doc.index_leaves = leaves;
        }
    }

    fn register(&mut self, node: NodeId) {
        let id = self[node].id.clone();
        match self.all_documents.get(&id).copied() {
            Some(existing) if existing != node => {
                let fresh = new_id();
                warn!(duplicate = %id, replacement = %fresh, "regenerating duplicate document id");
                self[node].id = fresh.clone();
                self.all_documents.insert(fresh, node);
            }
            _ => {
                self.all_documents.insert(id, node);
            }
        }
    }

    /// Give `node` a new identifier and move its lookup entry along.
    ///
    /// # Errors
    ///
    /// [`QuireError::Malformed`] when `id` is empty or already names
    /// another document of this project.
    pub fn set_id(&mut self, node: NodeId, id: impl Into<String>) -> Result<()> {
        let id = id.into();
        if id.is_empty() {
            return Err(QuireError::Malformed("document id cannot be empty".into()));
        }
        match self.all_documents.get(&id) {
            Some(existing) if *existing != node => {
                return Err(QuireError::Malformed(format!("document id '{id}' is taken")));
            }
            _ => {}
        }
        let old = std::mem::replace(&mut self[node].id, id.clone());
        if self.all_documents.get(&old) == Some(&node) {
            self.all_documents.remove(&old);
            self.all_documents.insert(id, node);
        }
        Ok(())
    }

    /// Unlink `node` from its parent and drop its subtree from the id
    /// lookup. The documents stay allocated and can be attached again.
    pub fn detach(&mut self, node: NodeId) {
        if let Some(parent) = self[node].parent.take() {
            if let Some(children) = self[parent].children.as_mut() {
                children.retain(|child| *child != node);
            }
        }
        for current in self.descendants(node) {
            let id = self[current].id.clone();
            if self.all_documents.get(&id) == Some(&current) {
                self.all_documents.remove(&id);
            }
        }
    }

    /// Detach `node` and free its whole subtree.
    pub fn remove(&mut self, node: NodeId) -> Result<()> {
        if node == self.root {
            return Err(QuireError::Malformed("the project root cannot be removed".into()));
        }
        self.detach(node);
        for current in self.descendants(node) {
            self.release(current);
        }
        Ok(())
    }

    /// Replace `node`'s children with a freshly ordered sequence.
    pub fn sort_children(&mut self, node: NodeId) {
        let ordered = order_documents(self, self.children(node));
        if let Some(children) = self[node].children.as_mut() {
            *children = ordered;
        }
    }

    /// Owned nested copy of the whole tree.
    pub fn to_tree(&self) -> DocumentTree {
        self.subtree(self.root)
    }

    pub fn subtree(&self, node: NodeId) -> DocumentTree {
        let mut document = self[node].clone();
        document.parent = None;
        let children = document.children.take().map(|ids| {
            ids.iter()
                .map(|child| self.subtree(*child))
                .collect::<Vec<_>>()
        });
        DocumentTree { document, children }
    }

    /// Fill bodies this project lacks from `previous`, matching by id.
    pub fn carry_content(&mut self, previous: &Project) {
        for node in self.descendants(self.root) {
            if self[node].content.is_some() {
                continue;
            }
            let stored = previous
                .find(&self[node].id)
                .and_then(|old| previous[old].content.clone());
            if stored.is_some() {
                self[node].content = stored;
            }
        }
    }

    /// Drop every body, as a structure-only load would.
    pub fn strip_content(&mut self) {
        for node in self.descendants(self.root) {
            self[node].content = None;
        }
    }

    fn alloc(&mut self, document: Document) -> NodeId {
        match self.free.pop() {
            Some(slot) => {
                self.nodes[slot] = Some(document);
                NodeId(slot)
            }
            None => {
                self.nodes.push(Some(document));
                NodeId(self.nodes.len() - 1)
            }
        }
    }

    fn release(&mut self, node: NodeId) {
        if let Some(slot) = self.nodes.get_mut(node.0) {
            if slot.take().is_some() {
                self.free.push(node.0);
            }
        }
    }
}

impl Index<NodeId> for Project {
    type Output = Document;

    /// Panics on a handle whose document was removed.
    fn index(&self, id: NodeId) -> &Document {
        match self.get(id) {
            Some(doc) => doc,
            None => panic!("stale document handle {id:?}"),
        }
    }
}

impl IndexMut<NodeId> for Project {
    fn index_mut(&mut self, id: NodeId) -> &mut Document {
        match self.get_mut(id) {
            Some(doc) => doc,
            None => panic!("stale document handle {id:?}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scenario() -> Project {
        let mut project = Project::new("Kenny", "Test");
        let root = project.root();
        let notes = project.create_document(root, "notes", false).unwrap();
        project[notes].index_nodes = Some(true);
        project[notes].index_leaves = Some(false);
        let mut chars = Document::new("chars", false);
        chars.index = 3;
        chars.index_leaves = Some(true);
        let chars = project.insert(notes, chars).unwrap();
        for (index, name) in [(1, "alice"), (2, "bob"), (3, "franck"), (4, "dave")] {
            let leaf = project.create_document(chars, name, true).unwrap();
            project[leaf].index = index;
        }
        project.sort_children(chars);
        project
    }

    #[test]
    fn root_gets_static_defaults() {
        let project = Project::new("kenny", "Test");
        let root = &project[project.root()];
        assert_eq!(root.index_nodes, Some(false));
        assert_eq!(root.index_leaves, Some(true));
        assert_eq!(project.name(), "Test");
        assert_eq!(project.find(&root.id), Some(project.root()));
    }

    #[test]
    fn attach_copies_parent_flags() {
        let project = scenario();
        let chars = project.find_path(&["notes", "chars"]).unwrap();
        assert_eq!(project[chars].index_nodes, Some(true));
        assert_eq!(project[chars].index_leaves, Some(true));
    }

    #[test]
    fn later_parent_changes_do_not_reach_attached_children() {
        let mut project = scenario();
        let notes = project.find_path(&["notes"]).unwrap();
        let chars = project.find_path(&["notes", "chars"]).unwrap();
        project[notes].index_nodes = Some(false);
        assert_eq!(project[chars].index_nodes, Some(true));
    }

    #[test]
    fn all_documents_tracks_attach_and_detach() {
        let mut project = scenario();
        assert_eq!(project.all_documents().len(), 7);

        let chars = project.find_path(&["notes", "chars"]).unwrap();
        let dave = project.find_path(&["notes", "chars", "dave"]).unwrap();
        let dave_id = project[dave].id.clone();

        project.detach(chars);
        assert_eq!(project.all_documents().len(), 2);
        assert!(project.find(&dave_id).is_none());

        let root = project.root();
        project.set_parent(chars, Some(root)).unwrap();
        assert_eq!(project.find(&dave_id), Some(dave));
        assert_eq!(project[chars].parent(), Some(root));
    }

    #[test]
    fn children_stay_sorted_after_attach() {
        let project = scenario();
        let chars = project.find_path(&["notes", "chars"]).unwrap();
        let names: Vec<_> = project
            .children(chars)
            .iter()
            .map(|c| project[*c].name.as_str())
            .collect();
        assert_eq!(names, ["alice", "bob", "franck", "dave"]);
    }

    #[test]
    fn rejects_attaching_below_a_leaf_or_itself() {
        let mut project = scenario();
        let notes = project.find_path(&["notes"]).unwrap();
        let chars = project.find_path(&["notes", "chars"]).unwrap();
        let dave = project.find_path(&["notes", "chars", "dave"]).unwrap();
        assert!(project.create_document(dave, "x", true).is_err());
        assert!(project.set_parent(notes, Some(chars)).is_err());
        assert!(project.set_parent(project.root(), Some(notes)).is_err());
    }

    #[test]
    fn remove_frees_the_subtree() {
        let mut project = scenario();
        let chars = project.find_path(&["notes", "chars"]).unwrap();
        project.remove(chars).unwrap();
        assert!(project.get(chars).is_none());
        assert_eq!(project.all_documents().len(), 2);
        let notes = project.find_path(&["notes"]).unwrap();
        assert!(project.children(notes).is_empty());
    }

    #[test]
    fn build_round_trips_through_owned_tree() {
        let project = scenario();
        let rebuilt = Project::build("Kenny", project.to_tree());
        assert_eq!(rebuilt.all_documents().len(), 7);
        let chars = rebuilt.find_path(&["notes", "chars"]).unwrap();
        assert_eq!(rebuilt[chars].index, 3);
        assert_eq!(rebuilt.children(chars).len(), 4);
        let notes = rebuilt.find_path(&["notes"]).unwrap();
        assert_eq!(rebuilt[chars].parent(), Some(notes));
    }

    #[test]
    fn build_regenerates_duplicate_ids() {
        let mut a = Document::new("a", true);
        let mut b = Document::new("b", true);
        b.id = "same".into();
        a.id = "same".into();
        let tree = DocumentTree::node(
            Document::new("Test", false),
            vec![DocumentTree::leaf(a), DocumentTree::leaf(b)],
        );
        let project = Project::build("kenny", tree);
        assert_eq!(project.all_documents().len(), 3);
    }

    #[test]
    fn set_id_moves_the_lookup_entry() {
        let mut project = scenario();
        let dave = project.find_path(&["notes", "chars", "dave"]).unwrap();
        let old = project[dave].id().to_string();

        project.set_id(dave, "dave-1").unwrap();
        assert_eq!(project[dave].id(), "dave-1");
        assert_eq!(project.find("dave-1"), Some(dave));
        assert_eq!(project.find(&old), None);
        assert_eq!(project.all_documents().len(), 7);

        let alice = project.find_path(&["notes", "chars", "alice"]).unwrap();
        assert!(project.set_id(alice, "dave-1").is_err());
        assert!(project.set_id(alice, "").is_err());
        assert_eq!(project.find("dave-1"), Some(dave));
    }

    #[test]
    fn set_id_on_a_detached_document_leaves_the_lookup_alone() {
        let mut project = scenario();
        let chars = project.find_path(&["notes", "chars"]).unwrap();
        project.detach(chars);
        project.set_id(chars, "cast").unwrap();
        assert_eq!(project.find("cast"), None);

        let notes = project.find_path(&["notes"]).unwrap();
        project.set_parent(chars, Some(notes)).unwrap();
        assert_eq!(project.find("cast"), Some(chars));
    }

    #[test]
    fn carry_content_fills_missing_bodies_by_id() {
        let mut previous = scenario();
        let dave = previous.find_path(&["notes", "chars", "dave"]).unwrap();
        previous[dave].content = Some("dave's notes".into());

        let mut current = previous.clone();
        current.strip_content();
        current.carry_content(&previous);
        let dave = current.find_path(&["notes", "chars", "dave"]).unwrap();
        assert_eq!(current[dave].content.as_deref(), Some("dave's notes"));
    }
}
