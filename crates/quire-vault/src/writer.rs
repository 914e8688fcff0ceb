//! Document tree → directory tree.

use std::fs;
use std::path::Path;

use tracing::debug;

use quire_core::metadata::{self, DEFAULT_INDEX_LEAVES, DEFAULT_INDEX_NODES};
use quire_core::{frontmatter, Document, NodeId, Project, Result};

use crate::layout::{
    encode_name, leaf_file_name, validate_name, DIRECTORY_DOCUMENT, LEAF_EXTENSION, VCS_DIR,
};

/// Remove every leaf file and every subdirectory of `dir` except the
/// version-control directory. Other files are left alone.
pub(crate) fn prune(dir: &Path) -> Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            if entry.file_name() != VCS_DIR {
                fs::remove_dir_all(&path)?;
            }
        } else if path.extension().is_some_and(|ext| ext == LEAF_EXTENSION) {
            fs::remove_file(&path)?;
        }
    }
    Ok(())
}

/// Check every name below the root before anything is touched on disk.
pub(crate) fn validate(project: &Project) -> Result<()> {
    for node in project.descendants(project.root()) {
        if node != project.root() {
            validate_name(&project[node].name)?;
        }
    }
    Ok(())
}

/// Write `node`, a directory document tree, into `dir`, then its children.
pub(crate) fn write_directory(project: &Project, node: NodeId, dir: &Path) -> Result<()> {
    fs::create_dir_all(dir)?;
    let document = &project[node];
    let parent = document.parent().map(|p| &project[p]);
    if metadata::needs_record(document, parent) {
        write_record(&dir.join(DIRECTORY_DOCUMENT), document, parent)?;
    }

    for child in project.children(node) {
        let child_doc = &project[*child];
        let segment_indexed = indexed(document, child_doc.is_leaf());
        if child_doc.is_leaf() {
            if metadata::needs_record(child_doc, Some(document)) {
                let file = leaf_file_name(&child_doc.name, child_doc.index, segment_indexed);
                write_record(&dir.join(file), child_doc, Some(document))?;
            } else {
                debug!(name = %child_doc.name, "leaf has nothing to store");
            }
        } else {
            let segment = encode_name(&child_doc.name, child_doc.index, segment_indexed);
            write_directory(project, *child, &dir.join(segment))?;
        }
    }
    Ok(())
}

/// Whether `parent` prefixes children of the given kind.
fn indexed(parent: &Document, leaf: bool) -> bool {
    if leaf {
        parent.index_leaves.unwrap_or(DEFAULT_INDEX_LEAVES)
    } else {
        parent.index_nodes.unwrap_or(DEFAULT_INDEX_NODES)
    }
}

fn write_record(path: &Path, document: &Document, parent: Option<&Document>) -> Result<()> {
    let fields = metadata::non_default(document, parent);
    let text = frontmatter::write_frontmatter(&fields, document.content.as_deref());
    fs::write(path, text)?;
    Ok(())
}
