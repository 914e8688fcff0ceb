//! Directory tree → document tree.

use std::fs;
use std::path::Path;

use tracing::debug;

use quire_core::{frontmatter, Document, DocumentTree, Result};

use crate::layout::{decode_name, is_reserved, leaf_stem, DIRECTORY_DOCUMENT};

/// Ordering flags resolved at a directory, handed to its children.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Flags {
    pub nodes: bool,
    pub leaves: bool,
}

/// Read one directory and everything below it.
///
/// `inherited` are the flags the directory resolves to when its own
/// directory document does not set them. They decide whether the names of
/// the directory's children carry an order prefix.
pub(crate) fn load_directory(
    dir: &Path,
    name: String,
    index: i32,
    inherited: Flags,
    with_content: bool,
) -> Result<DocumentTree> {
    let mut document = Document::new(name, false);
    document.index = index;

    let own = dir.join(DIRECTORY_DOCUMENT);
    if own.is_file() {
        let text = fs::read_to_string(&own)?;
        frontmatter::read_metadata(&mut document, &text);
        if with_content {
            frontmatter::read_document(&mut document, &text);
        }
    }
    let flags = Flags {
        nodes: document.index_nodes.unwrap_or(inherited.nodes),
        leaves: document.index_leaves.unwrap_or(inherited.leaves),
    };

    let mut entries = fs::read_dir(dir)?.collect::<std::io::Result<Vec<_>>>()?;
    entries.sort_by_key(|entry| entry.file_name());

    let mut children = Vec::new();
    for entry in entries {
        let file_name = entry.file_name();
        let Some(file_name) = file_name.to_str() else {
            debug!(path = %entry.path().display(), "skipping non UTF-8 entry");
            continue;
        };
        if is_reserved(file_name) {
            continue;
        }
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            let (index, name) = decode_name(file_name, flags.nodes);
            children.push(load_directory(
                &entry.path(),
                name,
                index,
                flags,
                with_content,
            )?);
        } else if file_type.is_file() {
            let Some(stem) = leaf_stem(file_name) else {
                continue;
            };
            let (index, name) = decode_name(stem, flags.leaves);
            children.push(load_leaf(&entry.path(), name, index, with_content)?);
        }
    }

    debug!(dir = %dir.display(), children = children.len(), "loaded directory");
    Ok(DocumentTree::node(document, children))
}

fn load_leaf(path: &Path, name: String, index: i32, with_content: bool) -> Result<DocumentTree> {
    let mut document = Document::new(name, true);
    document.index = index;
    let text = fs::read_to_string(path)?;
    frontmatter::read_metadata(&mut document, &text);
    if with_content {
        frontmatter::read_document(&mut document, &text);
    }
    Ok(DocumentTree::leaf(document))
}
