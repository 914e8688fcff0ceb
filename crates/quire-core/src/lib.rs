//! # quire-core
//!
//! Core types for Quire, a hierarchical notes manager whose projects are
//! stored interchangeably as git-backed directory trees, JSON blobs, or
//! database records.
//!
//! This crate defines what every backend shares:
//! - [`Project`] and [`Document`] — the arena-backed document tree
//! - [`metadata`] — the ordered metadata descriptor registry
//! - [`ordering`] — canonical sibling order
//! - [`equality`] — round-trip comparison
//! - [`frontmatter`] — `key: value` header parsing and writing
//! - [`Storage`] — the load/save contract
//! - Error hierarchy ([`QuireError`], [`ErrorKind`])

pub mod document;
pub mod equality;
pub mod error;
pub mod frontmatter;
pub mod metadata;
pub mod ordering;
pub mod project;
pub mod storage;

pub use document::{new_id, validate_name, Document, DocumentTree, NodeId};
pub use equality::{equal, Comparison};
pub use error::{ErrorKind, QuireError, Result};
pub use project::Project;
pub use storage::Storage;
