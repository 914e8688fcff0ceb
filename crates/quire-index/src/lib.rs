//! # quire-index
//!
//! Flat-record storage for Quire projects.
//!
//! - [`JsonStorage`] keeps each project as one JSON document on disk.
//! - [`DatabaseStorage`] spreads the tree over SQLite tables: one record
//!   per document, one per body, linked by parent id.
//!
//! Both key projects by name and store the owner alongside, so loading or
//! overwriting another user's project is refused.

pub mod database;
pub mod json;

pub use database::DatabaseStorage;
pub use json::{JsonStorage, ProjectRecord};
