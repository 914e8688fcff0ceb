//! The storage contract every backend implements.

use crate::error::Result;
use crate::project::Project;

/// A backend able to load and save whole projects.
///
/// Implementations are shared between concurrent requests for different
/// projects. Saving one project from two requests at once is not safe
/// with the prune-then-rebuild backends; callers serialize per project.
pub trait Storage: Send + Sync {
    /// Load `project` owned by `user`. Without `with_content` every body
    /// is left unset.
    ///
    /// # Errors
    ///
    /// [`crate::QuireError::NotFound`] when the backend has no such
    /// project, [`crate::QuireError::Unauthorized`] when `user` does not
    /// own it.
    fn load(&self, user: &str, project: &str, with_content: bool) -> Result<Project>;

    /// Persist `project` so that a later `load` reproduces it. Without
    /// `with_content` stored bodies are kept as they are.
    ///
    /// # Errors
    ///
    /// [`crate::QuireError::Unauthorized`] when the stored project belongs
    /// to another user; I/O and backend failures otherwise.
    fn save(&self, project: &mut Project, with_content: bool) -> Result<()>;

    /// Short backend name for logs.
    fn backend(&self) -> &'static str;
}
