//! # quire-vault
//!
//! Directory tree storage for Quire projects.
//!
//! A project lives at `<root>/<user>/<project>/`. Directories are nodes,
//! `.md` files are leaves, and a directory's own metadata sits in its
//! hidden `.node.md`. When children are indexed their names carry a
//! two-digit order prefix (`03.chars/04.dave.md`).
//!
//! With a [`GitHost`] attached, the working tree is synced from the
//! project's remote before a save and committed afterwards.

pub mod git;
pub mod layout;
mod loader;
pub mod watcher;
mod writer;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use quire_core::metadata::{DEFAULT_INDEX_LEAVES, DEFAULT_INDEX_NODES};
use quire_core::{Project, QuireError, Result, Storage};

pub use git::{GitHost, LocalGitHost};
pub use watcher::{ProjectEvent, ProjectWatcher};

use crate::layout::{validate_name, VCS_DIR};
use crate::loader::Flags;

/// Storage writing projects as directory trees.
pub struct FsStorage {
    root: PathBuf,
    git: Option<Arc<dyn GitHost>>,
}

impl FsStorage {
    /// Plain directory storage under `root`, no version control.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            git: None,
        }
    }

    /// Git-backed directory storage under `root`.
    pub fn with_git(root: impl Into<PathBuf>, git: Arc<dyn GitHost>) -> Self {
        Self {
            root: root.into(),
            git: Some(git),
        }
    }

    /// Directory of `project` owned by `user`.
    pub fn project_path(&self, user: &str, project: &str) -> Result<PathBuf> {
        validate_name(user)?;
        validate_name(project)?;
        Ok(self.root.join(user).join(project))
    }

    /// Bring the working tree up to date with the project's remote.
    /// Returns whether the remote was reached.
    fn sync_remote(&self, git: &dyn GitHost, repo: Option<&str>, path: &Path) -> Result<bool> {
        let Some(repo) = repo else {
            return Ok(false);
        };
        let attached = if path.join(VCS_DIR).exists() {
            git.has_origin(path)
        } else {
            Ok(false)
        };
        let synced = attached.and_then(|attached| {
            if attached {
                git.pull(path)
            } else {
                git.clone_repo(repo, path)
            }
        });
        match synced {
            Ok(()) => Ok(true),
            Err(err @ (QuireError::RemoteDisconnected(_) | QuireError::Git(_))) => {
                warn!(repo, error = %err, "remote unreachable, saving locally");
                Ok(false)
            }
            Err(err) => Err(err),
        }
    }

    fn commit(&self, git: &dyn GitHost, project: &Project, path: &Path) -> Result<bool> {
        let message = format!("Save {} at {}", project.name(), Utc::now().to_rfc3339());
        match git.commit(path, &message) {
            Ok(()) => Ok(true),
            Err(QuireError::RemoteDisconnected(reason)) => {
                warn!(project = project.name(), reason, "push failed, commit kept locally");
                Ok(false)
            }
            Err(err) => Err(err),
        }
    }
}

impl Storage for FsStorage {
    fn load(&self, user: &str, project: &str, with_content: bool) -> Result<Project> {
        let path = self.project_path(user, project)?;
        fs::create_dir_all(&path)?;

        let inherited = Flags {
            nodes: DEFAULT_INDEX_NODES,
            leaves: DEFAULT_INDEX_LEAVES,
        };
        let tree = loader::load_directory(&path, project.to_string(), 0, inherited, with_content)?;
        let loaded = Project::build(user, tree);
        info!(
            user,
            project,
            documents = loaded.all_documents().len(),
            "loaded project from directory"
        );
        Ok(loaded)
    }

    fn save(&self, project: &mut Project, with_content: bool) -> Result<()> {
        let path = self.project_path(project.owner(), project.name())?;
        writer::validate(project)?;
        fs::create_dir_all(&path)?;

        let root = project.root();
        let repo = project[root].repo.clone();
        let mut connected = match &self.git {
            Some(git) => self.sync_remote(git.as_ref(), repo.as_deref(), &path)?,
            None => false,
        };

        let carried;
        let to_write = if with_content {
            &*project
        } else {
            let previous = self.load(project.owner(), project.name(), true)?;
            let mut merged = project.clone();
            merged.carry_content(&previous);
            carried = merged;
            &carried
        };

        writer::prune(&path)?;
        writer::write_directory(to_write, to_write.root(), &path)?;

        if let Some(git) = &self.git {
            connected &= self.commit(git.as_ref(), project, &path)?;
        }
        project.disconnected = !connected;
        info!(
            user = project.owner(),
            project = project.name(),
            connected,
            "saved project to directory"
        );
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "git"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quire_core::{equal, Comparison, Document};

    /// Every document carries a body so nothing is suppressed on save.
    fn scenario() -> Project {
        let mut project = Project::new("Kenny", "Test");
        let root = project.root();
        project[root].content = Some("Kenny's test project.\n".into());
        let notes = project.create_document(root, "notes", false).unwrap();
        project[notes].index_nodes = Some(true);
        project[notes].index_leaves = Some(false);
        project[notes].content = Some("All my notes.".into());

        let mut chars = Document::new("chars", false);
        chars.index = 3;
        chars.index_leaves = Some(true);
        let chars = project.insert(notes, chars).unwrap();
        for (index, name) in [(1, "alice"), (2, "bob"), (3, "franck"), (4, "dave")] {
            let mut leaf = Document::new(name, true);
            leaf.index = index;
            leaf.content = Some(format!("{name} is a character.\n"));
            project.insert(chars, leaf).unwrap();
        }
        let todo = project.create_document(notes, "todo", true).unwrap();
        project[todo].content = Some("- write more\n".into());
        project
    }

    #[test]
    fn save_writes_index_prefixes() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FsStorage::new(dir.path());
        let mut project = scenario();
        storage.save(&mut project, true).unwrap();

        let base = dir.path().join("Kenny").join("Test");
        assert!(base.join("notes").join("03.chars").join("04.dave.md").is_file());
        assert!(base.join("notes").join("todo.md").is_file());
        assert!(base.join("notes").join(".node.md").is_file());
        assert!(base.join(".node.md").is_file());
        assert!(project.disconnected);
    }

    #[test]
    fn reload_recovers_index_names_and_inheritance() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FsStorage::new(dir.path());
        let mut project = scenario();
        storage.save(&mut project, true).unwrap();

        let loaded = storage.load("Kenny", "Test", true).unwrap();
        let chars = loaded.find_path(&["notes", "chars"]).unwrap();
        assert_eq!(loaded[chars].index, 3);
        assert_eq!(loaded[chars].index_nodes, Some(true));
        assert_eq!(loaded[chars].index_leaves, Some(true));

        let dave = loaded.find_path(&["notes", "chars", "dave"]).unwrap();
        assert_eq!(loaded[dave].index, 4);
        assert_eq!(loaded[dave].name, "dave");

        assert!(equal(&project, &loaded, Comparison::Strict));
    }

    #[test]
    fn save_is_idempotent_and_prunes_stale_documents() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FsStorage::new(dir.path());
        let mut project = scenario();
        storage.save(&mut project, true).unwrap();

        let bob = project.find_path(&["notes", "chars", "bob"]).unwrap();
        project.remove(bob).unwrap();
        let dave = project.find_path(&["notes", "chars", "dave"]).unwrap();
        project[dave].name = "david".into();
        storage.save(&mut project, true).unwrap();
        storage.save(&mut project, true).unwrap();

        let chars = dir.path().join("Kenny").join("Test").join("notes").join("03.chars");
        assert!(!chars.join("02.bob.md").exists());
        assert!(!chars.join("04.dave.md").exists());
        assert!(chars.join("04.david.md").is_file());

        let loaded = storage.load("Kenny", "Test", true).unwrap();
        assert!(equal(&project, &loaded, Comparison::Strict));
    }

    #[test]
    fn unindexed_numeric_name_is_not_stripped() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FsStorage::new(dir.path());
        let base = storage.project_path("Kenny", "Test").unwrap();
        fs::create_dir_all(base.join("plain")).unwrap();
        fs::write(
            base.join("plain").join(".node.md"),
            "---\nid: p\nindex.leaves: false\n---\n",
        )
        .unwrap();
        fs::write(base.join("plain").join("03.md"), "third").unwrap();

        let loaded = storage.load("Kenny", "Test", true).unwrap();
        let leaf = loaded.find_path(&["plain", "03"]).unwrap();
        assert_eq!(loaded[leaf].index, 0);
        assert_eq!(loaded[leaf].name, "03");
    }

    #[test]
    fn load_bootstraps_a_missing_project() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FsStorage::new(dir.path());
        let project = storage.load("Kenny", "Fresh", true).unwrap();
        assert_eq!(project.name(), "Fresh");
        assert!(project.children(project.root()).is_empty());
        assert!(dir.path().join("Kenny").join("Fresh").is_dir());
    }

    #[test]
    fn metadata_less_documents_round_trip_structurally() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FsStorage::new(dir.path());
        let mut project = Project::new("Kenny", "Test");
        let root = project.root();
        let empty_dir = project.create_document(root, "drafts", false).unwrap();
        let leaf = project.create_document(empty_dir, "idea", true).unwrap();
        project[leaf].content = Some("an idea".into());
        storage.save(&mut project, true).unwrap();

        assert!(!dir.path().join("Kenny").join("Test").join("drafts").join(".node.md").exists());
        let loaded = storage.load("Kenny", "Test", true).unwrap();
        assert!(equal(&project, &loaded, Comparison::IgnoreMetadata));
        assert!(!equal(&project, &loaded, Comparison::Strict));
    }

    #[test]
    fn save_without_content_keeps_stored_bodies() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FsStorage::new(dir.path());
        let mut project = scenario();
        storage.save(&mut project, true).unwrap();

        let mut structure = storage.load("Kenny", "Test", false).unwrap();
        let todo = structure.find_path(&["notes", "todo"]).unwrap();
        structure[todo].name = "tasks".into();
        storage.save(&mut structure, false).unwrap();
        assert!(structure[todo].content.is_none());

        let loaded = storage.load("Kenny", "Test", true).unwrap();
        assert!(loaded.find_path(&["notes", "todo"]).is_none());
        let tasks = loaded.find_path(&["notes", "tasks"]).unwrap();
        assert_eq!(loaded[tasks].content.as_deref(), Some("- write more\n"));
    }

    #[test]
    fn invalid_names_fail_before_touching_disk() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FsStorage::new(dir.path());
        let mut project = scenario();
        storage.save(&mut project, true).unwrap();

        let root = project.root();
        project.create_document(root, ".sneaky", true).unwrap();
        assert!(matches!(
            storage.save(&mut project, true),
            Err(QuireError::InvalidName(_))
        ));
        let base = dir.path().join("Kenny").join("Test");
        assert!(base.join("notes").join("todo.md").is_file());
    }

    #[test]
    fn git_backed_save_commits_locally_without_remote() {
        let dir = tempfile::tempdir().unwrap();
        let host = Arc::new(LocalGitHost::new(dir.path().join("remotes")));
        let storage = FsStorage::with_git(dir.path().join("data"), host);
        let mut project = scenario();
        let root = project.root();
        project[root].repo = Some("missing".into());

        storage.save(&mut project, true).unwrap();

        assert!(project.disconnected);
        let base = dir.path().join("data").join("Kenny").join("Test");
        assert!(base.join(".git").is_dir());
        assert!(base.join(".node.md").is_file());

        // The working tree survives a second save with version control intact.
        storage.save(&mut project, true).unwrap();
        let loaded = storage.load("Kenny", "Test", true).unwrap();
        assert_eq!(loaded[loaded.root()].repo.as_deref(), Some("missing"));
        assert!(equal(&project, &loaded, Comparison::Strict));
    }

    #[test]
    fn git_backed_save_pushes_to_existing_remote() {
        let dir = tempfile::tempdir().unwrap();
        let host = Arc::new(LocalGitHost::new(dir.path().join("remotes")));
        host.create("test-notes").unwrap();
        let storage = FsStorage::with_git(dir.path().join("data"), host.clone());
        let mut project = scenario();
        let root = project.root();
        project[root].repo = Some("test-notes".into());

        storage.save(&mut project, true).unwrap();
        assert!(!project.disconnected);

        let mirror = dir.path().join("mirror");
        host.clone_repo("test-notes", &mirror).unwrap();
        assert!(mirror.join("notes").join("03.chars").join("01.alice.md").is_file());
    }

    #[test]
    fn git_backed_save_reconnects_once_the_remote_appears() {
        let dir = tempfile::tempdir().unwrap();
        let host = Arc::new(LocalGitHost::new(dir.path().join("remotes")));
        let storage = FsStorage::with_git(dir.path().join("data"), host.clone());
        let mut project = scenario();
        let root = project.root();
        project[root].repo = Some("late".into());

        storage.save(&mut project, true).unwrap();
        assert!(project.disconnected);
        let base = dir.path().join("data").join("Kenny").join("Test");
        assert!(!host.has_origin(&base).unwrap());

        host.create("late").unwrap();
        storage.save(&mut project, true).unwrap();
        assert!(!project.disconnected);
        assert!(host.has_origin(&base).unwrap());

        let mirror = dir.path().join("mirror");
        host.clone_repo("late", &mirror).unwrap();
        assert!(mirror.join(".node.md").is_file());
        assert!(mirror.join("notes").join("todo.md").is_file());
    }
}
