//! Git hosting collaborator.
//!
//! The directory codec keeps a project's working tree in step with a
//! remote through [`GitHost`]. [`LocalGitHost`] hosts remotes as bare
//! repositories under one directory.

use std::fs;
use std::path::{Path, PathBuf};

use git2::build::CheckoutBuilder;
use git2::{ErrorCode, IndexAddOption, PushOptions, RemoteCallbacks, Repository, Signature};
use tracing::{debug, info};

use quire_core::{QuireError, Result};

/// Remote repository operations used around a save.
///
/// Failures reaching a remote are reported as
/// [`QuireError::RemoteDisconnected`] so callers can fall back to a
/// local-only save.
pub trait GitHost: Send + Sync {
    /// Create the remote repository `repo`. Creating an existing one is a no-op.
    fn create(&self, repo: &str) -> Result<()>;
    fn exists(&self, repo: &str) -> Result<bool>;
    fn delete(&self, repo: &str) -> Result<()>;
    /// Fast-forward the working tree at `path` from its `origin`.
    fn pull(&self, path: &Path) -> Result<()>;
    /// Whether the working tree at `path` has an `origin` to pull from.
    fn has_origin(&self, path: &Path) -> Result<bool>;
    /// Make `path` a working tree of `repo`. An existing working tree
    /// gets `repo` as its `origin` and is fast-forwarded from it.
    fn clone_repo(&self, repo: &str, path: &Path) -> Result<()>;
    /// Stage everything under `path`, commit, and push when an `origin` exists.
    fn commit(&self, path: &Path, message: &str) -> Result<()>;
}

fn git_err(err: git2::Error) -> QuireError {
    QuireError::Git(err.message().to_string())
}

fn remote_err(err: git2::Error) -> QuireError {
    QuireError::RemoteDisconnected(err.message().to_string())
}

/// Git host keeping bare remotes in a local directory.
#[derive(Debug, Clone)]
pub struct LocalGitHost {
    remotes: PathBuf,
    author: String,
    email: String,
}

impl LocalGitHost {
    pub fn new(remotes: impl Into<PathBuf>) -> Self {
        Self {
            remotes: remotes.into(),
            author: "quire".to_string(),
            email: "quire@localhost".to_string(),
        }
    }

    pub fn with_signature(mut self, author: impl Into<String>, email: impl Into<String>) -> Self {
        self.author = author.into();
        self.email = email.into();
        self
    }

    /// Location of the bare repository backing `repo`.
    pub fn remote_path(&self, repo: &str) -> Result<PathBuf> {
        crate::layout::validate_name(repo)?;
        Ok(self.remotes.join(format!("{repo}.git")))
    }

    fn remote_url(&self, repo: &str) -> Result<String> {
        let path = self.remote_path(repo)?;
        if !self.exists(repo)? {
            return Err(QuireError::RemoteDisconnected(format!(
                "remote repository '{repo}' does not exist"
            )));
        }
        Ok(path.to_string_lossy().into_owned())
    }
}

/// Full name of the branch `HEAD` points at, born or not.
fn current_branch(repo: &Repository) -> Result<String> {
    let head = repo.find_reference("HEAD").map_err(git_err)?;
    Ok(head
        .symbolic_target()
        .unwrap_or("refs/heads/master")
        .to_string())
}

impl GitHost for LocalGitHost {
    fn create(&self, repo: &str) -> Result<()> {
        let path = self.remote_path(repo)?;
        if !self.exists(repo)? {
            fs::create_dir_all(&path)?;
            Repository::init_bare(&path).map_err(git_err)?;
            info!(repo, "created remote repository");
        }
        Ok(())
    }

    fn exists(&self, repo: &str) -> Result<bool> {
        let path = self.remote_path(repo)?;
        Ok(Repository::open_bare(path).is_ok())
    }

    fn delete(&self, repo: &str) -> Result<()> {
        if !self.exists(repo)? {
            return Err(QuireError::NotFound(format!("remote repository '{repo}'")));
        }
        fs::remove_dir_all(self.remote_path(repo)?)?;
        info!(repo, "deleted remote repository");
        Ok(())
    }

    fn pull(&self, path: &Path) -> Result<()> {
        let repo = Repository::open(path).map_err(git_err)?;
        let mut remote = match repo.find_remote("origin") {
            Ok(remote) => remote,
            Err(err) if err.code() == ErrorCode::NotFound => {
                return Err(QuireError::RemoteDisconnected(
                    "working tree has no origin".to_string(),
                ))
            }
            Err(err) => return Err(git_err(err)),
        };
        remote
            .fetch(&[] as &[&str], None, None)
            .map_err(remote_err)?;

        let branch = current_branch(&repo)?;
        let short = branch.trim_start_matches("refs/heads/");
        let tracking = match repo.find_reference(&format!("refs/remotes/origin/{short}")) {
            Ok(reference) => reference,
            Err(err) if err.code() == ErrorCode::NotFound => {
                debug!(path = %path.display(), "remote has no history yet");
                return Ok(());
            }
            Err(err) => return Err(git_err(err)),
        };
        let incoming = repo
            .reference_to_annotated_commit(&tracking)
            .map_err(git_err)?;
        let (analysis, _) = repo.merge_analysis(&[&incoming]).map_err(git_err)?;

        if analysis.is_up_to_date() {
            return Ok(());
        }
        if !(analysis.is_fast_forward() || analysis.is_unborn()) {
            return Err(QuireError::RemoteDisconnected(
                "local history diverged from origin".to_string(),
            ));
        }
        repo.reference(&branch, incoming.id(), true, "pull: fast-forward")
            .map_err(git_err)?;
        repo.set_head(&branch).map_err(git_err)?;
        repo.checkout_head(Some(CheckoutBuilder::new().force()))
            .map_err(git_err)?;
        debug!(path = %path.display(), "fast-forwarded from origin");
        Ok(())
    }

    fn has_origin(&self, path: &Path) -> Result<bool> {
        let repo = Repository::open(path).map_err(git_err)?;
        let found = match repo.find_remote("origin") {
            Ok(_) => Ok(true),
            Err(err) if err.code() == ErrorCode::NotFound => Ok(false),
            Err(err) => Err(git_err(err)),
        };
        found
    }

    fn clone_repo(&self, repo: &str, path: &Path) -> Result<()> {
        let url = self.remote_url(repo)?;
        let occupied = path.is_dir() && fs::read_dir(path)?.next().is_some();
        if occupied {
            let local = Repository::init(path).map_err(git_err)?;
            match local.find_remote("origin") {
                Ok(_) => local.remote_set_url("origin", &url).map_err(git_err)?,
                Err(err) if err.code() == ErrorCode::NotFound => {
                    local.remote("origin", &url).map_err(git_err)?;
                }
                Err(err) => return Err(git_err(err)),
            }
            info!(repo, path = %path.display(), "attached working tree to remote");
            return self.pull(path);
        }
        Repository::clone(&url, path).map_err(remote_err)?;
        info!(repo, path = %path.display(), "cloned remote repository");
        Ok(())
    }

    fn commit(&self, path: &Path, message: &str) -> Result<()> {
        let repo = match Repository::open(path) {
            Ok(repo) => repo,
            Err(err) if err.code() == ErrorCode::NotFound => {
                Repository::init(path).map_err(git_err)?
            }
            Err(err) => return Err(git_err(err)),
        };

        let mut index = repo.index().map_err(git_err)?;
        index
            .add_all(["*"].iter(), IndexAddOption::DEFAULT, None)
            .map_err(git_err)?;
        index.update_all(["*"].iter(), None).map_err(git_err)?;
        index.write().map_err(git_err)?;
        let tree_id = index.write_tree().map_err(git_err)?;
        let tree = repo.find_tree(tree_id).map_err(git_err)?;

        let sig = Signature::now(&self.author, &self.email).map_err(git_err)?;
        let parent = match repo.head() {
            Ok(head) => Some(head.peel_to_commit().map_err(git_err)?),
            Err(_) => None,
        };
        let parents: Vec<&git2::Commit> = parent.iter().collect();
        repo.commit(Some("HEAD"), &sig, &sig, message, &tree, &parents)
            .map_err(git_err)?;

        let mut remote = match repo.find_remote("origin") {
            Ok(remote) => remote,
            Err(err) if err.code() == ErrorCode::NotFound => return Ok(()),
            Err(err) => return Err(git_err(err)),
        };
        let branch = current_branch(&repo)?;
        let refspec = format!("{branch}:{branch}");
        let mut rejected: Option<String> = None;
        {
            let mut callbacks = RemoteCallbacks::new();
            callbacks.push_update_reference(|name, status| {
                if let Some(status) = status {
                    rejected = Some(format!("{name}: {status}"));
                }
                Ok(())
            });
            let mut options = PushOptions::new();
            options.remote_callbacks(callbacks);
            remote
                .push(&[refspec.as_str()], Some(&mut options))
                .map_err(remote_err)?;
        }
        match rejected {
            Some(reason) => Err(QuireError::RemoteDisconnected(reason)),
            None => Ok(()),
        }
    }
}
