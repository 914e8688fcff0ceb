//! Change notifications for a directory-backed project.
//!
//! Only paths the directory codec would read are reported: leaf files and
//! directory documents outside reserved directories.

use std::path::{Component, Path, PathBuf};
use std::sync::mpsc;
use std::time::Duration;

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};

use quire_core::QuireError;

use crate::layout::{is_reserved, leaf_stem, DIRECTORY_DOCUMENT};

/// Events emitted by the project watcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProjectEvent {
    /// A leaf file or directory document was created or modified.
    Changed(PathBuf),
    /// A leaf file or directory document was deleted.
    Removed(PathBuf),
}

/// Whether `path` below `root` is something the directory codec reads.
fn is_document_path(root: &Path, path: &Path) -> bool {
    let Ok(relative) = path.strip_prefix(root) else {
        return false;
    };
    let mut components: Vec<&str> = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => match part.to_str() {
                Some(part) => components.push(part),
                None => return false,
            },
            _ => return false,
        }
    }
    let Some((file, dirs)) = components.split_last() else {
        return false;
    };
    if dirs.iter().any(|dir| is_reserved(dir)) {
        return false;
    }
    *file == DIRECTORY_DOCUMENT || (!is_reserved(file) && leaf_stem(file).is_some())
}

/// Watches a project directory for document changes and emits events.
pub struct ProjectWatcher {
    _watcher: RecommendedWatcher,
    receiver: mpsc::Receiver<ProjectEvent>,
}

impl ProjectWatcher {
    /// Start watching a project directory for changes.
    ///
    /// # Errors
    ///
    /// Returns [`QuireError::Io`] if the watcher cannot be created.
    pub fn start(project_root: &Path) -> Result<Self, QuireError> {
        let (tx, rx) = mpsc::channel();
        let root = project_root.to_path_buf();

        let mut watcher = notify::recommended_watcher(move |res: Result<Event, notify::Error>| {
            if let Ok(event) = res {
                for path in &event.paths {
                    if !is_document_path(&root, path) {
                        continue;
                    }
                    let project_event = match event.kind {
                        EventKind::Create(_) | EventKind::Modify(_) => {
                            ProjectEvent::Changed(path.clone())
                        }
                        EventKind::Remove(_) => ProjectEvent::Removed(path.clone()),
                        _ => continue,
                    };
                    let _ = tx.send(project_event);
                }
            }
        })
        .map_err(|e| QuireError::Io(std::io::Error::other(e)))?;

        watcher
            .watch(project_root, RecursiveMode::Recursive)
            .map_err(|e| QuireError::Io(std::io::Error::other(e)))?;

        Ok(Self {
            _watcher: watcher,
            receiver: rx,
        })
    }

    /// Try to receive the next event with a timeout.
    ///
    /// Returns `None` if no event is available within the timeout.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<ProjectEvent> {
        self.receiver.recv_timeout(timeout).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    /// Next event about `name`, skipping unrelated ones.
    fn next_about(watcher: &ProjectWatcher, name: &str) -> Option<ProjectEvent> {
        while let Some(event) = watcher.recv_timeout(Duration::from_secs(2)) {
            let (ProjectEvent::Changed(path) | ProjectEvent::Removed(path)) = &event;
            if path.ends_with(name) {
                return Some(event);
            }
        }
        None
    }

    #[test]
    fn classifies_document_paths() {
        let root = Path::new("/p");
        assert!(is_document_path(root, Path::new("/p/notes/03.chars/04.dave.md")));
        assert!(is_document_path(root, Path::new("/p/notes/.node.md")));
        assert!(is_document_path(root, Path::new("/p/.node.md")));
        assert!(!is_document_path(root, Path::new("/p/.git/HEAD.md")));
        assert!(!is_document_path(root, Path::new("/p/notes/.draft.md")));
        assert!(!is_document_path(root, Path::new("/p/notes/readme.txt")));
        assert!(!is_document_path(root, Path::new("/q/notes/a.md")));
        assert!(!is_document_path(root, Path::new("/p")));
    }

    #[test]
    fn reports_leaf_written_in_nested_directory() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().canonicalize().unwrap();
        let chars = root.join("notes").join("03.chars");
        fs::create_dir_all(&chars).unwrap();

        let watcher = ProjectWatcher::start(&root).unwrap();
        fs::write(chars.join("04.dave.md"), "dave is a character.").unwrap();

        match next_about(&watcher, "04.dave.md") {
            Some(ProjectEvent::Changed(path)) => assert!(path.starts_with(&chars)),
            other => panic!("expected a change to 04.dave.md, got {other:?}"),
        }
    }

    #[test]
    fn reports_directory_document_removal() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().canonicalize().unwrap();
        fs::create_dir_all(root.join("notes")).unwrap();
        let record = root.join("notes").join(DIRECTORY_DOCUMENT);
        fs::write(&record, "---\nindex.nodes: true\n---\n").unwrap();

        let watcher = ProjectWatcher::start(&root).unwrap();
        std::thread::sleep(Duration::from_millis(100));
        fs::remove_file(&record).unwrap();

        let mut removed = false;
        while let Some(event) = next_about(&watcher, DIRECTORY_DOCUMENT) {
            if matches!(event, ProjectEvent::Removed(_)) {
                removed = true;
                break;
            }
        }
        assert!(removed, "removing .node.md was not reported");
    }

    #[test]
    fn stays_quiet_for_vcs_and_foreign_files() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().canonicalize().unwrap();
        fs::create_dir_all(root.join(".git").join("refs")).unwrap();

        let watcher = ProjectWatcher::start(&root).unwrap();
        fs::write(root.join(".git").join("refs").join("main.md"), "x").unwrap();
        fs::write(root.join("todo.txt"), "not a document").unwrap();
        fs::write(root.join(".scratch.md"), "hidden").unwrap();

        assert_eq!(watcher.recv_timeout(Duration::from_millis(500)), None);
    }
}
