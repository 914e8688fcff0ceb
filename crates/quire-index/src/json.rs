//! JSON blob storage: one file per project holding the whole tree.

use std::fs;
use std::io::Write;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use quire_core::{validate_name, DocumentTree, Project, QuireError, Result, Storage};

/// Stored shape of a project blob.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectRecord {
    pub owner: String,
    pub saved_at: DateTime<Utc>,
    pub tree: DocumentTree,
}

/// Storage keeping each project as `<root>/<project>.json`.
pub struct JsonStorage {
    root: PathBuf,
}

impl JsonStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn record_path(&self, project: &str) -> Result<PathBuf> {
        validate_name(project)?;
        Ok(self.root.join(format!("{project}.json")))
    }

    /// Read the stored record of `project`, if any.
    fn read_record(&self, project: &str) -> Result<Option<ProjectRecord>> {
        let path = self.record_path(project)?;
        if !path.is_file() {
            return Ok(None);
        }
        let text = fs::read_to_string(&path)?;
        Ok(Some(serde_json::from_str(&text)?))
    }
}

impl Storage for JsonStorage {
    fn load(&self, user: &str, project: &str, with_content: bool) -> Result<Project> {
        let record = self
            .read_record(project)?
            .ok_or_else(|| QuireError::NotFound(format!("project '{project}'")))?;
        if record.owner != user {
            return Err(QuireError::unauthorized(user, project));
        }

        let mut loaded = Project::build(record.owner, record.tree);
        if !with_content {
            loaded.strip_content();
        }
        info!(
            user,
            project,
            documents = loaded.all_documents().len(),
            "loaded project from json"
        );
        Ok(loaded)
    }

    fn save(&self, project: &mut Project, with_content: bool) -> Result<()> {
        let path = self.record_path(project.name())?;
        let stored = self.read_record(project.name())?;
        if let Some(stored) = &stored {
            if stored.owner != project.owner() {
                return Err(QuireError::unauthorized(project.owner(), project.name()));
            }
        }

        let mut tree = project.to_tree();
        if !with_content {
            if let Some(stored) = stored {
                let previous = Project::build(stored.owner, stored.tree);
                let mut merged = project.clone();
                merged.carry_content(&previous);
                tree = merged.to_tree();
            }
        }
        let record = ProjectRecord {
            owner: project.owner().to_string(),
            saved_at: Utc::now(),
            tree,
        };

        fs::create_dir_all(&self.root)?;
        let mut file = tempfile::NamedTempFile::new_in(&self.root)?;
        serde_json::to_writer_pretty(&mut file, &record)?;
        file.write_all(b"\n")?;
        file.persist(&path).map_err(|e| QuireError::Io(e.error))?;

        project.disconnected = false;
        info!(
            user = project.owner(),
            project = project.name(),
            "saved project to json"
        );
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "json"
    }
}
