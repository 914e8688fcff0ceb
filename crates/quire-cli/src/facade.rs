//! Backend selection and per-project save serialization.

use std::collections::HashMap;
use std::fs;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::debug;

use quire_core::{Project, QuireError, Result, Storage};
use quire_index::{DatabaseStorage, JsonStorage};
use quire_vault::{FsStorage, LocalGitHost};

use crate::config::{Backend, Config};

/// Build the codec `backend` names, configured from `config`.
pub fn open_storage(config: &Config, backend: Backend) -> Result<LockedStorage> {
    let storage: Box<dyn Storage> = match backend {
        Backend::Git if config.git.enabled => {
            let host = LocalGitHost::new(config.remotes_dir())
                .with_signature(&config.git.author, &config.git.email);
            Box::new(FsStorage::with_git(&config.root, Arc::new(host)))
        }
        Backend::Git => Box::new(FsStorage::new(&config.root)),
        Backend::Json => Box::new(JsonStorage::new(&config.root)),
        Backend::Database => {
            let path = config.database_path();
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            Box::new(DatabaseStorage::open(&path)?)
        }
    };
    debug!(backend = storage.backend(), root = %config.root.display(), "opened storage");
    Ok(LockedStorage::new(storage))
}

/// A storage that never runs two saves of the same project at once.
///
/// Directory saves prune before they rebuild, so concurrent writers of one
/// project would corrupt each other. Saves of different projects proceed
/// in parallel.
pub struct LockedStorage {
    inner: Box<dyn Storage>,
    locks: Mutex<HashMap<(String, String), Arc<Mutex<()>>>>,
}

impl LockedStorage {
    pub fn new(inner: Box<dyn Storage>) -> Self {
        Self {
            inner,
            locks: Mutex::new(HashMap::new()),
        }
    }

    fn table(&self) -> Result<MutexGuard<'_, HashMap<(String, String), Arc<Mutex<()>>>>> {
        self.locks
            .lock()
            .map_err(|_| QuireError::Malformed("project lock table poisoned".to_string()))
    }

    fn project_lock(&self, owner: &str, project: &str) -> Result<Arc<Mutex<()>>> {
        Ok(self
            .table()?
            .entry((owner.to_string(), project.to_string()))
            .or_default()
            .clone())
    }

    /// Drop the table entry for a project once no save holds or awaits it.
    fn release(&self, owner: &str, project: &str, lock: Arc<Mutex<()>>) -> Result<()> {
        let mut locks = self.table()?;
        let key = (owner.to_string(), project.to_string());
        // The table's handle plus ours: nobody else is queued.
        if Arc::strong_count(&lock) == 2 {
            locks.remove(&key);
        }
        Ok(())
    }
}

impl Storage for LockedStorage {
    fn load(&self, user: &str, project: &str, with_content: bool) -> Result<Project> {
        self.inner.load(user, project, with_content)
    }

    fn save(&self, project: &mut Project, with_content: bool) -> Result<()> {
        let (owner, name) = (project.owner().to_string(), project.name().to_string());
        let lock = self.project_lock(&owner, &name)?;
        let saved = {
            let _guard = lock
                .lock()
                .map_err(|_| QuireError::Malformed("project lock poisoned".to_string()))?;
            self.inner.save(project, with_content)
        };
        self.release(&owner, &name, lock)?;
        saved
    }

    fn backend(&self) -> &'static str {
        self.inner.backend()
    }
}
