//! `quire.toml` configuration.
//!
//! ```toml
//! backend = "git"          # git | json | database
//! root = "quire-data"
//!
//! [git]
//! enabled = true
//! remotes = "quire-data/.remotes"
//! author = "Kenny"
//! email = "kenny@example.com"
//!
//! [database]
//! path = "quire-data/quire.db"
//! ```

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// File looked up in the working directory when no `--config` is given.
pub const CONFIG_FILE: &str = "quire.toml";

/// Which codec serves the projects.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Directory trees, optionally under git.
    #[default]
    Git,
    /// One JSON file per project.
    Json,
    /// SQLite document database.
    Database,
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Git => "git",
            Self::Json => "json",
            Self::Database => "database",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub backend: Backend,
    pub root: PathBuf,
    pub git: GitConfig,
    pub database: DatabaseConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GitConfig {
    pub enabled: bool,
    /// Directory of bare remotes; `<root>/.remotes` when unset.
    pub remotes: Option<PathBuf>,
    pub author: String,
    pub email: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite file; `<root>/quire.db` when unset.
    pub path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend: Backend::Git,
            root: PathBuf::from("quire-data"),
            git: GitConfig::default(),
            database: DatabaseConfig::default(),
        }
    }
}

impl Default for GitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            remotes: None,
            author: "quire".to_string(),
            email: "quire@localhost".to_string(),
        }
    }
}

impl Config {
    /// Read `path`, or `quire.toml` in the working directory when `path` is
    /// `None`. Only an explicitly named file is required to exist.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let (path, required) = match path {
            Some(path) => (path.to_path_buf(), true),
            None => (PathBuf::from(CONFIG_FILE), false),
        };
        if !required && !path.is_file() {
            return Ok(Self::default());
        }
        let text = fs::read_to_string(&path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("parsing config {}", path.display()))
    }

    pub fn parse(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn remotes_dir(&self) -> PathBuf {
        self.git
            .remotes
            .clone()
            .unwrap_or_else(|| self.root.join(".remotes"))
    }

    pub fn database_path(&self) -> PathBuf {
        self.database
            .path
            .clone()
            .unwrap_or_else(|| self.root.join("quire.db"))
    }
}
