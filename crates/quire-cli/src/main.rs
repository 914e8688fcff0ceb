//! Quire CLI: hierarchical notes projects on git, JSON, or a database
//!
//! Commands: init, tree, add, export, import, copy, verify, watch

mod config;
mod facade;

use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::Parser;
use serde_json::json;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use quire_core::metadata::needs_record;
use quire_core::{equal, validate_name, Comparison, NodeId, Project, QuireError, Storage};
use quire_index::ProjectRecord;
use quire_vault::layout::encode_name;
use quire_vault::{FsStorage, ProjectEvent, ProjectWatcher};

use crate::config::{Backend, Config, CONFIG_FILE};
use crate::facade::{open_storage, LockedStorage};

#[derive(Parser)]
#[command(name = "quire")]
#[command(version)]
#[command(about = "Hierarchical notes projects stored as git trees, JSON blobs, or a database")]
struct Cli {
    /// Config file (default: ./quire.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Storage backend, overriding the config file
    #[arg(long, global = true, value_enum)]
    backend: Option<Backend>,
    /// Storage root, overriding the config file
    #[arg(long, global = true)]
    root: Option<PathBuf>,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Create the storage root and write a quire.toml
    Init,
    /// Print a project's document tree
    Tree { user: String, project: String },
    /// Create or update a document at a slash-separated path
    Add {
        user: String,
        project: String,
        path: String,
        /// Create a text document instead of a directory
        #[arg(long)]
        leaf: bool,
        /// Text body; may start with a dash, as markdown lists do
        #[arg(long, allow_hyphen_values = true)]
        content: Option<String>,
        /// Position among its siblings
        #[arg(long)]
        index: Option<i32>,
    },
    /// Write a project as JSON to stdout
    Export { user: String, project: String },
    /// Save a project exported as JSON
    Import { file: PathBuf },
    /// Copy a project into another backend
    Copy {
        user: String,
        project: String,
        #[arg(long, value_enum)]
        to: Backend,
        /// Root of the target backend (default: the configured root)
        #[arg(long)]
        to_root: Option<PathBuf>,
    },
    /// Save and reload a project, checking nothing changed
    Verify { user: String, project: String },
    /// Report document changes in a directory-backed project
    Watch {
        user: String,
        project: String,
        /// Stop after this many events
        #[arg(long)]
        limit: Option<usize>,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            debug!(error = ?err, "command failed");
            let quire = err.downcast_ref::<QuireError>();
            match quire {
                Some(quire) => eprintln!("error: {}", quire.public_message()),
                None => eprintln!("error: {err}"),
            }
            match quire.map(QuireError::kind) {
                Some(quire_core::ErrorKind::NotFound) => ExitCode::from(3),
                Some(quire_core::ErrorKind::Unauthorized) => ExitCode::from(4),
                _ => ExitCode::FAILURE,
            }
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(backend) = cli.backend {
        config.backend = backend;
    }
    if let Some(root) = cli.root {
        config.root = root;
    }

    let Some(command) = cli.command else {
        println!(
            "Quire v{} — hierarchical notes projects",
            env!("CARGO_PKG_VERSION")
        );
        println!("Run `quire --help` for usage.");
        return Ok(());
    };

    match command {
        Commands::Init => cmd_init(&config),
        Commands::Tree { user, project } => cmd_tree(&config, &user, &project),
        Commands::Add {
            user,
            project,
            path,
            leaf,
            content,
            index,
        } => cmd_add(&config, &user, &project, &path, leaf, content, index),
        Commands::Export { user, project } => cmd_export(&config, &user, &project),
        Commands::Import { file } => cmd_import(&config, &file),
        Commands::Copy {
            user,
            project,
            to,
            to_root,
        } => cmd_copy(&config, &user, &project, to, to_root),
        Commands::Verify { user, project } => cmd_verify(&config, &user, &project),
        Commands::Watch {
            user,
            project,
            limit,
        } => cmd_watch(&config, &user, &project, limit),
    }
}

fn storage(config: &Config) -> Result<LockedStorage> {
    open_storage(config, config.backend)
        .with_context(|| format!("opening {} storage at {}", config.backend, config.root.display()))
}

fn print_json(value: &impl serde::Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn cmd_init(config: &Config) -> Result<()> {
    fs::create_dir_all(&config.root)
        .with_context(|| format!("creating {}", config.root.display()))?;
    let storage = storage(config)?;

    let config_path = PathBuf::from(CONFIG_FILE);
    if !config_path.exists() {
        fs::write(&config_path, config.to_toml()?)
            .with_context(|| format!("writing {}", config_path.display()))?;
    }
    println!(
        "Initialized quire {} storage at {}",
        storage.backend(),
        config.root.display()
    );
    Ok(())
}

fn cmd_tree(config: &Config, user: &str, project: &str) -> Result<()> {
    let loaded = storage(config)?.load(user, project, false)?;
    let mut out = String::new();
    render(&loaded, loaded.root(), 0, &mut out);
    print!("{out}");
    Ok(())
}

/// One line per document, children indented under their parent, names
/// shown as the directory codec spells them.
fn render(project: &Project, node: NodeId, depth: usize, out: &mut String) {
    let doc = &project[node];
    let label = match doc.parent() {
        Some(parent) => {
            let parent = &project[parent];
            let indexed = if doc.is_leaf() {
                parent.index_leaves
            } else {
                parent.index_nodes
            };
            encode_name(&doc.name, doc.index, indexed.unwrap_or(false))
        }
        None => doc.name.clone(),
    };
    let suffix = if doc.is_leaf() { "" } else { "/" };
    out.push_str(&format!("{}{label}{suffix}\n", "  ".repeat(depth)));
    for child in project.children(node) {
        render(project, *child, depth + 1, out);
    }
}

fn cmd_add(
    config: &Config,
    user: &str,
    project_name: &str,
    path: &str,
    leaf: bool,
    content: Option<String>,
    index: Option<i32>,
) -> Result<()> {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    let Some((last, dirs)) = segments.split_last() else {
        bail!("empty document path");
    };
    for segment in &segments {
        validate_name(segment)?;
    }

    let storage = storage(config)?;
    let mut project = match storage.load(user, project_name, true) {
        Ok(project) => project,
        Err(QuireError::NotFound(_)) => Project::new(user, project_name),
        Err(err) => return Err(err.into()),
    };

    let mut parent = project.root();
    for dir in dirs {
        parent = match child_named(&project, parent, dir) {
            Some(existing) if project[existing].is_leaf() => {
                bail!("'{dir}' is a text document and cannot hold children")
            }
            Some(existing) => existing,
            None => project.create_document(parent, *dir, false)?,
        };
    }
    let node = match child_named(&project, parent, last) {
        Some(existing) if project[existing].is_leaf() != leaf => {
            bail!("'{last}' already exists with a different kind")
        }
        Some(existing) => existing,
        None => project.create_document(parent, *last, leaf)?,
    };
    if let Some(content) = content {
        project[node].content = Some(content);
    }
    if let Some(index) = index {
        project[node].index = index;
        project.sort_children(parent);
    }
    if config.backend == Backend::Git
        && project[node].is_leaf()
        && !needs_record(&project[node], Some(&project[parent]))
    {
        bail!("'{last}' has no content and would not be stored; pass --content");
    }

    storage.save(&mut project, true)?;
    info!(user, project = project_name, path, "added document");
    print_json(&project[node])
}

fn child_named(project: &Project, parent: NodeId, name: &str) -> Option<NodeId> {
    project
        .children(parent)
        .iter()
        .copied()
        .find(|child| project[*child].name == name)
}

fn cmd_export(config: &Config, user: &str, project: &str) -> Result<()> {
    let loaded = storage(config)?.load(user, project, true)?;
    print_json(&ProjectRecord {
        owner: loaded.owner().to_string(),
        saved_at: Utc::now(),
        tree: loaded.to_tree(),
    })
}

fn cmd_import(config: &Config, file: &std::path::Path) -> Result<()> {
    let text =
        fs::read_to_string(file).with_context(|| format!("reading {}", file.display()))?;
    let record: ProjectRecord =
        serde_json::from_str(&text).with_context(|| format!("parsing {}", file.display()))?;
    let mut project = Project::build(record.owner, record.tree);

    let storage = storage(config)?;
    storage.save(&mut project, true)?;
    print_json(&json!({
        "owner": project.owner(),
        "project": project.name(),
        "documents": project.all_documents().len(),
        "backend": storage.backend(),
        "disconnected": project.disconnected,
    }))
}

fn cmd_copy(
    config: &Config,
    user: &str,
    project: &str,
    to: Backend,
    to_root: Option<PathBuf>,
) -> Result<()> {
    let source = storage(config)?;
    let mut target_config = config.clone();
    target_config.backend = to;
    if let Some(root) = to_root {
        target_config.root = root;
    }
    let target = storage(&target_config)?;

    let mut copied = source.load(user, project, true)?;
    target.save(&mut copied, true)?;
    let reloaded = target.load(user, project, true)?;
    print_json(&json!({
        "project": project,
        "from": source.backend(),
        "to": target.backend(),
        "documents": reloaded.all_documents().len(),
        "equal": equal(&copied, &reloaded, Comparison::Strict),
        "disconnected": copied.disconnected,
    }))
}

fn cmd_verify(config: &Config, user: &str, project: &str) -> Result<()> {
    let storage = storage(config)?;
    let mut loaded = storage.load(user, project, true)?;
    let original = loaded.clone();
    storage.save(&mut loaded, true)?;
    let reloaded = storage.load(user, project, true)?;

    let strict = equal(&original, &reloaded, Comparison::Strict);
    let structural = strict || equal(&original, &reloaded, Comparison::IgnoreMetadata);
    print_json(&json!({
        "project": project,
        "backend": storage.backend(),
        "documents": reloaded.all_documents().len(),
        "equal": strict,
        "structure_equal": structural,
    }))?;
    if !structural {
        bail!("project '{project}' changed across a save and reload");
    }
    Ok(())
}

fn cmd_watch(config: &Config, user: &str, project: &str, limit: Option<usize>) -> Result<()> {
    if config.backend != Backend::Git {
        bail!("watch needs the git backend, not {}", config.backend);
    }
    let path = FsStorage::new(&config.root).project_path(user, project)?;
    fs::create_dir_all(&path)?;
    let watcher = ProjectWatcher::start(&path)?;
    eprintln!("Watching {}", path.display());

    let mut seen = 0;
    while limit.map_or(true, |limit| seen < limit) {
        let Some(event) = watcher.recv_timeout(Duration::from_millis(500)) else {
            continue;
        };
        let (kind, changed) = match &event {
            ProjectEvent::Changed(p) => ("changed", p),
            ProjectEvent::Removed(p) => ("removed", p),
        };
        let relative = changed.strip_prefix(&path).unwrap_or(changed);
        println!("{}", json!({ "event": kind, "path": relative.display().to_string() }));
        seen += 1;
    }
    Ok(())
}
