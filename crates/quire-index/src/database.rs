//! Document database storage on SQLite.
//!
//! The tree is projected onto flat records:
//! - `projects`: one row per project with its owner and root id
//! - `documents`: one row per node, pointing at its parent by id
//! - `contents`: one body per node, carrying project and owner keys

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{info, warn};

use quire_core::{Document, DocumentTree, Project, QuireError, Result, Storage};

/// One `documents` row.
#[derive(Debug, Clone)]
struct DocumentRow {
    id: String,
    parent_id: Option<String>,
    name: String,
    index: i32,
    is_leaf: bool,
    index_nodes: Option<bool>,
    index_leaves: Option<bool>,
    repo: Option<String>,
}

/// Storage backed by a SQLite database. One instance serves concurrent
/// requests; the connection is shared behind a mutex.
pub struct DatabaseStorage {
    conn: Mutex<Connection>,
}

impl DatabaseStorage {
    /// Open or create a database at the given path.
    ///
    /// # Errors
    ///
    /// Returns [`QuireError::Database`] if the database cannot be opened.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).map_err(|e| QuireError::Database(e.to_string()))?;
        Self::with_connection(conn)
    }

    /// Create an in-memory database (useful for testing).
    ///
    /// # Errors
    ///
    /// Returns [`QuireError::Database`] if schema creation fails.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| QuireError::Database(e.to_string()))?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        create_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| QuireError::Database("connection lock poisoned".to_string()))
    }

    /// Fetch the body of one document.
    ///
    /// # Errors
    ///
    /// [`QuireError::NotFound`] when the project or the text is absent,
    /// [`QuireError::Unauthorized`] when either belongs to another user.
    pub fn read_text(&self, user: &str, project: &str, document_id: &str) -> Result<String> {
        let conn = self.lock()?;
        check_owner(&conn, user, project)?;
        let row: Option<(String, String)> = conn
            .query_row(
                "SELECT owner, body FROM contents WHERE project = ?1 AND document_id = ?2",
                params![project, document_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .map_err(|e| QuireError::Database(e.to_string()))?;
        match row {
            None => Err(QuireError::NotFound(format!("text '{document_id}'"))),
            Some((owner, _)) if owner != user => Err(QuireError::unauthorized(user, document_id)),
            Some((_, body)) => Ok(body),
        }
    }

    /// Names of the projects `user` owns.
    pub fn projects(&self, user: &str) -> Result<Vec<String>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare("SELECT name FROM projects WHERE owner = ?1 ORDER BY name")
            .map_err(|e| QuireError::Database(e.to_string()))?;
        let names = stmt
            .query_map(params![user], |row| row.get(0))
            .map_err(|e| QuireError::Database(e.to_string()))?
            .collect::<std::result::Result<Vec<String>, _>>()
            .map_err(|e| QuireError::Database(e.to_string()))?;
        Ok(names)
    }
}

fn create_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS projects (
            name TEXT PRIMARY KEY,
            owner TEXT NOT NULL,
            root_id TEXT NOT NULL,
            saved_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS documents (
            project TEXT NOT NULL,
            id TEXT NOT NULL,
            parent_id TEXT,
            name TEXT NOT NULL,
            idx INTEGER NOT NULL DEFAULT 0,
            is_leaf INTEGER NOT NULL,
            index_nodes INTEGER,
            index_leaves INTEGER,
            repo TEXT,
            PRIMARY KEY (project, id)
        );

        CREATE TABLE IF NOT EXISTS contents (
            project TEXT NOT NULL,
            document_id TEXT NOT NULL,
            owner TEXT NOT NULL,
            body TEXT NOT NULL,
            PRIMARY KEY (project, document_id)
        );

        CREATE INDEX IF NOT EXISTS idx_documents_parent ON documents(project, parent_id);
        CREATE INDEX IF NOT EXISTS idx_projects_owner ON projects(owner);
        ",
    )
    .map_err(|e| QuireError::Database(e.to_string()))?;
    Ok(())
}

/// Ensure `project` exists and belongs to `user`; returns its root id.
fn check_owner(conn: &Connection, user: &str, project: &str) -> Result<String> {
    let row: Option<(String, String)> = conn
        .query_row(
            "SELECT owner, root_id FROM projects WHERE name = ?1",
            params![project],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()
        .map_err(|e| QuireError::Database(e.to_string()))?;
    match row {
        None => Err(QuireError::NotFound(format!("project '{project}'"))),
        Some((owner, _)) if owner != user => Err(QuireError::unauthorized(user, project)),
        Some((_, root_id)) => Ok(root_id),
    }
}

fn read_rows(conn: &Connection, project: &str) -> Result<Vec<DocumentRow>> {
    let mut stmt = conn
        .prepare(
            "SELECT id, parent_id, name, idx, is_leaf, index_nodes, index_leaves, repo
             FROM documents
             WHERE project = ?1",
        )
        .map_err(|e| QuireError::Database(e.to_string()))?;

    let rows = stmt
        .query_map(params![project], |row| {
            Ok(DocumentRow {
                id: row.get(0)?,
                parent_id: row.get(1)?,
                name: row.get(2)?,
                index: row.get(3)?,
                is_leaf: row.get(4)?,
                index_nodes: row.get(5)?,
                index_leaves: row.get(6)?,
                repo: row.get(7)?,
            })
        })
        .map_err(|e| QuireError::Database(e.to_string()))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| QuireError::Database(e.to_string()))?;

    Ok(rows)
}

/// Bodies of `project`, keyed by document id. Every record must carry the
/// requesting owner.
fn read_contents(conn: &Connection, user: &str, project: &str) -> Result<HashMap<String, String>> {
    let mut stmt = conn
        .prepare("SELECT document_id, owner, body FROM contents WHERE project = ?1")
        .map_err(|e| QuireError::Database(e.to_string()))?;
    let rows = stmt
        .query_map(params![project], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })
        .map_err(|e| QuireError::Database(e.to_string()))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| QuireError::Database(e.to_string()))?;

    let mut bodies = HashMap::with_capacity(rows.len());
    for (document_id, owner, body) in rows {
        if owner != user {
            return Err(QuireError::unauthorized(user, document_id));
        }
        bodies.insert(document_id, body);
    }
    Ok(bodies)
}

/// Rebuild the nested tree below `row` from the parent-indexed rows.
fn assemble(
    row: DocumentRow,
    by_parent: &mut HashMap<String, Vec<DocumentRow>>,
    bodies: &mut HashMap<String, String>,
) -> DocumentTree {
    let mut document = Document::new(row.name, row.is_leaf).with_id(row.id);
    document.index = row.index;
    document.index_nodes = row.index_nodes;
    document.index_leaves = row.index_leaves;
    document.repo = row.repo;
    document.content = bodies.remove(document.id());

    if row.is_leaf {
        return DocumentTree::leaf(document);
    }
    let children = by_parent
        .remove(document.id())
        .unwrap_or_default()
        .into_iter()
        .map(|child| assemble(child, by_parent, bodies))
        .collect();
    DocumentTree::node(document, children)
}

impl Storage for DatabaseStorage {
    fn load(&self, user: &str, project: &str, with_content: bool) -> Result<Project> {
        let conn = self.lock()?;
        let root_id = check_owner(&conn, user, project)?;
        let rows = read_rows(&conn, project)?;
        let mut bodies = if with_content {
            read_contents(&conn, user, project)?
        } else {
            HashMap::new()
        };
        drop(conn);

        let total = rows.len();
        let mut root = None;
        let mut by_parent: HashMap<String, Vec<DocumentRow>> = HashMap::new();
        for row in rows {
            if row.id == root_id {
                root = Some(row);
            } else if let Some(parent) = row.parent_id.clone() {
                by_parent.entry(parent).or_default().push(row);
            } else {
                warn!(project, id = %row.id, "ignoring second parentless document");
            }
        }
        let root = root.ok_or_else(|| {
            QuireError::Malformed(format!("project '{project}' has no root document"))
        })?;

        let tree = assemble(root, &mut by_parent, &mut bodies);
        let loaded = Project::build(user, tree);
        if loaded.all_documents().len() < total {
            warn!(
                project,
                orphans = total - loaded.all_documents().len(),
                "ignoring documents unreachable from the root"
            );
        }
        info!(
            user,
            project,
            documents = loaded.all_documents().len(),
            "loaded project from database"
        );
        Ok(loaded)
    }

    fn save(&self, project: &mut Project, with_content: bool) -> Result<()> {
        let owner = project.owner().to_string();
        let name = project.name().to_string();
        quire_core::validate_name(&name)?;

        let mut conn = self.lock()?;
        let tx = conn
            .transaction()
            .map_err(|e| QuireError::Database(e.to_string()))?;

        match check_owner(&tx, &owner, &name) {
            Ok(_) | Err(QuireError::NotFound(_)) => {}
            Err(err) => return Err(err),
        }

        tx.execute("DELETE FROM documents WHERE project = ?1", params![name])
            .map_err(|e| QuireError::Database(e.to_string()))?;
        if with_content {
            tx.execute("DELETE FROM contents WHERE project = ?1", params![name])
                .map_err(|e| QuireError::Database(e.to_string()))?;
        }

        let root = project.root();
        tx.execute(
            "INSERT OR REPLACE INTO projects (name, owner, root_id, saved_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![name, owner, project[root].id(), Utc::now().to_rfc3339()],
        )
        .map_err(|e| QuireError::Database(e.to_string()))?;

        let mut live = HashSet::new();
        {
            let mut insert_doc = tx
                .prepare(
                    "INSERT INTO documents
                    (project, id, parent_id, name, idx, is_leaf, index_nodes, index_leaves, repo)
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                )
                .map_err(|e| QuireError::Database(e.to_string()))?;
            let mut insert_body = tx
                .prepare(
                    "INSERT INTO contents (project, document_id, owner, body)
                     VALUES (?1, ?2, ?3, ?4)",
                )
                .map_err(|e| QuireError::Database(e.to_string()))?;

            for node in project.descendants(root) {
                let doc = &project[node];
                let parent_id = doc.parent().map(|p| project[p].id());
                insert_doc
                    .execute(params![
                        name,
                        doc.id(),
                        parent_id,
                        doc.name,
                        doc.index,
                        doc.is_leaf(),
                        doc.index_nodes,
                        doc.index_leaves,
                        doc.repo,
                    ])
                    .map_err(|e| QuireError::Database(e.to_string()))?;
                live.insert(doc.id().to_string());

                let body = doc.content.as_deref().filter(|c| !c.is_empty());
                if let (true, Some(body)) = (with_content, body) {
                    insert_body
                        .execute(params![name, doc.id(), owner, body])
                        .map_err(|e| QuireError::Database(e.to_string()))?;
                }
            }
        }

        if !with_content {
            tx.execute(
                "DELETE FROM contents WHERE project = ?1 AND document_id NOT IN
                 (SELECT id FROM documents WHERE project = ?1)",
                params![name],
            )
            .map_err(|e| QuireError::Database(e.to_string()))?;
        }

        tx.commit()
            .map_err(|e| QuireError::Database(e.to_string()))?;
        drop(conn);

        project.disconnected = false;
        info!(
            user = %owner,
            project = %name,
            documents = live.len(),
            "saved project to database"
        );
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "database"
    }
}
