#![forbid(unsafe_code)]

mod checkout;
mod commit;
mod content;
mod error;
mod files;
mod history;
mod import;
mod projects;
mod requests;

pub use content::{
    ContentPayload, FileContent, MAX_FILE_BYTES, changed, classify, read_file, sha256_hex,
};
pub use error::StoreError;
pub use requests::*;

use rusqlite::{Connection, ErrorCode, OptionalExtension, Transaction, params};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use stemma_core::ids::{BranchName, ProjectSlug};

const DEFAULT_BRANCH: &str = "main";
const SCHEMA_VERSION: i64 = 1;
const DB_FILE_NAME: &str = "stemma.db";

#[derive(Debug)]
pub struct SqliteStore {
    conn: Connection,
    storage_dir: PathBuf,
}

impl SqliteStore {
    pub fn open(storage_dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let storage_dir = storage_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&storage_dir)?;

        let db_path = storage_dir.join(DB_FILE_NAME);
        let conn = Connection::open(db_path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;

        preflight_gate(&conn)?;
        install_schema(&conn)?;

        Ok(Self { conn, storage_dir })
    }

    pub fn storage_dir(&self) -> &Path {
        &self.storage_dir
    }

    pub fn default_branch_name(&self) -> &'static str {
        DEFAULT_BRANCH
    }
}

fn preflight_gate(conn: &Connection) -> Result<(), StoreError> {
    let mut stmt = conn.prepare(
        "SELECT name FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%'",
    )?;
    let mut rows = stmt.query([])?;
    let mut tables = BTreeSet::new();
    while let Some(row) = rows.next()? {
        tables.insert(row.get::<_, String>(0)?);
    }

    if tables.is_empty() {
        return Ok(());
    }

    let required: BTreeSet<&str> = [
        "store_state",
        "projects",
        "files",
        "content_versions",
        "commits",
        "commit_changes",
        "checkouts",
        "checkout_snapshots",
    ]
    .into_iter()
    .collect();

    if tables
        .iter()
        .any(|table| !required.contains(table.as_str()))
    {
        return Err(StoreError::InvalidInput(
            "RESET_REQUIRED: unsupported tables detected",
        ));
    }

    for table in required {
        if !tables.contains(table) {
            return Err(StoreError::InvalidInput(
                "RESET_REQUIRED: required table is missing",
            ));
        }
    }

    let version = conn
        .query_row(
            "SELECT schema_version FROM store_state WHERE singleton=1",
            [],
            |row| row.get::<_, i64>(0),
        )
        .optional()?;

    match version {
        Some(v) if v == SCHEMA_VERSION => Ok(()),
        Some(_) => Err(StoreError::InvalidInput(
            "RESET_REQUIRED: schema version mismatch",
        )),
        None => Err(StoreError::InvalidInput(
            "RESET_REQUIRED: schema state row is missing",
        )),
    }
}

fn install_schema(conn: &Connection) -> Result<(), StoreError> {
    let now_ms = now_ms();

    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS store_state (
          singleton INTEGER PRIMARY KEY CHECK(singleton = 1),
          schema_version INTEGER NOT NULL,
          created_at_ms INTEGER NOT NULL,
          updated_at_ms INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS projects (
          slug TEXT PRIMARY KEY,
          name TEXT NOT NULL,
          origin TEXT NOT NULL,
          active_branch TEXT NOT NULL,
          deploy_config TEXT,
          created_at_ms INTEGER NOT NULL,
          updated_at_ms INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS files (
          id INTEGER PRIMARY KEY AUTOINCREMENT,
          project TEXT NOT NULL,
          path TEXT NOT NULL,
          file_type TEXT NOT NULL CHECK(file_type IN ('text','binary')),
          status TEXT NOT NULL CHECK(status IN ('active','deleted')),
          created_at_ms INTEGER NOT NULL,
          FOREIGN KEY(project) REFERENCES projects(slug) ON DELETE CASCADE
        );

        CREATE UNIQUE INDEX IF NOT EXISTS idx_files_active_path
          ON files(project, path) WHERE status='active';

        CREATE INDEX IF NOT EXISTS idx_files_project_path
          ON files(project, path, id);

        CREATE TABLE IF NOT EXISTS commits (
          id INTEGER PRIMARY KEY AUTOINCREMENT,
          project TEXT NOT NULL,
          branch TEXT NOT NULL,
          message TEXT NOT NULL,
          author TEXT NOT NULL,
          created_at_ms INTEGER NOT NULL,
          FOREIGN KEY(project) REFERENCES projects(slug) ON DELETE CASCADE
        );

        CREATE INDEX IF NOT EXISTS idx_commits_project_branch
          ON commits(project, branch, id);

        CREATE TABLE IF NOT EXISTS content_versions (
          id INTEGER PRIMARY KEY AUTOINCREMENT,
          file_id INTEGER NOT NULL,
          version INTEGER NOT NULL,
          kind TEXT NOT NULL CHECK(kind IN ('text','binary')),
          text_content TEXT,
          binary_content BLOB,
          byte_size INTEGER NOT NULL,
          line_count INTEGER,
          sha256 TEXT NOT NULL,
          is_current INTEGER NOT NULL DEFAULT 0,
          commit_id INTEGER,
          created_at_ms INTEGER NOT NULL,
          UNIQUE(file_id, version),
          FOREIGN KEY(file_id) REFERENCES files(id) ON DELETE CASCADE,
          FOREIGN KEY(commit_id) REFERENCES commits(id) ON DELETE SET NULL,
          CHECK(
            (kind='text' AND text_content IS NOT NULL AND binary_content IS NULL)
            OR (kind='binary' AND binary_content IS NOT NULL AND text_content IS NULL)
          )
        );

        CREATE UNIQUE INDEX IF NOT EXISTS idx_versions_single_current
          ON content_versions(file_id) WHERE is_current=1;

        CREATE TABLE IF NOT EXISTS commit_changes (
          commit_id INTEGER NOT NULL,
          ordinal INTEGER NOT NULL,
          file_id INTEGER NOT NULL,
          path TEXT NOT NULL,
          change TEXT NOT NULL CHECK(change IN ('add','modify','delete')),
          old_version INTEGER,
          new_version INTEGER,
          PRIMARY KEY(commit_id, ordinal),
          FOREIGN KEY(commit_id) REFERENCES commits(id) ON DELETE CASCADE,
          FOREIGN KEY(file_id) REFERENCES files(id) ON DELETE CASCADE
        );

        CREATE TABLE IF NOT EXISTS checkouts (
          id INTEGER PRIMARY KEY AUTOINCREMENT,
          project TEXT NOT NULL,
          branch TEXT NOT NULL,
          workspace_dir TEXT NOT NULL UNIQUE,
          created_at_ms INTEGER NOT NULL,
          updated_at_ms INTEGER NOT NULL,
          FOREIGN KEY(project) REFERENCES projects(slug) ON DELETE CASCADE
        );

        CREATE TABLE IF NOT EXISTS checkout_snapshots (
          checkout_id INTEGER NOT NULL,
          file_id INTEGER NOT NULL,
          path TEXT NOT NULL,
          version INTEGER NOT NULL,
          sha256 TEXT NOT NULL,
          PRIMARY KEY(checkout_id, file_id),
          FOREIGN KEY(checkout_id) REFERENCES checkouts(id) ON DELETE CASCADE,
          FOREIGN KEY(file_id) REFERENCES files(id) ON DELETE CASCADE
        );
        "#,
    )?;

    conn.execute(
        "INSERT INTO store_state(singleton, schema_version, created_at_ms, updated_at_ms) \
         VALUES (1, ?1, ?2, ?2) \
         ON CONFLICT(singleton) DO UPDATE SET schema_version=excluded.schema_version, updated_at_ms=excluded.updated_at_ms",
        params![SCHEMA_VERSION, now_ms],
    )?;

    Ok(())
}

fn project_branch_tx(tx: &Transaction<'_>, project: &str) -> Result<String, StoreError> {
    tx.query_row(
        "SELECT active_branch FROM projects WHERE slug=?1",
        params![project],
        |row| row.get::<_, String>(0),
    )
    .optional()?
    .ok_or(StoreError::UnknownProject)
}

/// Resolves the branch for an operation: an explicit request wins, otherwise
/// the project's active branch. Fails with `UnknownProject` when the project
/// row is missing.
fn resolve_branch_tx(
    tx: &Transaction<'_>,
    project: &str,
    requested: Option<&str>,
) -> Result<String, StoreError> {
    let active = project_branch_tx(tx, project)?;
    match requested {
        Some(branch) => canonicalize_branch(branch),
        None => Ok(active),
    }
}

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(code, message) => {
            code.code == ErrorCode::ConstraintViolation
                || message.as_deref().is_some_and(|value| {
                    value.contains("UNIQUE constraint failed")
                        || value.contains("PRIMARY KEY constraint failed")
                })
        }
        _ => false,
    }
}

fn to_sqlite_i64(value: usize) -> Result<i64, StoreError> {
    i64::try_from(value).map_err(|_| StoreError::InvalidInput("numeric overflow"))
}

fn canonicalize_slug(value: &str) -> Result<String, StoreError> {
    ProjectSlug::try_new(value)
        .map(|slug| slug.as_str().to_string())
        .map_err(|_| StoreError::InvalidInput("invalid project slug"))
}

fn canonicalize_branch(value: &str) -> Result<String, StoreError> {
    BranchName::try_new(value)
        .map(|branch| branch.as_str().to_string())
        .map_err(|_| StoreError::InvalidInput("invalid branch name"))
}

/// Canonical string key for a workspace directory; the directory must exist
/// (checkout creates it before calling this).
fn workspace_key(dir: &Path) -> Result<String, StoreError> {
    let canonical = std::fs::canonicalize(dir)?;
    Ok(canonical.to_string_lossy().into_owned())
}

fn now_ms() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};

    let now = match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(duration) => duration,
        Err(_) => return 0,
    };

    i64::try_from(now.as_millis()).unwrap_or(i64::MAX)
}
