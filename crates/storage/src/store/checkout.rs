#![forbid(unsafe_code)]

use super::files::current_files_tx;
use super::*;

impl SqliteStore {
    /// Materializes the project's current file tree into `workspace_dir` and
    /// records one snapshot row per file. Snapshot rows are only written
    /// after every file write succeeded; a failed write aborts the checkout
    /// with the store untouched (stray files on disk are accepted).
    pub fn checkout(&mut self, request: CheckoutRequest) -> Result<CheckoutSummary, StoreError> {
        let project = canonicalize_slug(&request.project)?;
        std::fs::create_dir_all(&request.workspace_dir)?;
        let workspace = workspace_key(&request.workspace_dir)?;
        let now_ms = now_ms();

        let (branch, files) = {
            let tx = self.conn.transaction()?;
            let branch = resolve_branch_tx(&tx, &project, request.branch.as_deref())?;

            let existing = tx
                .query_row(
                    "SELECT project, branch FROM checkouts WHERE workspace_dir=?1",
                    params![workspace],
                    |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
                )
                .optional()?;
            if let Some((bound_project, bound_branch)) = existing
                && (bound_project != project || bound_branch != branch)
                && !request.force
            {
                return Err(StoreError::WorkspaceConflict {
                    workspace_dir: workspace,
                });
            }

            let files = current_files_tx(&tx, &project)?;
            tx.commit()?;
            (branch, files)
        };

        let mut bytes_written = 0u64;
        for file in &files {
            let target = rel_target(&request.workspace_dir, &file.path);
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&target, &file.bytes)?;
            bytes_written += file.bytes.len() as u64;
        }

        let tx = self.conn.transaction()?;
        tx.execute(
            "INSERT INTO checkouts(project, branch, workspace_dir, created_at_ms, updated_at_ms) \
             VALUES (?1, ?2, ?3, ?4, ?4) \
             ON CONFLICT(workspace_dir) DO UPDATE SET \
               project=excluded.project, \
               branch=excluded.branch, \
               updated_at_ms=excluded.updated_at_ms",
            params![project, branch, workspace, now_ms],
        )?;
        let checkout_id = tx.query_row(
            "SELECT id FROM checkouts WHERE workspace_dir=?1",
            params![workspace],
            |row| row.get::<_, i64>(0),
        )?;

        // Full snapshot rewrite from store truth; stale rows from a prior
        // binding of this workspace go with it.
        tx.execute(
            "DELETE FROM checkout_snapshots WHERE checkout_id=?1",
            params![checkout_id],
        )?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO checkout_snapshots(checkout_id, file_id, path, version, sha256) \
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for file in &files {
                stmt.execute(params![
                    checkout_id,
                    file.file_id,
                    file.path,
                    file.version,
                    file.sha256
                ])?;
            }
        }
        tx.commit()?;

        Ok(CheckoutSummary {
            checkout_id,
            branch,
            files_written: files.len(),
            bytes_written,
        })
    }
}

/// Joins a stored forward-slash relative path under a workspace root using
/// native separators.
fn rel_target(base: &Path, rel: &str) -> PathBuf {
    rel.split('/')
        .fold(base.to_path_buf(), |path, segment| path.join(segment))
}
