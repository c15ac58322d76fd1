#![forbid(unsafe_code)]

use super::*;
use stemma_core::model::ChangeKind;

impl SqliteStore {
    /// Linear per-branch history, newest first.
    pub fn commit_log(&mut self, request: CommitLogRequest) -> Result<Vec<CommitRow>, StoreError> {
        let project = canonicalize_slug(&request.project)?;
        let limit = to_sqlite_i64(request.limit.clamp(1, 200))?;
        let offset = to_sqlite_i64(request.offset)?;

        let tx = self.conn.transaction()?;
        let branch = resolve_branch_tx(&tx, &project, request.branch.as_deref())?;
        let out = {
            let mut stmt = tx.prepare(
                "SELECT id, project, branch, message, author, created_at_ms \
                 FROM commits WHERE project=?1 AND branch=?2 \
                 ORDER BY id DESC LIMIT ?3 OFFSET ?4",
            )?;
            let mut rows = stmt.query(params![project, branch, limit, offset])?;
            let mut out = Vec::new();
            while let Some(row) = rows.next()? {
                out.push(commit_row_from_sql(row)?);
            }
            out
        };
        tx.commit()?;
        Ok(out)
    }

    /// One commit with its ordered change list.
    pub fn commit_show(
        &mut self,
        project: &str,
        commit_id: i64,
    ) -> Result<Option<(CommitRow, Vec<FileChange>)>, StoreError> {
        let project = canonicalize_slug(project)?;
        let tx = self.conn.transaction()?;

        let commit = tx
            .query_row(
                "SELECT id, project, branch, message, author, created_at_ms \
                 FROM commits WHERE project=?1 AND id=?2",
                params![project, commit_id],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, i64>(5)?,
                    ))
                },
            )
            .optional()?;
        let Some((id, project, branch, message, author, created_at_ms)) = commit else {
            tx.commit()?;
            return Ok(None);
        };

        let changes = {
            let mut stmt = tx.prepare(
                "SELECT path, change, old_version, new_version \
                 FROM commit_changes WHERE commit_id=?1 ORDER BY ordinal ASC",
            )?;
            let mut rows = stmt.query(params![id])?;
            let mut changes = Vec::new();
            while let Some(row) = rows.next()? {
                let kind = row.get::<_, String>(1)?;
                changes.push(FileChange {
                    path: row.get(0)?,
                    change: ChangeKind::parse(&kind)
                        .ok_or(StoreError::InvalidInput("invalid change kind row"))?,
                    old_version: row.get(2)?,
                    new_version: row.get(3)?,
                });
            }
            changes
        };
        tx.commit()?;

        Ok(Some((
            CommitRow {
                id,
                project,
                branch,
                message,
                author,
                created_at_ms,
            },
            changes,
        )))
    }
}

fn commit_row_from_sql(row: &rusqlite::Row<'_>) -> Result<CommitRow, StoreError> {
    Ok(CommitRow {
        id: row.get(0)?,
        project: row.get(1)?,
        branch: row.get(2)?,
        message: row.get(3)?,
        author: row.get(4)?,
        created_at_ms: row.get(5)?,
    })
}
