#![forbid(unsafe_code)]

use super::content::{ContentPayload, FileContent};
use super::*;
use stemma_core::model::{ContentKind, FileStatus};

/// Store-side identity of an active file plus its current version, as needed
/// by conflict detection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(super) struct ActiveFileState {
    pub file_id: i64,
    pub version: i64,
    pub sha256: String,
}

/// One active file with the payload of its current version, as materialized
/// by checkout.
#[derive(Clone, Debug)]
pub(super) struct CurrentFile {
    pub file_id: i64,
    pub path: String,
    pub version: i64,
    pub sha256: String,
    pub bytes: Vec<u8>,
}

impl SqliteStore {
    /// Current version metadata of the active file at `path`, if any.
    pub fn file_current_version(
        &mut self,
        project: &str,
        path: &str,
    ) -> Result<Option<VersionRow>, StoreError> {
        let project = canonicalize_slug(project)?;
        let tx = self.conn.transaction()?;
        let row = match active_file_tx(&tx, &project, path)? {
            Some(state) => current_version_row_tx(&tx, state.file_id)?,
            None => None,
        };
        tx.commit()?;
        Ok(row)
    }

    /// Every tracked file of a project, deleted lineages included, in path
    /// order.
    pub fn file_list(&self, project: &str) -> Result<Vec<FileRow>, StoreError> {
        let project = canonicalize_slug(project)?;
        let mut stmt = self.conn.prepare(
            "SELECT id, project, path, file_type, status, created_at_ms \
             FROM files WHERE project=?1 ORDER BY path ASC, id ASC",
        )?;
        let mut rows = stmt.query(params![project])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let file_type = row.get::<_, String>(3)?;
            let status = row.get::<_, String>(4)?;
            out.push(FileRow {
                id: row.get(0)?,
                project: row.get(1)?,
                path: row.get(2)?,
                file_type: ContentKind::parse(&file_type)
                    .ok_or(StoreError::InvalidInput("invalid file type row"))?,
                status: FileStatus::parse(&status)
                    .ok_or(StoreError::InvalidInput("invalid file status row"))?,
                created_at_ms: row.get(5)?,
            });
        }
        Ok(out)
    }

    /// Every version recorded at `path`, across all lineages (a deleted then
    /// re-added path starts a fresh lineage), newest first.
    pub fn file_history(
        &mut self,
        project: &str,
        path: &str,
    ) -> Result<Vec<VersionRow>, StoreError> {
        let project = canonicalize_slug(project)?;
        let tx = self.conn.transaction()?;
        let out = {
            let mut stmt = tx.prepare(
                "SELECT v.file_id, v.version, v.kind, v.byte_size, v.line_count, v.sha256, \
                        v.is_current, v.commit_id, v.created_at_ms \
                 FROM content_versions v \
                 JOIN files f ON f.id = v.file_id \
                 WHERE f.project=?1 AND f.path=?2 \
                 ORDER BY f.id DESC, v.version DESC",
            )?;
            let mut rows = stmt.query(params![project, path])?;
            let mut out = Vec::new();
            while let Some(row) = rows.next()? {
                out.push(version_row_from_sql(row)?);
            }
            out
        };
        tx.commit()?;
        Ok(out)
    }
}

pub(super) fn create_file_tx(
    tx: &Transaction<'_>,
    project: &str,
    path: &str,
    kind: ContentKind,
    now_ms: i64,
) -> Result<i64, StoreError> {
    tx.execute(
        "INSERT INTO files(project, path, file_type, status, created_at_ms) \
         VALUES (?1, ?2, ?3, 'active', ?4)",
        params![project, path, kind.as_str(), now_ms],
    )?;
    Ok(tx.last_insert_rowid())
}

/// Appends the next version for `file_id` and makes it current in the same
/// transaction: the prior current row loses its flag first so the partial
/// unique index never sees two current rows.
pub(super) fn create_version_tx(
    tx: &Transaction<'_>,
    file_id: i64,
    content: &FileContent,
    commit_id: Option<i64>,
    now_ms: i64,
) -> Result<i64, StoreError> {
    let next_version = tx.query_row(
        "SELECT COALESCE(MAX(version), 0) + 1 FROM content_versions WHERE file_id=?1",
        params![file_id],
        |row| row.get::<_, i64>(0),
    )?;

    tx.execute(
        "UPDATE content_versions SET is_current=0 WHERE file_id=?1 AND is_current=1",
        params![file_id],
    )?;

    let (text_content, binary_content): (Option<&str>, Option<&[u8]>) = match &content.payload {
        ContentPayload::Text(text) => (Some(text.as_str()), None),
        ContentPayload::Binary(bytes) => (None, Some(bytes.as_slice())),
    };

    tx.execute(
        "INSERT INTO content_versions(file_id, version, kind, text_content, binary_content, \
                                      byte_size, line_count, sha256, is_current, commit_id, created_at_ms) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 1, ?9, ?10)",
        params![
            file_id,
            next_version,
            content.kind().as_str(),
            text_content,
            binary_content,
            i64::try_from(content.byte_size)
                .map_err(|_| StoreError::InvalidInput("numeric overflow"))?,
            content.line_count.map(|count| count as i64),
            content.sha256,
            commit_id,
            now_ms,
        ],
    )?;

    // Keep the file's coarse classification in step with its latest payload.
    tx.execute(
        "UPDATE files SET file_type=?2 WHERE id=?1 AND file_type<>?2",
        params![file_id, content.kind().as_str()],
    )?;

    Ok(next_version)
}

/// Terminal for this lineage: the last version row stays (and stays flagged
/// current), the file just stops participating in checkouts.
pub(super) fn mark_deleted_tx(tx: &Transaction<'_>, file_id: i64) -> Result<(), StoreError> {
    let updated = tx.execute(
        "UPDATE files SET status='deleted' WHERE id=?1 AND status='active'",
        params![file_id],
    )?;
    if updated == 0 {
        return Err(StoreError::InvalidInput("file is not active"));
    }
    Ok(())
}

pub(super) fn active_file_tx(
    tx: &Transaction<'_>,
    project: &str,
    path: &str,
) -> Result<Option<ActiveFileState>, StoreError> {
    let found = tx
        .query_row(
            "SELECT f.id, v.version, v.sha256 \
             FROM files f \
             JOIN content_versions v ON v.file_id = f.id AND v.is_current=1 \
             WHERE f.project=?1 AND f.path=?2 AND f.status='active'",
            params![project, path],
            |row| {
                Ok(ActiveFileState {
                    file_id: row.get(0)?,
                    version: row.get(1)?,
                    sha256: row.get(2)?,
                })
            },
        )
        .optional()?;
    Ok(found)
}

pub(super) fn current_version_row_tx(
    tx: &Transaction<'_>,
    file_id: i64,
) -> Result<Option<VersionRow>, StoreError> {
    let row = tx
        .query_row(
            "SELECT file_id, version, kind, byte_size, line_count, sha256, is_current, commit_id, created_at_ms \
             FROM content_versions WHERE file_id=?1 AND is_current=1",
            params![file_id],
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, i64>(3)?,
                    row.get::<_, Option<i64>>(4)?,
                    row.get::<_, String>(5)?,
                    row.get::<_, bool>(6)?,
                    row.get::<_, Option<i64>>(7)?,
                    row.get::<_, i64>(8)?,
                ))
            },
        )
        .optional()?;

    match row {
        Some(raw) => Ok(Some(version_row_from_raw(raw)?)),
        None => Ok(None),
    }
}

/// Every active file of a project with the payload bytes of its current
/// version, in path order.
pub(super) fn current_files_tx(
    tx: &Transaction<'_>,
    project: &str,
) -> Result<Vec<CurrentFile>, StoreError> {
    let mut stmt = tx.prepare(
        "SELECT f.id, f.path, v.version, v.sha256, v.kind, v.text_content, v.binary_content \
         FROM files f \
         JOIN content_versions v ON v.file_id = f.id AND v.is_current=1 \
         WHERE f.project=?1 AND f.status='active' \
         ORDER BY f.path ASC",
    )?;
    let mut rows = stmt.query(params![project])?;
    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        let kind = row.get::<_, String>(4)?;
        let bytes = match kind.as_str() {
            "text" => row.get::<_, String>(5)?.into_bytes(),
            _ => row.get::<_, Vec<u8>>(6)?,
        };
        out.push(CurrentFile {
            file_id: row.get(0)?,
            path: row.get(1)?,
            version: row.get(2)?,
            sha256: row.get(3)?,
            bytes,
        });
    }
    Ok(out)
}

type RawVersionRow = (
    i64,
    i64,
    String,
    i64,
    Option<i64>,
    String,
    bool,
    Option<i64>,
    i64,
);

fn version_row_from_raw(raw: RawVersionRow) -> Result<VersionRow, StoreError> {
    let (file_id, version, kind, byte_size, line_count, sha256, is_current, commit_id, created_at_ms) =
        raw;
    let kind = ContentKind::parse(&kind)
        .ok_or(StoreError::InvalidInput("invalid content kind row"))?;
    Ok(VersionRow {
        file_id,
        version,
        kind,
        byte_size,
        line_count,
        sha256,
        is_current,
        commit_id,
        created_at_ms,
    })
}

fn version_row_from_sql(row: &rusqlite::Row<'_>) -> Result<VersionRow, StoreError> {
    version_row_from_raw((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
        row.get(8)?,
    ))
}
