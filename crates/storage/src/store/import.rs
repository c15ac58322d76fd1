#![forbid(unsafe_code)]

use super::content::read_file;
use super::files::{create_file_tx, create_version_tx};
use super::*;

impl SqliteStore {
    /// First-time ingestion of a directory tree into an existing (and still
    /// empty) project. One transaction end to end: any failure rolls back
    /// every file and version row created by this call; the partial stats
    /// ride along in the error for diagnostics only.
    pub fn import(&mut self, request: ImportRequest) -> Result<ImportStats, StoreError> {
        let project = canonicalize_slug(&request.project)?;
        if !request.source_dir.is_dir() {
            return Err(StoreError::InvalidInput(
                "import source must be an existing directory",
            ));
        }

        let now_ms = now_ms();
        let tx = self.conn.transaction()?;
        project_branch_tx(&tx, &project)?;

        let existing = tx.query_row(
            "SELECT COUNT(1) FROM files WHERE project=?1",
            params![project],
            |row| row.get::<_, i64>(0),
        )?;
        if existing > 0 {
            return Err(StoreError::InvalidInput(
                "project already has files (import is first-time only)",
            ));
        }

        let mut stats = ImportStats::default();
        let entries = match walk_files(&request.source_dir) {
            Ok(entries) => entries,
            Err(err) => return Err(import_aborted(stats, err)),
        };

        for entry in entries {
            let content = match read_file(&entry.abs_path) {
                Ok(content) => content,
                Err(StoreError::SizeExceeded { .. }) => {
                    stats.files_skipped += 1;
                    continue;
                }
                Err(err) => return Err(import_aborted(stats, err)),
            };

            let seeded = create_file_tx(&tx, &project, &entry.rel_path, content.kind(), now_ms)
                .and_then(|file_id| create_version_tx(&tx, file_id, &content, None, now_ms));
            if let Err(err) = seeded {
                return Err(import_aborted(stats, err));
            }

            stats.files_imported += 1;
            stats.bytes_imported += content.byte_size;
        }

        tx.commit()?;
        Ok(stats)
    }
}

fn import_aborted(stats: ImportStats, cause: StoreError) -> StoreError {
    StoreError::ImportAborted {
        stats,
        cause: Box::new(cause),
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(super) struct WalkEntry {
    pub abs_path: PathBuf,
    /// Forward-slash path relative to the walk root, as stored in `files`.
    pub rel_path: String,
}

/// Recursive walk shared by import and commit. Dot-entries (`.git`, `.env`,
/// editor droppings) are skipped at every level; results come back sorted by
/// relative path so row creation order is deterministic.
pub(super) fn walk_files(root: &Path) -> Result<Vec<WalkEntry>, StoreError> {
    let mut out = Vec::new();
    walk_into(root, root, &mut out)?;
    out.sort_by(|a, b| a.rel_path.cmp(&b.rel_path));
    Ok(out)
}

fn walk_into(root: &Path, dir: &Path, out: &mut Vec<WalkEntry>) -> Result<(), StoreError> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        if name.to_string_lossy().starts_with('.') {
            continue;
        }

        let abs_path = entry.path();
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            walk_into(root, &abs_path, out)?;
        } else if file_type.is_file() {
            let rel = abs_path
                .strip_prefix(root)
                .map_err(|_| StoreError::InvalidInput("walk produced a path outside its root"))?;
            let rel_path = stemma_core::paths::normalize_rel(&rel.to_string_lossy())
                .map_err(|_| StoreError::InvalidInput("unrepresentable relative path"))?;
            out.push(WalkEntry { abs_path, rel_path });
        }
        // Symlinks and other special entries are ignored.
    }
    Ok(())
}
