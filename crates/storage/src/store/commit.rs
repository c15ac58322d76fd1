#![forbid(unsafe_code)]

use super::content::{FileContent, changed};
use super::files::{ActiveFileState, active_file_tx, create_file_tx, create_version_tx, mark_deleted_tx};
use super::import::walk_files;
use super::*;
use std::collections::{BTreeMap, BTreeSet};
use stemma_core::model::{ChangeKind, CommitStrategy};

/// What the workspace did to one path, relative to its snapshot.
#[derive(Debug)]
enum LocalChange {
    Added {
        content: FileContent,
    },
    Modified {
        file_id: i64,
        snapshot_version: i64,
        snapshot_sha256: String,
        content: FileContent,
    },
    Deleted {
        file_id: i64,
        snapshot_version: i64,
        snapshot_sha256: String,
    },
}

/// How one local change lands in the store once conflicts are resolved.
#[derive(Debug)]
enum Planned {
    CreateLineage {
        content: FileContent,
    },
    NewVersion {
        file_id: i64,
        old_version: i64,
        content: FileContent,
    },
    MarkDeleted {
        file_id: i64,
        old_version: i64,
    },
}

impl SqliteStore {
    /// Commits the workspace's local changes as one transaction: classify
    /// against the snapshot, detect conflicts against the store's live
    /// current versions, apply, record the commit with its ordered change
    /// list, and refresh the snapshot so the next commit from this
    /// workspace starts from the new agreement point.
    pub fn commit(&mut self, request: CommitRequest) -> Result<CommitSummary, StoreError> {
        let project = canonicalize_slug(&request.project)?;
        if request.message.trim().is_empty() {
            return Err(StoreError::InvalidInput("commit message must not be empty"));
        }
        if request.author.trim().is_empty() {
            return Err(StoreError::InvalidInput("commit author must not be empty"));
        }
        if !request.workspace_dir.is_dir() {
            return Err(StoreError::InvalidInput(
                "workspace directory does not exist",
            ));
        }
        let workspace = workspace_key(&request.workspace_dir)?;

        // Hash the workspace before opening the write transaction; a file
        // over the ceiling fails the commit outright.
        let mut disk: BTreeMap<String, FileContent> = BTreeMap::new();
        for entry in walk_files(&request.workspace_dir)? {
            let content = super::content::read_file(&entry.abs_path)?;
            disk.insert(entry.rel_path, content);
        }

        let now_ms = now_ms();
        let tx = self.conn.transaction()?;

        let bound = tx
            .query_row(
                "SELECT id, project, branch FROM checkouts WHERE workspace_dir=?1",
                params![workspace],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                },
            )
            .optional()?;
        let Some((checkout_id, bound_project, bound_branch)) = bound else {
            return Err(StoreError::NoCheckout {
                workspace_dir: workspace,
            });
        };
        if bound_project != project {
            return Err(StoreError::InvalidInput(
                "workspace is checked out from a different project",
            ));
        }
        let branch = match request.branch.as_deref() {
            Some(branch) => canonicalize_branch(branch)?,
            None => bound_branch,
        };

        let snapshot = snapshot_rows_tx(&tx, checkout_id)?;
        let changes = classify_changes(disk, &snapshot);
        if changes.is_empty() {
            return Err(StoreError::NothingToCommit);
        }

        // Conflict detection against the store's live state, inside the
        // write transaction so no commit can slip in between detect and
        // apply.
        let mut conflicts: Vec<String> = Vec::new();
        let mut plan: Vec<(String, Planned)> = Vec::new();

        for (path, change) in changes {
            let live = active_file_tx(&tx, &project, &path)?;
            match resolve_change(change, live, request.strategy) {
                Resolution::Clean(planned) => plan.push((path, planned)),
                Resolution::Conflicted(planned) => {
                    conflicts.push(path.clone());
                    if let Some(planned) = planned {
                        plan.push((path, planned));
                    }
                }
                Resolution::Settled => {}
            }
        }

        if request.strategy == CommitStrategy::Abort && !conflicts.is_empty() {
            // Dropping the transaction un-does nothing because nothing has
            // been written yet; the whole file set is rejected as one unit.
            return Err(StoreError::Conflict { paths: conflicts });
        }
        if plan.is_empty() {
            return Err(StoreError::NothingToCommit);
        }

        tx.execute(
            "INSERT INTO commits(project, branch, message, author, created_at_ms) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![project, branch, request.message, request.author, now_ms],
        )?;
        let commit_id = tx.last_insert_rowid();

        let mut recorded: Vec<FileChange> = Vec::new();
        for (ordinal, (path, planned)) in plan.into_iter().enumerate() {
            let change = apply_planned_tx(&tx, &project, &path, planned, commit_id, now_ms)?;
            tx.execute(
                "INSERT INTO commit_changes(commit_id, ordinal, file_id, path, change, old_version, new_version) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    commit_id,
                    to_sqlite_i64(ordinal)?,
                    change.file_id,
                    path,
                    change.kind.as_str(),
                    change.old_version,
                    change.new_version,
                ],
            )?;
            refresh_snapshot_tx(&tx, checkout_id, &path, &change)?;
            recorded.push(FileChange {
                path,
                change: change.kind,
                old_version: change.old_version,
                new_version: change.new_version,
            });
        }

        tx.commit()?;
        Ok(CommitSummary {
            commit_id,
            branch,
            changes: recorded,
            created_at_ms: now_ms,
        })
    }
}

struct SnapshotRow {
    file_id: i64,
    version: i64,
    sha256: String,
}

fn snapshot_rows_tx(
    tx: &Transaction<'_>,
    checkout_id: i64,
) -> Result<BTreeMap<String, SnapshotRow>, StoreError> {
    let mut stmt = tx.prepare(
        "SELECT path, file_id, version, sha256 FROM checkout_snapshots WHERE checkout_id=?1",
    )?;
    let mut rows = stmt.query(params![checkout_id])?;
    let mut out = BTreeMap::new();
    while let Some(row) = rows.next()? {
        out.insert(
            row.get::<_, String>(0)?,
            SnapshotRow {
                file_id: row.get(1)?,
                version: row.get(2)?,
                sha256: row.get(3)?,
            },
        );
    }
    Ok(out)
}

/// Hash-compare every disk path against the snapshot; unchanged files drop
/// out here. BTreeMap keeps the change set in path order throughout.
fn classify_changes(
    disk: BTreeMap<String, FileContent>,
    snapshot: &BTreeMap<String, SnapshotRow>,
) -> BTreeMap<String, LocalChange> {
    let on_disk: BTreeSet<String> = disk.keys().cloned().collect();
    let mut changes = BTreeMap::new();

    for (path, content) in disk {
        match snapshot.get(&path) {
            // Hash agrees with the snapshot: unchanged, ignored.
            Some(snap) if !changed(Some(&snap.sha256), &content.sha256) => {}
            Some(snap) => {
                changes.insert(
                    path,
                    LocalChange::Modified {
                        file_id: snap.file_id,
                        snapshot_version: snap.version,
                        snapshot_sha256: snap.sha256.clone(),
                        content,
                    },
                );
            }
            None => {
                changes.insert(path, LocalChange::Added { content });
            }
        }
    }

    for (path, snap) in snapshot {
        if on_disk.contains(path) {
            continue;
        }
        changes.insert(
            path.clone(),
            LocalChange::Deleted {
                file_id: snap.file_id,
                snapshot_version: snap.version,
                snapshot_sha256: snap.sha256.clone(),
            },
        );
    }

    changes
}

enum Resolution {
    /// No divergence; apply as planned.
    Clean(Planned),
    /// Diverged since checkout. Under `force` the payload says how the
    /// workspace's intent lands anyway; under `abort` it is ignored.
    Conflicted(Option<Planned>),
    /// The store already agrees with the workspace's intent; nothing to do.
    Settled,
}

fn resolve_change(
    change: LocalChange,
    live: Option<ActiveFileState>,
    strategy: CommitStrategy,
) -> Resolution {
    match change {
        LocalChange::Added { content } => match live {
            // Nobody claimed the path since checkout.
            None => Resolution::Clean(Planned::CreateLineage { content }),
            // A concurrent commit created this path after our snapshot was
            // taken; force resolves by superseding that lineage's tip.
            Some(state) => Resolution::Conflicted(Some(Planned::NewVersion {
                file_id: state.file_id,
                old_version: state.version,
                content,
            })),
        },
        LocalChange::Modified {
            file_id,
            snapshot_version,
            snapshot_sha256,
            content,
        } => match live {
            Some(state)
                if state.file_id == file_id
                    && state.version == snapshot_version
                    && state.sha256 == snapshot_sha256 =>
            {
                Resolution::Clean(Planned::NewVersion {
                    file_id,
                    old_version: snapshot_version,
                    content,
                })
            }
            // Advanced (or replaced) since checkout; force supersedes the
            // intervening tip.
            Some(state) => Resolution::Conflicted(Some(Planned::NewVersion {
                file_id: state.file_id,
                old_version: state.version,
                content,
            })),
            // Deleted store-side while modified locally; force re-adds the
            // local content as a fresh lineage.
            None => Resolution::Conflicted(Some(Planned::CreateLineage { content })),
        },
        LocalChange::Deleted {
            file_id,
            snapshot_version,
            snapshot_sha256,
        } => match live {
            Some(state)
                if state.file_id == file_id
                    && state.version == snapshot_version
                    && state.sha256 == snapshot_sha256 =>
            {
                Resolution::Clean(Planned::MarkDeleted {
                    file_id,
                    old_version: snapshot_version,
                })
            }
            Some(state) => Resolution::Conflicted(Some(Planned::MarkDeleted {
                file_id: state.file_id,
                old_version: state.version,
            })),
            // Already gone store-side; the delete intent is satisfied. Still
            // a divergence worth failing on under abort, but under force
            // there is nothing left to write.
            None => match strategy {
                CommitStrategy::Abort => Resolution::Conflicted(None),
                CommitStrategy::Force => Resolution::Settled,
            },
        },
    }
}

struct AppliedChange {
    file_id: i64,
    kind: ChangeKind,
    old_version: Option<i64>,
    new_version: Option<i64>,
    new_sha256: Option<String>,
}

fn apply_planned_tx(
    tx: &Transaction<'_>,
    project: &str,
    path: &str,
    planned: Planned,
    commit_id: i64,
    now_ms: i64,
) -> Result<AppliedChange, StoreError> {
    match planned {
        Planned::CreateLineage { content } => {
            let file_id = create_file_tx(tx, project, path, content.kind(), now_ms)?;
            let version = create_version_tx(tx, file_id, &content, Some(commit_id), now_ms)?;
            Ok(AppliedChange {
                file_id,
                kind: ChangeKind::Add,
                old_version: None,
                new_version: Some(version),
                new_sha256: Some(content.sha256),
            })
        }
        Planned::NewVersion {
            file_id,
            old_version,
            content,
        } => {
            let version = create_version_tx(tx, file_id, &content, Some(commit_id), now_ms)?;
            Ok(AppliedChange {
                file_id,
                kind: ChangeKind::Modify,
                old_version: Some(old_version),
                new_version: Some(version),
                new_sha256: Some(content.sha256),
            })
        }
        Planned::MarkDeleted {
            file_id,
            old_version,
        } => {
            mark_deleted_tx(tx, file_id)?;
            Ok(AppliedChange {
                file_id,
                kind: ChangeKind::Delete,
                old_version: Some(old_version),
                new_version: None,
                new_sha256: None,
            })
        }
    }
}

/// Brings the checkout's snapshot to the just-committed state so the next
/// sequential commit from this workspace does not see its own changes as
/// conflicts. Keyed deletes go by path: a forced re-add may have moved the
/// path to a new file id.
fn refresh_snapshot_tx(
    tx: &Transaction<'_>,
    checkout_id: i64,
    path: &str,
    change: &AppliedChange,
) -> Result<(), StoreError> {
    tx.execute(
        "DELETE FROM checkout_snapshots WHERE checkout_id=?1 AND path=?2",
        params![checkout_id, path],
    )?;
    if let (Some(version), Some(sha256)) = (change.new_version, change.new_sha256.as_deref()) {
        tx.execute(
            "INSERT INTO checkout_snapshots(checkout_id, file_id, path, version, sha256) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![checkout_id, change.file_id, path, version, sha256],
        )?;
    }
    Ok(())
}
