#![forbid(unsafe_code)]

use std::path::PathBuf;
use stemma_core::model::{ChangeKind, CommitStrategy, ContentKind, FileStatus};

#[derive(Clone, Debug, PartialEq)]
pub struct CreateProjectRequest {
    pub slug: String,
    pub name: String,
    pub origin: String,
    /// Defaults to "main" when absent.
    pub active_branch: Option<String>,
    pub deploy_config: Option<serde_json::Value>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ProjectRow {
    pub slug: String,
    pub name: String,
    pub origin: String,
    pub active_branch: String,
    pub deploy_config: Option<serde_json::Value>,
    pub created_at_ms: i64,
    pub updated_at_ms: i64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileRow {
    pub id: i64,
    pub project: String,
    pub path: String,
    pub file_type: ContentKind,
    pub status: FileStatus,
    pub created_at_ms: i64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VersionRow {
    pub file_id: i64,
    pub version: i64,
    pub kind: ContentKind,
    pub byte_size: i64,
    pub line_count: Option<i64>,
    pub sha256: String,
    pub is_current: bool,
    pub commit_id: Option<i64>,
    pub created_at_ms: i64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImportRequest {
    pub project: String,
    pub source_dir: PathBuf,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ImportStats {
    pub files_imported: usize,
    pub bytes_imported: u64,
    pub files_skipped: usize,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CheckoutRequest {
    pub project: String,
    /// Defaults to the project's active branch.
    pub branch: Option<String>,
    pub workspace_dir: PathBuf,
    pub force: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CheckoutSummary {
    pub checkout_id: i64,
    pub branch: String,
    pub files_written: usize,
    pub bytes_written: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommitRequest {
    pub project: String,
    /// Defaults to the branch the checkout was made from.
    pub branch: Option<String>,
    pub workspace_dir: PathBuf,
    pub message: String,
    pub author: String,
    pub strategy: CommitStrategy,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileChange {
    pub path: String,
    pub change: ChangeKind,
    pub old_version: Option<i64>,
    pub new_version: Option<i64>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommitSummary {
    pub commit_id: i64,
    pub branch: String,
    pub changes: Vec<FileChange>,
    pub created_at_ms: i64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommitRow {
    pub id: i64,
    pub project: String,
    pub branch: String,
    pub message: String,
    pub author: String,
    pub created_at_ms: i64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommitLogRequest {
    pub project: String,
    /// Defaults to the project's active branch.
    pub branch: Option<String>,
    /// Page size, clamped to `1..=200`; `0` reads as 1.
    pub limit: usize,
    pub offset: usize,
}
