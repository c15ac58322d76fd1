#![forbid(unsafe_code)]

use super::ImportStats;

#[derive(Debug)]
pub enum StoreError {
    Io(std::io::Error),
    Sql(rusqlite::Error),
    InvalidInput(&'static str),
    UnknownProject,
    ProjectAlreadyExists,
    SizeExceeded {
        path: String,
        size: u64,
        limit: u64,
    },
    WorkspaceConflict {
        workspace_dir: String,
    },
    NoCheckout {
        workspace_dir: String,
    },
    NothingToCommit,
    Conflict {
        paths: Vec<String>,
    },
    ImportAborted {
        stats: ImportStats,
        cause: Box<StoreError>,
    },
}

impl StoreError {
    /// Stable machine-readable token per variant, for exit-code mapping by
    /// an outer CLI.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Io(_) => "IO",
            Self::Sql(_) => "SQL",
            Self::InvalidInput(message) if message.starts_with("RESET_REQUIRED") => {
                "RESET_REQUIRED"
            }
            Self::InvalidInput(_) => "INVALID_INPUT",
            Self::UnknownProject => "UNKNOWN_PROJECT",
            Self::ProjectAlreadyExists => "PROJECT_EXISTS",
            Self::SizeExceeded { .. } => "SIZE_EXCEEDED",
            Self::WorkspaceConflict { .. } => "WORKSPACE_CONFLICT",
            Self::NoCheckout { .. } => "NO_CHECKOUT",
            Self::NothingToCommit => "NOTHING_TO_COMMIT",
            Self::Conflict { .. } => "CONFLICT",
            Self::ImportAborted { .. } => "IMPORT_ABORTED",
        }
    }
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(err) => write!(f, "io: {err}"),
            Self::Sql(err) => write!(f, "sqlite: {err}"),
            Self::InvalidInput(message) => write!(f, "invalid input: {message}"),
            Self::UnknownProject => write!(f, "unknown project"),
            Self::ProjectAlreadyExists => write!(f, "project already exists"),
            Self::SizeExceeded { path, size, limit } => {
                write!(f, "file too large ({path}: {size} bytes, limit {limit})")
            }
            Self::WorkspaceConflict { workspace_dir } => {
                write!(
                    f,
                    "workspace {workspace_dir} is bound to a different checkout (use force to take it over)"
                )
            }
            Self::NoCheckout { workspace_dir } => {
                write!(f, "workspace {workspace_dir} has no recorded checkout")
            }
            Self::NothingToCommit => write!(f, "nothing to commit"),
            Self::Conflict { paths } => {
                write!(f, "conflicting changes for: {}", paths.join(", "))
            }
            Self::ImportAborted { stats, cause } => {
                write!(
                    f,
                    "import aborted after {} files / {} bytes (skipped {}): {cause}",
                    stats.files_imported, stats.bytes_imported, stats.files_skipped
                )
            }
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::Sql(err) => Some(err),
            Self::ImportAborted { cause, .. } => Some(cause),
            _ => None,
        }
    }
}

impl From<std::io::Error> for StoreError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sql(value)
    }
}
