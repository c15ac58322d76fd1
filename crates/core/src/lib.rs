#![forbid(unsafe_code)]

pub mod ids {
    #[derive(Clone, Debug, PartialEq, Eq, Hash)]
    pub struct ProjectSlug(String);

    impl ProjectSlug {
        pub fn as_str(&self) -> &str {
            &self.0
        }

        pub fn try_new(value: impl Into<String>) -> Result<Self, IdError> {
            let value = value.into();
            validate_identifier(&value)?;
            Ok(Self(value))
        }
    }

    #[derive(Clone, Debug, PartialEq, Eq, Hash)]
    pub struct BranchName(String);

    impl BranchName {
        pub fn as_str(&self) -> &str {
            &self.0
        }

        pub fn try_new(value: impl Into<String>) -> Result<Self, IdError> {
            let value = value.into();
            validate_identifier(&value)?;
            Ok(Self(value))
        }
    }

    #[derive(Clone, Debug, PartialEq, Eq)]
    pub enum IdError {
        Empty,
        TooLong,
        InvalidFirstChar,
        InvalidChar { ch: char, index: usize },
    }

    impl std::fmt::Display for IdError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            match self {
                Self::Empty => write!(f, "identifier must not be empty"),
                Self::TooLong => write!(f, "identifier exceeds 128 characters"),
                Self::InvalidFirstChar => {
                    write!(f, "identifier must start with an ascii alphanumeric")
                }
                Self::InvalidChar { ch, index } => {
                    write!(f, "invalid character {ch:?} at index {index}")
                }
            }
        }
    }

    impl std::error::Error for IdError {}

    fn validate_identifier(value: &str) -> Result<(), IdError> {
        if value.is_empty() {
            return Err(IdError::Empty);
        }
        if value.len() > 128 {
            return Err(IdError::TooLong);
        }
        let mut chars = value.chars();
        let Some(first) = chars.next() else {
            return Err(IdError::Empty);
        };
        if !first.is_ascii_alphanumeric() {
            return Err(IdError::InvalidFirstChar);
        }
        for (index, ch) in value.chars().enumerate() {
            if index == 0 {
                continue;
            }
            if ch.is_ascii_alphanumeric() || matches!(ch, '.' | '_' | '/' | '-') {
                continue;
            }
            return Err(IdError::InvalidChar { ch, index });
        }
        Ok(())
    }
}

pub mod model {
    /// How a file's payload is stored: decoded UTF-8 text or raw bytes.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub enum ContentKind {
        Text,
        Binary,
    }

    impl ContentKind {
        pub fn as_str(self) -> &'static str {
            match self {
                ContentKind::Text => "text",
                ContentKind::Binary => "binary",
            }
        }

        pub fn parse(value: &str) -> Option<Self> {
            match value {
                "text" => Some(ContentKind::Text),
                "binary" => Some(ContentKind::Binary),
                _ => None,
            }
        }
    }

    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub enum ChangeKind {
        Add,
        Modify,
        Delete,
    }

    impl ChangeKind {
        pub fn as_str(self) -> &'static str {
            match self {
                ChangeKind::Add => "add",
                ChangeKind::Modify => "modify",
                ChangeKind::Delete => "delete",
            }
        }

        pub fn parse(value: &str) -> Option<Self> {
            match value {
                "add" => Some(ChangeKind::Add),
                "modify" => Some(ChangeKind::Modify),
                "delete" => Some(ChangeKind::Delete),
                _ => None,
            }
        }
    }

    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub enum FileStatus {
        Active,
        Deleted,
    }

    impl FileStatus {
        pub fn as_str(self) -> &'static str {
            match self {
                FileStatus::Active => "active",
                FileStatus::Deleted => "deleted",
            }
        }

        pub fn parse(value: &str) -> Option<Self> {
            match value {
                "active" => Some(FileStatus::Active),
                "deleted" => Some(FileStatus::Deleted),
                _ => None,
            }
        }
    }

    /// Conflict policy for a commit: fail the whole commit, or let the
    /// workspace's content win.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub enum CommitStrategy {
        #[default]
        Abort,
        Force,
    }

    impl CommitStrategy {
        pub fn as_str(self) -> &'static str {
            match self {
                CommitStrategy::Abort => "abort",
                CommitStrategy::Force => "force",
            }
        }

        pub fn parse(value: &str) -> Option<Self> {
            match value {
                "abort" => Some(CommitStrategy::Abort),
                "force" => Some(CommitStrategy::Force),
                _ => None,
            }
        }
    }
}

pub mod paths {
    /// Normalizes a workspace-relative path to forward slashes with no
    /// leading separator, the form stored in the database.
    pub fn normalize_rel(value: &str) -> Result<String, RelPathError> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(RelPathError::Empty);
        }
        let unified = trimmed.replace('\\', "/");
        let mut segments = Vec::new();
        for segment in unified.split('/') {
            match segment {
                "" | "." => continue,
                ".." => return Err(RelPathError::ParentTraversal),
                other => segments.push(other),
            }
        }
        if segments.is_empty() {
            return Err(RelPathError::Empty);
        }
        Ok(segments.join("/"))
    }

    #[derive(Clone, Debug, PartialEq, Eq)]
    pub enum RelPathError {
        Empty,
        ParentTraversal,
    }

    impl std::fmt::Display for RelPathError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            match self {
                Self::Empty => write!(f, "path must not be empty"),
                Self::ParentTraversal => write!(f, "path must not contain '..'"),
            }
        }
    }

    impl std::error::Error for RelPathError {}
}
