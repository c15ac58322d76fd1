#![forbid(unsafe_code)]

use super::StoreError;
use sha2::Digest as _;
use std::fmt::Write as _;
use std::path::Path;
use stemma_core::model::ContentKind;

/// Files above this ceiling are never read into the store.
pub const MAX_FILE_BYTES: u64 = 10 * 1024 * 1024;

/// Extensions stored as raw bytes without a decode attempt. Everything else
/// is tried as UTF-8 first and reclassified as binary only when the decode
/// fails.
const BINARY_EXTENSIONS: &[&str] = &[
    // images
    "png", "jpg", "jpeg", "gif", "bmp", "ico", "webp", "tiff", "psd",
    // archives
    "zip", "tar", "gz", "tgz", "bz2", "xz", "7z", "rar", "jar", "war",
    // executables and object code
    "exe", "dll", "so", "dylib", "bin", "o", "a", "class", "pyc", "wasm",
    // fonts
    "ttf", "otf", "woff", "woff2", "eot",
    // media
    "mp3", "mp4", "m4a", "wav", "avi", "mov", "mkv", "flac", "ogg", "webm",
    // embedded databases and documents
    "db", "sqlite", "sqlite3", "mdb", "pdf",
];

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ContentPayload {
    Text(String),
    Binary(Vec<u8>),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileContent {
    pub payload: ContentPayload,
    pub byte_size: u64,
    /// Number of lines for text payloads (robust to a missing trailing
    /// newline); `None` for binary.
    pub line_count: Option<u64>,
    /// Lower-hex SHA-256 over the exact bytes that get persisted.
    pub sha256: String,
}

impl FileContent {
    pub fn kind(&self) -> ContentKind {
        match self.payload {
            ContentPayload::Text(_) => ContentKind::Text,
            ContentPayload::Binary(_) => ContentKind::Binary,
        }
    }

    /// The persisted byte image: UTF-8 of the decoded text, or the raw bytes.
    pub fn as_bytes(&self) -> &[u8] {
        match &self.payload {
            ContentPayload::Text(text) => text.as_bytes(),
            ContentPayload::Binary(bytes) => bytes,
        }
    }
}

/// Extension-based classification; files without a known binary suffix are
/// candidates for text and may still fall back to binary on decode failure.
pub fn classify(path: &Path) -> ContentKind {
    let Some(ext) = path.extension().and_then(|ext| ext.to_str()) else {
        return ContentKind::Text;
    };
    let ext = ext.to_ascii_lowercase();
    if BINARY_EXTENSIONS.iter().any(|known| *known == ext) {
        ContentKind::Binary
    } else {
        ContentKind::Text
    }
}

/// Reads one file through the size gate; the payload is never touched when
/// the metadata already shows it over the ceiling.
pub fn read_file(path: &Path) -> Result<FileContent, StoreError> {
    let size = std::fs::metadata(path)?.len();
    if size > MAX_FILE_BYTES {
        return Err(StoreError::SizeExceeded {
            path: path.display().to_string(),
            size,
            limit: MAX_FILE_BYTES,
        });
    }
    let bytes = std::fs::read(path)?;
    Ok(content_from_bytes(classify(path), bytes))
}

pub fn content_from_bytes(kind: ContentKind, bytes: Vec<u8>) -> FileContent {
    let sha256 = sha256_hex(&bytes);
    let byte_size = bytes.len() as u64;
    match kind {
        ContentKind::Text => match String::from_utf8(bytes) {
            Ok(text) => FileContent {
                line_count: Some(count_lines(&text)),
                payload: ContentPayload::Text(text),
                byte_size,
                sha256,
            },
            Err(err) => FileContent {
                payload: ContentPayload::Binary(err.into_bytes()),
                byte_size,
                line_count: None,
                sha256,
            },
        },
        ContentKind::Binary => FileContent {
            payload: ContentPayload::Binary(bytes),
            byte_size,
            line_count: None,
            sha256,
        },
    }
}

/// True when there is no previous hash or the hashes differ; shared by
/// import (no previous) and commit (previous = snapshot hash).
pub fn changed(previous: Option<&str>, current: &str) -> bool {
    match previous {
        Some(previous) => previous != current,
        None => true,
    }
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = sha2::Sha256::new();
    hasher.update(bytes);
    let digest = hasher.finalize();
    let mut out = String::with_capacity(64);
    for b in digest {
        let _ = write!(&mut out, "{b:02x}");
    }
    out
}

fn count_lines(text: &str) -> u64 {
    text.lines().count() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn temp_file(name: &str, bytes: &[u8]) -> PathBuf {
        let nonce = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        let path = std::env::temp_dir().join(format!(
            "stemma_content_{name}_{}_{nonce}",
            std::process::id()
        ));
        std::fs::write(&path, bytes).expect("write temp file");
        path
    }

    #[test]
    fn classify_uses_known_binary_suffixes() {
        assert_eq!(classify(Path::new("logo.PNG")), ContentKind::Binary);
        assert_eq!(classify(Path::new("dump.sqlite3")), ContentKind::Binary);
        assert_eq!(classify(Path::new("src/main.rs")), ContentKind::Text);
        assert_eq!(classify(Path::new("Makefile")), ContentKind::Text);
    }

    #[test]
    fn invalid_utf8_reclassifies_as_binary() {
        let content = content_from_bytes(ContentKind::Text, vec![0xff, 0xfe, 0x00, 0x41]);
        assert_eq!(content.kind(), ContentKind::Binary);
        assert_eq!(content.line_count, None);
        assert_eq!(content.byte_size, 4);
    }

    #[test]
    fn line_count_tolerates_missing_trailing_newline() {
        let with_newline = content_from_bytes(ContentKind::Text, b"a\nb\n".to_vec());
        let without_newline = content_from_bytes(ContentKind::Text, b"a\nb".to_vec());
        let empty = content_from_bytes(ContentKind::Text, Vec::new());
        assert_eq!(with_newline.line_count, Some(2));
        assert_eq!(without_newline.line_count, Some(2));
        assert_eq!(empty.line_count, Some(0));
    }

    #[test]
    fn hash_covers_exact_bytes() {
        let text = content_from_bytes(ContentKind::Text, b"hello\n".to_vec());
        let binary = content_from_bytes(ContentKind::Binary, b"hello\n".to_vec());
        assert_eq!(text.sha256, binary.sha256);
        assert_eq!(text.sha256, sha256_hex(b"hello\n"));
        assert_eq!(text.sha256.len(), 64);
    }

    #[test]
    fn read_file_rejects_oversize_from_metadata() {
        let path = temp_file("oversize", b"ignored");
        // Grow the file past the ceiling without materializing the payload.
        let file = std::fs::OpenOptions::new()
            .write(true)
            .open(&path)
            .expect("reopen temp file");
        file.set_len(MAX_FILE_BYTES + 1).expect("extend temp file");
        let err = read_file(&path).expect_err("oversize must be rejected");
        assert!(matches!(err, StoreError::SizeExceeded { size, limit, .. }
            if size == MAX_FILE_BYTES + 1 && limit == MAX_FILE_BYTES));
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn read_file_reads_text() {
        let path = temp_file("text", b"line one\nline two");
        let content = read_file(&path).expect("read text file");
        assert_eq!(content.kind(), ContentKind::Text);
        assert_eq!(content.line_count, Some(2));
        assert_eq!(content.byte_size, 17);
        assert_eq!(content.as_bytes(), b"line one\nline two");
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn changed_matches_import_and_commit_use() {
        assert!(changed(None, "abc"));
        assert!(changed(Some("abc"), "def"));
        assert!(!changed(Some("abc"), "abc"));
    }
}
