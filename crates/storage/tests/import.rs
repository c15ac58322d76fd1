#![forbid(unsafe_code)]

use rusqlite::Connection;
use std::path::{Path, PathBuf};
use stemma_storage::{
    CreateProjectRequest, ImportRequest, MAX_FILE_BYTES, SqliteStore, StoreError, sha256_hex,
};

fn temp_dir(test_name: &str) -> PathBuf {
    let base = std::env::temp_dir();
    let pid = std::process::id();
    let nonce = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let dir = base.join(format!("stemma_import_{test_name}_{pid}_{nonce}"));
    std::fs::create_dir_all(&dir).expect("create temp dir");
    dir
}

fn write_file(root: &Path, rel: &str, bytes: &[u8]) {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("create parent dirs");
    }
    std::fs::write(&path, bytes).expect("write source file");
}

fn create_project(store: &mut SqliteStore, slug: &str) {
    store
        .project_create(CreateProjectRequest {
            slug: slug.to_string(),
            name: slug.to_string(),
            origin: format!("/origin/{slug}"),
            active_branch: None,
            deploy_config: None,
        })
        .expect("create project");
}

#[test]
fn import_populates_files_and_stats() {
    let base = temp_dir("import_populates");
    let mut store = SqliteStore::open(base.join("store")).expect("open store");
    create_project(&mut store, "demo");

    let source = base.join("source");
    write_file(&source, "README.md", b"# demo\n");
    write_file(&source, "src/main.rs", b"fn main() {}\n");
    write_file(&source, "assets/logo.png", &[0x89, 0x50, 0x4e, 0x47, 0x00, 0xff]);
    // Dot-entries never enter the store.
    write_file(&source, ".git/config", b"[core]\n");

    let stats = store
        .import(ImportRequest {
            project: "demo".to_string(),
            source_dir: source,
        })
        .expect("import");

    assert_eq!(stats.files_imported, 3);
    assert_eq!(stats.files_skipped, 0);
    assert_eq!(stats.bytes_imported, 7 + 13 + 6);

    let readme = store
        .file_current_version("demo", "README.md")
        .expect("current version query")
        .expect("README.md imported");
    assert_eq!(readme.version, 1);
    assert!(readme.is_current);
    assert_eq!(readme.commit_id, None);
    assert_eq!(readme.sha256, sha256_hex(b"# demo\n"));
    assert_eq!(readme.line_count, Some(1));

    let logo = store
        .file_current_version("demo", "assets/logo.png")
        .expect("current version query")
        .expect("logo imported");
    assert_eq!(logo.line_count, None);
    assert_eq!(logo.byte_size, 6);

    assert!(
        store
            .file_current_version("demo", ".git/config")
            .expect("current version query")
            .is_none(),
        "dot-entries must be skipped"
    );
}

#[test]
fn import_skips_oversize_files() {
    let base = temp_dir("import_oversize");
    let mut store = SqliteStore::open(base.join("store")).expect("open store");
    create_project(&mut store, "demo");

    let source = base.join("source");
    write_file(&source, "small.txt", b"ok\n");
    write_file(&source, "huge.bin", b"seed");
    let huge = std::fs::OpenOptions::new()
        .write(true)
        .open(source.join("huge.bin"))
        .expect("reopen huge file");
    huge.set_len(MAX_FILE_BYTES + 1).expect("extend huge file");

    let stats = store
        .import(ImportRequest {
            project: "demo".to_string(),
            source_dir: source,
        })
        .expect("import");

    assert_eq!(stats.files_imported, 1);
    assert_eq!(stats.files_skipped, 1);
    assert!(
        store
            .file_current_version("demo", "huge.bin")
            .expect("current version query")
            .is_none()
    );
}

#[test]
fn import_requires_existing_project() {
    let base = temp_dir("import_no_project");
    let mut store = SqliteStore::open(base.join("store")).expect("open store");

    let source = base.join("source");
    write_file(&source, "a.txt", b"a\n");

    let err = store
        .import(ImportRequest {
            project: "ghost".to_string(),
            source_dir: source,
        })
        .expect_err("import into missing project must fail");
    assert!(matches!(err, StoreError::UnknownProject));
}

#[test]
fn import_is_first_time_only() {
    let base = temp_dir("import_first_time");
    let mut store = SqliteStore::open(base.join("store")).expect("open store");
    create_project(&mut store, "demo");

    let source = base.join("source");
    write_file(&source, "a.txt", b"a\n");

    store
        .import(ImportRequest {
            project: "demo".to_string(),
            source_dir: source.clone(),
        })
        .expect("first import");

    let err = store
        .import(ImportRequest {
            project: "demo".to_string(),
            source_dir: source,
        })
        .expect_err("second import must be rejected");
    assert!(matches!(err, StoreError::InvalidInput(_)));
}

#[cfg(unix)]
#[test]
fn failed_import_rolls_back_every_row() {
    let base = temp_dir("import_rollback");
    let store_dir = base.join("store");
    let mut store = SqliteStore::open(&store_dir).expect("open store");
    create_project(&mut store, "demo");

    // Two on-disk names that normalize to the same stored path: a real
    // `src/main.rs` plus a single file literally named `src\main.rs`. The
    // second insert trips the active-path unique index partway through the
    // walk, after at least one row has been created.
    let source = base.join("source");
    write_file(&source, "src/main.rs", b"fn main() {}\n");
    std::fs::write(source.join("src\\main.rs"), b"fn main() { /* dupe */ }\n")
        .expect("write colliding file");

    let err = store
        .import(ImportRequest {
            project: "demo".to_string(),
            source_dir: source,
        })
        .expect_err("colliding paths must abort the import");

    match err {
        StoreError::ImportAborted { stats, cause } => {
            assert!(stats.files_imported >= 1, "failure must be mid-import");
            assert!(matches!(*cause, StoreError::Sql(_)));
        }
        other => panic!("expected ImportAborted, got {other:?}"),
    }

    // The transaction rolled back: no file or version rows survive.
    let conn = Connection::open(store_dir.join("stemma.db")).expect("open db");
    let files: i64 = conn
        .query_row("SELECT COUNT(1) FROM files", [], |row| row.get(0))
        .expect("count files");
    let versions: i64 = conn
        .query_row("SELECT COUNT(1) FROM content_versions", [], |row| row.get(0))
        .expect("count versions");
    assert_eq!(files, 0);
    assert_eq!(versions, 0);
}
