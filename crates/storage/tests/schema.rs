#![forbid(unsafe_code)]

use rusqlite::{Connection, params};
use std::path::{Path, PathBuf};
use stemma_storage::{CreateProjectRequest, ImportRequest, SqliteStore, StoreError};

fn temp_dir(test_name: &str) -> PathBuf {
    let base = std::env::temp_dir();
    let pid = std::process::id();
    let nonce = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let dir = base.join(format!("stemma_schema_{test_name}_{pid}_{nonce}"));
    std::fs::create_dir_all(&dir).expect("create temp dir");
    dir
}

fn seed_one_file(store: &mut SqliteStore, base: &Path) {
    store
        .project_create(CreateProjectRequest {
            slug: "demo".to_string(),
            name: "demo".to_string(),
            origin: "/origin/demo".to_string(),
            active_branch: None,
            deploy_config: None,
        })
        .expect("create project");
    let source = base.join("source");
    std::fs::create_dir_all(&source).expect("create source dir");
    std::fs::write(source.join("a.txt"), b"a\n").expect("write source file");
    store
        .import(ImportRequest {
            project: "demo".to_string(),
            source_dir: source,
        })
        .expect("import");
}

#[test]
fn open_is_fail_closed_on_foreign_tables() {
    let dir = temp_dir("foreign_tables");
    let db_path = dir.join("stemma.db");

    let conn = Connection::open(db_path).expect("open raw db");
    conn.execute("CREATE TABLE legacy_stuff(id TEXT PRIMARY KEY)", [])
        .expect("create legacy table");
    drop(conn);

    let err = SqliteStore::open(&dir).expect_err("foreign tables must be rejected");
    assert_eq!(err.code(), "RESET_REQUIRED");
    assert!(matches!(
        err,
        StoreError::InvalidInput(message) if message.starts_with("RESET_REQUIRED")
    ));
}

#[test]
fn open_is_fail_closed_on_version_mismatch() {
    let dir = temp_dir("version_mismatch");
    {
        let _store = SqliteStore::open(&dir).expect("open fresh store");
    }

    let conn = Connection::open(dir.join("stemma.db")).expect("open raw db");
    conn.execute("UPDATE store_state SET schema_version=999 WHERE singleton=1", [])
        .expect("bump schema version");
    drop(conn);

    let err = SqliteStore::open(&dir).expect_err("version mismatch must be rejected");
    assert_eq!(err.code(), "RESET_REQUIRED");
}

#[test]
fn single_current_version_is_schema_enforced() {
    let dir = temp_dir("single_current");
    let mut store = SqliteStore::open(&dir).expect("open store");
    seed_one_file(&mut store, &dir);
    drop(store);

    let conn = Connection::open(dir.join("stemma.db")).expect("open raw db");
    let file_id: i64 = conn
        .query_row("SELECT id FROM files WHERE path='a.txt'", [], |row| {
            row.get(0)
        })
        .expect("file row");

    // A second current row for the same file must be impossible to write.
    let err = conn
        .execute(
            "INSERT INTO content_versions(file_id, version, kind, text_content, byte_size, \
                                          line_count, sha256, is_current, created_at_ms) \
             VALUES (?1, 2, 'text', 'rogue', 5, 1, 'deadbeef', 1, 0)",
            params![file_id],
        )
        .expect_err("second is_current row must violate the partial index");
    assert!(err.to_string().contains("UNIQUE"), "got: {err}");
}

#[test]
fn uncommitted_raw_transaction_is_not_persisted() {
    let dir = temp_dir("uncommitted_tx");
    {
        let _store = SqliteStore::open(&dir).expect("open fresh store");
    }

    {
        let mut conn = Connection::open(dir.join("stemma.db")).expect("open raw db");
        let tx = conn.transaction().expect("begin tx");
        tx.execute(
            "INSERT INTO projects(slug, name, origin, active_branch, created_at_ms, updated_at_ms) \
             VALUES ('ghost', 'Ghost', '/origin/ghost', 'main', 0, 0)",
            [],
        )
        .expect("insert project");
        // Drop without commit -> rollback (simulated crash before commit).
    }

    let store = SqliteStore::open(&dir).expect("reopen store");
    assert!(
        store
            .project_get("ghost")
            .expect("project query")
            .is_none(),
        "uncommitted transaction should not persist"
    );
}

#[test]
fn project_delete_cascades_to_all_rows() {
    let dir = temp_dir("delete_cascade");
    let mut store = SqliteStore::open(&dir).expect("open store");
    seed_one_file(&mut store, &dir);

    let workspace = dir.join("ws");
    store
        .checkout(stemma_storage::CheckoutRequest {
            project: "demo".to_string(),
            branch: None,
            workspace_dir: workspace.clone(),
            force: false,
        })
        .expect("checkout");
    std::fs::write(workspace.join("a.txt"), b"edited\n").expect("edit a.txt");
    store
        .commit(stemma_storage::CommitRequest {
            project: "demo".to_string(),
            branch: None,
            workspace_dir: workspace,
            message: "edit".to_string(),
            author: "tester".to_string(),
            strategy: stemma_core::model::CommitStrategy::Abort,
        })
        .expect("commit");

    assert!(store.project_delete("demo").expect("delete project"));
    drop(store);

    let conn = Connection::open(dir.join("stemma.db")).expect("open raw db");
    for table in [
        "files",
        "content_versions",
        "commits",
        "commit_changes",
        "checkouts",
        "checkout_snapshots",
    ] {
        let count: i64 = conn
            .query_row(&format!("SELECT COUNT(1) FROM {table}"), [], |row| {
                row.get(0)
            })
            .expect("count rows");
        assert_eq!(count, 0, "{table} must be empty after project delete");
    }
}
