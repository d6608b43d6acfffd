//! End-to-end runs through the in-memory catalog into every sink

#![cfg(feature = "s3")]

use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, TimeZone, Utc};
use object_store::ObjectStore;
use object_store::local::LocalFileSystem;
use object_store::memory::InMemory;
use object_store::path::Path;
use sqlbackup_core::{
    BackupError, BackupPhase, ColumnSpec, FileSink, MemoryCatalog, MemorySink, ObjectStoreSink,
    Row, SqlValue, artifact_name, run_backup,
};
use tempfile::TempDir;

fn users_catalog() -> MemoryCatalog {
    MemoryCatalog::new().with_table(
        "users",
        vec![
            ColumnSpec::new("id", "int").not_null(),
            ColumnSpec::new("name", "varchar").with_max_length(20),
        ],
        vec![Row::new(vec![SqlValue::from_i64(1), SqlValue::text("O'Brien")])],
    )
}

fn shop_catalog() -> MemoryCatalog {
    let created = Utc.with_ymd_and_hms(2024, 2, 29, 8, 15, 0).unwrap();
    let orders: Vec<Row> = (1..=7)
        .map(|id| {
            Row::new(vec![
                SqlValue::from_i64(id),
                SqlValue::from_f64(id as f64 * 2.5),
                SqlValue::from_bool(id % 2 == 0),
                SqlValue::from_timestamptz(created),
                if id == 3 {
                    SqlValue::Null
                } else {
                    SqlValue::text(format!("note #{id}"))
                },
            ])
        })
        .collect();

    MemoryCatalog::new()
        .with_batch_size(3)
        .with_table(
            "customers",
            vec![
                ColumnSpec::new("id", "bigint").not_null(),
                ColumnSpec::new("email", "character varying").with_max_length(255),
                ColumnSpec::new("born", "date"),
            ],
            vec![
                Row::new(vec![
                    SqlValue::from_i64(10),
                    SqlValue::text("ann@example.com"),
                    SqlValue::from_date(NaiveDate::from_ymd_opt(1990, 4, 1).unwrap()),
                ]),
                Row::new(vec![SqlValue::from_i64(11), SqlValue::Null, SqlValue::Null]),
            ],
        )
        .with_table("archive", vec![ColumnSpec::new("payload", "jsonb")], vec![])
        .with_table(
            "orders",
            vec![
                ColumnSpec::new("id", "integer").not_null(),
                ColumnSpec::new("total", "double precision"),
                ColumnSpec::new("paid", "boolean").not_null(),
                ColumnSpec::new("created_at", "timestamp with time zone"),
                ColumnSpec::new("note", "text"),
            ],
            orders,
        )
}

#[tokio::test]
async fn users_scenario_matches_expected_artifact() {
    let mut catalog = users_catalog();
    let mut sink = MemorySink::new();

    let summary = run_backup(&mut catalog, &mut sink, "backup.sql")
        .await
        .unwrap();

    assert_eq!(
        sink.contents(),
        "CREATE TABLE IF NOT EXISTS \"users\" (\"id\" int NOT NULL, \"name\" varchar(20));\n\
         \n\
         INSERT INTO \"users\" (\"id\", \"name\") VALUES (1, 'O''Brien');\n\
         \n"
    );
    assert_eq!(summary.tables, 1);
    assert_eq!(summary.rows, 1);
    assert_eq!(summary.bytes, sink.contents().len() as u64);
    assert!(sink.is_finished());
}

#[tokio::test]
async fn tables_are_emitted_in_order_with_separators() {
    let mut catalog = shop_catalog();
    let mut sink = MemorySink::new();

    let summary = run_backup(&mut catalog, &mut sink, "backup.sql")
        .await
        .unwrap();
    let text = sink.contents();

    let customers = text.find("CREATE TABLE IF NOT EXISTS \"customers\"").unwrap();
    let archive = text.find("CREATE TABLE IF NOT EXISTS \"archive\"").unwrap();
    let orders = text.find("CREATE TABLE IF NOT EXISTS \"orders\"").unwrap();
    assert!(customers < archive && archive < orders);

    // the empty table contributes its schema line and nothing else
    assert!(
        text.contains("CREATE TABLE IF NOT EXISTS \"archive\" (\"payload\" jsonb);\n\nCREATE")
    );
    assert!(!text.contains("INSERT INTO \"archive\""));

    assert_eq!(text.matches("INSERT INTO \"orders\"").count(), 7);
    assert!(text.contains("VALUES (3, 7.5, false, '2024-02-29T08:15:00Z', NULL);"));
    assert!(text.contains("VALUES (10, 'ann@example.com', '1990-04-01');"));
    assert!(text.contains("VALUES (11, NULL, NULL);"));
    assert!(text.ends_with(";\n\n"));

    assert_eq!(summary.tables, 3);
    assert_eq!(summary.rows, 9);
}

#[tokio::test]
async fn file_and_object_store_outputs_are_identical() {
    let artifact = artifact_name(Utc::now());

    let dir = TempDir::new().unwrap();
    let mut file_sink = FileSink::create(dir.path(), &artifact).await.unwrap();
    let file_summary = run_backup(&mut shop_catalog(), &mut file_sink, &artifact)
        .await
        .unwrap();
    let file_bytes = std::fs::read(dir.path().join(&artifact)).unwrap();

    let store = Arc::new(InMemory::new());
    let mut upload_sink = ObjectStoreSink::new(store.clone(), &artifact, Duration::from_secs(5));
    let upload_summary = run_backup(&mut shop_catalog(), &mut upload_sink, &artifact)
        .await
        .unwrap();
    let uploaded = store
        .get(&Path::from(artifact.as_str()))
        .await
        .unwrap()
        .bytes()
        .await
        .unwrap();

    assert_eq!(&uploaded[..], &file_bytes[..]);
    assert_eq!(file_summary, upload_summary);
    assert_eq!(upload_summary.bytes, file_bytes.len() as u64);
}

#[tokio::test]
async fn failure_reports_progress_and_discards_output() {
    let mut catalog = MemoryCatalog::new()
        .with_table("a", vec![ColumnSpec::new("x", "integer")], vec![])
        .with_table("b", vec![ColumnSpec::new("x", "integer")], vec![])
        .with_unreadable_table("secret", vec![ColumnSpec::new("x", "integer")])
        .with_table("c", vec![ColumnSpec::new("x", "integer")], vec![]);

    let dir = TempDir::new().unwrap();
    let mut sink = FileSink::create(dir.path(), "backup-failed.sql").await.unwrap();

    let failure = run_backup(&mut catalog, &mut sink, "backup-failed.sql")
        .await
        .unwrap_err();

    assert_eq!(failure.phase, BackupPhase::ProcessingTable);
    assert_eq!(failure.tables_completed, 2);
    assert_eq!(failure.tables_total, 4);
    assert!(matches!(failure.source, BackupError::Catalog(_)));
    assert!(std::fs::read_dir(dir.path()).unwrap().next().is_none());
}

#[tokio::test]
async fn failed_run_leaves_no_uploaded_object() {
    let mut catalog = MemoryCatalog::new()
        .with_table(
            "a",
            vec![ColumnSpec::new("x", "integer")],
            vec![Row::new(vec![SqlValue::from_i64(1)])],
        )
        .with_unreadable_table("b", vec![ColumnSpec::new("x", "integer")]);

    let store = Arc::new(InMemory::new());
    let mut sink = ObjectStoreSink::new(store.clone(), "partial.sql", Duration::from_secs(5));

    let failure = run_backup(&mut catalog, &mut sink, "partial.sql")
        .await
        .unwrap_err();

    assert_eq!(failure.tables_completed, 1);
    assert!(store.get(&Path::from("partial.sql")).await.is_err());
}

#[tokio::test]
async fn rejected_upload_fails_the_run_while_finalizing() {
    let dir = TempDir::new().unwrap();
    let blocker = dir.path().join("blocker");
    std::fs::write(&blocker, b"not a directory").unwrap();
    let store = Arc::new(LocalFileSystem::new_with_prefix(&blocker).unwrap());
    let mut sink = ObjectStoreSink::new(store, "rejected.sql", Duration::from_secs(5));

    let failure = run_backup(&mut shop_catalog(), &mut sink, "rejected.sql")
        .await
        .unwrap_err();

    assert_eq!(failure.phase, BackupPhase::Finalizing);
    assert_eq!(failure.tables_completed, failure.tables_total);
    match failure.source {
        BackupError::Upload(message) => assert!(message.contains("rejected.sql")),
        other => panic!("expected upload error, got {other:?}"),
    }
}
