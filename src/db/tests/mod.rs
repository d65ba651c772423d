//! Record store tests

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#![allow(clippy::unwrap_used, clippy::expect_used)]

use crate::db::{Database, NewRecord, RecordUpdate};
use crate::types::{RecordId, Status};
use tempfile::TempDir;

async fn test_db() -> (Database, TempDir) {
    let dir = TempDir::new().unwrap();
    let db = Database::open(&dir.path().join("test.db")).await.unwrap();
    (db, dir)
}

fn new_record(url: &str, filename: &str) -> NewRecord {
    NewRecord {
        source_url: url.to_string(),
        filename: filename.to_string(),
    }
}

#[tokio::test]
async fn insert_creates_pending_record_with_zero_retries() {
    let (db, _dir) = test_db().await;

    let id = db
        .insert_record(&new_record("http://example.com/a.pdf", "a.pdf"))
        .await
        .unwrap();

    let record = db.get_record(id).await.unwrap().unwrap();
    assert_eq!(record.source_url, "http://example.com/a.pdf");
    assert_eq!(record.filename, "a.pdf");
    assert_eq!(record.status, Status::Pending);
    assert_eq!(record.retry_count, 0);
    assert!(record.local_path.is_none());
    assert!(record.digest.is_none());
    assert!(record.completed_at.is_none());
}

#[tokio::test]
async fn record_ids_are_unique_and_increasing() {
    let (db, _dir) = test_db().await;

    let first = db
        .insert_record(&new_record("http://example.com/a.pdf", "a.pdf"))
        .await
        .unwrap();
    let second = db
        .insert_record(&new_record("http://example.com/b.pdf", "b.pdf"))
        .await
        .unwrap();

    assert!(second.get() > first.get());
}

#[tokio::test]
async fn get_missing_record_returns_none() {
    let (db, _dir) = test_db().await;
    assert!(db.get_record(RecordId::new(999)).await.unwrap().is_none());
}

#[tokio::test]
async fn update_missing_record_is_not_found() {
    let (db, _dir) = test_db().await;

    let result = db
        .update_record(
            RecordId::new(999),
            &RecordUpdate {
                status: Some(Status::Downloading),
                ..Default::default()
            },
        )
        .await;

    assert!(matches!(result, Err(crate::Error::NotFound(_))));
}

#[tokio::test]
async fn partial_update_leaves_other_fields_untouched() {
    let (db, _dir) = test_db().await;

    let id = db
        .insert_record(&new_record("http://example.com/a.pdf", "a.pdf"))
        .await
        .unwrap();

    db.update_record(
        id,
        &RecordUpdate {
            status: Some(Status::Downloading),
            ..Default::default()
        },
    )
    .await
    .unwrap();

    let record = db
        .update_record(
            id,
            &RecordUpdate {
                retry_count: Some(2),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    // Status from the first update survives the second
    assert_eq!(record.status, Status::Downloading);
    assert_eq!(record.retry_count, 2);
    assert_eq!(record.filename, "a.pdf");
}

#[tokio::test]
async fn completed_at_is_stamped_exactly_once() {
    let (db, _dir) = test_db().await;

    let id = db
        .insert_record(&new_record("http://example.com/a.pdf", "a.pdf"))
        .await
        .unwrap();

    let completed = db
        .update_record(
            id,
            &RecordUpdate {
                status: Some(Status::Completed),
                size_bytes: Some(1024),
                digest: Some("abc123".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let first_completion = completed.completed_at.expect("completed_at should be set");

    // A later update must not move the completion time
    tokio::time::sleep(std::time::Duration::from_millis(1100)).await;
    let touched = db
        .update_record(
            id,
            &RecordUpdate {
                metadata: Some(serde_json::json!({"note": "touched"})),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(touched.completed_at, Some(first_completion));
}

#[tokio::test]
async fn error_message_set_and_cleared() {
    let (db, _dir) = test_db().await;

    let id = db
        .insert_record(&new_record("http://example.com/a.pdf", "a.pdf"))
        .await
        .unwrap();

    let failed = db
        .update_record(
            id,
            &RecordUpdate {
                status: Some(Status::Failed),
                error_message: Some("connection refused".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(failed.error_message.as_deref(), Some("connection refused"));

    let cleared = db
        .update_record(
            id,
            &RecordUpdate {
                clear_error: true,
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert!(cleared.error_message.is_none());
}

#[tokio::test]
async fn list_is_newest_first_with_status_filter_and_limit() {
    let (db, _dir) = test_db().await;

    let first = db
        .insert_record(&new_record("http://example.com/a.pdf", "a.pdf"))
        .await
        .unwrap();
    let second = db
        .insert_record(&new_record("http://example.com/b.pdf", "b.pdf"))
        .await
        .unwrap();
    let third = db
        .insert_record(&new_record("http://example.com/c.pdf", "c.pdf"))
        .await
        .unwrap();

    db.update_record(
        second,
        &RecordUpdate {
            status: Some(Status::Failed),
            ..Default::default()
        },
    )
    .await
    .unwrap();

    let all = db.list_records(None, None).await.unwrap();
    assert_eq!(
        all.iter().map(|r| r.id).collect::<Vec<_>>(),
        vec![third, second, first],
        "newest first"
    );

    let failed = db.list_records(Some(Status::Failed), None).await.unwrap();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].id, second);

    let limited = db.list_records(None, Some(2)).await.unwrap();
    assert_eq!(limited.len(), 2);
    assert_eq!(limited[0].id, third);
}

#[tokio::test]
async fn source_dedup_sees_only_completed_records() {
    let (db, _dir) = test_db().await;

    let id = db
        .insert_record(&new_record("http://example.com/a.pdf", "a.pdf"))
        .await
        .unwrap();

    assert!(!db
        .is_source_completed("http://example.com/a.pdf")
        .await
        .unwrap());

    db.update_record(
        id,
        &RecordUpdate {
            status: Some(Status::Completed),
            size_bytes: Some(10),
            ..Default::default()
        },
    )
    .await
    .unwrap();

    assert!(db
        .is_source_completed("http://example.com/a.pdf")
        .await
        .unwrap());
    assert!(!db
        .is_source_completed("http://example.com/other.pdf")
        .await
        .unwrap());
}

#[tokio::test]
async fn digest_dedup_sees_only_completed_records() {
    let (db, _dir) = test_db().await;

    let id = db
        .insert_record(&new_record("http://example.com/a.pdf", "a.pdf"))
        .await
        .unwrap();

    // A skipped record carrying the digest must not count as completed
    db.update_record(
        id,
        &RecordUpdate {
            status: Some(Status::Skipped),
            digest: Some("deadbeef".into()),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    assert!(!db.is_digest_completed("deadbeef").await.unwrap());

    let other = db
        .insert_record(&new_record("http://example.com/b.pdf", "b.pdf"))
        .await
        .unwrap();
    db.update_record(
        other,
        &RecordUpdate {
            status: Some(Status::Completed),
            digest: Some("deadbeef".into()),
            size_bytes: Some(10),
            ..Default::default()
        },
    )
    .await
    .unwrap();

    assert!(db.is_digest_completed("deadbeef").await.unwrap());
}

#[tokio::test]
async fn statistics_aggregate_counts_and_sizes() {
    let (db, _dir) = test_db().await;

    let stats = db.statistics().await.unwrap();
    assert_eq!(stats, crate::types::Statistics::default());

    let a = db
        .insert_record(&new_record("http://example.com/a.pdf", "a.pdf"))
        .await
        .unwrap();
    let b = db
        .insert_record(&new_record("http://example.com/b.pdf", "b.pdf"))
        .await
        .unwrap();
    let c = db
        .insert_record(&new_record("http://example.com/c.pdf", "c.pdf"))
        .await
        .unwrap();
    let _pending = db
        .insert_record(&new_record("http://example.com/d.pdf", "d.pdf"))
        .await
        .unwrap();

    db.update_record(
        a,
        &RecordUpdate {
            status: Some(Status::Completed),
            size_bytes: Some(100),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    db.update_record(
        b,
        &RecordUpdate {
            status: Some(Status::Completed),
            size_bytes: Some(250),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    db.update_record(
        c,
        &RecordUpdate {
            status: Some(Status::Failed),
            error_message: Some("timeout".into()),
            ..Default::default()
        },
    )
    .await
    .unwrap();

    let stats = db.statistics().await.unwrap();
    assert_eq!(stats.total_completed, 2);
    assert_eq!(stats.total_size_bytes, 350);
    assert_eq!(stats.pending, 1);
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.downloading, 0);
}

#[tokio::test]
async fn reset_for_retry_clears_error_and_retry_count() {
    let (db, _dir) = test_db().await;

    let id = db
        .insert_record(&new_record("http://example.com/a.pdf", "a.pdf"))
        .await
        .unwrap();
    db.update_record(
        id,
        &RecordUpdate {
            status: Some(Status::Failed),
            retry_count: Some(2),
            error_message: Some("HTTP 500".into()),
            ..Default::default()
        },
    )
    .await
    .unwrap();

    db.reset_record_for_retry(id).await.unwrap();

    let record = db.get_record(id).await.unwrap().unwrap();
    assert_eq!(record.status, Status::Pending);
    assert_eq!(record.retry_count, 0);
    assert!(record.error_message.is_none());
}

#[tokio::test]
async fn last_check_time_round_trips() {
    let (db, _dir) = test_db().await;

    assert!(db.last_check_time().await.unwrap().is_none());

    let now = chrono::Utc::now();
    db.set_last_check_time(now).await.unwrap();

    let stored = db.last_check_time().await.unwrap().unwrap();
    assert_eq!(stored.timestamp(), now.timestamp());
}

#[tokio::test]
async fn records_survive_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("persist.db");

    {
        let db = Database::open(&path).await.unwrap();
        db.insert_record(&new_record("http://example.com/a.pdf", "a.pdf"))
            .await
            .unwrap();
        db.close().await;
    }

    let db = Database::open(&path).await.unwrap();
    let records = db.list_records(None, None).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].source_url, "http://example.com/a.pdf");
}

#[tokio::test]
async fn corrupt_database_self_heals_to_empty_store() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("corrupt.db");

    // Not a SQLite file at all
    std::fs::write(&path, b"this is definitely not a sqlite database").unwrap();

    let db = Database::open(&path).await.unwrap();
    let records = db.list_records(None, None).await.unwrap();
    assert!(records.is_empty(), "store should start empty after healing");

    // The healed store is immediately usable and durable
    db.insert_record(&new_record("http://example.com/a.pdf", "a.pdf"))
        .await
        .unwrap();
    assert_eq!(db.list_records(None, None).await.unwrap().len(), 1);
}

#[tokio::test]
async fn metadata_round_trips_as_json() {
    let (db, _dir) = test_db().await;

    let id = db
        .insert_record(&new_record("http://example.com/a.pdf", "a.pdf"))
        .await
        .unwrap();

    let record = db
        .update_record(
            id,
            &RecordUpdate {
                metadata: Some(serde_json::json!({"origin": "listing", "batch": 7})),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let metadata = record.metadata.unwrap();
    assert_eq!(metadata["origin"], "listing");
    assert_eq!(metadata["batch"], 7);
}
