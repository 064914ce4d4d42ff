#![allow(dead_code)]

use bucket_iterator::{BucketIterator, IteratorError, services::catalog_client::run_migrations};
use chrono::Utc;
use sqlx::{SqlitePool, sqlite::SqlitePoolOptions};
use uuid::Uuid;

/// Fresh in-memory catalog with the schema applied.
///
/// A single connection that never expires keeps the in-memory database
/// alive for the whole test.
pub async fn catalog() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .expect("open in-memory catalog");
    run_migrations(&pool).await.expect("apply schema");
    pool
}

pub async fn insert_bucket(db: &SqlitePool, name: &str) -> Uuid {
    let id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO buckets (id, name, owner_id, region, created_at, versioning_enabled)
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(id)
    .bind(name)
    .bind(Uuid::new_v4())
    .bind("us-east-1")
    .bind(Utc::now())
    .bind(false)
    .execute(db)
    .await
    .expect("insert bucket");
    id
}

/// Insert a live object, optionally with a metadata entry named `meta_key`.
pub async fn insert_object(
    db: &SqlitePool,
    bucket_id: Uuid,
    key: &str,
    checksum: Option<(&str, &str)>,
) -> Uuid {
    let id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO objects (
            id, bucket_id, key, filename, content_type, size_bytes,
            etag, storage_class, last_modified, version_id, is_deleted
        ) VALUES (?, ?, ?, ?, NULL, 7, NULL, 'STANDARD', ?, NULL, 0)",
    )
    .bind(id)
    .bind(bucket_id)
    .bind(key)
    .bind(key.rsplit('/').next().unwrap_or(key))
    .bind(Utc::now())
    .execute(db)
    .await
    .expect("insert object");

    if let Some((meta_key, value)) = checksum {
        sqlx::query("INSERT INTO object_metadata (id, object_id, key, value) VALUES (?, ?, ?, ?)")
            .bind(Uuid::new_v4())
            .bind(id)
            .bind(meta_key)
            .bind(value)
            .execute(db)
            .await
            .expect("insert metadata");
    }
    id
}

pub async fn soft_delete(db: &SqlitePool, object_id: Uuid) {
    sqlx::query("UPDATE objects SET is_deleted = 1 WHERE id = ?")
        .bind(object_id)
        .execute(db)
        .await
        .expect("soft delete");
}

/// Drain an iterator, returning every blob path until exhaustion.
pub async fn drain_paths<I: BucketIterator>(iter: &mut I) -> Vec<String> {
    let mut paths = Vec::new();
    loop {
        match iter.next().await {
            Ok(blob) => paths.push(blob.path),
            Err(IteratorError::Exhausted) => return paths,
            Err(err) => panic!("unexpected iterator error: {err}"),
        }
    }
}
