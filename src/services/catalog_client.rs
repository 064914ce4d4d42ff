//! src/services/catalog_client.rs
//!
//! CatalogClient: read side of the object-store metadata catalog kept in
//! SQLite (`buckets`, `objects`, `object_metadata`). Listing follows
//! ListObjectsV2 rules with keyset pagination, and the checksum recorded in
//! `object_metadata` rides along with each page.

use crate::{
    models::listing::{ListObjectsParams, ListObjectsResult, ListedObject, normalize_checksum},
    services::storage_client::{MAX_PAGE_SIZE, StorageClient, StorageError, StorageResult},
};
use async_trait::async_trait;
use sqlx::{FromRow, QueryBuilder, SqlitePool, sqlite::Sqlite};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

const BUCKET_NAME_MIN_LEN: usize = 3;
const BUCKET_NAME_MAX_LEN: usize = 63;

/// Embedded catalog schema, applied by [`run_migrations`].
const SCHEMA: &str = include_str!("../../migrations/0001_init.sql");

/// Metadata names (lowercased) that hold an object's checksum.
const CHECKSUM_KEYS_SQL: &str = "('checksum', 'x-amz-meta-checksum')";

/// One listed row: object key plus its recorded checksum, if any.
#[derive(Debug, FromRow)]
struct ListedRow {
    key: String,
    checksum: Option<String>,
}

#[derive(Clone)]
pub struct CatalogClient {
    /// Shared SQLite connection pool used for metadata queries.
    pub db: Arc<SqlitePool>,
}

impl CatalogClient {
    pub fn new(db: Arc<SqlitePool>) -> Self {
        Self { db }
    }

    /// Look up the catalog id of a bucket.
    ///
    /// Returns BucketNotFound if missing.
    /// Validates bucket name before querying.
    async fn bucket_id(&self, bucket: &str) -> StorageResult<Uuid> {
        ensure_bucket_name_safe(bucket)?;
        sqlx::query_scalar::<Sqlite, Uuid>("SELECT id FROM buckets WHERE name = ?")
            .bind(bucket)
            .fetch_optional(&*self.db)
            .await?
            .ok_or_else(|| StorageError::BucketNotFound(bucket.to_string()))
    }
}

#[async_trait]
impl StorageClient for CatalogClient {
    async fn ensure_bucket(&self, bucket: &str) -> StorageResult<()> {
        self.bucket_id(bucket).await.map(|_| ())
    }

    /// List one page of live objects in ascending key order.
    ///
    /// Fetches one row beyond `max_keys` to learn whether more pages exist;
    /// the continuation token is the last key returned.
    async fn list_objects(
        &self,
        bucket: &str,
        params: &ListObjectsParams,
    ) -> StorageResult<ListObjectsResult> {
        let bucket_id = self.bucket_id(bucket).await?;
        let max_keys = params.max_keys.clamp(1, MAX_PAGE_SIZE);
        let fetch_limit = max_keys + 1;

        let mut builder = QueryBuilder::<Sqlite>::new(format!(
            "SELECT o.key AS key, \
             (SELECT m.value FROM object_metadata m \
              WHERE m.object_id = o.id AND lower(m.key) IN {CHECKSUM_KEYS_SQL} \
              LIMIT 1) AS checksum \
             FROM objects o WHERE o.bucket_id = "
        ));
        builder.push_bind(bucket_id);
        builder.push(" AND o.is_deleted = 0");

        if let Some(prefix) = &params.prefix {
            builder.push(" AND substr(o.key, 1, length(");
            builder.push_bind(prefix.clone());
            builder.push(")) = ");
            builder.push_bind(prefix.clone());
        }

        if let Some(token) = &params.continuation_token {
            builder.push(" AND o.key > ");
            builder.push_bind(token.clone());
        }

        builder.push(" ORDER BY o.key ASC LIMIT ");
        builder.push_bind(fetch_limit as i64);

        let mut rows: Vec<ListedRow> = builder.build_query_as().fetch_all(&*self.db).await?;

        let is_truncated = rows.len() == fetch_limit;
        if is_truncated {
            rows.pop();
        }
        let next_continuation_token = if is_truncated {
            rows.last().map(|row| row.key.clone())
        } else {
            None
        };

        debug!(
            "catalog listed {} objects in bucket {} (truncated: {})",
            rows.len(),
            bucket,
            is_truncated
        );

        Ok(ListObjectsResult {
            objects: rows
                .into_iter()
                .map(|row| {
                    let checksum = normalize_checksum(row.checksum.as_deref());
                    ListedObject::inline(row.key, checksum)
                })
                .collect(),
            is_truncated,
            next_continuation_token,
        })
    }

    async fn checksum(&self, bucket: &str, key: &str) -> StorageResult<Option<String>> {
        let bucket_id = self.bucket_id(bucket).await?;
        let row: Option<ListedRow> = sqlx::query_as(&format!(
            "SELECT o.key AS key, \
             (SELECT m.value FROM object_metadata m \
              WHERE m.object_id = o.id AND lower(m.key) IN {CHECKSUM_KEYS_SQL} \
              LIMIT 1) AS checksum \
             FROM objects o \
             WHERE o.bucket_id = ? AND o.key = ? AND o.is_deleted = 0"
        ))
        .bind(bucket_id)
        .bind(key)
        .fetch_optional(&*self.db)
        .await?;

        match row {
            Some(row) => Ok(normalize_checksum(row.checksum.as_deref())),
            None => Err(StorageError::ObjectNotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            }),
        }
    }
}

/// Apply the embedded catalog schema, one statement at a time.
pub async fn run_migrations(db: &SqlitePool) -> StorageResult<()> {
    let statements = SCHEMA
        .split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>();

    debug!("Running {} migration statements...", statements.len());

    for stmt in statements {
        debug!("Executing migration SQL: {}", stmt);
        sqlx::query(stmt).execute(db).await?;
    }

    Ok(())
}

/// Validate bucket name format.
///
/// Enforces S3-like naming rules:
/// - 3–63 characters
/// - lowercase letters, digits, dots, hyphens only
/// - cannot start/end with dot or hyphen
/// - cannot contain consecutive dots or dot-hyphen patterns
/// - cannot look like an IPv4 address
pub fn ensure_bucket_name_safe(name: &str) -> StorageResult<()> {
    let invalid = |reason: &str| StorageError::InvalidBucketName {
        name: name.to_string(),
        reason: reason.to_string(),
    };

    if name.trim() != name {
        return Err(invalid("cannot begin or end with whitespace"));
    }

    let len = name.len();
    if !(BUCKET_NAME_MIN_LEN..=BUCKET_NAME_MAX_LEN).contains(&len) {
        return Err(invalid("must be between 3 and 63 characters"));
    }

    if !name
        .chars()
        .all(|c| matches!(c, 'a'..='z' | '0'..='9' | '.' | '-'))
    {
        return Err(invalid(
            "allowed characters are lowercase letters, digits, dots, and hyphens",
        ));
    }

    if name.starts_with(['.', '-']) || name.ends_with(['.', '-']) {
        return Err(invalid("must start and end with a lowercase letter or digit"));
    }

    if name.contains("..") || name.contains("-.") || name.contains(".-") {
        return Err(invalid("cannot contain consecutive dots or dot-hyphen combinations"));
    }

    if is_ipv4_like(name) {
        return Err(invalid("must not be formatted like an IP address"));
    }

    Ok(())
}

/// Check if a string matches IPv4-like dotted decimal form.
/// Rejects names formatted like `1.2.3.4`.
fn is_ipv4_like(name: &str) -> bool {
    let parts: Vec<&str> = name.split('.').collect();
    if parts.len() != 4 {
        return false;
    }
    parts.iter().all(|segment| {
        !segment.is_empty()
            && segment.len() <= 3
            && segment.chars().all(|c| c.is_ascii_digit())
            && segment.parse::<u8>().is_ok()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_s3_style_names() {
        for name in ["abc", "some-bucket-1", "my.bucket.name", "a1-b2.c3"] {
            assert!(ensure_bucket_name_safe(name).is_ok(), "{name} should be valid");
        }
    }

    #[test]
    fn rejects_invalid_names() {
        for name in [
            "ab",
            " abc",
            "Upper",
            "under_score",
            "-leading",
            "trailing.",
            "double..dot",
            "dot.-hyphen",
            "192.168.1.1",
        ] {
            assert!(
                matches!(
                    ensure_bucket_name_safe(name),
                    Err(StorageError::InvalidBucketName { .. })
                ),
                "{name} should be rejected"
            );
        }
        assert!(ensure_bucket_name_safe(&"a".repeat(64)).is_err());
    }

    #[test]
    fn ipv4_detection() {
        assert!(is_ipv4_like("10.0.0.1"));
        assert!(!is_ipv4_like("10.0.0"));
        assert!(!is_ipv4_like("999.0.0.1"));
        assert!(!is_ipv4_like("a.b.c.d"));
    }
}
