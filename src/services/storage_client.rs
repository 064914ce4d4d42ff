//! The storage-client seam the bucket iterator is written against.
//!
//! Each backend answers three questions: does the bucket exist, what is the
//! next page of keys, and what checksum does a key carry.

use crate::models::listing::{ListObjectsParams, ListObjectsResult};
use async_trait::async_trait;
use aws_sdk_s3::{
    error::SdkError,
    operation::{
        head_bucket::HeadBucketError, head_object::HeadObjectError,
        list_objects_v2::ListObjectsV2Error,
    },
};
#[cfg(test)]
use mockall::automock;
use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("bucket `{0}` not found")]
    BucketNotFound(String),
    #[error("bucket `{name}` invalid: {reason}")]
    InvalidBucketName { name: String, reason: String },
    #[error("object `{key}` not found in bucket `{bucket}`")]
    ObjectNotFound { bucket: String, key: String },
    #[error("invalid object key `{0}`")]
    InvalidObjectKey(String),
    #[error("failed to probe bucket: {0}")]
    HeadBucket(#[from] SdkError<HeadBucketError>),
    #[error("failed to list objects: {0}")]
    ListObjects(#[from] SdkError<ListObjectsV2Error>),
    #[error("failed to read object metadata: {0}")]
    HeadObject(#[from] SdkError<HeadObjectError>),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Largest page a backend will return, matching the S3 `max-keys` ceiling.
pub const MAX_PAGE_SIZE: usize = 1000;

/// Object storage operations needed to iterate a bucket.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait StorageClient: Send + Sync {
    /// Succeed if `bucket` exists and can be listed.
    async fn ensure_bucket(&self, bucket: &str) -> StorageResult<()>;

    /// Fetch one page of keys in ascending order.
    async fn list_objects(
        &self,
        bucket: &str,
        params: &ListObjectsParams,
    ) -> StorageResult<ListObjectsResult>;

    /// Look up the checksum recorded for `key`. `Ok(None)` when the object
    /// carries none.
    async fn checksum(&self, bucket: &str, key: &str) -> StorageResult<Option<String>>;
}
