//! Entry point for callers: a configured storage client that hands out
//! bucket iterators.

use crate::{
    errors::IteratorError,
    services::{
        bucket_iterator::{IteratorOptions, PagedBucketIterator},
        storage_client::StorageClient,
    },
};
use std::sync::Arc;
use tracing::debug;

/// A named storage backend that can iterate its buckets.
#[derive(Clone)]
pub struct Blobstore {
    name: String,
    client: Arc<dyn StorageClient>,
    options: IteratorOptions,
}

impl Blobstore {
    pub fn new(name: impl Into<String>, client: impl StorageClient + 'static) -> Self {
        Self::from_shared(name, Arc::new(client))
    }

    pub fn from_shared(name: impl Into<String>, client: Arc<dyn StorageClient>) -> Self {
        Self {
            name: name.into(),
            client,
            options: IteratorOptions::default(),
        }
    }

    /// Only list keys starting with `prefix`.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.options.prefix = Some(prefix.into());
        self
    }

    /// Request at most `page_size` keys per listing call (1..=1000).
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.options.page_size = page_size;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Create an iterator over `bucket`.
    ///
    /// Fails with [`IteratorError::Unavailable`] if the bucket does not exist
    /// or cannot be read.
    pub async fn new_bucket_iterator(
        &self,
        bucket: &str,
    ) -> Result<PagedBucketIterator, IteratorError> {
        self.client
            .ensure_bucket(bucket)
            .await
            .map_err(|source| IteratorError::Unavailable {
                bucket: bucket.to_string(),
                source,
            })?;

        debug!("created {} iterator for bucket {}", self.name, bucket);
        Ok(PagedBucketIterator::new(
            self.client.clone(),
            bucket,
            self.options.clone(),
        ))
    }
}
