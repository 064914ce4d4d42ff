use crate::services::storage_client::StorageError;
use thiserror::Error;

/// Message carried by [`IteratorError::Exhausted`]. Consumers compare
/// against this text, so it must not change.
pub const EXHAUSTED_MESSAGE: &str = "no more items in iterator";

/// Errors surfaced by a bucket iterator.
#[derive(Debug, Error)]
pub enum IteratorError {
    /// No objects remain, or `done()` was called.
    #[error("no more items in iterator")]
    Exhausted,

    /// The bucket is missing or cannot be read, so no iterator was built.
    #[error("bucket `{bucket}` is not accessible: {source}")]
    Unavailable {
        bucket: String,
        #[source]
        source: StorageError,
    },

    /// Fetching a listing page failed. The iterator is unchanged and the
    /// same page is requested on the next call.
    #[error("failed to list objects in bucket `{bucket}`: {source}")]
    Listing {
        bucket: String,
        #[source]
        source: StorageError,
    },

    /// Looking up the checksum of a listed object failed. The object stays
    /// at the head of the buffer.
    #[error("failed to read checksum of `{bucket}/{key}`: {source}")]
    Metadata {
        bucket: String,
        key: String,
        #[source]
        source: StorageError,
    },
}

impl IteratorError {
    /// True for the exhaustion sentinel.
    pub fn is_exhausted(&self) -> bool {
        matches!(self, IteratorError::Exhausted)
    }
}
