//! src/services/bucket_iterator.rs
//!
//! Lazy, paginated iteration over one bucket. `PagedBucketIterator` keeps a
//! single page of listed keys in memory and asks the storage client for the
//! next page only once that buffer runs dry.

use crate::{
    errors::IteratorError,
    models::{
        blob::Blob,
        listing::{ChecksumSource, ListObjectsParams, ListedObject},
    },
    services::storage_client::{MAX_PAGE_SIZE, StorageClient},
};
use async_trait::async_trait;
use futures::stream::{self, BoxStream};
use std::{collections::VecDeque, sync::Arc};
use tracing::{debug, warn};

/// A finite, non-restartable cursor over the blobs of one bucket.
#[async_trait]
pub trait BucketIterator: Send {
    /// Return the next blob, or [`IteratorError::Exhausted`] once nothing is
    /// left or [`done`](Self::done) has been called.
    async fn next(&mut self) -> Result<Blob, IteratorError>;

    /// Stop iterating. Buffered keys are dropped and every later `next()`
    /// reports exhaustion. Performs no I/O.
    fn done(&mut self);
}

/// Listing options applied to every page request.
#[derive(Clone, Debug)]
pub struct IteratorOptions {
    pub prefix: Option<String>,
    pub page_size: usize,
}

impl Default for IteratorOptions {
    fn default() -> Self {
        Self {
            prefix: None,
            page_size: MAX_PAGE_SIZE,
        }
    }
}

/// Position in the paginated listing.
#[derive(Clone, Debug, PartialEq, Eq)]
enum Cursor {
    Start,
    Continue(String),
    End,
}

/// [`BucketIterator`] backed by any [`StorageClient`].
pub struct PagedBucketIterator {
    client: Arc<dyn StorageClient>,
    bucket: String,
    options: IteratorOptions,
    buffer: VecDeque<ListedObject>,
    cursor: Cursor,
    terminal: bool,
}

impl PagedBucketIterator {
    /// Create an iterator over `bucket`. No request is made until the first
    /// call to `next()`.
    pub fn new(
        client: Arc<dyn StorageClient>,
        bucket: impl Into<String>,
        options: IteratorOptions,
    ) -> Self {
        Self {
            client,
            bucket: bucket.into(),
            options,
            buffer: VecDeque::new(),
            cursor: Cursor::Start,
            terminal: false,
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Whether the iterator has reached its absorbing end state.
    pub fn is_terminal(&self) -> bool {
        self.terminal
    }

    /// Fill the buffer from the storage client until it holds at least one
    /// key or the listing ends.
    ///
    /// Cursor and buffer are only updated after a page arrives, so a failed
    /// request leaves the iterator exactly as it was.
    async fn refill(&mut self) -> Result<(), IteratorError> {
        while self.buffer.is_empty() {
            let continuation_token = match &self.cursor {
                Cursor::Start => None,
                Cursor::Continue(token) => Some(token.clone()),
                Cursor::End => return Ok(()),
            };
            let params = ListObjectsParams {
                prefix: self.options.prefix.clone(),
                continuation_token,
                max_keys: self.options.page_size.clamp(1, MAX_PAGE_SIZE),
            };

            let page = self
                .client
                .list_objects(&self.bucket, &params)
                .await
                .map_err(|source| IteratorError::Listing {
                    bucket: self.bucket.clone(),
                    source,
                })?;

            debug!(
                "fetched {} keys from bucket {} (truncated: {})",
                page.objects.len(),
                self.bucket,
                page.is_truncated
            );

            self.cursor = match page.next_token() {
                Some(token) => Cursor::Continue(token.to_string()),
                None => {
                    if page.is_truncated {
                        warn!(
                            "bucket {} returned a truncated page without a continuation token; \
                             treating it as the last page",
                            self.bucket
                        );
                    }
                    Cursor::End
                }
            };
            self.buffer.extend(page.objects);
        }
        Ok(())
    }

    /// Resolve the checksum for a listed object, querying the storage
    /// client when the listing did not carry it.
    async fn resolve_checksum(
        &self,
        object: &ListedObject,
    ) -> Result<Option<String>, IteratorError> {
        match &object.checksum {
            ChecksumSource::Inline(checksum) => Ok(checksum.clone()),
            ChecksumSource::Deferred => {
                debug!("looking up checksum of {}/{}", self.bucket, object.key);
                self.client
                    .checksum(&self.bucket, &object.key)
                    .await
                    .map_err(|source| IteratorError::Metadata {
                        bucket: self.bucket.clone(),
                        key: object.key.clone(),
                        source,
                    })
            }
        }
    }
}

#[async_trait]
impl BucketIterator for PagedBucketIterator {
    async fn next(&mut self) -> Result<Blob, IteratorError> {
        if self.terminal {
            return Err(IteratorError::Exhausted);
        }

        self.refill().await?;

        let Some(object) = self.buffer.pop_front() else {
            self.terminal = true;
            return Err(IteratorError::Exhausted);
        };

        let resolved = self.resolve_checksum(&object).await;
        match resolved {
            Ok(checksum) => Ok(Blob::new(&self.bucket, &object.key, checksum)),
            Err(err) => {
                self.buffer.push_front(object);
                Err(err)
            }
        }
    }

    fn done(&mut self) {
        self.terminal = true;
        self.buffer.clear();
        self.cursor = Cursor::End;
    }
}

#[async_trait]
impl<I: BucketIterator + ?Sized> BucketIterator for Box<I> {
    async fn next(&mut self) -> Result<Blob, IteratorError> {
        (**self).next().await
    }

    fn done(&mut self) {
        (**self).done()
    }
}

/// Adapt a bucket iterator into a stream of blobs.
///
/// The stream ends at exhaustion. Storage failures are yielded as items and
/// leave the iterator in place, so polling again retries.
pub fn stream_blobs<I>(iterator: I) -> BoxStream<'static, Result<Blob, IteratorError>>
where
    I: BucketIterator + 'static,
{
    Box::pin(stream::unfold(iterator, |mut iterator| async move {
        match iterator.next().await {
            Ok(blob) => Some((Ok(blob), iterator)),
            Err(err) if err.is_exhausted() => None,
            Err(err) => Some((Err(err), iterator)),
        }
    }))
}
