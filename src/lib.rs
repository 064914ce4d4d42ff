//! Lazy, paginated iteration over the objects of a storage bucket.
//!
//! A [`Blobstore`] wraps a configured [`StorageClient`] (S3, the SQLite
//! object catalog, or a local directory tree) and hands out
//! [`PagedBucketIterator`]s that yield one [`Blob`] per `next()` call,
//! fetching listing pages only as the previous one is consumed.

pub mod errors;
pub mod models;
pub mod services;

pub use errors::{EXHAUSTED_MESSAGE, IteratorError};
pub use models::blob::Blob;
pub use services::{
    blobstore::Blobstore,
    bucket_iterator::{BucketIterator, IteratorOptions, PagedBucketIterator, stream_blobs},
    catalog_client::CatalogClient,
    directory_client::DirectoryClient,
    s3_client::{S3Config, S3StorageClient},
    storage_client::{StorageClient, StorageError},
};
