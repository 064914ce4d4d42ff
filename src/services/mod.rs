pub mod blobstore;
pub mod bucket_iterator;
pub mod catalog_client;
pub mod directory_client;
pub mod s3_client;
pub mod storage_client;
