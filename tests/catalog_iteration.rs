mod common;

use bucket_iterator::{
    Blobstore, BucketIterator, CatalogClient, EXHAUSTED_MESSAGE, IteratorError, StorageClient,
    StorageError,
};
use common::{catalog, drain_paths, insert_bucket, insert_object, soft_delete};
use rstest::rstest;
use std::sync::Arc;

const BUCKET: &str = "some-bucket";

fn store_with(db: sqlx::SqlitePool) -> Blobstore {
    Blobstore::new("catalog", CatalogClient::new(Arc::new(db)))
}

#[tokio::test]
async fn empty_bucket_reports_exhaustion() {
    let db = catalog().await;
    insert_bucket(&db, BUCKET).await;

    let mut iter = store_with(db).new_bucket_iterator(BUCKET).await.unwrap();
    for _ in 0..2 {
        let err = iter.next().await.unwrap_err();
        assert_eq!(err.to_string(), EXHAUSTED_MESSAGE);
    }
}

#[tokio::test]
async fn single_blob_then_exhaustion() {
    let db = catalog().await;
    let bucket_id = insert_bucket(&db, BUCKET).await;
    insert_object(
        &db,
        bucket_id,
        "some-path/some-file",
        Some(("Checksum", "some-checksum")),
    )
    .await;

    let mut iter = store_with(db).new_bucket_iterator(BUCKET).await.unwrap();
    let blob = iter.next().await.unwrap();
    assert_eq!(blob.path, "some-bucket/some-path/some-file");
    assert_eq!(blob.checksum.as_deref(), Some("some-checksum"));

    let err = iter.next().await.unwrap_err();
    assert_eq!(err.to_string(), "no more items in iterator");
}

#[rstest]
#[case(1)]
#[case(2)]
#[case(4)]
#[case(1000)]
#[tokio::test]
async fn every_live_object_is_listed_once_in_key_order(#[case] page_size: usize) {
    let db = catalog().await;
    let bucket_id = insert_bucket(&db, BUCKET).await;
    let other_id = insert_bucket(&db, "other-bucket").await;

    for key in ["c/3", "a/1", "b/2", "a/0", "d/4"] {
        insert_object(&db, bucket_id, key, None).await;
    }
    let deleted = insert_object(&db, bucket_id, "a/deleted", None).await;
    soft_delete(&db, deleted).await;
    insert_object(&db, other_id, "a/elsewhere", None).await;

    let store = store_with(db).with_page_size(page_size);
    let mut iter = store.new_bucket_iterator(BUCKET).await.unwrap();

    assert_eq!(
        drain_paths(&mut iter).await,
        vec![
            "some-bucket/a/0",
            "some-bucket/a/1",
            "some-bucket/b/2",
            "some-bucket/c/3",
            "some-bucket/d/4",
        ]
    );
    assert!(iter.next().await.unwrap_err().is_exhausted());
}

#[tokio::test]
async fn prefix_limits_the_listing() {
    let db = catalog().await;
    let bucket_id = insert_bucket(&db, BUCKET).await;
    for key in ["droplets/1", "droplets/2", "packages/1", "droplets_x"] {
        insert_object(&db, bucket_id, key, None).await;
    }

    let store = store_with(db).with_prefix("droplets/").with_page_size(1);
    let mut iter = store.new_bucket_iterator(BUCKET).await.unwrap();
    assert_eq!(
        drain_paths(&mut iter).await,
        vec!["some-bucket/droplets/1", "some-bucket/droplets/2"]
    );
}

#[tokio::test]
async fn done_stops_iteration_with_objects_left() {
    let db = catalog().await;
    let bucket_id = insert_bucket(&db, BUCKET).await;
    insert_object(&db, bucket_id, "some-path/some-file", None).await;
    insert_object(&db, bucket_id, "some-path/some-other-file", None).await;

    let store = store_with(db);

    let mut iter = store.new_bucket_iterator(BUCKET).await.unwrap();
    iter.done();
    let err = iter.next().await.unwrap_err();
    assert_eq!(err.to_string(), EXHAUSTED_MESSAGE);

    let mut iter = store.new_bucket_iterator(BUCKET).await.unwrap();
    iter.next().await.unwrap();
    iter.done();
    iter.done();
    assert!(iter.next().await.unwrap_err().is_exhausted());
    assert!(iter.next().await.unwrap_err().is_exhausted());
}

#[tokio::test]
async fn missing_or_invalid_bucket_fails_construction() {
    let db = catalog().await;
    let store = store_with(db);

    let err = store.new_bucket_iterator("no-such-bucket").await.err().unwrap();
    assert!(matches!(
        err,
        IteratorError::Unavailable {
            source: StorageError::BucketNotFound(_),
            ..
        }
    ));

    let err = store.new_bucket_iterator("Bad_Name").await.err().unwrap();
    assert!(matches!(
        err,
        IteratorError::Unavailable {
            source: StorageError::InvalidBucketName { .. },
            ..
        }
    ));
}

#[tokio::test]
async fn checksum_lookup_reads_object_metadata() {
    let db = catalog().await;
    let bucket_id = insert_bucket(&db, BUCKET).await;
    insert_object(&db, bucket_id, "with-amz", Some(("x-amz-meta-checksum", "abc"))).await;
    insert_object(&db, bucket_id, "blank", Some(("checksum", "   "))).await;
    insert_object(&db, bucket_id, "other-meta", Some(("author", "someone"))).await;

    let client = CatalogClient::new(Arc::new(db));
    assert_eq!(
        client.checksum(BUCKET, "with-amz").await.unwrap().as_deref(),
        Some("abc")
    );
    assert_eq!(client.checksum(BUCKET, "blank").await.unwrap(), None);
    assert_eq!(client.checksum(BUCKET, "other-meta").await.unwrap(), None);
    assert!(matches!(
        client.checksum(BUCKET, "missing").await,
        Err(StorageError::ObjectNotFound { .. })
    ));
}
