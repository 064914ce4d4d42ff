//! S3-compatible storage client built on `aws-sdk-s3`.
//!
//! Works against AWS S3, MinIO and other S3-compatible endpoints. Listings use
//! ListObjectsV2; checksums live in user metadata and cost one HeadObject per
//! key, since ListObjectsV2 does not return user metadata.

use crate::{
    models::listing::{ListObjectsParams, ListObjectsResult, ListedObject, normalize_checksum},
    services::storage_client::{MAX_PAGE_SIZE, StorageClient, StorageError, StorageResult},
};
use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_s3::{Client, config::Credentials, operation::list_objects_v2::ListObjectsV2Output};
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, sync::Arc};
use tracing::debug;

/// User metadata entry holding an object's checksum.
pub const CHECKSUM_METADATA_KEY: &str = "checksum";

/// Connection settings for an S3-compatible endpoint.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct S3Config {
    /// Region to sign requests for (defaults to `us-east-1`).
    pub region: String,

    /// Custom endpoint (e.g. `http://127.0.0.1:9000` for MinIO).
    pub endpoint: Option<String>,

    /// Static access key. Used together with `secret_access_key`; when
    /// either is missing the default AWS credential chain applies.
    pub access_key_id: Option<String>,

    pub secret_access_key: Option<String>,

    pub session_token: Option<String>,

    /// Address buckets as `endpoint/bucket` instead of `bucket.endpoint`.
    pub force_path_style: bool,
}

impl Default for S3Config {
    fn default() -> Self {
        Self {
            region: "us-east-1".into(),
            endpoint: None,
            access_key_id: None,
            secret_access_key: None,
            session_token: None,
            force_path_style: false,
        }
    }
}

#[derive(Clone, Debug)]
pub struct S3StorageClient {
    client: Arc<Client>,
}

impl S3StorageClient {
    /// Build a client from explicit settings.
    pub async fn connect(config: &S3Config) -> Self {
        let region = Region::new(config.region.clone());
        let mut loader = aws_config::defaults(BehaviorVersion::latest()).region(region);

        if let (Some(access_key), Some(secret_key)) =
            (&config.access_key_id, &config.secret_access_key)
        {
            loader = loader.credentials_provider(Credentials::new(
                access_key,
                secret_key,
                config.session_token.clone(),
                None,
                "bucket-iterator-static",
            ));
        }

        if let Some(endpoint) = &config.endpoint {
            loader = loader.endpoint_url(endpoint);
        }

        let sdk_config = loader.load().await;
        let s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(config.force_path_style)
            .build();

        debug!(
            "configured S3 client for region {} (endpoint: {:?}, path style: {})",
            config.region, config.endpoint, config.force_path_style
        );

        Self::from_client(Client::from_conf(s3_config))
    }

    /// Wrap an already configured SDK client.
    pub fn from_client(client: Client) -> Self {
        Self {
            client: Arc::new(client),
        }
    }
}

#[async_trait]
impl StorageClient for S3StorageClient {
    async fn ensure_bucket(&self, bucket: &str) -> StorageResult<()> {
        match self.client.head_bucket().bucket(bucket).send().await {
            Ok(_) => Ok(()),
            Err(err)
                if err
                    .as_service_error()
                    .is_some_and(|service_err| service_err.is_not_found()) =>
            {
                Err(StorageError::BucketNotFound(bucket.to_string()))
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn list_objects(
        &self,
        bucket: &str,
        params: &ListObjectsParams,
    ) -> StorageResult<ListObjectsResult> {
        let max_keys = params.max_keys.clamp(1, MAX_PAGE_SIZE) as i32;
        let output = self
            .client
            .list_objects_v2()
            .bucket(bucket)
            .max_keys(max_keys)
            .set_prefix(params.prefix.clone())
            .set_continuation_token(params.continuation_token.clone())
            .send()
            .await?;

        Ok(page_from_output(&output))
    }

    async fn checksum(&self, bucket: &str, key: &str) -> StorageResult<Option<String>> {
        let output = self
            .client
            .head_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|err| {
                if err
                    .as_service_error()
                    .is_some_and(|service_err| service_err.is_not_found())
                {
                    StorageError::ObjectNotFound {
                        bucket: bucket.to_string(),
                        key: key.to_string(),
                    }
                } else {
                    StorageError::HeadObject(err)
                }
            })?;

        Ok(checksum_from_metadata(output.metadata()))
    }
}

/// Translate a ListObjectsV2 response into a listing page. Entries without a
/// key are dropped.
fn page_from_output(output: &ListObjectsV2Output) -> ListObjectsResult {
    let objects = output
        .contents()
        .iter()
        .filter_map(|object| object.key())
        .map(ListedObject::deferred)
        .collect();

    ListObjectsResult {
        objects,
        is_truncated: output.is_truncated().unwrap_or(false),
        next_continuation_token: output.next_continuation_token().map(str::to_string),
    }
}

/// Pick the checksum out of S3 user metadata. S3 lowercases metadata names,
/// but other S3-compatible stores may not.
fn checksum_from_metadata(metadata: Option<&HashMap<String, String>>) -> Option<String> {
    let value = metadata?
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(CHECKSUM_METADATA_KEY))
        .map(|(_, value)| value.as_str());
    normalize_checksum(value)
}
