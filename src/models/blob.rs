//! The value yielded by a bucket iterator.

use serde::{Deserialize, Serialize};

/// A single stored object as seen by consumers of a bucket iterator.
///
/// The path carries the bucket name as its first segment, so a blob listed
/// from bucket `droplets` at key `ab/cd/file` has path `droplets/ab/cd/file`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Blob {
    /// Bucket-scoped path, `<bucket>/<key>`.
    pub path: String,

    /// Checksum recorded for the object, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
}

impl Blob {
    /// Build a blob for `key` listed in `bucket`.
    pub fn new(bucket: &str, key: &str, checksum: Option<String>) -> Self {
        Self {
            path: format!("{}/{}", bucket, key),
            checksum,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_is_prefixed_with_bucket() {
        let blob = Blob::new("some-bucket", "some-path/some-file", None);
        assert_eq!(blob.path, "some-bucket/some-path/some-file");
        assert_eq!(blob.checksum, None);
    }

    #[test]
    fn json_omits_missing_checksum() {
        let blob = Blob::new("b", "k", None);
        assert_eq!(serde_json::to_string(&blob).unwrap(), r#"{"path":"b/k"}"#);

        let blob = Blob::new("b", "k", Some("abc".into()));
        assert_eq!(
            serde_json::to_string(&blob).unwrap(),
            r#"{"path":"b/k","checksum":"abc"}"#
        );
    }
}
