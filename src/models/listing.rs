//! One page of an object listing, as returned by a storage backend.

/// Parameters for a single ListObjectsV2-style page request.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ListObjectsParams {
    pub prefix: Option<String>,
    pub continuation_token: Option<String>,
    pub max_keys: usize,
}

/// Where the checksum of a listed object comes from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChecksumSource {
    /// The backend returned the checksum with the listing (possibly absent).
    Inline(Option<String>),
    /// The checksum must be looked up per key.
    Deferred,
}

/// An object key from a listing page.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ListedObject {
    pub key: String,
    pub checksum: ChecksumSource,
}

impl ListedObject {
    pub fn inline(key: impl Into<String>, checksum: Option<String>) -> Self {
        Self {
            key: key.into(),
            checksum: ChecksumSource::Inline(checksum),
        }
    }

    pub fn deferred(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            checksum: ChecksumSource::Deferred,
        }
    }
}

/// A page of listed objects in ascending key order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ListObjectsResult {
    pub objects: Vec<ListedObject>,
    pub is_truncated: bool,
    pub next_continuation_token: Option<String>,
}

impl ListObjectsResult {
    /// The token for the following page, or `None` when this page is the
    /// last one.
    pub fn next_token(&self) -> Option<&str> {
        if self.is_truncated {
            self.next_continuation_token.as_deref()
        } else {
            None
        }
    }
}

/// Normalize a raw checksum value: trimmed, and `None` when blank.
pub fn normalize_checksum(raw: Option<&str>) -> Option<String> {
    raw.map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}
