//! Error types reported by object stores.

use crate::types::ByteRange;

/// Errors produced by an [`ObjectStore`](crate::ObjectStore).
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("no such bucket: {0}")]
    NoSuchBucket(String),

    #[error("object not found: [{bucket}] {key}")]
    NotFound {
        bucket: String,
        key: String,
    },

    /// The bucket answered with a permanent redirect.
    #[error("bucket [{0}] is served from a different region")]
    WrongRegion(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("no such multi-part upload: {0}")]
    NoSuchUpload(String),

    #[error("invalid range {range} for object of {size} bytes")]
    InvalidRange {
        range: ByteRange,
        size: u64,
    },

    #[error("invalid part: {0}")]
    InvalidPart(String),

    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("too many keys in one delete request: {0}")]
    TooManyKeys(usize),

    #[error("service error: {0}")]
    Service(String),
}

impl StoreError {
    /// Returns `true` when the object (not the bucket) does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }

    pub(crate) fn not_found(bucket: &str, key: &str) -> Self {
        StoreError::NotFound {
            bucket: bucket.to_string(),
            key: key.to_string(),
        }
    }
}
