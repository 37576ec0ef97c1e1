//! Remote object store interface.
//!
//! The transfer core never speaks a blob-store wire protocol itself. It talks
//! to an [`ObjectStore`] implementation: a bucket/key addressed service with
//! head, ranged get, put, multi-part upload, paginated list and batch delete.
//!
//! Two implementations ship with the crate:
//!
//! - [`MemoryStore`] keeps everything in process and records every call. It
//!   can inject faults and per-call latency, which makes it the fake used by
//!   the transfer tests.
//! - [`LocalStore`] maps buckets to directories under a root path.

mod error;
mod local;
mod memory;
mod store;
mod types;
mod validation;

pub use error::StoreError;
pub use local::LocalStore;
pub use memory::{CallLog, MemoryStore};
pub use store::{ObjectStore, StoreFuture};
pub use types::{ByteRange, CompletedPart, ListPage, ObjectMeta};
pub use validation::{validate_bucket_name, validate_object_key};

/// Hard limit on keys per delete request imposed by S3-compatible stores.
pub const MAX_DELETE_KEYS: usize = 1000;

/// Highest part number a multi-part upload may use.
pub const MAX_PART_NUMBER: u32 = 10_000;

/// Keys returned per listing page unless a store is configured otherwise.
pub const DEFAULT_LIST_PAGE_SIZE: usize = 1000;

/// Computes the ETag a store assigns to a part or single-shot object body.
pub fn etag_for(data: &[u8]) -> String {
    use md5::{Digest, Md5};

    let mut hasher = Md5::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn etag_is_hex_md5() {
        assert_eq!(etag_for(b""), "d41d8cd98f00b204e9800998ecf8427e");
        assert_eq!(etag_for(b"hello").len(), 32);
    }

    #[test]
    fn etag_differs_per_body() {
        assert_ne!(etag_for(b"part-1"), etag_for(b"part-2"));
    }
}
