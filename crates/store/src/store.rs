//! The object store trait.

use std::future::Future;
use std::pin::Pin;

use bytes::Bytes;

use crate::error::StoreError;
use crate::types::{ByteRange, CompletedPart, ListPage, ObjectMeta};

/// Boxed future returned by every [`ObjectStore`] method.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + Send + 'a>>;

/// Bucket/key addressed blob storage.
///
/// Implementations own transport concerns (authentication, retries,
/// timeouts). A timeout surfaces as an ordinary error. Methods must be safe
/// to call concurrently from many tasks; the transfer core issues hundreds of
/// part requests against one handle at a time.
pub trait ObjectStore: Send + Sync {
    /// Returns the object's size, or [`StoreError::NotFound`].
    fn head_object<'a>(&'a self, bucket: &'a str, key: &'a str) -> StoreFuture<'a, ObjectMeta>;

    /// Reads `range` of an object.
    fn get_object_range<'a>(
        &'a self,
        bucket: &'a str,
        key: &'a str,
        range: ByteRange,
    ) -> StoreFuture<'a, Bytes>;

    /// Creates or overwrites an object in one request.
    fn put_object<'a>(&'a self, bucket: &'a str, key: &'a str, body: Bytes)
    -> StoreFuture<'a, ()>;

    /// Starts a multi-part upload and returns its upload id.
    fn create_multipart_upload<'a>(
        &'a self,
        bucket: &'a str,
        key: &'a str,
    ) -> StoreFuture<'a, String>;

    /// Uploads one part and returns its ETag.
    fn upload_part<'a>(
        &'a self,
        bucket: &'a str,
        key: &'a str,
        upload_id: &'a str,
        part_number: u32,
        body: Bytes,
    ) -> StoreFuture<'a, String>;

    /// Commits an upload. `parts` must be in ascending part-number order.
    fn complete_multipart_upload<'a>(
        &'a self,
        bucket: &'a str,
        key: &'a str,
        upload_id: &'a str,
        parts: Vec<CompletedPart>,
    ) -> StoreFuture<'a, ()>;

    /// Discards an upload and any parts staged for it.
    fn abort_multipart_upload<'a>(
        &'a self,
        bucket: &'a str,
        key: &'a str,
        upload_id: &'a str,
    ) -> StoreFuture<'a, ()>;

    /// Lists one page of keys starting with `prefix`.
    fn list_objects<'a>(
        &'a self,
        bucket: &'a str,
        prefix: &'a str,
        continuation: Option<&'a str>,
    ) -> StoreFuture<'a, ListPage>;

    /// Deletes up to [`MAX_DELETE_KEYS`](crate::MAX_DELETE_KEYS) keys.
    /// Missing keys are not an error.
    fn delete_objects<'a>(&'a self, bucket: &'a str, keys: Vec<String>) -> StoreFuture<'a, ()>;
}
