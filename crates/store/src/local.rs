//! Filesystem-backed object store.
//!
//! Layout under the root directory:
//!
//! ```text
//! <root>/<bucket>/<key>                       objects
//! <root>/.keel-staging/<upload_id>/<part>     staged multi-part data
//! <root>/.keel-staging/<uuid>.tmp             in-flight single puts
//! ```
//!
//! Objects become visible through a rename, so readers never observe a
//! partially written object.

use std::collections::{BTreeMap, HashMap};
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tracing::{debug, warn};

use crate::error::StoreError;
use crate::store::{ObjectStore, StoreFuture};
use crate::types::{ByteRange, CompletedPart, ListPage, ObjectMeta};
use crate::validation::{validate_bucket_name, validate_object_key};
use crate::{DEFAULT_LIST_PAGE_SIZE, MAX_DELETE_KEYS, MAX_PART_NUMBER, etag_for};

const STAGING_DIR: &str = ".keel-staging";

struct UploadRecord {
    bucket: String,
    key: String,
    /// part number -> ETag
    parts: BTreeMap<u32, String>,
}

/// Object store rooted at a local directory.
pub struct LocalStore {
    root: PathBuf,
    page_size: usize,
    uploads: Mutex<HashMap<String, UploadRecord>>,
}

impl LocalStore {
    /// Creates a store rooted at `root`. The directory must already exist.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            page_size: DEFAULT_LIST_PAGE_SIZE,
            uploads: Mutex::new(HashMap::new()),
        }
    }

    /// Sets how many keys a listing page holds.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Returns the root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Creates the directory backing `bucket`.
    pub async fn create_bucket(&self, bucket: &str) -> Result<(), StoreError> {
        validate_bucket_name(bucket)?;
        tokio::fs::create_dir_all(self.root.join(bucket)).await?;
        Ok(())
    }

    async fn bucket_dir(&self, bucket: &str) -> Result<PathBuf, StoreError> {
        validate_bucket_name(bucket)?;
        let dir = self.root.join(bucket);
        match tokio::fs::metadata(&dir).await {
            Ok(meta) if meta.is_dir() => Ok(dir),
            Ok(_) => Err(StoreError::NoSuchBucket(bucket.to_string())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StoreError::NoSuchBucket(bucket.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn object_path(&self, bucket: &str, key: &str) -> Result<PathBuf, StoreError> {
        validate_object_key(key)?;
        Ok(self.bucket_dir(bucket).await?.join(key))
    }

    fn staging_dir(&self) -> PathBuf {
        self.root.join(STAGING_DIR)
    }

    fn upload_dir(&self, upload_id: &str) -> PathBuf {
        self.staging_dir().join(upload_id)
    }

    /// Moves a fully written staging file into place.
    async fn publish(&self, staged: &Path, target: &Path) -> Result<(), StoreError> {
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::rename(staged, target).await?;
        Ok(())
    }

    /// Removes a staging file left behind by a failed write.
    async fn discard(&self, staged: &Path) {
        match tokio::fs::remove_file(staged).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(
                path = %staged.display(),
                error = %e,
                "local store: failed to remove staged file"
            ),
        }
    }

    fn map_not_found(err: std::io::Error, bucket: &str, key: &str) -> StoreError {
        if err.kind() == std::io::ErrorKind::NotFound {
            StoreError::not_found(bucket, key)
        } else {
            err.into()
        }
    }
}

/// Collects every file under `dir` as a `/`-separated key relative to `dir`.
fn walk_keys(dir: &Path) -> std::io::Result<Vec<String>> {
    let mut keys = Vec::new();
    let mut pending = vec![dir.to_path_buf()];
    while let Some(current) = pending.pop() {
        for entry in std::fs::read_dir(&current)? {
            let entry = entry?;
            let path = entry.path();
            if entry.file_type()?.is_dir() {
                pending.push(path);
            } else if let Ok(rel) = path.strip_prefix(dir) {
                let key = rel
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                keys.push(key);
            }
        }
    }
    keys.sort();
    Ok(keys)
}

impl ObjectStore for LocalStore {
    fn head_object<'a>(&'a self, bucket: &'a str, key: &'a str) -> StoreFuture<'a, ObjectMeta> {
        Box::pin(async move {
            let path = self.object_path(bucket, key).await?;
            let meta = tokio::fs::metadata(&path)
                .await
                .map_err(|e| Self::map_not_found(e, bucket, key))?;
            if !meta.is_file() {
                return Err(StoreError::not_found(bucket, key));
            }
            Ok(ObjectMeta {
                key: key.to_string(),
                size: meta.len(),
            })
        })
    }

    fn get_object_range<'a>(
        &'a self,
        bucket: &'a str,
        key: &'a str,
        range: ByteRange,
    ) -> StoreFuture<'a, Bytes> {
        Box::pin(async move {
            let path = self.object_path(bucket, key).await?;
            let mut file = tokio::fs::File::open(&path)
                .await
                .map_err(|e| Self::map_not_found(e, bucket, key))?;
            let size = file.metadata().await?.len();
            if range.start > range.end || range.end > size {
                return Err(StoreError::InvalidRange { range, size });
            }

            file.seek(SeekFrom::Start(range.start)).await?;
            let mut buf = vec![0u8; range.len() as usize];
            file.read_exact(&mut buf).await?;
            Ok(Bytes::from(buf))
        })
    }

    fn put_object<'a>(
        &'a self,
        bucket: &'a str,
        key: &'a str,
        body: Bytes,
    ) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let target = self.object_path(bucket, key).await?;
            let staging = self.staging_dir();
            tokio::fs::create_dir_all(&staging).await?;

            let staged = staging.join(format!("{}.tmp", uuid::Uuid::new_v4()));
            let written = async {
                let mut file = tokio::fs::File::create(&staged).await?;
                file.write_all(&body).await?;
                file.flush().await?;
                drop(file);
                self.publish(&staged, &target).await
            }
            .await;
            if let Err(e) = written {
                self.discard(&staged).await;
                return Err(e);
            }
            debug!(bucket, key, size = body.len(), "local store: object written");
            Ok(())
        })
    }

    fn create_multipart_upload<'a>(
        &'a self,
        bucket: &'a str,
        key: &'a str,
    ) -> StoreFuture<'a, String> {
        Box::pin(async move {
            self.object_path(bucket, key).await?;
            let upload_id = uuid::Uuid::new_v4().to_string();
            tokio::fs::create_dir_all(self.upload_dir(&upload_id)).await?;

            self.uploads.lock().unwrap().insert(
                upload_id.clone(),
                UploadRecord {
                    bucket: bucket.to_string(),
                    key: key.to_string(),
                    parts: BTreeMap::new(),
                },
            );
            Ok(upload_id)
        })
    }

    fn upload_part<'a>(
        &'a self,
        bucket: &'a str,
        key: &'a str,
        upload_id: &'a str,
        part_number: u32,
        body: Bytes,
    ) -> StoreFuture<'a, String> {
        Box::pin(async move {
            if part_number == 0 || part_number > MAX_PART_NUMBER {
                return Err(StoreError::InvalidPart(format!(
                    "part number {part_number} out of range"
                )));
            }
            let known = self
                .uploads
                .lock()
                .unwrap()
                .get(upload_id)
                .is_some_and(|u| u.bucket == bucket && u.key == key);
            if !known {
                return Err(StoreError::NoSuchUpload(upload_id.to_string()));
            }

            let path = self.upload_dir(upload_id).join(part_number.to_string());
            tokio::fs::write(&path, &body).await?;

            let etag = etag_for(&body);
            let mut uploads = self.uploads.lock().unwrap();
            let record = uploads
                .get_mut(upload_id)
                .ok_or_else(|| StoreError::NoSuchUpload(upload_id.to_string()))?;
            record.parts.insert(part_number, etag.clone());
            Ok(etag)
        })
    }

    fn complete_multipart_upload<'a>(
        &'a self,
        bucket: &'a str,
        key: &'a str,
        upload_id: &'a str,
        parts: Vec<CompletedPart>,
    ) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            if parts.is_empty() {
                return Err(StoreError::InvalidPart("no parts to complete".into()));
            }
            if parts.windows(2).any(|w| w[0].part_number >= w[1].part_number) {
                return Err(StoreError::InvalidPart(
                    "parts are not in ascending order".into(),
                ));
            }
            {
                let uploads = self.uploads.lock().unwrap();
                let record = uploads
                    .get(upload_id)
                    .filter(|u| u.bucket == bucket && u.key == key)
                    .ok_or_else(|| StoreError::NoSuchUpload(upload_id.to_string()))?;
                for part in &parts {
                    if record.parts.get(&part.part_number) != Some(&part.etag) {
                        return Err(StoreError::InvalidPart(format!(
                            "part {} missing or etag mismatch",
                            part.part_number
                        )));
                    }
                }
            }

            let target = self.object_path(bucket, key).await?;
            let upload_dir = self.upload_dir(upload_id);
            let assembled_path = upload_dir.join("assembled");
            let written = async {
                let mut assembled = tokio::fs::File::create(&assembled_path).await?;
                for part in &parts {
                    let data =
                        tokio::fs::read(upload_dir.join(part.part_number.to_string())).await?;
                    assembled.write_all(&data).await?;
                }
                assembled.flush().await?;
                drop(assembled);
                self.publish(&assembled_path, &target).await
            }
            .await;
            if let Err(e) = written {
                self.discard(&assembled_path).await;
                return Err(e);
            }
            tokio::fs::remove_dir_all(&upload_dir).await?;
            self.uploads.lock().unwrap().remove(upload_id);
            debug!(bucket, key, parts = parts.len(), "local store: upload committed");
            Ok(())
        })
    }

    fn abort_multipart_upload<'a>(
        &'a self,
        _bucket: &'a str,
        _key: &'a str,
        upload_id: &'a str,
    ) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let removed = self.uploads.lock().unwrap().remove(upload_id);
            if removed.is_none() {
                return Err(StoreError::NoSuchUpload(upload_id.to_string()));
            }
            match tokio::fs::remove_dir_all(self.upload_dir(upload_id)).await {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                Err(e) => Err(e.into()),
            }
        })
    }

    fn list_objects<'a>(
        &'a self,
        bucket: &'a str,
        prefix: &'a str,
        continuation: Option<&'a str>,
    ) -> StoreFuture<'a, ListPage> {
        Box::pin(async move {
            let dir = self.bucket_dir(bucket).await?;
            let all = tokio::task::spawn_blocking(move || walk_keys(&dir))
                .await
                .map_err(|e| StoreError::Service(format!("listing task failed: {e}")))??;

            let mut matching = all
                .into_iter()
                .filter(|k| k.starts_with(prefix))
                .filter(|k| continuation.is_none_or(|token| k.as_str() > token));

            let keys: Vec<String> = matching.by_ref().take(self.page_size).collect();
            let next_token = match (matching.next(), keys.last()) {
                (Some(_), Some(last)) => Some(last.clone()),
                _ => None,
            };
            Ok(ListPage { keys, next_token })
        })
    }

    fn delete_objects<'a>(&'a self, bucket: &'a str, keys: Vec<String>) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            if keys.len() > MAX_DELETE_KEYS {
                return Err(StoreError::TooManyKeys(keys.len()));
            }
            for key in &keys {
                let path = self.object_path(bucket, key).await?;
                match tokio::fs::remove_file(&path).await {
                    Ok(()) => {}
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => return Err(e.into()),
                }
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn store() -> (TempDir, LocalStore) {
        let dir = TempDir::new().unwrap();
        let store = LocalStore::new(dir.path());
        store.create_bucket("graphs").await.unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn put_then_read_range() {
        let (_dir, store) = store().await;
        store
            .put_object("graphs", "g/nodes", Bytes::from_static(b"abcdefgh"))
            .await
            .unwrap();

        assert_eq!(store.head_object("graphs", "g/nodes").await.unwrap().size, 8);
        let data = store
            .get_object_range("graphs", "g/nodes", ByteRange::new(3, 7))
            .await
            .unwrap();
        assert_eq!(&data[..], b"defg");
    }

    #[tokio::test]
    async fn missing_bucket_and_object() {
        let (_dir, store) = store().await;
        assert!(matches!(
            store.head_object("nope", "k").await.unwrap_err(),
            StoreError::NoSuchBucket(_)
        ));
        assert!(store.head_object("graphs", "k").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn traversal_key_rejected() {
        let (_dir, store) = store().await;
        let err = store
            .put_object("graphs", "../escape", Bytes::from_static(b"x"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidKey(_)));
    }

    #[tokio::test]
    async fn multipart_commit_and_abort() {
        let (dir, store) = store().await;
        let id = store.create_multipart_upload("graphs", "big").await.unwrap();
        let e2 = store
            .upload_part("graphs", "big", &id, 2, Bytes::from_static(b"-tail"))
            .await
            .unwrap();
        let e1 = store
            .upload_part("graphs", "big", &id, 1, Bytes::from_static(b"head"))
            .await
            .unwrap();
        store
            .complete_multipart_upload(
                "graphs",
                "big",
                &id,
                vec![
                    CompletedPart {
                        part_number: 1,
                        etag: e1,
                    },
                    CompletedPart {
                        part_number: 2,
                        etag: e2,
                    },
                ],
            )
            .await
            .unwrap();
        let content = std::fs::read(dir.path().join("graphs").join("big")).unwrap();
        assert_eq!(&content, b"head-tail");

        let id = store.create_multipart_upload("graphs", "other").await.unwrap();
        store.abort_multipart_upload("graphs", "other", &id).await.unwrap();
        assert!(!dir.path().join(STAGING_DIR).join(&id).exists());
    }

    #[tokio::test]
    async fn listing_is_sorted_and_paginated() {
        let dir = TempDir::new().unwrap();
        let store = LocalStore::new(dir.path()).with_page_size(2);
        store.create_bucket("graphs").await.unwrap();
        for key in ["g/c", "g/a", "g/sub/b", "h/z"] {
            store
                .put_object("graphs", key, Bytes::from_static(b"1"))
                .await
                .unwrap();
        }

        let first = store.list_objects("graphs", "g/", None).await.unwrap();
        assert_eq!(first.keys, vec!["g/a", "g/c"]);
        let token = first.next_token.unwrap();
        let second = store
            .list_objects("graphs", "g/", Some(&token))
            .await
            .unwrap();
        assert_eq!(second.keys, vec!["g/sub/b"]);
        assert!(second.next_token.is_none());
    }

    #[tokio::test]
    async fn delete_ignores_missing() {
        let (_dir, store) = store().await;
        store
            .put_object("graphs", "a", Bytes::from_static(b"1"))
            .await
            .unwrap();
        store
            .delete_objects("graphs", vec!["a".into(), "b".into()])
            .await
            .unwrap();
        assert!(store.head_object("graphs", "a").await.unwrap_err().is_not_found());
    }

    /// Files directly under the staging directory, ignoring upload dirs.
    fn staged_files(root: &Path) -> Vec<PathBuf> {
        match std::fs::read_dir(root.join(STAGING_DIR)) {
            Ok(entries) => entries
                .map(|entry| entry.unwrap().path())
                .filter(|path| path.is_file())
                .collect(),
            Err(_) => Vec::new(),
        }
    }

    #[tokio::test]
    async fn failed_put_leaves_no_staged_file() {
        let (dir, store) = store().await;
        store
            .put_object("graphs", "g/nodes", Bytes::from_static(b"abc"))
            .await
            .unwrap();

        // "g" is a non-empty directory, so the final rename fails.
        assert!(
            store
                .put_object("graphs", "g", Bytes::from_static(b"clash"))
                .await
                .is_err()
        );
        assert!(staged_files(dir.path()).is_empty());
        assert_eq!(store.head_object("graphs", "g/nodes").await.unwrap().size, 3);
    }

    #[tokio::test]
    async fn failed_commit_removes_assembled_file() {
        let (dir, store) = store().await;
        let id = store.create_multipart_upload("graphs", "g").await.unwrap();
        let etag = store
            .upload_part("graphs", "g", &id, 1, Bytes::from_static(b"part"))
            .await
            .unwrap();
        store
            .put_object("graphs", "g/nodes", Bytes::from_static(b"abc"))
            .await
            .unwrap();

        let result = store
            .complete_multipart_upload(
                "graphs",
                "g",
                &id,
                vec![CompletedPart {
                    part_number: 1,
                    etag,
                }],
            )
            .await;
        assert!(result.is_err());

        let upload_dir = dir.path().join(STAGING_DIR).join(&id);
        assert!(!upload_dir.join("assembled").exists());
        assert!(upload_dir.join("1").exists());
        store.abort_multipart_upload("graphs", "g", &id).await.unwrap();
        assert!(!upload_dir.exists());
    }
}
