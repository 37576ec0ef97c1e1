use std::collections::BTreeSet;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use keel_store::ObjectStore;
use tracing::debug;

use crate::target::Target;
use crate::upload::UploadCreated;
use crate::{
    Pending, TransferConfig, TransferError, WorkerPool, delete, download, listing, upload,
};

/// Entry point for remote-object I/O.
///
/// Bundles a store handle, the worker pool its requests run on, and the
/// transfer configuration. Cheap to clone; clones share all three.
#[derive(Clone)]
pub struct RemoteStorage {
    store: Arc<dyn ObjectStore>,
    pool: WorkerPool,
    config: Arc<TransferConfig>,
}

impl RemoteStorage {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        pool: WorkerPool,
        config: TransferConfig,
    ) -> Result<Self, TransferError> {
        config.validate()?;
        Ok(Self {
            store,
            pool,
            config: Arc::new(config),
        })
    }

    pub fn config(&self) -> &TransferConfig {
        &self.config
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    fn target(&self, bucket: &str, key: &str) -> Arc<Target> {
        Target::new(Arc::clone(&self.store), self.pool.clone(), bucket, key)
    }

    /// Size of an object in bytes.
    pub async fn size(&self, bucket: &str, key: &str) -> Result<u64, TransferError> {
        match self.store.head_object(bucket, key).await {
            Ok(meta) => Ok(meta.size),
            Err(e) => {
                if e.is_not_found() {
                    debug!(bucket, key, "object not found");
                }
                Err(e.into())
            }
        }
    }

    /// Whether an object exists. Errors other than "not found" propagate.
    pub async fn exists(&self, bucket: &str, key: &str) -> Result<bool, TransferError> {
        match self.size(bucket, key).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Uploads `data` as `bucket/key`, overwriting any existing object, and
    /// returns once it is committed.
    pub async fn upload(&self, bucket: &str, key: &str, data: Bytes) -> Result<(), TransferError> {
        upload::put(self.target(bucket, key), data, &self.config).await
    }

    /// Starts a multi-part upload whose phases the caller drives. Dropping a
    /// phase before `finish` aborts the session in the background.
    ///
    /// # Panics
    ///
    /// Panics if `data` is empty.
    pub fn start_upload(&self, bucket: &str, key: &str, data: Bytes) -> UploadCreated {
        UploadCreated::start(self.target(bucket, key), data, &self.config)
    }

    /// [`upload`](Self::upload) on the worker pool.
    pub fn put_async(&self, bucket: &str, key: &str, data: Bytes) -> Pending<()> {
        let target = self.target(bucket, key);
        let config = Arc::clone(&self.config);
        self.pool
            .spawn(async move { upload::put(target, data, &config).await })
    }

    /// Reads `dest.len()` bytes starting at `start` into `dest`.
    pub async fn download_range(
        &self,
        bucket: &str,
        key: &str,
        start: u64,
        dest: BytesMut,
    ) -> Result<BytesMut, TransferError> {
        download::download(self.target(bucket, key), start, dest, &self.config).await
    }

    /// [`download_range`](Self::download_range) on the worker pool.
    pub fn get_async(
        &self,
        bucket: &str,
        key: &str,
        start: u64,
        dest: BytesMut,
    ) -> Pending<BytesMut> {
        let target = self.target(bucket, key);
        let config = Arc::clone(&self.config);
        self.pool
            .spawn(async move { download::download(target, start, dest, &config).await })
    }

    /// Reads a whole object.
    pub async fn download(&self, bucket: &str, key: &str) -> Result<Bytes, TransferError> {
        let size = self.size(bucket, key).await?;
        let dest = BytesMut::zeroed(size as usize);
        Ok(self.download_range(bucket, key, 0, dest).await?.freeze())
    }

    /// Names of all objects under the directory `dir`, relative to it.
    pub async fn list(&self, bucket: &str, dir: &str) -> Result<BTreeSet<String>, TransferError> {
        listing::list_all(self.store.as_ref(), bucket, dir).await
    }

    /// [`list`](Self::list) on the worker pool.
    pub fn list_async(&self, bucket: &str, dir: &str) -> Pending<BTreeSet<String>> {
        let store = Arc::clone(&self.store);
        let (bucket, dir) = (bucket.to_string(), dir.to_string());
        self.pool
            .spawn(async move { listing::list_all(store.as_ref(), &bucket, &dir).await })
    }

    /// Deletes `names` under the directory `dir` in bounded batches.
    pub async fn delete<I>(&self, bucket: &str, dir: &str, names: I) -> Result<(), TransferError>
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        delete::delete_batched(
            self.store.as_ref(),
            bucket,
            dir,
            names,
            self.config.max_delete_batch,
        )
        .await
    }
}

impl std::fmt::Debug for RemoteStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteStorage")
            .field("pool", &self.pool)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
