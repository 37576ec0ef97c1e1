use std::sync::Arc;

use keel_store::ObjectStore;
use tracing::{debug, warn};

use crate::WorkerPool;

/// The object a transfer works on, together with the store and pool that
/// carry its requests. Shared by every part task of the transfer.
pub(crate) struct Target {
    pub store: Arc<dyn ObjectStore>,
    pub pool: WorkerPool,
    pub bucket: String,
    pub key: String,
}

impl Target {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        pool: WorkerPool,
        bucket: &str,
        key: &str,
    ) -> Arc<Self> {
        Arc::new(Self {
            store,
            pool,
            bucket: bucket.to_string(),
            key: key.to_string(),
        })
    }

    /// Best-effort abort of an upload session. Failures are only logged so
    /// they never mask the error that triggered the abort.
    pub async fn abort_upload(&self, upload_id: &str) {
        match self
            .store
            .abort_multipart_upload(&self.bucket, &self.key, upload_id)
            .await
        {
            Ok(()) => debug!(bucket = %self.bucket, key = %self.key, upload_id, "aborted upload"),
            Err(e) => warn!(
                bucket = %self.bucket,
                key = %self.key,
                upload_id,
                error = %e,
                "failed to abort upload"
            ),
        }
    }
}
