//! Multi-part upload state machine.
//!
//! Each phase is its own type and each transition consumes the previous
//! phase, so an upload session is driven forward (or abandoned) exactly once:
//!
//! ```text
//! UploadCreated --dispatch--> PartsDispatched --wait_parts--> PartsComplete
//!     --finalize--> Finalizing --finish--> ()
//! ```
//!
//! The phases can be interleaved across many uploads, e.g. dispatch the parts
//! of several objects before waiting on any of them. A failure after the
//! session exists issues a best-effort abort before the error is returned.
//! Dropping a phase before it hands the session on does the same in the
//! background, once the session id and any in-flight parts have settled.

use std::mem;
use std::sync::Arc;

use bytes::Bytes;
use keel_store::CompletedPart;
use tracing::{debug, warn};

use crate::target::Target;
use crate::tracker::PartTracker;
use crate::{Pending, SegmentedBufferView, TransferConfig, TransferError};

/// Session creation has been requested; the upload id is on its way.
pub struct UploadCreated {
    target: Arc<Target>,
    data: Bytes,
    view: SegmentedBufferView,
    create: Pending<String>,
    armed: bool,
}

/// Every part has been handed to the worker pool.
pub struct PartsDispatched {
    target: Arc<Target>,
    upload_id: Arc<str>,
    tracker: Arc<PartTracker<String>>,
    parts: usize,
    armed: bool,
}

/// Every part reported success; the ETags are in part order.
pub struct PartsComplete {
    target: Arc<Target>,
    upload_id: Arc<str>,
    etags: Vec<String>,
    armed: bool,
}

/// The commit request is in flight.
pub struct Finalizing {
    target: Arc<Target>,
    upload_id: Arc<str>,
    commit: Pending<()>,
    armed: bool,
}

impl UploadCreated {
    /// # Panics
    ///
    /// Panics if `data` is empty; empty objects go out as a single put.
    pub(crate) fn start(target: Arc<Target>, data: Bytes, config: &TransferConfig) -> Self {
        assert!(!data.is_empty(), "multi-part upload of an empty buffer");
        let view = SegmentedBufferView::for_transfer(0, data.len() as u64, config);

        let create = {
            let t = Arc::clone(&target);
            target.pool.spawn(async move {
                let id = t.store.create_multipart_upload(&t.bucket, &t.key).await?;
                Ok(id)
            })
        };
        debug!(
            bucket = %target.bucket,
            key = %target.key,
            size = data.len(),
            parts = view.num_segments(),
            part_size = view.segment_size(),
            "multi-part upload requested"
        );

        Self {
            target,
            data,
            view,
            create,
            armed: true,
        }
    }

    /// Number of parts the upload will use.
    pub fn parts(&self) -> usize {
        self.view.num_segments()
    }

    /// Waits for the session id and dispatches one task per part.
    pub async fn dispatch(mut self) -> Result<PartsDispatched, TransferError> {
        let created = (&mut self.create).await;
        self.armed = false;
        let target = Arc::clone(&self.target);

        let upload_id: Arc<str> = match created {
            Ok(id) => id.into(),
            Err(e) => {
                warn!(
                    bucket = %target.bucket,
                    key = %target.key,
                    error = %e,
                    "failed to create upload"
                );
                return Err(e);
            }
        };

        let pieces = self.view.split_bytes(&self.data);
        let parts = pieces.len();
        let tracker = PartTracker::new(parts);
        for (index, (_, body)) in pieces.into_iter().enumerate() {
            let guard = tracker.guard(index);
            let part_number = index as u32 + 1;
            let task_target = Arc::clone(&target);
            let upload_id = Arc::clone(&upload_id);
            target.pool.dispatch(async move {
                let t = &task_target;
                match t
                    .store
                    .upload_part(&t.bucket, &t.key, &upload_id, part_number, body)
                    .await
                {
                    Ok(etag) => guard.complete(etag),
                    Err(source) => guard.fail(TransferError::Part {
                        part_number,
                        source,
                    }),
                }
            });
        }
        debug!(bucket = %target.bucket, key = %target.key, %upload_id, parts, "parts dispatched");

        Ok(PartsDispatched {
            target,
            upload_id,
            tracker,
            parts,
            armed: true,
        })
    }
}

impl Drop for UploadCreated {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let create = mem::replace(
            &mut self.create,
            Pending::ready(Err(TransferError::Task("upload abandoned".into()))),
        );
        let target = Arc::clone(&self.target);
        self.target.pool.dispatch(async move {
            if let Ok(upload_id) = create.await {
                debug!(
                    bucket = %target.bucket,
                    key = %target.key,
                    %upload_id,
                    "upload abandoned before dispatch"
                );
                target.abort_upload(&upload_id).await;
            }
        });
    }
}

impl PartsDispatched {
    pub fn upload_id(&self) -> &str {
        &self.upload_id
    }

    pub fn parts(&self) -> usize {
        self.parts
    }

    /// Waits until every part has reported, successfully or not.
    pub async fn wait_parts(mut self) -> Result<PartsComplete, TransferError> {
        self.tracker.wait().await;
        self.armed = false;
        match self.tracker.take_results() {
            Ok(etags) => Ok(PartsComplete {
                target: Arc::clone(&self.target),
                upload_id: Arc::clone(&self.upload_id),
                etags,
                armed: true,
            }),
            Err(e) => {
                warn!(
                    bucket = %self.target.bucket,
                    key = %self.target.key,
                    upload_id = %self.upload_id,
                    error = %e,
                    "part upload failed"
                );
                self.target.abort_upload(&self.upload_id).await;
                Err(e)
            }
        }
    }
}

impl Drop for PartsDispatched {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let target = Arc::clone(&self.target);
        let upload_id = Arc::clone(&self.upload_id);
        let tracker = Arc::clone(&self.tracker);
        self.target.pool.dispatch(async move {
            tracker.wait().await;
            debug!(
                bucket = %target.bucket,
                key = %target.key,
                %upload_id,
                "upload abandoned with parts in flight"
            );
            target.abort_upload(&upload_id).await;
        });
    }
}

impl PartsComplete {
    /// ETags in part order.
    pub fn etags(&self) -> &[String] {
        &self.etags
    }

    /// Requests the commit of all parts, in ascending part-number order.
    pub fn finalize(mut self) -> Finalizing {
        self.armed = false;
        let parts: Vec<CompletedPart> = mem::take(&mut self.etags)
            .into_iter()
            .enumerate()
            .map(|(index, etag)| CompletedPart {
                part_number: index as u32 + 1,
                etag,
            })
            .collect();

        let commit = {
            let t = Arc::clone(&self.target);
            let upload_id = Arc::clone(&self.upload_id);
            self.target.pool.spawn(async move {
                t.store
                    .complete_multipart_upload(&t.bucket, &t.key, &upload_id, parts)
                    .await?;
                Ok(())
            })
        };

        Finalizing {
            target: Arc::clone(&self.target),
            upload_id: Arc::clone(&self.upload_id),
            commit,
            armed: true,
        }
    }
}

impl Drop for PartsComplete {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let target = Arc::clone(&self.target);
        let upload_id = Arc::clone(&self.upload_id);
        self.target.pool.dispatch(async move {
            debug!(
                bucket = %target.bucket,
                key = %target.key,
                %upload_id,
                "upload abandoned before commit"
            );
            target.abort_upload(&upload_id).await;
        });
    }
}

impl Finalizing {
    /// Waits for the commit. The object is visible once this returns `Ok`.
    pub async fn finish(mut self) -> Result<(), TransferError> {
        let committed = (&mut self.commit).await;
        self.armed = false;
        match committed {
            Ok(()) => {
                debug!(bucket = %self.target.bucket, key = %self.target.key, "upload committed");
                Ok(())
            }
            Err(e) => {
                warn!(
                    bucket = %self.target.bucket,
                    key = %self.target.key,
                    upload_id = %self.upload_id,
                    error = %e,
                    "failed to commit upload"
                );
                self.target.abort_upload(&self.upload_id).await;
                Err(e)
            }
        }
    }
}

impl Drop for Finalizing {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let commit = mem::replace(&mut self.commit, Pending::ready(Ok(())));
        let target = Arc::clone(&self.target);
        let upload_id = Arc::clone(&self.upload_id);
        self.target.pool.dispatch(async move {
            if commit.await.is_err() {
                target.abort_upload(&upload_id).await;
            }
        });
    }
}

/// Drives an upload through every phase.
pub(crate) async fn run(created: UploadCreated) -> Result<(), TransferError> {
    created
        .dispatch()
        .await?
        .wait_parts()
        .await?
        .finalize()
        .finish()
        .await
}

/// Uploads `data` under the target key: one put below the threshold (or for
/// an empty body), a multi-part upload otherwise.
pub(crate) async fn put(
    target: Arc<Target>,
    data: Bytes,
    config: &TransferConfig,
) -> Result<(), TransferError> {
    if (data.len() as u64) < config.single_put_threshold {
        debug!(bucket = %target.bucket, key = %target.key, size = data.len(), "single put");
        target
            .store
            .put_object(&target.bucket, &target.key, data)
            .await?;
        return Ok(());
    }
    run(UploadCreated::start(target, data, config)).await
}
