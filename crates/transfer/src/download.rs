//! Parallel ranged download into a caller-provided buffer.

use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use tracing::debug;

use crate::segment::BufPart;
use crate::target::Target;
use crate::tracker::PartTracker;
use crate::{SegmentedBufferView, TransferConfig, TransferError};

/// Fills `dest` with the object bytes starting at `start`.
///
/// The buffer is split into one owned piece per part, each part task fills
/// its own piece, and the pieces are joined back once every part has
/// reported. A range that fits in one part is read directly without touching
/// the worker pool.
pub(crate) async fn download(
    target: Arc<Target>,
    start: u64,
    dest: BytesMut,
    config: &TransferConfig,
) -> Result<BytesMut, TransferError> {
    let len = dest.len() as u64;
    if start.checked_add(len).is_none() {
        return Err(TransferError::RangeOverflow { start, len });
    }
    let view = SegmentedBufferView::for_transfer(start, len, config);
    if view.is_empty() {
        return Ok(dest);
    }

    let mut pieces = view.split_mut(dest);
    if pieces.len() == 1 {
        if let Some((part, mut piece)) = pieces.pop() {
            let data = fetch_part(&target, part, 1).await?;
            piece.copy_from_slice(&data);
            return Ok(piece);
        }
    }

    debug!(
        bucket = %target.bucket,
        key = %target.key,
        start,
        size = view.total_size(),
        parts = pieces.len(),
        "parallel download"
    );

    let tracker = PartTracker::new(pieces.len());
    for (index, (part, mut piece)) in pieces.into_iter().enumerate() {
        let guard = tracker.guard(index);
        let part_number = index as u32 + 1;
        let task_target = Arc::clone(&target);
        target.pool.dispatch(async move {
            match fetch_part(&task_target, part, part_number).await {
                Ok(data) => {
                    piece.copy_from_slice(&data);
                    guard.complete(piece);
                }
                Err(e) => guard.fail(e),
            }
        });
    }

    tracker.wait().await;
    let mut pieces = tracker.take_results()?.into_iter();
    let mut whole = pieces.next().unwrap_or_default();
    for piece in pieces {
        whole.unsplit(piece);
    }
    Ok(whole)
}

async fn fetch_part(
    target: &Target,
    part: BufPart,
    part_number: u32,
) -> Result<Bytes, TransferError> {
    let data = target
        .store
        .get_object_range(&target.bucket, &target.key, part.range())
        .await
        .map_err(|source| TransferError::Part {
            part_number,
            source,
        })?;
    if data.len() as u64 != part.len() {
        return Err(TransferError::ShortRead {
            part_number,
            expected: part.len(),
            actual: data.len() as u64,
        });
    }
    Ok(data)
}
