//! Per-part bookkeeping for one multi-part transfer.

use std::sync::{Arc, Mutex};

use tracing::warn;

use crate::{CountingSemaphore, TransferError};

/// Result slots for every part of a transfer plus the barrier their tasks
/// report to.
///
/// Each part task gets a [`PartGuard`]. The guard reports exactly once: on
/// [`complete`](PartGuard::complete), on [`fail`](PartGuard::fail), or as an
/// abandoned part when it is dropped unresolved. The coordinator waits with
/// [`wait`](Self::wait) and then collects with [`take_results`](Self::take_results).
pub(crate) struct PartTracker<T> {
    sema: CountingSemaphore,
    slots: Mutex<Vec<Option<T>>>,
    failure: Mutex<Option<TransferError>>,
}

impl<T: Send> PartTracker<T> {
    pub fn new(parts: usize) -> Arc<Self> {
        let sema = CountingSemaphore::new();
        sema.set_goal(parts as u64);
        let mut slots = Vec::with_capacity(parts);
        slots.resize_with(parts, || None);
        Arc::new(Self {
            sema,
            slots: Mutex::new(slots),
            failure: Mutex::new(None),
        })
    }

    /// Hands out the completion guard for part `index` (0-based).
    pub fn guard(self: &Arc<Self>, index: usize) -> PartGuard<T> {
        PartGuard {
            tracker: Arc::clone(self),
            index,
            resolved: false,
        }
    }

    pub async fn wait(&self) {
        self.sema.wait_goal().await;
    }

    /// Collects part results in part order, or the first recorded failure.
    /// Call after [`wait`](Self::wait).
    pub fn take_results(&self) -> Result<Vec<T>, TransferError> {
        if let Some(e) = self.failure.lock().unwrap().take() {
            return Err(e);
        }
        let slots = std::mem::take(&mut *self.slots.lock().unwrap());
        slots
            .into_iter()
            .enumerate()
            .map(|(index, slot)| slot.ok_or(TransferError::PartAbandoned(index as u32 + 1)))
            .collect()
    }

    fn record_failure(&self, index: usize, err: TransferError) {
        let mut failure = self.failure.lock().unwrap();
        if failure.is_none() {
            *failure = Some(err);
        } else {
            warn!(part = index + 1, error = %err, "additional part failure");
        }
    }
}

/// Completion handle for one part.
pub(crate) struct PartGuard<T: Send> {
    tracker: Arc<PartTracker<T>>,
    index: usize,
    resolved: bool,
}

impl<T: Send> PartGuard<T> {
    pub fn complete(mut self, value: T) {
        self.tracker.slots.lock().unwrap()[self.index] = Some(value);
        self.resolve();
    }

    pub fn fail(mut self, err: TransferError) {
        self.tracker.record_failure(self.index, err);
        self.resolve();
    }

    fn resolve(&mut self) {
        self.resolved = true;
        self.tracker.sema.goal_minus_one();
    }
}

impl<T: Send> Drop for PartGuard<T> {
    fn drop(&mut self) {
        if !self.resolved {
            let part_number = self.index as u32 + 1;
            self.tracker
                .record_failure(self.index, TransferError::PartAbandoned(part_number));
            self.resolve();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn results_come_back_in_part_order() {
        let tracker = PartTracker::new(8);
        for index in (0..8).rev() {
            let guard = tracker.guard(index);
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(8 - index as u64)).await;
                guard.complete(format!("etag-{index}"));
            });
        }
        tracker.wait().await;
        let tags = tracker.take_results().unwrap();
        assert_eq!(tags, (0..8).map(|i| format!("etag-{i}")).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn first_failure_is_kept() {
        let tracker = PartTracker::<u8>::new(3);
        tracker.guard(0).complete(1);
        tracker.guard(1).fail(TransferError::Protocol("first".into()));
        tracker.guard(2).fail(TransferError::Protocol("second".into()));
        tracker.wait().await;
        let err = tracker.take_results().unwrap_err();
        assert!(matches!(err, TransferError::Protocol(ref m) if m == "first"));
    }

    #[tokio::test]
    async fn dropped_guard_counts_as_failure() {
        let tracker = PartTracker::<u8>::new(2);
        tracker.guard(0).complete(1);
        drop(tracker.guard(1));
        tracker.wait().await;
        assert!(matches!(
            tracker.take_results(),
            Err(TransferError::PartAbandoned(2))
        ));
    }

    #[tokio::test]
    async fn zero_parts_need_no_waiting() {
        let tracker = PartTracker::<u8>::new(0);
        tracker.wait().await;
        assert!(tracker.take_results().unwrap().is_empty());
    }
}
