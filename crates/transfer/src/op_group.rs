//! Tracking of many independent named operations.
//!
//! An [`AsyncOpGroup`] holds pending results together with a label and a
//! completion hook. [`finish`](AsyncOpGroup::finish) awaits them in the
//! order they were added and runs each hook exactly once, no matter which
//! transfer actually completed first. [`ReadGroup`] and [`WriteGroup`] are the
//! same mechanism under names that say what the call site is doing.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;

use tracing::{debug, error, warn};

use crate::{Pending, TransferError};

type OpFuture = Pin<Box<dyn Future<Output = Result<(), TransferError>> + Send>>;

type Hook<T> = Box<dyn FnOnce(T) -> Result<(), TransferError> + Send>;

/// A tracked operation with its result type erased.
trait TrackedOp: Send {
    fn label(&self) -> &str;

    /// Awaits the result and feeds it to the hook.
    fn finish(self: Box<Self>) -> OpFuture;
}

struct Op<T> {
    pending: Pending<T>,
    label: String,
    on_complete: Hook<T>,
}

impl<T: Send + 'static> TrackedOp for Op<T> {
    fn label(&self) -> &str {
        &self.label
    }

    fn finish(self: Box<Self>) -> OpFuture {
        let Op {
            pending,
            on_complete,
            ..
        } = *self;
        Box::pin(async move {
            let value = pending.await?;
            on_complete(value)
        })
    }
}

/// Ordered set of outstanding operations.
#[derive(Default)]
pub struct AsyncOpGroup {
    ops: Mutex<VecDeque<Box<dyn TrackedOp>>>,
}

impl AsyncOpGroup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tracks an operation whose only result is success or failure.
    pub fn add_op<F>(&self, pending: Pending<()>, label: impl Into<String>, on_complete: F)
    where
        F: FnOnce() -> Result<(), TransferError> + Send + 'static,
    {
        self.add_returns_op(pending, label, move |()| on_complete());
    }

    /// Tracks an operation producing a `T`, which `on_complete` receives.
    pub fn add_returns_op<T, F>(
        &self,
        pending: Pending<T>,
        label: impl Into<String>,
        on_complete: F,
    ) where
        T: Send + 'static,
        F: FnOnce(T) -> Result<(), TransferError> + Send + 'static,
    {
        let op = Op {
            pending,
            label: label.into(),
            on_complete: Box::new(on_complete),
        };
        self.ops.lock().unwrap().push_back(Box::new(op));
    }

    /// Operations added and not yet drained.
    pub fn len(&self) -> usize {
        self.ops.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Awaits every tracked operation in the order it was added and runs its
    /// hook.
    ///
    /// All operations are drained even after a failure, including ones added
    /// while draining. The first failure (by drain order) is returned; later
    /// ones are logged.
    pub async fn finish(&self) -> Result<(), TransferError> {
        let mut first_failure: Option<TransferError> = None;
        let mut drained = 0usize;

        loop {
            let next = self.ops.lock().unwrap().pop_front();
            let Some(op) = next else { break };
            let label = op.label().to_owned();
            drained += 1;

            if let Err(e) = op.finish().await {
                if first_failure.is_none() {
                    error!(op = %label, error = %e, "tracked operation failed");
                    first_failure = Some(e);
                } else {
                    warn!(op = %label, error = %e, "additional tracked operation failed");
                }
            }
        }

        debug!(drained, failed = first_failure.is_some(), "op group drained");
        match first_failure {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl std::fmt::Debug for AsyncOpGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncOpGroup")
            .field("outstanding", &self.len())
            .finish()
    }
}

/// Tracks reads; hooks typically consume the downloaded bytes.
#[derive(Debug, Default)]
pub struct ReadGroup {
    group: AsyncOpGroup,
}

impl ReadGroup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_op<F>(&self, pending: Pending<()>, label: impl Into<String>, on_complete: F)
    where
        F: FnOnce() -> Result<(), TransferError> + Send + 'static,
    {
        self.group.add_op(pending, label, on_complete);
    }

    pub fn add_returns_op<T, F>(
        &self,
        pending: Pending<T>,
        label: impl Into<String>,
        on_complete: F,
    ) where
        T: Send + 'static,
        F: FnOnce(T) -> Result<(), TransferError> + Send + 'static,
    {
        self.group.add_returns_op(pending, label, on_complete);
    }

    pub fn len(&self) -> usize {
        self.group.len()
    }

    pub fn is_empty(&self) -> bool {
        self.group.is_empty()
    }

    pub async fn finish(&self) -> Result<(), TransferError> {
        self.group.finish().await
    }
}

/// Tracks writes; hooks typically record that an object became durable.
#[derive(Debug, Default)]
pub struct WriteGroup {
    group: AsyncOpGroup,
}

impl WriteGroup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_op<F>(&self, pending: Pending<()>, label: impl Into<String>, on_complete: F)
    where
        F: FnOnce() -> Result<(), TransferError> + Send + 'static,
    {
        self.group.add_op(pending, label, on_complete);
    }

    pub fn add_returns_op<T, F>(
        &self,
        pending: Pending<T>,
        label: impl Into<String>,
        on_complete: F,
    ) where
        T: Send + 'static,
        F: FnOnce(T) -> Result<(), TransferError> + Send + 'static,
    {
        self.group.add_returns_op(pending, label, on_complete);
    }

    pub fn len(&self) -> usize {
        self.group.len()
    }

    pub fn is_empty(&self) -> bool {
        self.group.is_empty()
    }

    pub async fn finish(&self) -> Result<(), TransferError> {
        self.group.finish().await
    }
}
