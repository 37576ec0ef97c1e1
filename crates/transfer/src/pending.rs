use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::task::JoinHandle;

use crate::TransferError;

type BoxedResult<T> = Pin<Box<dyn Future<Output = Result<T, TransferError>> + Send>>;

/// The result of an operation that is still in flight.
///
/// Returned by every `*_async` call. Await it for the outcome, or hand it to
/// an [`AsyncOpGroup`](crate::AsyncOpGroup) to have it resolved in order.
/// Dropping a `Pending` that wraps a spawned task detaches the task rather
/// than cancelling it.
pub struct Pending<T> {
    inner: BoxedResult<T>,
}

impl<T: Send + 'static> Pending<T> {
    pub fn new<F>(fut: F) -> Self
    where
        F: Future<Output = Result<T, TransferError>> + Send + 'static,
    {
        Self {
            inner: Box::pin(fut),
        }
    }

    /// An already-resolved result.
    pub fn ready(result: Result<T, TransferError>) -> Self {
        Self::new(std::future::ready(result))
    }

    /// Wraps a spawned task. A panic inside the task resumes on the awaiting
    /// side; a cancelled task becomes [`TransferError::Task`].
    pub fn from_handle(handle: JoinHandle<Result<T, TransferError>>) -> Self {
        Self::new(async move {
            match handle.await {
                Ok(result) => result,
                Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
                Err(e) => Err(TransferError::Task(e.to_string())),
            }
        })
    }
}

impl<T> Future for Pending<T> {
    type Output = Result<T, TransferError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.inner.as_mut().poll(cx)
    }
}

impl<T> fmt::Debug for Pending<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pending").finish_non_exhaustive()
    }
}
