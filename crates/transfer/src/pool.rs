use std::fmt;
use std::future::Future;
use std::sync::Arc;

use tokio::runtime::{Builder, Handle, Runtime};
use tracing::debug;

use crate::{Pending, TransferError};

/// Where transfer work runs.
///
/// Either an owned multi-threaded runtime sized for I/O fan-out, or a handle
/// to a runtime the caller already drives. Clones share the same runtime; an
/// owned runtime shuts down in the background when the last clone drops.
#[derive(Clone)]
pub struct WorkerPool {
    handle: Handle,
    owned: Option<Arc<OwnedRuntime>>,
}

struct OwnedRuntime {
    runtime: Option<Runtime>,
    threads: usize,
}

impl Drop for OwnedRuntime {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

impl WorkerPool {
    /// Starts a dedicated runtime with `threads` worker threads.
    pub fn new(threads: usize) -> Result<Self, TransferError> {
        if threads == 0 {
            return Err(TransferError::Config("worker pool needs at least one thread".into()));
        }
        let runtime = Builder::new_multi_thread()
            .worker_threads(threads)
            .thread_name("keel-io")
            .enable_all()
            .build()?;
        debug!(threads, "started transfer worker pool");
        Ok(Self {
            handle: runtime.handle().clone(),
            owned: Some(Arc::new(OwnedRuntime {
                runtime: Some(runtime),
                threads,
            })),
        })
    }

    /// Runs work on the runtime the caller is currently inside.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime.
    pub fn current() -> Self {
        Self::from_handle(Handle::current())
    }

    pub fn from_handle(handle: Handle) -> Self {
        Self {
            handle,
            owned: None,
        }
    }

    pub fn handle(&self) -> &Handle {
        &self.handle
    }

    /// Thread count of an owned runtime, `None` for a borrowed handle.
    pub fn threads(&self) -> Option<usize> {
        self.owned.as_ref().map(|owned| owned.threads)
    }

    /// Spawns `fut` and returns its eventual result.
    pub fn spawn<T, F>(&self, fut: F) -> Pending<T>
    where
        T: Send + 'static,
        F: Future<Output = Result<T, TransferError>> + Send + 'static,
    {
        Pending::from_handle(self.handle.spawn(fut))
    }

    /// Spawns `fut` without keeping a handle; the task reports back on its own.
    pub fn dispatch<F>(&self, fut: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        drop(self.handle.spawn(fut));
    }
}

impl fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerPool")
            .field("threads", &self.threads())
            .finish_non_exhaustive()
    }
}
