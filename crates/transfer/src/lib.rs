//! Parallel remote-object transfers.
//!
//! A single logical read or write is cut into bounded parts
//! ([`SegmentedBufferView`]), each part runs as its own task on a
//! [`WorkerPool`], and the coordinator waits on a [`CountingSemaphore`] until
//! every part has reported. Whole-object operations come back as
//! [`Pending`] results that callers can batch in a [`ReadGroup`] or
//! [`WriteGroup`] and synchronize on later, with completion hooks running in
//! the order the operations were issued.
//!
//! [`RemoteStorage`] ties it together over any [`keel_store::ObjectStore`].

mod config;
mod delete;
mod download;
mod error;
mod listing;
mod op_group;
mod pending;
mod pool;
mod segment;
mod semaphore;
mod storage;
mod target;
mod tracker;
mod upload;

pub use config::{GIB, KIB, MIB, TransferConfig};
pub use error::TransferError;
pub use op_group::{AsyncOpGroup, ReadGroup, WriteGroup};
pub use pending::Pending;
pub use pool::WorkerPool;
pub use segment::{BufPart, Parts, SegmentedBufferView};
pub use semaphore::CountingSemaphore;
pub use storage::RemoteStorage;
pub use upload::{Finalizing, PartsComplete, PartsDispatched, UploadCreated};
