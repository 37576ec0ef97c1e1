//! Transfer error types.

use keel_store::StoreError;

/// Errors produced by the transfer crate.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("part {part_number} failed: {source}")]
    Part {
        part_number: u32,
        #[source]
        source: StoreError,
    },

    #[error("short read for part {part_number}: expected {expected} bytes, got {actual}")]
    ShortRead {
        part_number: u32,
        expected: u64,
        actual: u64,
    },

    #[error("range [{start}, +{len}) overflows u64")]
    RangeOverflow {
        start: u64,
        len: u64,
    },

    #[error("part {0} was dropped before reporting completion")]
    PartAbandoned(u32),

    #[error("task failed: {0}")]
    Task(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TransferError {
    /// Returns `true` when the underlying store reported a missing object.
    pub fn is_not_found(&self) -> bool {
        match self {
            TransferError::Store(e) | TransferError::Part { source: e, .. } => e.is_not_found(),
            _ => false,
        }
    }
}
