//! Transfer tuning knobs.
//!
//! Defaults follow the S3 limits and the AWS CLI's multi-part settings: parts
//! between 5 MiB and 5 GiB, 8 MiB by default, at most 10000 parts, and delete
//! requests kept a little under the 1000-key ceiling.

use keel_store::{MAX_DELETE_KEYS, MAX_PART_NUMBER};
use serde::{Deserialize, Serialize};

use crate::TransferError;

pub const KIB: u64 = 1024;
pub const MIB: u64 = 1024 * KIB;
pub const GIB: u64 = 1024 * MIB;

/// Part sizing, batching and pool settings shared by every transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferConfig {
    /// Smallest segment a recomputed part size may use.
    #[serde(default = "default_min_part_size")]
    pub min_part_size: u64,

    /// Segment size used unless the transfer would need too many parts.
    #[serde(default = "default_part_size")]
    pub default_part_size: u64,

    /// Largest segment a recomputed part size may use.
    #[serde(default = "default_max_part_size")]
    pub max_part_size: u64,

    /// Maximum parts in one transfer.
    #[serde(default = "default_max_parts")]
    pub max_parts: u64,

    /// Keys per delete request.
    #[serde(default = "default_max_delete_batch")]
    pub max_delete_batch: usize,

    /// Threads in an owned worker pool.
    #[serde(default = "default_worker_threads")]
    pub worker_threads: usize,

    /// Uploads smaller than this go out as a single put.
    #[serde(default = "default_single_put_threshold")]
    pub single_put_threshold: u64,
}

fn default_min_part_size() -> u64 {
    5 * MIB
}

fn default_part_size() -> u64 {
    8 * MIB
}

fn default_max_part_size() -> u64 {
    5 * GIB
}

fn default_max_parts() -> u64 {
    u64::from(MAX_PART_NUMBER)
}

fn default_max_delete_batch() -> usize {
    995
}

fn default_worker_threads() -> usize {
    36
}

fn default_single_put_threshold() -> u64 {
    8 * MIB
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            min_part_size: default_min_part_size(),
            default_part_size: default_part_size(),
            max_part_size: default_max_part_size(),
            max_parts: default_max_parts(),
            max_delete_batch: default_max_delete_batch(),
            worker_threads: default_worker_threads(),
            single_put_threshold: default_single_put_threshold(),
        }
    }
}

impl TransferConfig {
    /// Checks that the knobs are mutually consistent.
    pub fn validate(&self) -> Result<(), TransferError> {
        if self.min_part_size == 0 {
            return Err(TransferError::Config("min_part_size must be positive".into()));
        }
        if self.min_part_size > self.default_part_size
            || self.default_part_size > self.max_part_size
        {
            return Err(TransferError::Config(format!(
                "part sizes must satisfy min <= default <= max, got {} / {} / {}",
                self.min_part_size, self.default_part_size, self.max_part_size
            )));
        }
        if self.max_parts == 0 || self.max_parts > u64::from(MAX_PART_NUMBER) {
            return Err(TransferError::Config(format!(
                "max_parts must be within 1..={MAX_PART_NUMBER}, got {}",
                self.max_parts
            )));
        }
        if self.max_delete_batch == 0 || self.max_delete_batch > MAX_DELETE_KEYS {
            return Err(TransferError::Config(format!(
                "max_delete_batch must be within 1..={MAX_DELETE_KEYS}, got {}",
                self.max_delete_batch
            )));
        }
        if self.worker_threads == 0 {
            return Err(TransferError::Config("worker_threads must be positive".into()));
        }
        if self.single_put_threshold == 0 {
            return Err(TransferError::Config(
                "single_put_threshold must be positive".into(),
            ));
        }
        Ok(())
    }
}
