//! Structured error types for clrstack
//!
//! Using thiserror for automatic Display implementation and error chaining.
//! Only the edges of the crate fail: the inspection core itself degrades to
//! sentinel values instead of returning errors.

use super::types::{MethodHandle, OsThreadId};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("Unsupported pointer size {0} (expected 4 or 8)")]
    InvalidPointerSize(usize),

    #[error("Invalid hex data in memory region at 0x{start:x}: {reason}")]
    InvalidHex { start: u64, reason: String },

    #[error("Thread {0} appears more than once in the snapshot")]
    DuplicateThread(OsThreadId),

    #[error("Method {0} appears more than once in the snapshot")]
    DuplicateMethod(MethodHandle),

    #[error("Thread {0} not found in the snapshot")]
    UnknownThread(OsThreadId),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum ExportError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
