//! Domain model for clrstack
//!
//! This module contains core domain types and errors that provide:
//! - Compile-time safety via newtype pattern
//! - Self-documenting function signatures
//! - Structured error handling

pub mod errors;
pub mod types;

// Re-export common types for convenience
pub use types::{AppDomainId, ManagedThreadId, MethodHandle, OsThreadId};

pub use errors::{ExportError, SnapshotError};
