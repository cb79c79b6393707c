//! Domain types providing compile-time safety and self-documentation
//!
//! These newtype wrappers keep the different integer handles of an inspection
//! session apart: an OS thread id is not a managed thread id, and an app
//! domain handle is not an object address.

use clrstack_common::Address;
use serde::{Deserialize, Serialize};
use std::fmt;

/// OS thread ID of a thread in the inspected process
///
/// Frames and roots refer back to their thread through this id. It never
/// keeps the thread's facade alive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OsThreadId(pub u32);

impl fmt::Display for OsThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TID:{}", self.0)
    }
}

/// Managed thread ID
///
/// The runtime's own thread numbering (1, 2, 3, ...), distinct from the
/// OS thread id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ManagedThreadId(pub u32);

impl fmt::Display for ManagedThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Managed#{}", self.0)
    }
}

/// App domain handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AppDomainId(pub Address);

impl fmt::Display for AppDomainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Domain:0x{:x}", self.0)
    }
}

/// Method handle (method description pointer)
///
/// Zero means "no method attached".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MethodHandle(pub Address);

impl MethodHandle {
    /// Returns true if this handle refers to a method
    #[must_use]
    pub fn is_valid(self) -> bool {
        self.0 != 0
    }
}

impl fmt::Display for MethodHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MD:0x{:x}", self.0)
    }
}
