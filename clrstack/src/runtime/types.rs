//! Values handed back by the runtime reader
//!
//! Everything here is a snapshot of inspected-process state taken at lookup
//! time. None of it is kept in sync with the target afterwards.

use clrstack_common::Address;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::MethodHandle;

/// Raw method description data, as read from the runtime's structures
///
/// Turned into a [`MethodDescriptor`] by
/// [`RuntimeReader::build_method`](super::RuntimeReader::build_method).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodDescriptorData {
    pub method_handle: MethodHandle,
    /// Method table of the declaring type (0 if unknown)
    pub method_table: Address,
    /// Metadata token of the method definition
    pub token: u32,
    /// Start of the method's jitted code (0 if not jitted)
    pub native_code: Address,
}

/// A resolved method
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MethodDescriptor {
    pub handle: MethodHandle,
    pub name: String,
    /// Fully qualified name of the declaring type, when known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub declaring_type: Option<String>,
    pub token: u32,
}

impl MethodDescriptor {
    /// `Type.Method`, or just `Method` without a declaring type
    #[must_use]
    pub fn qualified_name(&self) -> String {
        match &self.declaring_type {
            Some(ty) => format!("{ty}.{}", self.name),
            None => self.name.clone(),
        }
    }
}

/// Type of a heap object
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeDescriptor {
    pub name: String,
    pub method_table: Address,
}

/// A heap object recognized as an exception
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExceptionObject {
    pub address: Address,
    pub type_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl fmt::Display for ExceptionObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} @ 0x{:x}", self.type_name, self.address)?;
        if let Some(message) = &self.message {
            write!(f, ": {message}")?;
        }
        Ok(())
    }
}

/// Why a thread is blocked on an object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockingReason {
    /// Waiting to enter a monitor (`lock`)
    MonitorEnter,
    /// Waiting inside `Monitor.Wait`
    MonitorWait,
    /// Waiting on a `WaitHandle`
    WaitOne,
    /// Waiting on a reader/writer lock
    ReaderAcquired,
    WriterAcquired,
    /// Owns the lock but is not waiting on it
    Owner,
    Unknown,
}

impl fmt::Display for BlockingReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BlockingReason::MonitorEnter => "monitor enter",
            BlockingReason::MonitorWait => "monitor wait",
            BlockingReason::WaitOne => "wait one",
            BlockingReason::ReaderAcquired => "reader lock",
            BlockingReason::WriterAcquired => "writer lock",
            BlockingReason::Owner => "owner",
            BlockingReason::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// An object a thread holds or waits on, found by the lock-inspection pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockingObject {
    pub object: Address,
    pub reason: BlockingReason,
    #[serde(default)]
    pub recursion_count: u32,
}

impl fmt::Display for BlockingObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:x} ({})", self.object, self.reason)?;
        if self.recursion_count > 1 {
            write!(f, " x{}", self.recursion_count)?;
        }
        Ok(())
    }
}
