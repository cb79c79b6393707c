//! # Runtime Reader Contracts
//!
//! The inspection core never touches the inspected process directly. All
//! memory and metadata access goes through two traits, implemented by
//! whatever backend understands the runtime's layout:
//!
//! - [`DataReader`]: raw pointer-sized reads from the target address space
//! - [`RuntimeReader`]: unwinding, method lookup, heap classification and
//!   lock inspection on top of a [`DataReader`]
//!
//! ## Failure Model
//!
//! Every method answers with `Option` (or an empty collection) rather than
//! an error. The target is a live or crash-dumped process whose memory may be
//! unmapped, half-written or simply wrong, so "no answer" is an ordinary
//! outcome and callers degrade to sentinel values.
//!
//! The [`snapshot`](crate::snapshot) module provides an implementation over a
//! JSON capture of a process.

pub mod types;

#[cfg(test)]
pub(crate) mod fake;

pub use types::{
    BlockingObject, BlockingReason, ExceptionObject, MethodDescriptor, MethodDescriptorData,
    TypeDescriptor,
};

use clrstack_common::{Address, RawFrame};

use crate::domain::{MethodHandle, OsThreadId};

/// Pointer-sized reads from the inspected address space
pub trait DataReader {
    /// Pointer width of the target, in bytes (4 or 8)
    fn pointer_size(&self) -> usize;

    /// Read one pointer at `address`
    ///
    /// `None` means the read failed (unmapped, partial, or inaccessible).
    fn read_pointer(&self, address: Address) -> Option<Address>;
}

/// Runtime-level queries against the inspected process
pub trait RuntimeReader: DataReader {
    /// Low-level unwind primitive for one thread, innermost frame first
    ///
    /// The sequence may be short, may repeat stack pointers, or may never
    /// end; the stack walker guards against all three.
    fn enumerate_raw_frames(&self, thread: OsThreadId) -> Box<dyn Iterator<Item = RawFrame> + '_>;

    /// Resolve the method whose code contains `instruction_pointer`
    fn method_by_address(&self, instruction_pointer: Address) -> Option<MethodDescriptor>;

    /// Read the raw method description behind `handle`
    fn method_descriptor_data(&self, handle: MethodHandle) -> Option<MethodDescriptorData>;

    /// Build a method descriptor from raw method description data
    fn build_method(&self, data: &MethodDescriptorData) -> Option<MethodDescriptor>;

    /// Human-readable name for a method handle
    fn method_display_name(&self, handle: MethodHandle) -> Option<String>;

    /// Name of the runtime-internal frame located at `frame_address`
    fn runtime_frame_name(&self, frame_address: Address) -> Option<String>;

    /// Classify the object at `address` as an exception, if it is one
    fn classify_heap_object(&self, address: Address) -> Option<ExceptionObject>;

    /// Type of the heap object starting at `address`, if it is one
    fn object_type(&self, address: Address) -> Option<TypeDescriptor>;

    /// Populate blocking-object state for every thread
    ///
    /// Must be idempotent: callers invoke it on every cache miss.
    fn run_lock_inspection(&self);

    /// Blocking objects for `thread`, as found by the last lock-inspection pass
    fn blocking_objects(&self, thread: OsThreadId) -> Vec<BlockingObject>;
}
