//! Frame resolution
//!
//! Turns one raw unwind step into a [`StackFrame`]: the display name is
//! resolved up front, the method descriptor only when somebody asks for it.

use clrstack_common::Address;
use log::debug;
use serde::Serialize;
use std::cell::OnceCell;
use std::fmt;

use crate::domain::{MethodHandle, OsThreadId};
use crate::runtime::{MethodDescriptor, RuntimeReader};

/// Name used when the runtime cannot name a frame
pub const UNKNOWN_FRAME_NAME: &str = "Unknown";

/// What kind of code a frame belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StackFrameKind {
    /// Jitted code of a method the runtime knows about
    ManagedMethod,
    /// Runtime-internal transition frame; the instruction pointer is meaningless
    Runtime,
}

impl fmt::Display for StackFrameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StackFrameKind::ManagedMethod => f.write_str("managed"),
            StackFrameKind::Runtime => f.write_str("runtime"),
        }
    }
}

/// One logical frame of a thread's stack
///
/// Immutable once built, apart from the method cache behind [`method`].
///
/// [`method`]: StackFrame::method
pub struct StackFrame<'a> {
    runtime: &'a dyn RuntimeReader,
    thread: OsThreadId,
    instruction_pointer: Address,
    stack_pointer: Address,
    kind: StackFrameKind,
    display_name: String,
    method_handle: MethodHandle,
    /// `Some(None)` caches a failed lookup
    method: OnceCell<Option<MethodDescriptor>>,
}

impl<'a> StackFrame<'a> {
    /// Frame for managed code at `instruction_pointer`
    ///
    /// The display name comes from the method handle, or [`UNKNOWN_FRAME_NAME`].
    #[must_use]
    pub fn managed(
        runtime: &'a dyn RuntimeReader,
        thread: OsThreadId,
        instruction_pointer: Address,
        stack_pointer: Address,
        method_handle: MethodHandle,
    ) -> Self {
        let display_name = runtime
            .method_display_name(method_handle)
            .unwrap_or_else(|| UNKNOWN_FRAME_NAME.to_string());

        Self {
            runtime,
            thread,
            instruction_pointer,
            stack_pointer,
            kind: StackFrameKind::ManagedMethod,
            display_name,
            method_handle,
            method: OnceCell::new(),
        }
    }

    /// Runtime-internal frame labelled `label`
    ///
    /// The method, if any, is resolved lazily from `method_handle`.
    #[must_use]
    pub fn runtime(
        runtime: &'a dyn RuntimeReader,
        thread: OsThreadId,
        stack_pointer: Address,
        label: impl Into<String>,
        method_handle: MethodHandle,
    ) -> Self {
        Self {
            runtime,
            thread,
            instruction_pointer: 0,
            stack_pointer,
            kind: StackFrameKind::Runtime,
            display_name: label.into(),
            method_handle,
            method: OnceCell::new(),
        }
    }

    /// Runtime-internal frame with an already-resolved method
    ///
    /// `method` is authoritative: no lookup ever happens for this frame.
    #[must_use]
    pub fn runtime_with_method(
        runtime: &'a dyn RuntimeReader,
        thread: OsThreadId,
        stack_pointer: Address,
        label: impl Into<String>,
        method: Option<MethodDescriptor>,
    ) -> Self {
        let method_handle = method.as_ref().map_or(MethodHandle::default(), |m| m.handle);
        Self {
            runtime,
            thread,
            instruction_pointer: 0,
            stack_pointer,
            kind: StackFrameKind::Runtime,
            display_name: label.into(),
            method_handle,
            method: OnceCell::from(method),
        }
    }

    #[must_use]
    pub fn instruction_pointer(&self) -> Address {
        self.instruction_pointer
    }

    #[must_use]
    pub fn stack_pointer(&self) -> Address {
        self.stack_pointer
    }

    #[must_use]
    pub fn kind(&self) -> StackFrameKind {
        self.kind
    }

    #[must_use]
    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    #[must_use]
    pub fn method_handle(&self) -> MethodHandle {
        self.method_handle
    }

    /// Thread this frame was unwound from
    #[must_use]
    pub fn thread(&self) -> OsThreadId {
        self.thread
    }

    /// The method executing in this frame, resolved on first call
    ///
    /// Managed frames resolve by instruction pointer; everything else by
    /// method handle. Failed lookups are cached too.
    #[must_use]
    pub fn method(&self) -> Option<&MethodDescriptor> {
        self.method.get_or_init(|| self.resolve_method()).as_ref()
    }

    fn resolve_method(&self) -> Option<MethodDescriptor> {
        if self.kind == StackFrameKind::ManagedMethod && self.instruction_pointer != 0 {
            debug!("Resolving method at ip 0x{:x}", self.instruction_pointer);
            return self.runtime.method_by_address(self.instruction_pointer);
        }

        if self.method_handle.is_valid() {
            debug!("Resolving method from {}", self.method_handle);
            return self
                .runtime
                .method_descriptor_data(self.method_handle)
                .and_then(|data| self.runtime.build_method(&data));
        }

        None
    }
}

impl fmt::Display for StackFrame<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            StackFrameKind::ManagedMethod => f.write_str(&self.display_name),
            StackFrameKind::Runtime => {
                write!(f, "[{}]", self.display_name)?;
                if let Some(method) = self.method() {
                    write!(f, " ({})", method.qualified_name())?;
                }
                Ok(())
            }
        }
    }
}

impl fmt::Debug for StackFrame<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StackFrame")
            .field("thread", &self.thread)
            .field("instruction_pointer", &format_args!("0x{:x}", self.instruction_pointer))
            .field("stack_pointer", &format_args!("0x{:x}", self.stack_pointer))
            .field("kind", &self.kind)
            .field("display_name", &self.display_name)
            .field("method_handle", &self.method_handle)
            .finish_non_exhaustive()
    }
}
