//! # Shared Data Structures (Unwinder ↔ Inspector)
//!
//! Defines the plain-data types and constants shared between the low-level
//! unwind primitive (whatever produces raw frames for an inspected thread) and
//! the inspector that turns them into logical stack traces. Types that cross
//! that boundary use `#[repr(C)]` so a native unwinder can hand them over
//! without translation.
//!
//! ## Key Types
//!
//! - [`RawFrame`] - One unwind step: instruction pointer, stack pointer, method handle
//! - [`Address`] - Opaque pointer-sized handle into the inspected address space
//!
//! ## Walk Limits
//!
//! The stack walker stops on two independent guards, both tunable at runtime:
//!
//! 1. **Frame cap** - [`DEFAULT_MAX_FRAMES`] frames consumed per thread
//! 2. **Repeat cap** - [`DEFAULT_MAX_REPEATED_STACK_POINTER`] consecutive frames
//!    sharing one stack pointer

#![no_std]

/// Address in the inspected process
///
/// Always 64 bits wide regardless of the target's pointer size; 32-bit
/// targets simply never set the upper half. `0` is the null/unknown handle.
pub type Address = u64;

// ============================================================================
// Walk Limit Defaults
// ============================================================================

/// Maximum number of raw frames consumed for a single thread
///
/// Bounds the work done when the unwinder keeps advancing without ever
/// reaching the end of the stack.
pub const DEFAULT_MAX_FRAMES: usize = 4096;

/// Maximum number of consecutive frames allowed to share one stack pointer
///
/// An unwinder that stops making progress reports the same stack pointer
/// over and over. The walk ends before a stack pointer would appear more
/// than this many times in a row.
pub const DEFAULT_MAX_REPEATED_STACK_POINTER: usize = 5;

/// "No previous frame observed" marker for the repeat guard
///
/// Real stack pointers never take this value, so the first raw frame always
/// counts as progress.
pub const NO_PREVIOUS_STACK_POINTER: Address = u64::MAX;

// ============================================================================
// Thread Control Block Layout
// ============================================================================

/// Pointer-sized slot in the thread control block holding the stack base
///
/// Stack base lives at `teb + STACK_BASE_SLOT * pointer_size`.
pub const STACK_BASE_SLOT: u64 = 1;

/// Pointer-sized slot in the thread control block holding the stack limit
///
/// Stack limit lives at `teb + STACK_LIMIT_SLOT * pointer_size`.
pub const STACK_LIMIT_SLOT: u64 = 2;

/// Upper bound on slots visited by one conservative stack scan
///
/// Corrupt stack bounds can describe gigabytes of "stack"; the scan stops
/// after this many pointer-sized slots.
pub const MAX_STACK_SCAN_SLOTS: u64 = 1 << 20;

// ============================================================================
// Shared Data Structures
// ============================================================================

/// One step of the low-level unwinder
///
/// **Value conventions**:
/// - `instruction_pointer == 0`: the frame is a runtime-internal transition
///   frame, not managed code. Its `stack_pointer` is the frame's address.
/// - `method_handle == 0`: the unwinder could not attach a method to the frame.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "user", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "user", serde(rename_all = "camelCase"))]
pub struct RawFrame {
    /// Instruction pointer (0 for runtime frames)
    #[cfg_attr(feature = "user", serde(default))]
    pub instruction_pointer: Address,

    /// Stack pointer, or the runtime frame's address
    ///
    /// Used by the stack walker as its loop-detection key.
    pub stack_pointer: Address,

    /// Runtime method handle (method description pointer), 0 if none
    #[cfg_attr(feature = "user", serde(default))]
    pub method_handle: Address,
}

impl RawFrame {
    /// Create a raw frame
    #[must_use]
    pub const fn new(
        instruction_pointer: Address,
        stack_pointer: Address,
        method_handle: Address,
    ) -> Self {
        Self { instruction_pointer, stack_pointer, method_handle }
    }

    /// Returns true if this frame belongs to managed code
    #[must_use]
    pub const fn is_managed(&self) -> bool {
        self.instruction_pointer != 0
    }
}
