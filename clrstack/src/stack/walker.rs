//! Stack walking
//!
//! Drives the runtime reader's unwind primitive and turns its raw frames into
//! [`StackFrame`]s. The unwinder is not trusted to terminate: the walk ends on
//! a frame cap and on a stack pointer that stops advancing.

use clrstack_common::{
    RawFrame, DEFAULT_MAX_FRAMES, DEFAULT_MAX_REPEATED_STACK_POINTER, NO_PREVIOUS_STACK_POINTER,
};
use log::{debug, warn};

use super::frame::{StackFrame, UNKNOWN_FRAME_NAME};
use crate::domain::{MethodHandle, OsThreadId};
use crate::runtime::RuntimeReader;

/// Bounds applied to a single stack walk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WalkLimits {
    /// Maximum number of frames kept
    pub max_frames: usize,
    /// Maximum number of consecutive frames sharing one stack pointer
    pub max_repeated_stack_pointer: usize,
}

impl WalkLimits {
    /// Create walk limits
    ///
    /// A repeat limit of 0 is raised to 1: every stack pointer may appear at
    /// least once.
    #[must_use]
    pub fn new(max_frames: usize, max_repeated_stack_pointer: usize) -> Self {
        Self { max_frames, max_repeated_stack_pointer: max_repeated_stack_pointer.max(1) }
    }
}

impl Default for WalkLimits {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAMES, DEFAULT_MAX_REPEATED_STACK_POINTER)
    }
}

/// Why a stack walk ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkStop {
    /// The unwinder ran out of frames
    EndOfStack,
    /// More frames were pending past `max_frames`
    FrameCap,
    /// The stack pointer repeated too many times in a row
    StalledStackPointer,
}

/// Stack walker - turns raw unwind steps into a bounded frame sequence
///
/// Frames come out innermost first, in exactly the order the unwinder
/// produced them.
pub struct StackWalker<'a> {
    runtime: &'a dyn RuntimeReader,
    limits: WalkLimits,
}

impl<'a> StackWalker<'a> {
    /// Create a new stack walker
    #[must_use]
    pub fn new(runtime: &'a dyn RuntimeReader, limits: WalkLimits) -> Self {
        Self { runtime, limits }
    }

    #[must_use]
    pub fn limits(&self) -> WalkLimits {
        self.limits
    }

    /// Walk the stack of `thread`
    ///
    /// Never fails: an unwinder that gives up early just yields a short
    /// (possibly empty) trace.
    #[must_use]
    pub fn walk(&self, thread: OsThreadId) -> Vec<StackFrame<'a>> {
        self.walk_until_stop(thread).0
    }

    /// Walk the stack of `thread`, also reporting why the walk ended
    #[must_use]
    pub fn walk_until_stop(&self, thread: OsThreadId) -> (Vec<StackFrame<'a>>, WalkStop) {
        let mut frames = Vec::new();
        let mut last_stack_pointer = NO_PREVIOUS_STACK_POINTER;
        let mut repeats = 0usize;
        let mut stop = WalkStop::EndOfStack;

        for raw in self.runtime.enumerate_raw_frames(thread) {
            // A raw frame is still pending here, so the cap always drops something
            if frames.len() >= self.limits.max_frames {
                warn!(
                    "{thread}: frame cap of {} reached, truncating stack",
                    self.limits.max_frames
                );
                stop = WalkStop::FrameCap;
                break;
            }

            if raw.stack_pointer == last_stack_pointer {
                repeats += 1;
                if repeats >= self.limits.max_repeated_stack_pointer {
                    warn!(
                        "{thread}: stack pointer 0x{:x} not advancing, stopping after {} frames",
                        raw.stack_pointer,
                        frames.len()
                    );
                    stop = WalkStop::StalledStackPointer;
                    break;
                }
            } else {
                repeats = 0;
                last_stack_pointer = raw.stack_pointer;
            }

            frames.push(self.resolve_frame(thread, raw));
        }

        debug!("{thread}: walked {} frames ({stop:?})", frames.len());
        (frames, stop)
    }

    fn resolve_frame(&self, thread: OsThreadId, raw: RawFrame) -> StackFrame<'a> {
        let method_handle = MethodHandle(raw.method_handle);

        if raw.is_managed() {
            return StackFrame::managed(
                self.runtime,
                thread,
                raw.instruction_pointer,
                raw.stack_pointer,
                method_handle,
            );
        }

        let label = self
            .runtime
            .runtime_frame_name(raw.stack_pointer)
            .unwrap_or_else(|| UNKNOWN_FRAME_NAME.to_string());
        StackFrame::runtime(self.runtime, thread, raw.stack_pointer, label, method_handle)
    }
}

/// Format one frame for terminal output
///
/// `#N  0xSP 0xIP text`; runtime frames leave the IP column blank.
#[must_use]
pub fn format_frame(index: usize, frame: &StackFrame<'_>) -> String {
    if frame.instruction_pointer() == 0 {
        format!("#{index:<3} 0x{:016x} {:18} {frame}", frame.stack_pointer(), "")
    } else {
        format!(
            "#{index:<3} 0x{:016x} 0x{:016x} {frame}",
            frame.stack_pointer(),
            frame.instruction_pointer()
        )
    }
}
