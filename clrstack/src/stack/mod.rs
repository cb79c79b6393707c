//! Stack trace reconstruction
//!
//! - `frame`: resolves a single raw frame to a display name and, lazily, a method
//! - `walker`: sequences raw unwind steps into a bounded, loop-safe trace

pub mod frame;
pub mod walker;

pub use frame::{StackFrame, StackFrameKind, UNKNOWN_FRAME_NAME};
pub use walker::{format_frame, StackWalker, WalkLimits, WalkStop};
