//! # clrstack - Managed Stack Reconstruction and Stack Root Discovery
//!
//! clrstack rebuilds the call stacks of threads in an inspected managed
//! process and finds the objects those stacks keep alive. It never touches
//! the target directly: all memory and metadata access goes through the
//! [`runtime::RuntimeReader`] contract, so the same core runs against a live
//! process, a crash dump, or a JSON [`snapshot`].
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                  Inspected Process (live or dump)               │
//! └───────────────────────┬─────────────────────────────────────────┘
//!                         │ memory reads, unwind steps, metadata
//!                         ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │              RuntimeReader (e.g. SnapshotRuntime)               │
//! └───────────────────────┬─────────────────────────────────────────┘
//!                         │
//!                         ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    clrstack (This Crate)                        │
//! │                                                                 │
//! │  ┌──────────────┐   ┌──────────────┐   ┌──────────────┐         │
//! │  │ ThreadFacade │──▶│ StackWalker  │──▶│  StackFrame  │         │
//! │  │   (cache)    │   │   (guards)   │   │ (resolution) │         │
//! │  └──────────────┘   └──────────────┘   └──────────────┘         │
//! │         │                                                       │
//! │         ▼                                                       │
//! │  ┌──────────────┐   ┌──────────────┐                            │
//! │  │ Root scanner │   │    Report    │                            │
//! │  │ (RootRecord) │   │   (JSON)     │                            │
//! │  └──────────────┘   └──────────────┘                            │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Structure
//!
//! - [`stack`]: frame resolution and the bounded stack walker
//!   - `frame`: display names up front, method descriptors on demand
//!   - `walker`: frame cap and stalled-stack-pointer guard
//! - [`thread`]: per-thread facade caching stack, locks; reading exception and bounds
//! - [`roots`]: local-variable GC roots and the conservative stack scanner
//! - [`runtime`]: the collaborator traits and the values they return
//! - [`snapshot`]: JSON capture format and its `RuntimeReader` implementation
//! - [`report`]: JSON report export
//! - [`cli`] / [`display`]: command-line front end
//! - [`domain`]: newtype ids and error types
//!
//! ## Degraded Input
//!
//! The target's memory can be inconsistent at any moment. No inspection
//! operation fails: unreadable memory yields 0, unknown methods yield `None`
//! or the name `"Unknown"`, and runaway unwinds are truncated. Errors only
//! come from the edges (loading snapshots, writing reports).
//!
//! ## Typical Usage
//!
//! ```bash
//! clrstack dump.json
//! clrstack dump.json --thread 4242 --roots
//! clrstack dump.json --export report.json
//! ```

pub mod cli;
pub mod display;
pub mod domain;
pub mod report;
pub mod roots;
pub mod runtime;
pub mod snapshot;
pub mod stack;
pub mod thread;
