//! Report export
//!
//! Collects what the inspection core found for each thread (stack, exception,
//! locks, roots) and writes it out as JSON for offline analysis or diffing
//! between captures. Addresses are rendered as `0x`-prefixed hex strings.

use clrstack_common::Address;
use serde::{Serialize, Serializer};
use std::io::Write;

use crate::domain::{AppDomainId, ExportError, ManagedThreadId, OsThreadId};
use crate::roots::{RootKind, RootRecord};
use crate::runtime::{BlockingObject, ExceptionObject};
use crate::stack::{StackFrame, StackFrameKind};
use crate::thread::ThreadFacade;

fn hex_address<S: Serializer>(address: &Address, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&format!("0x{address:x}"))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InspectionReport<'r> {
    pointer_size: usize,
    threads: &'r [ThreadReport],
}

/// Everything known about one thread at export time
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadReport {
    pub os_id: OsThreadId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub managed_id: Option<ManagedThreadId>,
    pub app_domain: AppDomainId,
    #[serde(serialize_with = "hex_address")]
    pub stack_base: Address,
    #[serde(serialize_with = "hex_address")]
    pub stack_limit: Address,
    pub frames: Vec<FrameReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exception: Option<ExceptionObject>,
    pub blocking_objects: Vec<BlockingObject>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub roots: Vec<RootReport>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameReport {
    #[serde(serialize_with = "hex_address")]
    pub instruction_pointer: Address,
    #[serde(serialize_with = "hex_address")]
    pub stack_pointer: Address,
    pub kind: StackFrameKind,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
}

impl From<&StackFrame<'_>> for FrameReport {
    fn from(frame: &StackFrame<'_>) -> Self {
        Self {
            instruction_pointer: frame.instruction_pointer(),
            stack_pointer: frame.stack_pointer(),
            kind: frame.kind(),
            text: frame.to_string(),
            method: frame.method().map(|m| m.qualified_name()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RootReport {
    pub name: &'static str,
    pub kind: RootKind,
    #[serde(serialize_with = "hex_address")]
    pub address: Address,
    #[serde(serialize_with = "hex_address")]
    pub object: Address,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub type_name: Option<String>,
    pub pinned: bool,
    pub interior_pointer: bool,
    pub possible_false_positive: bool,
}

impl From<&RootRecord> for RootReport {
    fn from(root: &RootRecord) -> Self {
        Self {
            name: root.name(),
            kind: root.kind(),
            address: root.address(),
            object: root.referenced_object(),
            type_name: root.ty().map(|t| t.name.clone()),
            pinned: root.is_pinned(),
            interior_pointer: root.is_interior_pointer(),
            possible_false_positive: root.is_possible_false_positive(),
        }
    }
}

/// JSON report exporter
pub struct ReportExporter {
    pointer_size: usize,
    threads: Vec<ThreadReport>,
}

impl ReportExporter {
    /// Create a new exporter for a target with the given pointer width
    #[must_use]
    pub fn new(pointer_size: usize) -> Self {
        Self { pointer_size, threads: Vec::new() }
    }

    /// Record a thread's current state
    ///
    /// Walks the stack if the facade has not done so yet.
    pub fn add_thread(&mut self, thread: &ThreadFacade<'_>, roots: &[RootRecord]) {
        self.threads.push(ThreadReport {
            os_id: thread.os_id(),
            managed_id: thread.managed_id(),
            app_domain: thread.app_domain(),
            stack_base: thread.stack_base(),
            stack_limit: thread.stack_limit(),
            frames: thread.stack_trace().iter().map(FrameReport::from).collect(),
            exception: thread.current_exception(),
            blocking_objects: thread.blocking_objects().to_vec(),
            roots: roots.iter().map(RootReport::from).collect(),
        });
    }

    #[must_use]
    pub fn threads(&self) -> &[ThreadReport] {
        &self.threads
    }

    /// Write the report as pretty-printed JSON
    ///
    /// # Errors
    /// Returns an error if serialization or writing fails
    pub fn export<W: Write>(&self, mut writer: W) -> Result<(), ExportError> {
        let report = InspectionReport { pointer_size: self.pointer_size, threads: &self.threads };
        serde_json::to_writer_pretty(&mut writer, &report)?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        Ok(())
    }
}
