//! # Inspection Snapshots
//!
//! A snapshot is a JSON capture of everything the inspection core needs to
//! know about a process: raw memory, method metadata, the unwinder's output
//! per thread, heap object types and lock ownership. Loading one yields a
//! [`SnapshotRuntime`], which implements [`RuntimeReader`] so stacks and
//! roots can be reconstructed offline exactly as they would be against a
//! live target.
//!
//! ## Format
//!
//! ```json
//! {
//!   "pointerSize": 8,
//!   "memory": [{ "start": 4096, "bytes": "00100000000000..." }],
//!   "methods": [{ "handle": 256, "name": "Main", "declaringType": "App.Program",
//!                 "token": 100663297, "codeStart": 2130706432, "codeSize": 64 }],
//!   "runtimeFrames": [{ "address": 8192, "name": "HelperMethodFrame" }],
//!   "threads": [{ "osId": 4242, "managedId": 1, "appDomain": 20480, "teb": 12288,
//!                 "exceptionPointer": 0,
//!                 "frames": [{ "instructionPointer": 2130706448, "stackPointer": 8208,
//!                              "methodHandle": 256 }],
//!                 "blockingObjects": [{ "object": 36864, "reason": "monitor_enter" }] }],
//!   "objects": [{ "address": 36864, "typeName": "System.Object" }]
//! }
//! ```
//!
//! All addresses are plain JSON integers. Memory bytes are hex, in target
//! (little-endian) byte order.
//!
//! ## Validation
//!
//! Loading rejects pointer sizes other than 4 and 8, malformed hex, and
//! duplicate thread ids or method handles. Everything else (dangling method
//! handles, frames pointing nowhere, bogus TEB addresses) is accepted: the
//! inspection core is built to degrade on exactly that kind of input.

pub mod memory;

pub use memory::{AddressSpace, MemoryRange, MemoryRegion};

use anyhow::{Context, Result};
use clrstack_common::{Address, RawFrame};
use log::{debug, info};
use serde::Deserialize;
use std::cell::OnceCell;
use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use crate::domain::{AppDomainId, ManagedThreadId, MethodHandle, OsThreadId, SnapshotError};
use crate::runtime::{
    BlockingObject, DataReader, ExceptionObject, MethodDescriptor, MethodDescriptorData,
    RuntimeReader, TypeDescriptor,
};
use crate::thread::ThreadInfo;

// ============================================================================
// On-disk format
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub pointer_size: usize,
    #[serde(default)]
    pub memory: Vec<MemoryEntry>,
    #[serde(default)]
    pub methods: Vec<MethodEntry>,
    #[serde(default)]
    pub runtime_frames: Vec<RuntimeFrameEntry>,
    #[serde(default)]
    pub threads: Vec<ThreadEntry>,
    #[serde(default)]
    pub objects: Vec<ObjectEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MemoryEntry {
    pub start: Address,
    pub bytes: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MethodEntry {
    pub handle: MethodHandle,
    pub name: String,
    #[serde(default)]
    pub declaring_type: Option<String>,
    #[serde(default)]
    pub method_table: Address,
    #[serde(default)]
    pub token: u32,
    #[serde(default)]
    pub code_start: Address,
    #[serde(default)]
    pub code_size: u64,
}

impl MethodEntry {
    fn code_range(&self) -> Option<MemoryRange> {
        if self.code_start == 0 || self.code_size == 0 {
            return None;
        }
        let end = self.code_start.checked_add(self.code_size)?;
        Some(MemoryRange { start: self.code_start, end })
    }

    fn descriptor(&self) -> MethodDescriptor {
        MethodDescriptor {
            handle: self.handle,
            name: self.name.clone(),
            declaring_type: self.declaring_type.clone(),
            token: self.token,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RuntimeFrameEntry {
    pub address: Address,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadEntry {
    pub os_id: OsThreadId,
    #[serde(default)]
    pub managed_id: Option<ManagedThreadId>,
    #[serde(default)]
    pub app_domain: AppDomainId,
    #[serde(default)]
    pub teb: Address,
    #[serde(default)]
    pub exception_pointer: Address,
    #[serde(default)]
    pub frames: Vec<RawFrame>,
    #[serde(default)]
    pub blocking_objects: Vec<BlockingObject>,
}

impl ThreadEntry {
    fn info(&self) -> ThreadInfo {
        ThreadInfo {
            os_id: self.os_id,
            managed_id: self.managed_id,
            app_domain: self.app_domain,
            teb_address: self.teb,
            exception_pointer: self.exception_pointer,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectEntry {
    pub address: Address,
    pub type_name: String,
    #[serde(default)]
    pub method_table: Address,
    #[serde(default)]
    pub message: Option<String>,
}

impl ObjectEntry {
    fn is_exception(&self) -> bool {
        self.type_name.ends_with("Exception") || self.message.is_some()
    }
}

impl Snapshot {
    /// Parse a snapshot from JSON
    ///
    /// # Errors
    /// Returns an error if the input is not a valid snapshot document
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, SnapshotError> {
        Ok(serde_json::from_reader(reader)?)
    }

    /// Read and parse a snapshot file
    ///
    /// # Errors
    /// Returns an error if the file cannot be opened or parsed
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file =
            File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
        Self::from_reader(BufReader::new(file))
            .with_context(|| format!("Failed to parse snapshot {}", path.display()))
    }
}

// ============================================================================
// Runtime reader over a snapshot
// ============================================================================

/// A loaded, validated snapshot answering runtime-reader queries
#[derive(Debug)]
pub struct SnapshotRuntime {
    pointer_size: usize,
    memory: AddressSpace,
    methods: HashMap<MethodHandle, MethodEntry>,
    /// Code ranges sorted by start address
    code_ranges: Vec<(MemoryRange, MethodHandle)>,
    runtime_frames: HashMap<Address, String>,
    threads: Vec<ThreadEntry>,
    objects: HashMap<Address, ObjectEntry>,
    /// Filled by the first lock-inspection pass
    lock_index: OnceCell<HashMap<OsThreadId, Vec<BlockingObject>>>,
}

impl SnapshotRuntime {
    /// Validate a snapshot and build its lookup indexes
    ///
    /// # Errors
    /// Returns an error on an unsupported pointer size, malformed memory, or
    /// duplicate thread ids / method handles
    pub fn new(snapshot: Snapshot) -> Result<Self, SnapshotError> {
        if !matches!(snapshot.pointer_size, 4 | 8) {
            return Err(SnapshotError::InvalidPointerSize(snapshot.pointer_size));
        }

        let regions = snapshot
            .memory
            .iter()
            .map(|m| MemoryRegion::from_hex(m.start, &m.bytes))
            .collect::<Result<Vec<_>, _>>()?;

        let mut seen_threads = HashSet::new();
        for thread in &snapshot.threads {
            if !seen_threads.insert(thread.os_id) {
                return Err(SnapshotError::DuplicateThread(thread.os_id));
            }
        }

        let mut methods = HashMap::with_capacity(snapshot.methods.len());
        let mut code_ranges = Vec::new();
        for method in snapshot.methods {
            if let Some(range) = method.code_range() {
                code_ranges.push((range, method.handle));
            }
            let handle = method.handle;
            if methods.insert(handle, method).is_some() {
                return Err(SnapshotError::DuplicateMethod(handle));
            }
        }
        code_ranges.sort_by_key(|(range, _)| range.start);

        let runtime_frames =
            snapshot.runtime_frames.into_iter().map(|f| (f.address, f.name)).collect();
        let objects = snapshot.objects.into_iter().map(|o| (o.address, o)).collect();

        info!(
            "Loaded snapshot: {}-bit, {} threads, {} methods",
            snapshot.pointer_size * 8,
            snapshot.threads.len(),
            methods.len()
        );

        Ok(Self {
            pointer_size: snapshot.pointer_size,
            memory: AddressSpace::new(regions),
            methods,
            code_ranges,
            runtime_frames,
            threads: snapshot.threads,
            objects,
            lock_index: OnceCell::new(),
        })
    }

    /// Load and validate a snapshot file
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, parsed, or validated
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let snapshot = Snapshot::load(path)?;
        Self::new(snapshot).with_context(|| format!("Invalid snapshot {}", path.display()))
    }

    /// Every thread in the snapshot, in capture order
    pub fn threads(&self) -> impl Iterator<Item = ThreadInfo> + '_ {
        self.threads.iter().map(ThreadEntry::info)
    }

    /// Look up one thread
    ///
    /// # Errors
    /// Returns [`SnapshotError::UnknownThread`] if the snapshot has no such thread
    pub fn thread(&self, os_id: OsThreadId) -> Result<ThreadInfo, SnapshotError> {
        self.threads
            .iter()
            .find(|t| t.os_id == os_id)
            .map(ThreadEntry::info)
            .ok_or(SnapshotError::UnknownThread(os_id))
    }

    fn method_at(&self, instruction_pointer: Address) -> Option<&MethodEntry> {
        // Nested or overlapping ranges: the innermost (latest start) wins
        let candidates =
            self.code_ranges.partition_point(|(range, _)| range.start <= instruction_pointer);
        self.code_ranges[..candidates]
            .iter()
            .rev()
            .find(|(range, _)| range.contains(instruction_pointer))
            .and_then(|(_, handle)| self.methods.get(handle))
    }
}

impl DataReader for SnapshotRuntime {
    fn pointer_size(&self) -> usize {
        self.pointer_size
    }

    fn read_pointer(&self, address: Address) -> Option<Address> {
        self.memory.read_pointer(address, self.pointer_size)
    }
}

impl RuntimeReader for SnapshotRuntime {
    fn enumerate_raw_frames(&self, thread: OsThreadId) -> Box<dyn Iterator<Item = RawFrame> + '_> {
        match self.threads.iter().find(|t| t.os_id == thread) {
            Some(entry) => Box::new(entry.frames.iter().copied()),
            None => Box::new(std::iter::empty()),
        }
    }

    fn method_by_address(&self, instruction_pointer: Address) -> Option<MethodDescriptor> {
        self.method_at(instruction_pointer).map(MethodEntry::descriptor)
    }

    fn method_descriptor_data(&self, handle: MethodHandle) -> Option<MethodDescriptorData> {
        self.methods.get(&handle).map(|m| MethodDescriptorData {
            method_handle: m.handle,
            method_table: m.method_table,
            token: m.token,
            native_code: m.code_start,
        })
    }

    fn build_method(&self, data: &MethodDescriptorData) -> Option<MethodDescriptor> {
        let entry = self.methods.get(&data.method_handle)?;
        Some(MethodDescriptor { token: data.token, ..entry.descriptor() })
    }

    fn method_display_name(&self, handle: MethodHandle) -> Option<String> {
        self.methods.get(&handle).map(|m| m.descriptor().qualified_name())
    }

    fn runtime_frame_name(&self, frame_address: Address) -> Option<String> {
        self.runtime_frames.get(&frame_address).cloned()
    }

    fn classify_heap_object(&self, address: Address) -> Option<ExceptionObject> {
        let object = self.objects.get(&address).filter(|o| o.is_exception())?;
        Some(ExceptionObject {
            address,
            type_name: object.type_name.clone(),
            message: object.message.clone(),
        })
    }

    fn object_type(&self, address: Address) -> Option<TypeDescriptor> {
        self.objects
            .get(&address)
            .map(|o| TypeDescriptor { name: o.type_name.clone(), method_table: o.method_table })
    }

    fn run_lock_inspection(&self) {
        if self.lock_index.get().is_some() {
            debug!("Lock inspection already done");
            return;
        }

        let index: HashMap<_, _> = self
            .threads
            .iter()
            .filter(|t| !t.blocking_objects.is_empty())
            .map(|t| (t.os_id, t.blocking_objects.clone()))
            .collect();
        info!("Lock inspection: {} threads hold or wait on objects", index.len());
        let _ = self.lock_index.set(index);
    }

    fn blocking_objects(&self, thread: OsThreadId) -> Vec<BlockingObject> {
        self.lock_index.get().and_then(|index| index.get(&thread)).cloned().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::BlockingReason;

    const SNAPSHOT: &str = r#"{
        "pointerSize": 8,
        "memory": [
            { "start": 12288, "bytes": "000000000000000000000100000000000000ff0000000000" },
            { "start": 16384, "bytes": "0090000000000000" }
        ],
        "methods": [
            { "handle": 256, "name": "Main", "declaringType": "App.Program",
              "token": 100663297, "codeStart": 2130706432, "codeSize": 64 },
            { "handle": 512, "name": "Enter", "declaringType": "System.Threading.Monitor" }
        ],
        "runtimeFrames": [{ "address": 8192, "name": "HelperMethodFrame" }],
        "threads": [
            { "osId": 4242, "managedId": 1, "appDomain": 20480, "teb": 12288,
              "exceptionPointer": 16384,
              "frames": [
                  { "stackPointer": 8192, "methodHandle": 512 },
                  { "instructionPointer": 2130706448, "stackPointer": 8208, "methodHandle": 256 }
              ],
              "blockingObjects": [{ "object": 40960, "reason": "monitor_enter" }] },
            { "osId": 4243 }
        ],
        "objects": [
            { "address": 36864, "typeName": "System.InvalidOperationException",
              "message": "bad state" },
            { "address": 40960, "typeName": "System.Object" }
        ]
    }"#;

    fn runtime() -> SnapshotRuntime {
        SnapshotRuntime::new(Snapshot::from_reader(SNAPSHOT.as_bytes()).unwrap()).unwrap()
    }

    #[test]
    fn test_threads() {
        let rt = runtime();
        let threads: Vec<_> = rt.threads().collect();
        assert_eq!(threads.len(), 2);
        assert_eq!(threads[0].os_id, OsThreadId(4242));
        assert_eq!(threads[0].managed_id, Some(ManagedThreadId(1)));
        assert_eq!(threads[0].app_domain, AppDomainId(20480));
        assert_eq!(threads[1].teb_address, 0);

        assert!(rt.thread(OsThreadId(4243)).is_ok());
        assert!(matches!(
            rt.thread(OsThreadId(1)),
            Err(SnapshotError::UnknownThread(OsThreadId(1)))
        ));
    }

    #[test]
    fn test_read_pointer() {
        let rt = runtime();
        assert_eq!(rt.read_pointer(12288 + 8), Some(0x1_0000));
        assert_eq!(rt.read_pointer(12288 + 16), Some(0xff_0000));
        assert_eq!(rt.read_pointer(16384), Some(36864));
        assert_eq!(rt.read_pointer(0x100), None);
    }

    #[test]
    fn test_method_lookup_by_address() {
        let rt = runtime();
        let method = rt.method_by_address(2_130_706_448).unwrap();
        assert_eq!(method.qualified_name(), "App.Program.Main");

        assert!(rt.method_by_address(2_130_706_432 + 64).is_none());
        assert!(rt.method_by_address(0x10).is_none());
    }

    #[test]
    fn test_method_lookup_nested_code_ranges() {
        let doc = r#"{ "pointerSize": 8, "methods": [
            { "handle": 1, "name": "Outer", "codeStart": 4096, "codeSize": 256 },
            { "handle": 2, "name": "Inner", "codeStart": 4112, "codeSize": 16 }] }"#;
        let rt = SnapshotRuntime::new(Snapshot::from_reader(doc.as_bytes()).unwrap()).unwrap();

        let name = |ip| rt.method_by_address(ip).map(|m| m.name);
        assert_eq!(name(4112).as_deref(), Some("Inner"));
        // Past the inner range, still inside the outer one
        assert_eq!(name(4200).as_deref(), Some("Outer"));
        assert_eq!(name(4096 + 256), None);
    }

    #[test]
    fn test_method_lookup_by_handle() {
        let rt = runtime();
        let data = rt.method_descriptor_data(MethodHandle(512)).unwrap();
        let method = rt.build_method(&data).unwrap();
        assert_eq!(method.qualified_name(), "System.Threading.Monitor.Enter");
        assert_eq!(
            rt.method_display_name(MethodHandle(256)).as_deref(),
            Some("App.Program.Main")
        );
        assert!(rt.method_descriptor_data(MethodHandle(1)).is_none());
    }

    #[test]
    fn test_heap_classification() {
        let rt = runtime();
        let ex = rt.classify_heap_object(36864).unwrap();
        assert_eq!(ex.type_name, "System.InvalidOperationException");
        assert_eq!(ex.message.as_deref(), Some("bad state"));

        assert!(rt.classify_heap_object(40960).is_none());
        assert_eq!(rt.object_type(40960).map(|t| t.name), Some("System.Object".to_string()));
        assert!(rt.object_type(1).is_none());
    }

    #[test]
    fn test_lock_inspection_is_idempotent() {
        let rt = runtime();
        assert!(rt.blocking_objects(OsThreadId(4242)).is_empty());

        rt.run_lock_inspection();
        rt.run_lock_inspection();

        let blocking = rt.blocking_objects(OsThreadId(4242));
        assert_eq!(blocking.len(), 1);
        assert_eq!(blocking[0].reason, BlockingReason::MonitorEnter);
        assert!(rt.blocking_objects(OsThreadId(4243)).is_empty());
    }

    #[test]
    fn test_raw_frames() {
        let rt = runtime();
        let frames: Vec<_> = rt.enumerate_raw_frames(OsThreadId(4242)).collect();
        assert_eq!(frames.len(), 2);
        assert!(!frames[0].is_managed());
        assert_eq!(frames[1].method_handle, 256);
        assert_eq!(rt.enumerate_raw_frames(OsThreadId(7)).count(), 0);
    }

    #[test]
    fn test_rejects_bad_pointer_size() {
        let snapshot = Snapshot::from_reader(r#"{ "pointerSize": 2 }"#.as_bytes()).unwrap();
        assert!(matches!(
            SnapshotRuntime::new(snapshot),
            Err(SnapshotError::InvalidPointerSize(2))
        ));
    }

    #[test]
    fn test_rejects_duplicates() {
        let threads = r#"{ "pointerSize": 8, "threads": [{ "osId": 1 }, { "osId": 1 }] }"#;
        let snapshot = Snapshot::from_reader(threads.as_bytes()).unwrap();
        assert!(matches!(
            SnapshotRuntime::new(snapshot),
            Err(SnapshotError::DuplicateThread(OsThreadId(1)))
        ));

        let methods = r#"{ "pointerSize": 8, "methods": [
            { "handle": 5, "name": "A" }, { "handle": 5, "name": "B" }] }"#;
        let snapshot = Snapshot::from_reader(methods.as_bytes()).unwrap();
        assert!(matches!(
            SnapshotRuntime::new(snapshot),
            Err(SnapshotError::DuplicateMethod(MethodHandle(5)))
        ));
    }

    #[test]
    fn test_rejects_bad_hex() {
        let doc = r#"{ "pointerSize": 8, "memory": [{ "start": 16, "bytes": "xyz" }] }"#;
        let snapshot = Snapshot::from_reader(doc.as_bytes()).unwrap();
        assert!(matches!(
            SnapshotRuntime::new(snapshot),
            Err(SnapshotError::InvalidHex { start: 16, .. })
        ));
    }

    #[test]
    fn test_malformed_json() {
        assert!(matches!(
            Snapshot::from_reader("{ not json".as_bytes()),
            Err(SnapshotError::Json(_))
        ));
    }
}
