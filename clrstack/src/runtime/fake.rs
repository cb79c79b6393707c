//! In-memory runtime reader for unit tests

use clrstack_common::{Address, RawFrame};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;

use super::{
    BlockingObject, DataReader, ExceptionObject, MethodDescriptor, MethodDescriptorData,
    RuntimeReader, TypeDescriptor,
};
use crate::domain::{MethodHandle, OsThreadId};

/// What the fake unwinder produces for a thread
#[derive(Debug, Clone)]
pub enum FakeStack {
    Frames(Vec<RawFrame>),
    /// The same raw frame, forever
    Repeat(RawFrame),
    /// Managed frames with a stack pointer that advances forever
    Advancing,
}

#[derive(Debug)]
pub struct FakeRuntime {
    pub pointer_size: usize,
    pub memory: HashMap<Address, Address>,
    pub stacks: RefCell<HashMap<OsThreadId, FakeStack>>,
    pub methods_by_ip: HashMap<Address, MethodDescriptor>,
    pub method_data: HashMap<MethodHandle, MethodDescriptorData>,
    pub methods: HashMap<MethodHandle, MethodDescriptor>,
    pub names: HashMap<MethodHandle, String>,
    pub runtime_frames: HashMap<Address, String>,
    pub exceptions: HashMap<Address, ExceptionObject>,
    pub objects: HashMap<Address, TypeDescriptor>,
    pub blocking: HashMap<OsThreadId, Vec<BlockingObject>>,
    pub reads: Cell<usize>,
    pub unwind_calls: Cell<usize>,
    pub address_lookups: Cell<usize>,
    pub descriptor_lookups: Cell<usize>,
    pub lock_passes: Cell<usize>,
}

impl Default for FakeRuntime {
    fn default() -> Self {
        Self {
            pointer_size: 8,
            memory: HashMap::new(),
            stacks: RefCell::new(HashMap::new()),
            methods_by_ip: HashMap::new(),
            method_data: HashMap::new(),
            methods: HashMap::new(),
            names: HashMap::new(),
            runtime_frames: HashMap::new(),
            exceptions: HashMap::new(),
            objects: HashMap::new(),
            blocking: HashMap::new(),
            reads: Cell::new(0),
            unwind_calls: Cell::new(0),
            address_lookups: Cell::new(0),
            descriptor_lookups: Cell::new(0),
            lock_passes: Cell::new(0),
        }
    }
}

impl FakeRuntime {
    pub fn set_stack(&self, thread: OsThreadId, stack: FakeStack) {
        self.stacks.borrow_mut().insert(thread, stack);
    }

    /// Register a method reachable both by handle and by every IP in `ips`
    pub fn add_method(&mut self, method: MethodDescriptor, ips: &[Address]) {
        let data = MethodDescriptorData {
            method_handle: method.handle,
            method_table: 0,
            token: method.token,
            native_code: ips.first().copied().unwrap_or(0),
        };
        self.method_data.insert(method.handle, data);
        self.names.insert(method.handle, method.qualified_name());
        for ip in ips {
            self.methods_by_ip.insert(*ip, method.clone());
        }
        self.methods.insert(method.handle, method);
    }
}

pub fn method(handle: Address, ty: Option<&str>, name: &str) -> MethodDescriptor {
    MethodDescriptor {
        handle: MethodHandle(handle),
        name: name.to_string(),
        declaring_type: ty.map(str::to_string),
        token: 0x0600_0000,
    }
}

impl DataReader for FakeRuntime {
    fn pointer_size(&self) -> usize {
        self.pointer_size
    }

    fn read_pointer(&self, address: Address) -> Option<Address> {
        self.reads.set(self.reads.get() + 1);
        self.memory.get(&address).copied()
    }
}

impl RuntimeReader for FakeRuntime {
    fn enumerate_raw_frames(&self, thread: OsThreadId) -> Box<dyn Iterator<Item = RawFrame> + '_> {
        self.unwind_calls.set(self.unwind_calls.get() + 1);
        match self.stacks.borrow().get(&thread).cloned() {
            Some(FakeStack::Frames(frames)) => Box::new(frames.into_iter()),
            Some(FakeStack::Repeat(frame)) => Box::new(std::iter::repeat(frame)),
            Some(FakeStack::Advancing) => {
                Box::new((1u64..).map(|i| RawFrame::new(0x7f00_0000, 0x1000 + i * 8, 0)))
            }
            None => Box::new(std::iter::empty()),
        }
    }

    fn method_by_address(&self, instruction_pointer: Address) -> Option<MethodDescriptor> {
        self.address_lookups.set(self.address_lookups.get() + 1);
        self.methods_by_ip.get(&instruction_pointer).cloned()
    }

    fn method_descriptor_data(&self, handle: MethodHandle) -> Option<MethodDescriptorData> {
        self.descriptor_lookups.set(self.descriptor_lookups.get() + 1);
        self.method_data.get(&handle).cloned()
    }

    fn build_method(&self, data: &MethodDescriptorData) -> Option<MethodDescriptor> {
        self.methods.get(&data.method_handle).cloned()
    }

    fn method_display_name(&self, handle: MethodHandle) -> Option<String> {
        self.names.get(&handle).cloned()
    }

    fn runtime_frame_name(&self, frame_address: Address) -> Option<String> {
        self.runtime_frames.get(&frame_address).cloned()
    }

    fn classify_heap_object(&self, address: Address) -> Option<ExceptionObject> {
        self.exceptions.get(&address).cloned()
    }

    fn object_type(&self, address: Address) -> Option<TypeDescriptor> {
        self.objects.get(&address).cloned()
    }

    fn run_lock_inspection(&self) {
        self.lock_passes.set(self.lock_passes.get() + 1);
    }

    fn blocking_objects(&self, thread: OsThreadId) -> Vec<BlockingObject> {
        self.blocking.get(&thread).cloned().unwrap_or_default()
    }
}
