//! Per-thread inspection state
//!
//! A [`ThreadFacade`] answers questions about one thread of the inspected
//! process: its stack, its in-flight exception, its stack bounds and the
//! objects it is blocked on. Expensive answers are computed once and cached
//! for the lifetime of the facade; to see a fresh stack, build a new facade.

use clrstack_common::{Address, STACK_BASE_SLOT, STACK_LIMIT_SLOT};
use log::debug;
use std::cell::OnceCell;

use crate::domain::{AppDomainId, ManagedThreadId, OsThreadId};
use crate::runtime::{BlockingObject, ExceptionObject, RuntimeReader};
use crate::stack::{StackFrame, StackWalker, WalkLimits};

/// Identity and raw pointers of a thread, as reported by the runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThreadInfo {
    pub os_id: OsThreadId,
    pub managed_id: Option<ManagedThreadId>,
    pub app_domain: AppDomainId,
    /// Base of the thread control block (0 if unknown)
    pub teb_address: Address,
    /// Location of the current exception's object handle (0 if none)
    pub exception_pointer: Address,
}

/// Cached view of one inspected thread
///
/// Not `Sync`: the lazy caches assume one caller at a time.
pub struct ThreadFacade<'a> {
    runtime: &'a dyn RuntimeReader,
    info: ThreadInfo,
    limits: WalkLimits,
    stack_trace: OnceCell<Vec<StackFrame<'a>>>,
    blocking_objects: OnceCell<Vec<BlockingObject>>,
}

impl<'a> ThreadFacade<'a> {
    #[must_use]
    pub fn new(runtime: &'a dyn RuntimeReader, info: ThreadInfo) -> Self {
        Self {
            runtime,
            info,
            limits: WalkLimits::default(),
            stack_trace: OnceCell::new(),
            blocking_objects: OnceCell::new(),
        }
    }

    /// Use `limits` for the stack walk instead of the defaults
    #[must_use]
    pub fn with_limits(mut self, limits: WalkLimits) -> Self {
        self.limits = limits;
        self
    }

    #[must_use]
    pub fn info(&self) -> &ThreadInfo {
        &self.info
    }

    #[must_use]
    pub fn os_id(&self) -> OsThreadId {
        self.info.os_id
    }

    #[must_use]
    pub fn managed_id(&self) -> Option<ManagedThreadId> {
        self.info.managed_id
    }

    #[must_use]
    pub fn app_domain(&self) -> AppDomainId {
        self.info.app_domain
    }

    pub(crate) fn runtime(&self) -> &'a dyn RuntimeReader {
        self.runtime
    }

    /// The thread's stack, innermost frame first
    ///
    /// Walked on first call; every later call returns the same frames.
    #[must_use]
    pub fn stack_trace(&self) -> &[StackFrame<'a>] {
        self.stack_trace.get_or_init(|| {
            debug!("{}: walking stack", self.info.os_id);
            StackWalker::new(self.runtime, self.limits).walk(self.info.os_id)
        })
    }

    /// The exception currently in flight on this thread
    ///
    /// Read fresh on every call. `None` when there is no exception pointer,
    /// the handle cannot be read, or the handle is empty.
    #[must_use]
    pub fn current_exception(&self) -> Option<ExceptionObject> {
        if self.info.exception_pointer == 0 {
            return None;
        }

        let object = self.runtime.read_pointer(self.info.exception_pointer)?;
        if object == 0 {
            return None;
        }

        self.runtime.classify_heap_object(object)
    }

    /// Highest address of the thread's stack, or 0 if unknown
    #[must_use]
    pub fn stack_base(&self) -> Address {
        self.read_teb_slot(STACK_BASE_SLOT)
    }

    /// Lowest address of the thread's stack, or 0 if unknown
    #[must_use]
    pub fn stack_limit(&self) -> Address {
        self.read_teb_slot(STACK_LIMIT_SLOT)
    }

    fn read_teb_slot(&self, slot: u64) -> Address {
        if self.info.teb_address == 0 {
            return 0;
        }

        let pointer_size = self.runtime.pointer_size() as u64;
        slot.checked_mul(pointer_size)
            .and_then(|offset| self.info.teb_address.checked_add(offset))
            .and_then(|address| self.runtime.read_pointer(address))
            .unwrap_or(0)
    }

    /// Objects this thread holds or waits on
    ///
    /// Runs the lock-inspection pass on first call.
    #[must_use]
    pub fn blocking_objects(&self) -> &[BlockingObject] {
        self.blocking_objects.get_or_init(|| {
            self.runtime.run_lock_inspection();
            self.runtime.blocking_objects(self.info.os_id)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::fake::{FakeRuntime, FakeStack};
    use crate::runtime::BlockingReason;
    use clrstack_common::RawFrame;

    const TID: OsThreadId = OsThreadId(11);

    fn info(teb_address: Address, exception_pointer: Address) -> ThreadInfo {
        ThreadInfo {
            os_id: TID,
            managed_id: Some(ManagedThreadId(1)),
            app_domain: AppDomainId(0x5000),
            teb_address,
            exception_pointer,
        }
    }

    fn exception(address: Address) -> ExceptionObject {
        ExceptionObject {
            address,
            type_name: "System.NullReferenceException".to_string(),
            message: None,
        }
    }

    #[test]
    fn test_stack_trace_is_cached() {
        let rt = FakeRuntime::default();
        rt.set_stack(TID, FakeStack::Frames(vec![RawFrame::new(0x10, 0x1000, 0)]));
        let thread = ThreadFacade::new(&rt, info(0, 0));

        let first = thread.stack_trace();
        assert_eq!(first.len(), 1);

        // A different answer from the unwinder must not leak into the cached trace
        rt.set_stack(TID, FakeStack::Frames(vec![RawFrame::new(0x20, 0x2000, 0); 3]));
        let second = thread.stack_trace();

        assert!(std::ptr::eq(first, second));
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].stack_pointer(), 0x1000);
        assert_eq!(rt.unwind_calls.get(), 1);
    }

    #[test]
    fn test_new_facade_walks_again() {
        let rt = FakeRuntime::default();
        rt.set_stack(TID, FakeStack::Frames(vec![RawFrame::new(0x10, 0x1000, 0)]));
        assert_eq!(ThreadFacade::new(&rt, info(0, 0)).stack_trace().len(), 1);

        rt.set_stack(TID, FakeStack::Frames(vec![]));
        assert!(ThreadFacade::new(&rt, info(0, 0)).stack_trace().is_empty());
        assert_eq!(rt.unwind_calls.get(), 2);
    }

    #[test]
    fn test_walk_uses_configured_limits() {
        let rt = FakeRuntime::default();
        rt.set_stack(TID, FakeStack::Advancing);
        let thread = ThreadFacade::new(&rt, info(0, 0)).with_limits(WalkLimits::new(32, 5));
        assert_eq!(thread.stack_trace().len(), 32);
    }

    #[test]
    fn test_no_exception_pointer() {
        let mut rt = FakeRuntime::default();
        rt.memory.insert(0, 0x9000);
        rt.exceptions.insert(0x9000, exception(0x9000));

        let thread = ThreadFacade::new(&rt, info(0, 0));
        assert!(thread.current_exception().is_none());
    }

    #[test]
    fn test_exception_pointer_unreadable() {
        let rt = FakeRuntime::default();
        let thread = ThreadFacade::new(&rt, info(0, 0x4000));
        assert!(thread.current_exception().is_none());
    }

    #[test]
    fn test_exception_handle_empty() {
        let mut rt = FakeRuntime::default();
        rt.memory.insert(0x4000, 0);
        rt.exceptions.insert(0, exception(0));

        let thread = ThreadFacade::new(&rt, info(0, 0x4000));
        assert!(thread.current_exception().is_none());
    }

    #[test]
    fn test_current_exception_resolves() {
        let mut rt = FakeRuntime::default();
        rt.memory.insert(0x4000, 0x9000);
        rt.exceptions.insert(0x9000, exception(0x9000));

        let thread = ThreadFacade::new(&rt, info(0, 0x4000));
        assert_eq!(thread.current_exception(), Some(exception(0x9000)));
    }

    #[test]
    fn test_handle_to_non_exception_object() {
        let mut rt = FakeRuntime::default();
        rt.memory.insert(0x4000, 0x9000);

        let thread = ThreadFacade::new(&rt, info(0, 0x4000));
        assert!(thread.current_exception().is_none());
    }

    #[test]
    fn test_stack_bounds_unknown_teb() {
        let mut rt = FakeRuntime::default();
        rt.memory.insert(8, 0x7fff_0000);
        rt.memory.insert(16, 0x7ffe_0000);

        let thread = ThreadFacade::new(&rt, info(0, 0));
        assert_eq!(thread.stack_base(), 0);
        assert_eq!(thread.stack_limit(), 0);
    }

    #[test]
    fn test_stack_bounds_from_teb() {
        let mut rt = FakeRuntime::default();
        rt.memory.insert(0x3000 + 8, 0x7fff_0000);
        rt.memory.insert(0x3000 + 16, 0x7ffe_0000);

        let thread = ThreadFacade::new(&rt, info(0x3000, 0));
        assert_eq!(thread.stack_base(), 0x7fff_0000);
        assert_eq!(thread.stack_limit(), 0x7ffe_0000);
    }

    #[test]
    fn test_stack_bounds_32_bit() {
        let mut rt = FakeRuntime { pointer_size: 4, ..FakeRuntime::default() };
        rt.memory.insert(0x3000 + 4, 0x0040_0000);
        rt.memory.insert(0x3000 + 8, 0x0030_0000);

        let thread = ThreadFacade::new(&rt, info(0x3000, 0));
        assert_eq!(thread.stack_base(), 0x0040_0000);
        assert_eq!(thread.stack_limit(), 0x0030_0000);
    }

    #[test]
    fn test_stack_bounds_read_failure() {
        let mut rt = FakeRuntime::default();
        rt.memory.insert(0x3000 + 8, 0x7fff_0000);

        let thread = ThreadFacade::new(&rt, info(0x3000, 0));
        assert_eq!(thread.stack_base(), 0x7fff_0000);
        assert_eq!(thread.stack_limit(), 0);
    }

    #[test]
    fn test_stack_bounds_overflowing_teb() {
        let rt = FakeRuntime::default();
        let thread = ThreadFacade::new(&rt, info(u64::MAX - 4, 0));
        assert_eq!(thread.stack_base(), 0);
    }

    #[test]
    fn test_blocking_objects_cached() {
        let mut rt = FakeRuntime::default();
        rt.blocking.insert(
            TID,
            vec![BlockingObject {
                object: 0x8000,
                reason: BlockingReason::MonitorEnter,
                recursion_count: 1,
            }],
        );

        let thread = ThreadFacade::new(&rt, info(0, 0));
        assert_eq!(thread.blocking_objects().len(), 1);
        assert_eq!(thread.blocking_objects()[0].object, 0x8000);
        assert_eq!(rt.lock_passes.get(), 1);
    }

    #[test]
    fn test_blocking_objects_empty() {
        let rt = FakeRuntime::default();
        let thread = ThreadFacade::new(&rt, info(0, 0));
        assert!(thread.blocking_objects().is_empty());
        assert!(thread.blocking_objects().is_empty());
        assert_eq!(rt.lock_passes.get(), 1);
    }
}
