//! GC roots found on thread stacks
//!
//! A [`RootRecord`] is a frozen result of one stack scan: a stack slot, the
//! object it pointed to at scan time, and how much the scanner trusts that
//! finding. Records are rebuilt on every scan and never updated.

use clrstack_common::{Address, MAX_STACK_SCAN_SLOTS};
use log::{debug, warn};
use serde::Serialize;
use std::fmt;

use crate::domain::{AppDomainId, OsThreadId};
use crate::runtime::TypeDescriptor;
use crate::thread::ThreadFacade;

/// Name shared by every local-variable root
pub const LOCAL_VAR_ROOT_NAME: &str = "local var";

/// Root kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RootKind {
    /// Stack slot of a method's local variable
    LocalVar,
}

/// Confidence flags attached to a root when it is discovered
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RootFlags {
    pub pinned: bool,
    /// Found by conservative scanning; the slot may not hold a live reference
    pub possible_false_positive: bool,
    /// Points into the middle of the object rather than at its start
    pub interior_pointer: bool,
}

/// A local-variable GC root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootRecord {
    address: Address,
    referenced_object: Address,
    ty: Option<TypeDescriptor>,
    app_domain: AppDomainId,
    thread: OsThreadId,
    flags: RootFlags,
}

impl RootRecord {
    #[must_use]
    pub fn new(
        address: Address,
        referenced_object: Address,
        ty: Option<TypeDescriptor>,
        app_domain: AppDomainId,
        thread: OsThreadId,
        flags: RootFlags,
    ) -> Self {
        Self { address, referenced_object, ty, app_domain, thread, flags }
    }

    /// Always [`RootKind::LocalVar`]
    #[must_use]
    pub fn kind(&self) -> RootKind {
        RootKind::LocalVar
    }

    /// Always `"local var"`
    #[must_use]
    pub fn name(&self) -> &'static str {
        LOCAL_VAR_ROOT_NAME
    }

    /// Stack slot holding the reference
    #[must_use]
    pub fn address(&self) -> Address {
        self.address
    }

    #[must_use]
    pub fn referenced_object(&self) -> Address {
        self.referenced_object
    }

    #[must_use]
    pub fn ty(&self) -> Option<&TypeDescriptor> {
        self.ty.as_ref()
    }

    #[must_use]
    pub fn app_domain(&self) -> AppDomainId {
        self.app_domain
    }

    #[must_use]
    pub fn thread(&self) -> OsThreadId {
        self.thread
    }

    #[must_use]
    pub fn flags(&self) -> RootFlags {
        self.flags
    }

    #[must_use]
    pub fn is_pinned(&self) -> bool {
        self.flags.pinned
    }

    #[must_use]
    pub fn is_possible_false_positive(&self) -> bool {
        self.flags.possible_false_positive
    }

    #[must_use]
    pub fn is_interior_pointer(&self) -> bool {
        self.flags.interior_pointer
    }
}

impl fmt::Display for RootRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ty = self.ty.as_ref().map_or("<unknown type>", |t| t.name.as_str());
        write!(
            f,
            "{} 0x{:x} -> 0x{:x} {} ({})",
            self.name(),
            self.address,
            self.referenced_object,
            ty,
            self.thread
        )?;
        if self.flags.pinned {
            f.write_str(" [pinned]")?;
        }
        if self.flags.interior_pointer {
            f.write_str(" [interior]")?;
        }
        if self.flags.possible_false_positive {
            f.write_str(" [possible false positive]")?;
        }
        Ok(())
    }
}

/// Conservatively scan a thread's stack for object references
///
/// Every pointer-aligned slot between the stack limit and the stack base
/// that holds the address of a known heap object becomes a root. Nothing
/// here knows which slots are live locals, so every root is flagged as a
/// possible false positive.
#[must_use]
pub fn scan_stack_roots(thread: &ThreadFacade<'_>) -> Vec<RootRecord> {
    let runtime = thread.runtime();
    let base = thread.stack_base();
    let limit = thread.stack_limit();

    if base == 0 || limit == 0 || limit >= base {
        debug!(
            "{}: stack bounds unknown (0x{limit:x}..0x{base:x}), skipping root scan",
            thread.os_id()
        );
        return Vec::new();
    }

    let pointer_size = runtime.pointer_size() as u64;
    let Some(mut slot) = limit.checked_next_multiple_of(pointer_size) else {
        return Vec::new();
    };

    let flags = RootFlags { possible_false_positive: true, ..RootFlags::default() };
    let mut roots = Vec::new();
    let mut visited = 0u64;

    while slot < base && base - slot >= pointer_size {
        if visited == MAX_STACK_SCAN_SLOTS {
            warn!(
                "{}: stack scan cap of {MAX_STACK_SCAN_SLOTS} slots reached at 0x{slot:x}, \
                 skipping the rest up to 0x{base:x}",
                thread.os_id()
            );
            break;
        }

        if let Some(object) = runtime.read_pointer(slot).filter(|&object| object != 0) {
            if let Some(ty) = runtime.object_type(object) {
                roots.push(RootRecord::new(
                    slot,
                    object,
                    Some(ty),
                    thread.app_domain(),
                    thread.os_id(),
                    flags,
                ));
            }
        }
        slot += pointer_size;
        visited += 1;
    }

    debug!("{}: scanned {visited} stack slots, found {} roots", thread.os_id(), roots.len());
    roots
}
