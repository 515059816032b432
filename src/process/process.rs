//! The `Process` object (§3, §4.8).
//!
//! Grounded on the reference kernel's `process/process.rs` for the
//! `ProcessId` newtype and lifecycle-method shape, re-pointed at this
//! core's `MmuContext`/`ThreadId` instead of `VirtAddr`/`GuardedStack`/
//! `ProcessPageTable`. `kernel_proc` never owns a context of its own;
//! it defers to [`crate::memory::with_kernel_ctx`] so there is exactly
//! one kernel `MmuContext` in the whole system, matching the invariant
//! that kernel threads never switch away from it.

extern crate alloc;
use alloc::string::String;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicU64, Ordering};

use crate::memory::MmuContext;
use crate::task::thread::ThreadId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProcessId(u64);

static NEXT_PID: AtomicU64 = AtomicU64::new(1);

fn allocate_pid() -> ProcessId {
    ProcessId(NEXT_PID.fetch_add(1, Ordering::Relaxed))
}

impl ProcessId {
    pub fn as_u64(self) -> u64 {
        self.0
    }

    #[cfg(test)]
    pub fn from_raw(id: u64) -> Self {
        ProcessId(id)
    }
}

impl core::fmt::Display for ProcessId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

enum CtxOwner {
    Kernel,
    Owned(MmuContext),
}

/// A process: an owned address space (or a deferral to the kernel's
/// shared one) and the set of threads running in it.
pub struct Process {
    id: ProcessId,
    name: String,
    ctx: CtxOwner,
    threads: Vec<ThreadId>,
    parent: Option<ProcessId>,
}

impl Process {
    /// Construct a process with its own fresh address space.
    pub fn new(name: &str, ctx: MmuContext, parent: Option<ProcessId>) -> Self {
        Process {
            id: allocate_pid(),
            name: String::from(name),
            ctx: CtxOwner::Owned(ctx),
            threads: Vec::new(),
            parent,
        }
    }

    /// Construct `kernel_proc`: no owned context, defers to the kernel's
    /// shared singleton `MmuContext`.
    pub fn new_kernel(name: &str) -> Self {
        Process { id: allocate_pid(), name: String::from(name), ctx: CtxOwner::Kernel, threads: Vec::new(), parent: None }
    }

    pub fn id(&self) -> ProcessId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_kernel(&self) -> bool {
        matches!(self.ctx, CtxOwner::Kernel)
    }

    pub fn with_ctx<R>(&self, f: impl FnOnce(&MmuContext) -> R) -> R {
        match &self.ctx {
            CtxOwner::Kernel => crate::memory::with_kernel_ctx(f),
            CtxOwner::Owned(ctx) => f(ctx),
        }
    }

    pub fn with_ctx_mut<R>(&mut self, f: impl FnOnce(&mut MmuContext) -> R) -> R {
        match &mut self.ctx {
            CtxOwner::Kernel => crate::memory::with_kernel_ctx_mut(f),
            CtxOwner::Owned(ctx) => f(ctx),
        }
    }

    pub fn parent(&self) -> Option<ProcessId> {
        self.parent
    }

    pub fn threads(&self) -> &[ThreadId] {
        &self.threads
    }

    /// Attach `tid` to this process's thread set.
    pub fn attach(&mut self, tid: ThreadId) {
        debug_assert!(!self.threads.contains(&tid), "thread already attached to process");
        self.threads.push(tid);
    }

    /// Detach `tid` from this process's thread set. A no-op if not present.
    pub fn detach(&mut self, tid: ThreadId) {
        self.threads.retain(|&t| t != tid);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn process_ids_are_unique_and_increasing() {
        let a = allocate_pid();
        let b = allocate_pid();
        assert!(b.as_u64() > a.as_u64());
    }

    #[test]
    fn attach_then_detach_empties_thread_set() {
        let ctx = crate::memory::page_table::create_ctx();
        let mut p = Process::new("test", ctx, None);
        let tid = ThreadId::from_raw(1);
        p.attach(tid);
        assert_eq!(p.threads(), &[tid]);
        p.detach(tid);
        assert!(p.threads().is_empty());
    }

    #[test]
    fn kernel_proc_has_no_owned_context() {
        let p = Process::new_kernel("kernel");
        assert!(p.is_kernel());
    }
}
