//! The `Thread` object (§3, §4.8, §4.9).
//!
//! Grounded on the reference kernel's `task/thread.rs` for the
//! thread-id-allocator/`ThreadState`/register-save-slot shape, narrowed
//! from its 64-bit `rax..r15`/`rflags`/`cs`/`ss` save area to the
//! `eip`/`esp`/`ebp` slot this core's 32-bit context switch actually
//! restores (§4.9), and replacing its `has_started: bool` sentinel-
//! detection flag with the explicit `first_run` the redesign in §9
//! calls for.

extern crate alloc;
use alloc::boxed::Box;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicU64, Ordering};

use crate::config::{DEFAULT_PRIORITY, KSTACK_SIZE};
use crate::process::process::ProcessId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ThreadId(u64);

static NEXT_THREAD_ID: AtomicU64 = AtomicU64::new(1);

fn allocate_thread_id() -> ThreadId {
    ThreadId(NEXT_THREAD_ID.fetch_add(1, Ordering::Relaxed))
}

impl ThreadId {
    pub fn as_u64(self) -> u64 {
        self.0
    }

    #[cfg(test)]
    pub fn from_raw(id: u64) -> Self {
        ThreadId(id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadState {
    Created,
    Ready,
    Running,
    Sleeping,
    Dead,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadPrivilege {
    Kernel,
    User,
}

/// The architecture register save slot (§4.9): just the three registers
/// a 32-bit `ret`-based context switch needs to restore control flow.
#[derive(Debug, Clone, Copy)]
pub struct CpuContext {
    pub eip: u32,
    pub esp: u32,
    pub ebp: u32,
}

impl CpuContext {
    pub fn new(entry: u32, stack_top: u32) -> Self {
        CpuContext { eip: entry, esp: stack_top, ebp: stack_top }
    }
}

/// A fixed-size, heap-owned kernel stack.
struct KernelStack {
    _storage: Box<[u8]>,
    top: u32,
}

impl KernelStack {
    fn allocate() -> Self {
        let storage = alloc::vec![0u8; KSTACK_SIZE].into_boxed_slice();
        let base = storage.as_ptr() as u32;
        let top = base + KSTACK_SIZE as u32;
        KernelStack { _storage: storage, top }
    }
}

pub type DeathNotifier = Box<dyn Fn(ThreadId) + Send + Sync>;

/// A schedulable thread of execution. Invariant (§3): a thread is on at
/// most one queue at a time; `Created`/`Dead` threads are on none.
pub struct Thread {
    id: ThreadId,
    name: alloc::string::String,
    owner: ProcessId,
    state: ThreadState,
    privilege: ThreadPrivilege,
    priority: u8,
    context: CpuContext,
    first_run: bool,
    /// `None` for a thread that adopted an already-running stack (the
    /// boot/idle thread) instead of getting a fresh heap allocation.
    kernel_stack: Option<KernelStack>,
    death_notifiers: Vec<DeathNotifier>,
}

impl Thread {
    /// Allocate a thread owned by `owner`, whose first context switch
    /// will resume at `entry` on top of a fresh kernel stack.
    pub fn new(name: &str, owner: ProcessId, entry: extern "C" fn(), privilege: ThreadPrivilege) -> Self {
        let kernel_stack = KernelStack::allocate();
        let context = CpuContext::new(entry as usize as u32, kernel_stack.top);
        Thread {
            id: allocate_thread_id(),
            name: alloc::string::String::from(name),
            owner,
            state: ThreadState::Created,
            privilege,
            priority: DEFAULT_PRIORITY,
            context,
            first_run: true,
            kernel_stack: Some(kernel_stack),
            death_notifiers: Vec::new(),
        }
    }

    /// Wrap the stack already executing on this CPU as a `Thread`, for
    /// the one thread (boot/idle) that was never spawned through
    /// `thread_create`. Its context is never read: it becomes current
    /// the moment it's handed to the scheduler, and the first switch
    /// away from it saves `esp`/`ebp` for real at that point.
    pub fn adopt_current(name: &str, owner: ProcessId) -> Self {
        Thread {
            id: allocate_thread_id(),
            name: alloc::string::String::from(name),
            owner,
            state: ThreadState::Running,
            privilege: ThreadPrivilege::Kernel,
            priority: DEFAULT_PRIORITY,
            context: CpuContext { eip: 0, esp: 0, ebp: 0 },
            first_run: false,
            kernel_stack: None,
            death_notifiers: Vec::new(),
        }
    }

    pub fn id(&self) -> ThreadId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn owner(&self) -> ProcessId {
        self.owner
    }

    pub fn state(&self) -> ThreadState {
        self.state
    }

    pub fn privilege(&self) -> ThreadPrivilege {
        self.privilege
    }

    pub fn priority(&self) -> u8 {
        self.priority
    }

    pub fn set_priority(&mut self, priority: u8) {
        self.priority = priority;
    }

    pub fn context(&self) -> &CpuContext {
        &self.context
    }

    pub fn context_mut(&mut self) -> &mut CpuContext {
        &mut self.context
    }

    /// Top of this thread's kernel stack, for `gdt::set_kernel_stack`.
    /// `None` for a thread that adopted an already-running stack (the
    /// boot/idle thread) instead of getting a fresh heap allocation.
    pub fn kernel_stack_top(&self) -> Option<u32> {
        self.kernel_stack.as_ref().map(|s| s.top)
    }

    pub fn first_run(&self) -> bool {
        self.first_run
    }

    /// Clear the first-run flag. Called by the context switch immediately
    /// after taking the first-run asm path for this thread.
    pub fn clear_first_run(&mut self) {
        self.first_run = false;
    }

    pub fn set_state(&mut self, state: ThreadState) {
        self.state = state;
    }

    pub fn is_runnable(&self) -> bool {
        matches!(self.state, ThreadState::Ready | ThreadState::Running)
    }

    pub fn on_death(&mut self, notifier: DeathNotifier) {
        self.death_notifiers.push(notifier);
    }

    /// Run every registered death notifier, in registration order.
    pub fn run_death_notifiers(&mut self) {
        for notifier in self.death_notifiers.drain(..) {
            notifier(self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    extern "C" fn dummy_entry() {}

    #[test]
    fn new_thread_starts_created_with_first_run_set() {
        let owner = ProcessId::from_raw(1);
        let t = Thread::new("worker", owner, dummy_entry, ThreadPrivilege::Kernel);
        assert_eq!(t.state(), ThreadState::Created);
        assert!(t.first_run());
        assert_eq!(t.priority(), DEFAULT_PRIORITY);
    }

    #[test]
    fn clear_first_run_is_observable() {
        let owner = ProcessId::from_raw(1);
        let mut t = Thread::new("worker", owner, dummy_entry, ThreadPrivilege::Kernel);
        t.clear_first_run();
        assert!(!t.first_run());
    }

    #[test]
    fn death_notifiers_run_once_in_order() {
        use alloc::sync::Arc;
        use core::sync::atomic::{AtomicU32, Ordering};

        let owner = ProcessId::from_raw(1);
        let mut t = Thread::new("worker", owner, dummy_entry, ThreadPrivilege::Kernel);
        let seen = Arc::new(AtomicU32::new(0));
        let seen2 = seen.clone();
        t.on_death(Box::new(move |_id| {
            seen2.fetch_add(1, Ordering::SeqCst);
        }));
        t.run_death_notifiers();
        assert_eq!(seen.load(Ordering::SeqCst), 1);
        t.run_death_notifiers();
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn is_runnable_only_for_ready_or_running() {
        let owner = ProcessId::from_raw(1);
        let mut t = Thread::new("worker", owner, dummy_entry, ThreadPrivilege::Kernel);
        assert!(!t.is_runnable());
        t.set_state(ThreadState::Ready);
        assert!(t.is_runnable());
        t.set_state(ThreadState::Dead);
        assert!(!t.is_runnable());
    }
}
