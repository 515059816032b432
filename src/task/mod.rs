//! Thread creation, lifecycle, and the scheduler/context-switch pair
//! they ride on (§4.8, §4.9).
//!
//! Grounded on the reference kernel's `task/mod.rs` for the module
//! layout; its async `executor`/`Task`/`TaskId` cooperative-future
//! model and the `kthread`/`workqueue`/`softirqd`/`process_task`/
//! `spawn` subsystems built on top of it have no counterpart in a
//! synchronous priority-scheduled thread model and are dropped.

extern crate alloc;
use alloc::boxed::Box;
use alloc::vec::Vec;

pub mod context;
pub mod scheduler;
pub mod thread;

use crate::error::KernelResult;
use crate::process::process::ProcessId;
use thread::{Thread, ThreadId, ThreadPrivilege};

use spin::Mutex;

/// Threads that exist but have not yet been handed to the scheduler
/// (§4.8: `thread_create` leaves a thread `CREATED` until `thread_run`).
static PENDING: Mutex<Vec<Box<Thread>>> = Mutex::new(Vec::new());

/// Allocate a thread object and a fixed-size kernel stack, attach it to
/// `owner` (defaulting to `kernel_proc`), and leave it `CREATED`.
pub fn thread_create(name: &str, owner: Option<ProcessId>, entry: extern "C" fn()) -> KernelResult<ThreadId> {
    let owner_pid = owner.unwrap_or_else(crate::process::kernel_proc_id);
    let thread = Box::new(Thread::new(name, owner_pid, entry, ThreadPrivilege::Kernel));
    let tid = thread.id();
    crate::process::process_attach(owner_pid, tid);
    PENDING.lock().push(thread);
    Ok(tid)
}

/// Transition a `CREATED` thread to `READY` and hand it to the
/// scheduler. A no-op if `tid` is not pending (already running or unknown).
pub fn thread_run(tid: ThreadId) {
    let mut pending = PENDING.lock();
    if let Some(pos) = pending.iter().position(|t| t.id() == tid) {
        let thread = pending.remove(pos);
        drop(pending);
        scheduler::sched_insert_thread(thread);
    }
}

/// Run the current thread's death notifiers, mark it `DEAD`, and
/// reschedule. Never returns; panics if it somehow does (§4.8).
pub fn thread_exit() -> ! {
    let irq_state = crate::port::irq_disable();
    let owner = scheduler::retire_current();
    let tid = scheduler::current_thread_id();
    crate::process::process_detach(owner, tid);
    unsafe { scheduler::sched_reschedule(irq_state) };
    panic!("thread_exit: a dead thread resumed execution");
}

/// Reclaim a `DEAD` thread's storage once its death has been observed.
pub fn thread_release(tid: ThreadId) {
    scheduler::release_thread(tid);
}

#[cfg(test)]
mod tests {
    use super::*;

    extern "C" fn dummy_entry() {}

    #[test]
    fn pending_holds_created_threads_until_run() {
        let owner = crate::process::process::ProcessId::from_raw(1);
        let thread = Box::new(Thread::new("worker", owner, dummy_entry, ThreadPrivilege::Kernel));
        let tid = thread.id();
        PENDING.lock().push(thread);
        assert!(PENDING.lock().iter().any(|t| t.id() == tid));
        let pos = PENDING.lock().iter().position(|t| t.id() == tid).unwrap();
        PENDING.lock().remove(pos);
        assert!(!PENDING.lock().iter().any(|t| t.id() == tid));
    }

    // Scenario 6 (thread dispatch): a thread created and run reaches the
    // ready queue, and once its entry has run and it retires, it is DEAD
    // and the effect of its entry is observable. The host build's
    // `context::context_switch` never actually transfers control (there
    // is no real CPU to jump on), so this test drives the entry and the
    // retire step directly rather than through a real `sched_reschedule`
    // dispatch, which is the substitution the mock-frame-source note in
    // the testable-properties section calls for.
    static DISPATCHED: core::sync::atomic::AtomicU32 = core::sync::atomic::AtomicU32::new(0);

    extern "C" fn sets_shared_word() {
        DISPATCHED.store(0xC0FFEE, core::sync::atomic::Ordering::SeqCst);
    }

    #[test]
    fn thread_dispatch_runs_entry_and_retires_dead() {
        use crate::task::thread::ThreadState;

        DISPATCHED.store(0, core::sync::atomic::Ordering::SeqCst);
        let owner = crate::process::process::ProcessId::from_raw(1);
        let mut t = Thread::new("dispatched", owner, sets_shared_word, ThreadPrivilege::Kernel);
        assert_eq!(t.state(), ThreadState::Created);

        t.set_state(ThreadState::Ready);
        t.set_state(ThreadState::Running);
        sets_shared_word();
        assert_eq!(DISPATCHED.load(core::sync::atomic::Ordering::SeqCst), 0xC0FFEE);

        t.run_death_notifiers();
        t.set_state(ThreadState::Dead);
        assert_eq!(t.state(), ThreadState::Dead);
    }
}
