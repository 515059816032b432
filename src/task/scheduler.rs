//! Priority-based scheduler and the single reschedule choke-point (§4.9).
//!
//! Grounded on the reference kernel's `task/scheduler.rs` for the
//! global-`Mutex<Option<Scheduler>>`/`with_scheduler` idiom and the
//! general shape of "schedule picks ids, caller does the context
//! switch", replacing its flat round-robin `VecDeque<u64>` with the
//! fixed `NUM_PRIORITIES` ready queues this core requires: the
//! scheduler always runs the highest-priority non-empty queue, FIFO
//! within it. The `waiters`/`WaitMode`/`retire_list` process-wait and
//! deferred-drop machinery has no counterpart here and is dropped.

extern crate alloc;
use alloc::boxed::Box;
use alloc::collections::VecDeque;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicBool, Ordering};

use crate::config::NUM_PRIORITIES;
use crate::task::context;
use crate::task::thread::{Thread, ThreadId, ThreadState};
use spin::Mutex;

static SCHEDULER: Mutex<Option<Scheduler>> = Mutex::new(None);
static NEED_RESCHED: AtomicBool = AtomicBool::new(false);

const EMPTY_QUEUE: VecDeque<ThreadId> = VecDeque::new();

struct Scheduler {
    threads: Vec<Box<Thread>>,
    ready: [VecDeque<ThreadId>; NUM_PRIORITIES],
    current: ThreadId,
    idle: ThreadId,
}

impl Scheduler {
    fn find_index(&self, tid: ThreadId) -> Option<usize> {
        self.threads.iter().position(|t| t.id() == tid)
    }

    fn insert_ready(&mut self, tid: ThreadId) {
        let priority = self.threads[self.find_index(tid).expect("sched_insert_thread: unknown thread")]
            .priority() as usize;
        self.ready[priority].push_back(tid);
    }

    /// Highest-priority non-empty queue, FIFO within it. Priority 0 is
    /// most urgent (§4.9), so this scans ascending.
    fn pop_highest_ready(&mut self) -> Option<ThreadId> {
        for queue in self.ready.iter_mut() {
            if let Some(tid) = queue.pop_front() {
                return Some(tid);
            }
        }
        None
    }
}

/// Bring up the scheduler around a boot-provided idle thread, which
/// runs whenever no other queue has anything ready. The idle thread is
/// never itself placed on a ready queue.
pub fn init(idle: Box<Thread>) {
    let idle_id = idle.id();
    let mut threads = Vec::new();
    threads.push(idle);
    *SCHEDULER.lock() = Some(Scheduler {
        threads,
        ready: [EMPTY_QUEUE; NUM_PRIORITIES],
        current: idle_id,
        idle: idle_id,
    });
    log::info!("Scheduler initialized, idle thread = {}", idle_id.as_u64());
}

fn with_scheduler<R>(f: impl FnOnce(&mut Scheduler) -> R) -> R {
    let mut guard = SCHEDULER.lock();
    f(guard.as_mut().expect("scheduler::init not called yet"))
}

/// Register a brand-new thread with the scheduler, transitioning it to
/// `READY` and enqueueing it at the tail of its priority queue.
pub fn sched_insert_thread(thread: Box<Thread>) {
    with_scheduler(|sched| {
        let tid = thread.id();
        sched.threads.push(thread);
        sched.threads[sched.find_index(tid).unwrap()].set_state(ThreadState::Ready);
        sched.insert_ready(tid);
    });
}

pub fn current_thread_id() -> ThreadId {
    with_scheduler(|sched| sched.current)
}

/// Like [`current_thread_id`], but `None` if the scheduler hasn't been
/// brought up yet instead of panicking. Used by the panic handler,
/// which must not itself panic reaching for diagnostics.
pub fn try_current_thread_id() -> Option<ThreadId> {
    SCHEDULER.lock().as_ref().map(|sched| sched.current)
}

/// The currently running thread's id, name, and owning process id.
/// `None` if the scheduler hasn't been brought up yet. Used by fault
/// handlers that need to name the thread in their diagnostic banner
/// without themselves risking a panic.
pub fn current_thread_info() -> Option<(ThreadId, alloc::string::String, crate::process::process::ProcessId)> {
    SCHEDULER.lock().as_ref().map(|sched| {
        let idx = sched.find_index(sched.current).expect("scheduler.current is always a known thread");
        let thread = &sched.threads[idx];
        (thread.id(), alloc::string::String::from(thread.name()), thread.owner())
    })
}

/// Run the current thread's death notifiers and mark it `DEAD`. Returns
/// its owning process so the caller can detach it there too.
pub fn retire_current() -> crate::process::process::ProcessId {
    with_scheduler(|sched| {
        let tid = sched.current;
        let idx = sched.find_index(tid).unwrap();
        let owner = sched.threads[idx].owner();
        sched.threads[idx].run_death_notifiers();
        sched.threads[idx].set_state(ThreadState::Dead);
        owner
    })
}

/// Reclaim a `DEAD` thread's storage. Panics if the thread is not dead
/// or unknown, per the "re-entering a queue" programmer-error row (§7).
pub fn release_thread(tid: ThreadId) {
    with_scheduler(|sched| {
        let idx = sched.find_index(tid).expect("thread_release: unknown thread");
        assert_eq!(sched.threads[idx].state(), ThreadState::Dead, "thread_release: thread is not dead");
        sched.threads.remove(idx);
    });
}

/// Ask the next reschedule point to actually switch. Called from the
/// timer tick; does not itself switch.
pub fn request_reschedule() {
    NEED_RESCHED.store(true, Ordering::Relaxed);
}

pub fn need_resched() -> bool {
    NEED_RESCHED.swap(false, Ordering::Relaxed)
}

/// The single reschedule choke-point (§4.9): pick the highest-priority
/// ready thread and context-switch into it if it differs from the one
/// currently running. `prev_irq_state` is the interrupt-enabled flag to
/// restore once the incoming thread resumes.
///
/// # Safety
/// Must be called with interrupts already disabled and only while the
/// caller's own thread is the one recorded as `current`.
pub unsafe fn sched_reschedule(prev_irq_state: bool) {
    let switch = with_scheduler(|sched| {
        let prev_tid = sched.current;
        if sched.threads[sched.find_index(prev_tid).unwrap()].state() == ThreadState::Running {
            sched.insert_ready(prev_tid);
        }

        let next_tid = sched.pop_highest_ready().unwrap_or(sched.idle);
        if next_tid == prev_tid {
            sched.threads[sched.find_index(prev_tid).unwrap()].set_state(ThreadState::Running);
            return None;
        }

        sched.current = next_tid;
        sched.threads[sched.find_index(next_tid).unwrap()].set_state(ThreadState::Running);

        let prev_ptr = &mut *sched.threads[sched.find_index(prev_tid).unwrap()] as *mut Thread;
        let next_ptr = &mut *sched.threads[sched.find_index(next_tid).unwrap()] as *mut Thread;
        Some((prev_ptr, next_ptr))
    });

    if let Some((prev_ptr, next_ptr)) = switch {
        context::context_switch(&mut *prev_ptr, &mut *next_ptr);
    }

    crate::port::irq_restore(prev_irq_state);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::process::ProcessId;
    use crate::task::thread::ThreadPrivilege;

    extern "C" fn dummy_entry() {}

    fn reset() {
        *SCHEDULER.lock() = None;
    }

    #[test]
    fn highest_priority_queue_wins() {
        reset();
        let owner = ProcessId::from_raw(1);
        let idle = Box::new(Thread::new("idle", owner, dummy_entry, ThreadPrivilege::Kernel));
        init(idle);

        let mut low = Thread::new("low", owner, dummy_entry, ThreadPrivilege::Kernel);
        low.set_priority(20);
        let low_id = low.id();
        sched_insert_thread(Box::new(low));

        let mut high = Thread::new("high", owner, dummy_entry, ThreadPrivilege::Kernel);
        high.set_priority(1);
        let high_id = high.id();
        sched_insert_thread(Box::new(high));

        let picked = with_scheduler(|sched| sched.pop_highest_ready());
        assert_eq!(picked, Some(high_id));
        let _ = low_id;
    }

    #[test]
    fn fifo_within_same_priority() {
        reset();
        let owner = ProcessId::from_raw(1);
        let idle = Box::new(Thread::new("idle", owner, dummy_entry, ThreadPrivilege::Kernel));
        init(idle);

        let a = Thread::new("a", owner, dummy_entry, ThreadPrivilege::Kernel);
        let a_id = a.id();
        sched_insert_thread(Box::new(a));
        let b = Thread::new("b", owner, dummy_entry, ThreadPrivilege::Kernel);
        let b_id = b.id();
        sched_insert_thread(Box::new(b));

        let first = with_scheduler(|sched| sched.pop_highest_ready());
        let second = with_scheduler(|sched| sched.pop_highest_ready());
        assert_eq!(first, Some(a_id));
        assert_eq!(second, Some(b_id));
    }
}
