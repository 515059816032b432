//! Software timers (component 5): a sorted per-CPU list of pending
//! timers expired from the periodic tick handler.
//!
//! Grounded on the design's §4.5 (`init_timer`/`set_timer`/`cancel_timer`/
//! `expire_timers`) and on the reference kernel's `spin::Mutex`-guarded
//! global-list idiom used throughout `memory/frame_allocator.rs` and
//! `gdt.rs`'s TSS singleton; the timer list itself has no reference kernel
//! counterpart (the original is single-CPU only), so its shape is
//! grounded on the original C core's intrusive sorted-insert scheme
//! implied by `kernel/proc/thread.c`'s `sched_insert_thread` neighbor.

extern crate alloc;
use alloc::boxed::Box;
use alloc::vec::Vec;
use spin::Mutex;

/// A callback run when a timer expires. Runs in interrupt context: must
/// not block. Takes ownership of the timer; returning `Some` reinserts
/// it (after re-arming it via [`Timer::rearm`]) instead of letting it
/// drop. A callback that wants a reschedule calls
/// `crate::task::scheduler::request_reschedule()` itself.
pub type TimerCallback = fn(Box<Timer>) -> Option<Box<Timer>>;

pub struct Timer {
    name: &'static str,
    expire_time: u64,
    callback: Option<TimerCallback>,
    active: bool,
}

impl Timer {
    pub const fn new(name: &'static str) -> Self {
        Timer { name, expire_time: 0, callback: None, active: false }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Re-arm this timer to fire `usecs_from_now` after `now`, keeping
    /// its existing callback. For a callback reinserting itself from
    /// `on_tick`.
    pub fn rearm(&mut self, now: u64, usecs_from_now: u64) {
        self.expire_time = now + usecs_from_now;
        self.active = true;
    }
}

static PENDING: Mutex<Vec<Box<Timer>>> = Mutex::new(Vec::new());

fn insert_sorted(list: &mut Vec<Box<Timer>>, timer: Box<Timer>) {
    let pos = list.iter().position(|t| t.expire_time > timer.expire_time).unwrap_or(list.len());
    list.insert(pos, timer);
}

/// Zero-initialize a timer. Equivalent to [`Timer::new`]; kept as a free
/// function to mirror the design's `init_timer(t, name)` entry point.
pub fn init_timer(name: &'static str) -> Box<Timer> {
    Box::new(Timer::new(name))
}

/// Arm `timer` to fire `usecs_from_now` microseconds after `now`,
/// inserting it into the pending list at its sorted position.
///
/// Re-arming an already-active timer is a programmer error; cancel it
/// first.
pub fn set_timer(mut timer: Box<Timer>, now: u64, usecs_from_now: u64, callback: TimerCallback) {
    assert!(!timer.active, "set_timer: timer '{}' is already active", timer.name);
    timer.expire_time = now + usecs_from_now;
    timer.callback = Some(callback);
    timer.active = true;
    insert_sorted(&mut PENDING.lock(), timer);
}

/// Unlink `name` from the pending list if present. Safe to call on an
/// inactive timer.
pub fn cancel_timer(name: &'static str) {
    let mut list = PENDING.lock();
    if let Some(pos) = list.iter().position(|t| t.name == name && t.active) {
        let mut t = list.remove(pos);
        t.active = false;
    }
}

/// Called from the tick handler: fire every timer whose `expire_time`
/// is at or before `now`, removing each from the pending list before
/// handing it to its callback by value. A callback that returns `Some`
/// (having re-armed the timer via [`Timer::rearm`]) has it reinserted at
/// its new sorted position; returning `None` drops it.
pub fn on_tick(now: u64) {
    let mut due = Vec::new();
    {
        let mut list = PENDING.lock();
        while let Some(t) = list.first() {
            if t.expire_time > now {
                break;
            }
            due.push(list.remove(0));
        }
    }

    for mut timer in due {
        timer.active = false;
        let Some(cb) = timer.callback.take() else {
            continue;
        };
        if let Some(mut next) = cb(timer) {
            next.callback = Some(cb);
            insert_sorted(&mut PENDING.lock(), next);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

    static FIRED: AtomicBool = AtomicBool::new(false);

    fn mark_fired(_t: Box<Timer>) -> Option<Box<Timer>> {
        FIRED.store(true, Ordering::SeqCst);
        None
    }

    #[test]
    fn timer_fires_exactly_once_at_expiry() {
        FIRED.store(false, Ordering::SeqCst);
        PENDING.lock().clear();

        let t = init_timer("x");
        set_timer(t, 0, 5000, mark_fired);

        on_tick(4999);
        assert!(!FIRED.load(Ordering::SeqCst));
        on_tick(5000);
        assert!(FIRED.load(Ordering::SeqCst));
        assert!(PENDING.lock().is_empty());
    }

    #[test]
    fn cancel_before_expiry_prevents_fire() {
        FIRED.store(false, Ordering::SeqCst);
        PENDING.lock().clear();

        let t = init_timer("y");
        set_timer(t, 0, 5000, mark_fired);
        cancel_timer("y");
        on_tick(10_000);
        assert!(!FIRED.load(Ordering::SeqCst));
    }

    #[test]
    fn canceling_inactive_timer_is_a_no_op() {
        PENDING.lock().clear();
        cancel_timer("never-armed");
    }

    static REINSERT_COUNT: AtomicU32 = AtomicU32::new(0);

    fn reinsert_once_then_stop(mut t: Box<Timer>) -> Option<Box<Timer>> {
        let count = REINSERT_COUNT.fetch_add(1, Ordering::SeqCst) + 1;
        if count < 2 {
            t.rearm(1000, 1000);
            Some(t)
        } else {
            None
        }
    }

    #[test]
    fn callback_can_reinsert_itself() {
        REINSERT_COUNT.store(0, Ordering::SeqCst);
        PENDING.lock().clear();

        let t = init_timer("periodic");
        set_timer(t, 0, 1000, reinsert_once_then_stop);

        on_tick(1000);
        assert_eq!(REINSERT_COUNT.load(Ordering::SeqCst), 1);
        assert!(!PENDING.lock().is_empty(), "first fire should reinsert itself");

        on_tick(2000);
        assert_eq!(REINSERT_COUNT.load(Ordering::SeqCst), 2);
        assert!(PENDING.lock().is_empty(), "second fire should not reinsert");
    }
}
