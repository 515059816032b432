//! Per-CPU state (§3 "CPU state").
//!
//! Single boot CPU in scope; this is a plain `static` rather than a
//! GS-segment-indexed array so a later SMP design can generalize it
//! without this core needing the indirection today. Grounded on the
//! design's data model: current MMU context, current thread, boot
//! flag, timer-enabled flag — the per-CPU ready queues and timer list
//! live in [`crate::task::scheduler`] and [`crate::timer`] respectively,
//! which already guard their own state with `spin::Mutex`.

use core::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Whether this CPU has completed `percpu::init()`.
static BOOTED: AtomicBool = AtomicBool::new(false);

/// Whether the periodic timer may expire software timers / reschedule.
/// Cleared during early boot before the scheduler is live.
static TIMER_ENABLED: AtomicBool = AtomicBool::new(false);

/// Numeric id of the thread currently running on this CPU, or 0 before
/// the scheduler is initialized.
static CURRENT_THREAD_ID: AtomicU64 = AtomicU64::new(0);

pub fn init() {
    BOOTED.store(true, Ordering::Release);
}

pub fn is_booted() -> bool {
    BOOTED.load(Ordering::Acquire)
}

pub fn timer_enabled() -> bool {
    TIMER_ENABLED.load(Ordering::Acquire)
}

pub fn set_timer_enabled(enabled: bool) {
    TIMER_ENABLED.store(enabled, Ordering::Release);
}

pub fn current_thread_id() -> u64 {
    CURRENT_THREAD_ID.load(Ordering::Acquire)
}

pub fn set_current_thread_id(id: u64) {
    CURRENT_THREAD_ID.store(id, Ordering::Release);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timer_enabled_round_trips() {
        set_timer_enabled(false);
        assert!(!timer_enabled());
        set_timer_enabled(true);
        assert!(timer_enabled());
        set_timer_enabled(false);
    }

    #[test]
    fn current_thread_id_round_trips() {
        set_current_thread_id(42);
        assert_eq!(current_thread_id(), 42);
    }
}
