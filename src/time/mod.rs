//! Public facade for the clock subsystem: periodic tick, TSC-derived
//! microsecond time, and CMOS wall clock.
//!
//! Grounded on the reference kernel's `time/mod.rs` (submodules plus a
//! thin facade re-exporting the handful of functions other subsystems
//! call), re-pointed at this core's `sys_time`/`get_uptime` split
//! instead of a single millisecond clock.

pub mod rtc;
pub mod time;
pub mod tsc;

pub use time::{get_uptime, pit_delay, sys_time, wall_time_us};

/// Bring up the clock subsystem: program the PIT, calibrate the TSC,
/// and anchor wall-clock time from the CMOS RTC.
pub fn init() {
    log::info!("Initializing clock subsystem...");
    time::init();
    log::info!("Clock subsystem initialized: uptime={} sys_time={}us", get_uptime(), sys_time());
}

/// Invoked from the timer interrupt handler (vector for IRQ0). Advances
/// the tick counter, expires any due software timers (each decides for
/// itself whether to call `scheduler::request_reschedule`), and drains
/// the preempt hint at the tail of the tick so a pending reschedule
/// actually happens before this ISR returns.
pub fn timer_interrupt(_frame: &crate::interrupts::InterruptStackFrame) {
    time::tick();
    crate::timer::on_tick(sys_time());
    if crate::task::scheduler::need_resched() {
        unsafe {
            crate::task::scheduler::sched_reschedule(false);
        }
    }
}
