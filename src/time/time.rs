//! Periodic tick (component 4a) and TSC-derived microsecond time (4b).
//!
//! Grounded on the reference kernel's `time/timer.rs` PIT-programming
//! shape (channel 0, mode 3, divisor from a base frequency constant),
//! re-pointed at `HZ`/`PIT_BASE_FREQUENCY_HZ` from [`crate::config`] and
//! at the design's `real_time`/`lost_ticks`/TSC-offset model instead of
//! a flat millisecond counter.

use crate::config::{HZ, PIT_BASE_FREQUENCY_HZ};
use crate::port::outb;
use crate::time::{rtc, tsc};
use core::sync::atomic::{AtomicU32, AtomicU64, Ordering};

const PIT_COMMAND_PORT: u16 = 0x43;
const PIT_CHANNEL0_PORT: u16 = 0x40;

/// Ticks since boot, incremented by the periodic timer interrupt.
static REAL_TIME: AtomicU64 = AtomicU64::new(0);

/// Ticks masked out by code that briefly disabled the timer, credited
/// back on the next tick.
static LOST_TICKS: AtomicU32 = AtomicU32::new(0);

/// TSC value latched at calibration time.
static SYS_TIME_OFFSET: AtomicU64 = AtomicU64::new(0);

/// TSC cycles per microsecond, from [`tsc::calibrate_cycles_per_us`].
static CYCLES_PER_US: AtomicU64 = AtomicU64::new(1);

/// Wall-clock microseconds at the instant `sys_time()` was zero.
static WALL_TIME_BASE_US: AtomicU64 = AtomicU64::new(0);

/// Program PIT channel 0 for periodic interrupts at `HZ`, then calibrate
/// the TSC against it and anchor wall-clock time from the CMOS RTC.
pub fn init() {
    let divisor = (PIT_BASE_FREQUENCY_HZ / HZ) as u16;
    outb(PIT_COMMAND_PORT, 0x36);
    outb(PIT_CHANNEL0_PORT, (divisor & 0xFF) as u8);
    outb(PIT_CHANNEL0_PORT, (divisor >> 8) as u8);
    log::info!("PIT programmed: {} Hz (divisor {})", HZ, divisor);

    let cycles_per_us = tsc::calibrate_cycles_per_us();
    CYCLES_PER_US.store(cycles_per_us, Ordering::Relaxed);
    SYS_TIME_OFFSET.store(tsc::read_tsc(), Ordering::Relaxed);
    log::info!("TSC calibrated: {} cycles/us", cycles_per_us);

    let cmos_us = rtc::platform_time_from_cmos();
    WALL_TIME_BASE_US.store(cmos_us.saturating_sub(sys_time()), Ordering::Relaxed);
}

/// Microseconds since `init()`, derived from the TSC.
pub fn sys_time() -> u64 {
    let offset = SYS_TIME_OFFSET.load(Ordering::Relaxed);
    let cycles_per_us = CYCLES_PER_US.load(Ordering::Relaxed).max(1);
    tsc::read_tsc().saturating_sub(offset) / cycles_per_us
}

/// Wall-clock time in microseconds since the Unix epoch.
pub fn wall_time_us() -> u64 {
    WALL_TIME_BASE_US.load(Ordering::Relaxed) + sys_time()
}

/// Ticks since boot (coarse, 1/`HZ` resolution).
pub fn get_uptime() -> u64 {
    REAL_TIME.load(Ordering::Relaxed)
}

/// Briefly mask the timer; ticks that occur while masked are credited
/// back on the next call to [`tick`].
pub fn lose_tick() {
    LOST_TICKS.fetch_add(1, Ordering::Relaxed);
}

/// Invoked from the timer interrupt handler on every PIT channel-0 tick.
/// Returns the new tick count.
pub fn tick() -> u64 {
    let lost = LOST_TICKS.swap(0, Ordering::Relaxed) as u64;
    REAL_TIME.fetch_add(1 + lost, Ordering::Relaxed) + 1 + lost
}

/// Busy-wait `ms` milliseconds by polling [`get_uptime`], idling between
/// polls. Intended only for early boot, before the scheduler is live.
pub fn pit_delay(ms: u64) {
    let target = get_uptime() + (ms * HZ as u64 + 999) / 1000;
    while get_uptime() < target {
        #[cfg(not(test))]
        unsafe {
            core::arch::asm!("hlt", options(nomem, nostack));
        }
        #[cfg(test)]
        {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tick_accumulates_lost_ticks() {
        REAL_TIME.store(0, Ordering::Relaxed);
        LOST_TICKS.store(0, Ordering::Relaxed);
        lose_tick();
        lose_tick();
        let after = tick();
        assert_eq!(after, 3);
        assert_eq!(get_uptime(), 3);
    }

    #[test]
    fn sys_time_is_monotonic_non_decreasing() {
        SYS_TIME_OFFSET.store(0, Ordering::Relaxed);
        CYCLES_PER_US.store(1, Ordering::Relaxed);
        let a = sys_time();
        let b = sys_time();
        assert!(b >= a);
    }
}
