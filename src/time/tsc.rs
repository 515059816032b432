//! TSC read and calibration: derives `cycles_per_us` from PIT channel 2
//! in one-shot mode, the way BIOS/kernel calibration loops classically
//! measure an unknown clock against the PIT's known 1.193182 MHz input.
//!
//! Grounded on the reference kernel's `time/tsc.rs` calibration routine
//! (channel-2 one-shot gate toggle, busy-wait on the gate status bit),
//! ported from the `x86_64::instructions::port::Port` wrapper onto this
//! core's own [`crate::port`] primitives.

use crate::port::{inb, outb, rdtsc};

const PIT_CHANNEL2_PORT: u16 = 0x42;
const PIT_COMMAND_PORT: u16 = 0x43;
const PIT_GATE_PORT: u16 = 0x61;

/// Countdown value for a ~50 ms one-shot on a 1.193182 MHz input clock.
const CALIBRATION_TICKS: u16 = 59_659;
const CALIBRATION_US: u64 = 50_000;

pub use crate::port::rdtsc as read_tsc;

/// Measure TSC cycles elapsed during one ~50 ms PIT channel-2 countdown
/// and derive cycles-per-microsecond from it.
#[cfg(not(test))]
pub fn calibrate_cycles_per_us() -> u64 {
    let orig_gate = inb(PIT_GATE_PORT);
    outb(PIT_GATE_PORT, (orig_gate & 0xFC) | 0x01);

    outb(PIT_COMMAND_PORT, 0xB0); // channel 2, lobyte/hibyte, mode 0, binary
    outb(PIT_CHANNEL2_PORT, (CALIBRATION_TICKS & 0xFF) as u8);
    outb(PIT_CHANNEL2_PORT, (CALIBRATION_TICKS >> 8) as u8);

    let start = rdtsc();

    let g = inb(PIT_GATE_PORT);
    outb(PIT_GATE_PORT, g & 0xFE);
    outb(PIT_GATE_PORT, g | 0x01);

    while inb(PIT_GATE_PORT) & 0x20 == 0 {
        core::hint::spin_loop();
    }

    let end = rdtsc();
    outb(PIT_GATE_PORT, orig_gate);

    let elapsed = end.saturating_sub(start);
    (elapsed / CALIBRATION_US).max(1)
}

#[cfg(test)]
pub fn calibrate_cycles_per_us() -> u64 {
    1
}
