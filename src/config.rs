//! Compile-time tunables for the kernel core.
//!
//! Centralizing these avoids the magic numbers scattered through the
//! reference kernel's individual subsystem files.

/// Timer interrupt frequency in Hz. Divides the PIT's 1.193182 MHz input.
pub const HZ: u32 = 100;

/// Size of a kernel stack, in bytes. Must be a multiple of `FRAME_SIZE`.
pub const KSTACK_SIZE: usize = 16 * 1024;

/// Physical page frame size.
pub const FRAME_SIZE: usize = 4096;

/// Number of scheduler priority levels. Priority 0 is the most urgent.
pub const NUM_PRIORITIES: usize = 32;

/// Default thread priority assigned by `thread_create`.
pub const DEFAULT_PRIORITY: u8 = 16;

/// PIT channel-0 input clock frequency, in Hz.
pub const PIT_BASE_FREQUENCY_HZ: u32 = 1_193_182;

/// Vector base the master 8259 is remapped to (IRQ0 -> this vector).
pub const PIC1_VECTOR_BASE: u8 = 0x20;

/// Vector base the slave 8259 is remapped to (IRQ8 -> this vector).
pub const PIC2_VECTOR_BASE: u8 = 0x28;

/// Interrupt vector the page-fault handler is installed on.
pub const VECTOR_PAGE_FAULT: u8 = 14;

/// Interrupt vector reserved for the system-call gate (DPL 3).
pub const VECTOR_SYSCALL: u8 = 0x80;

/// COM1 I/O port base for the serial console.
pub const COM1_PORT: u16 = 0x3F8;

/// CMOS/RTC index and data ports.
pub const CMOS_INDEX_PORT: u16 = 0x70;
pub const CMOS_DATA_PORT: u16 = 0x71;

/// Physical frames assumed present. A real boot entry would read this
/// off a memory map; this core boots without one (see DESIGN.md) and
/// assumes a fixed 64 MiB of RAM instead.
pub const BOOT_TOTAL_FRAMES: usize = (64 * 1024 * 1024) / FRAME_SIZE;

/// Frames reserved for the kernel image and early boot placement area,
/// pre-marked allocated before anything else runs.
pub const BOOT_RESERVED_FRAMES: usize = (4 * 1024 * 1024) / FRAME_SIZE;
