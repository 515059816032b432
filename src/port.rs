//! Port I/O and low-level CPU primitives.
//!
//! Grounded on the reference kernel's `x86_64::instructions::port`/
//! `x86_64::instructions::interrupts` usage throughout `gdt.rs`,
//! `interrupts.rs` and `serial.rs`; ported onto 32-bit protected mode.
//! Port I/O goes through the `x86` crate (the rust-osdev sibling of
//! `x86_64` that supports non-long-mode targets); the handful of
//! genuinely arch-width-specific instructions (control registers,
//! `rdtsc`, `cli`/`sti`) are hand-rolled with inline asm the way the
//! original C core calls them directly, since the higher-level wrapper
//! crates in this ecosystem target long mode only.

#[cfg(not(test))]
use x86::io;

/// Write a byte to an I/O port.
#[inline]
pub fn outb(port: u16, value: u8) {
    #[cfg(not(test))]
    unsafe {
        io::outb(port, value);
    }
    #[cfg(test)]
    {
        use core::sync::atomic::Ordering;
        LAST_OUTB_PORT.store(port, Ordering::SeqCst);
        LAST_OUTB_VALUE.store(value, Ordering::SeqCst);
    }
}

/// Records the most recent mock `outb` call so host tests can assert on
/// hardware-bound byte sequences (e.g. the PIC end-of-interrupt write)
/// without a real I/O bus to observe.
#[cfg(test)]
static LAST_OUTB_PORT: core::sync::atomic::AtomicU16 = core::sync::atomic::AtomicU16::new(0);
#[cfg(test)]
static LAST_OUTB_VALUE: core::sync::atomic::AtomicU8 = core::sync::atomic::AtomicU8::new(0);

#[cfg(test)]
pub fn last_outb() -> (u16, u8) {
    use core::sync::atomic::Ordering;
    (LAST_OUTB_PORT.load(Ordering::SeqCst), LAST_OUTB_VALUE.load(Ordering::SeqCst))
}

/// Read a byte from an I/O port.
#[inline]
pub fn inb(port: u16) -> u8 {
    #[cfg(not(test))]
    unsafe {
        return io::inb(port);
    }
    #[cfg(test)]
    {
        let _ = port;
        0
    }
}

/// Read a word (16 bits) from an I/O port.
#[inline]
pub fn inw(port: u16) -> u16 {
    #[cfg(not(test))]
    unsafe {
        return io::inw(port);
    }
    #[cfg(test)]
    {
        let _ = port;
        0
    }
}

/// Read the timestamp counter.
#[inline]
pub fn rdtsc() -> u64 {
    #[cfg(not(test))]
    unsafe {
        let high: u32;
        let low: u32;
        core::arch::asm!("rdtsc", out("eax") low, out("edx") high, options(nomem, nostack));
        return ((high as u64) << 32) | (low as u64);
    }
    #[cfg(test)]
    {
        MOCK_TSC.fetch_add(1, core::sync::atomic::Ordering::Relaxed)
    }
}

#[cfg(test)]
static MOCK_TSC: core::sync::atomic::AtomicU64 = core::sync::atomic::AtomicU64::new(0);

/// Read CR2 (the faulting address on a page fault).
#[inline]
pub fn read_cr2() -> u32 {
    #[cfg(not(test))]
    unsafe {
        let val: u32;
        core::arch::asm!("mov {}, cr2", out(reg) val, options(nomem, nostack, preserves_flags));
        return val;
    }
    #[cfg(test)]
    {
        0
    }
}

/// Read CR3 (the current page-directory physical base register).
#[inline]
pub fn read_cr3() -> u32 {
    #[cfg(not(test))]
    unsafe {
        let val: u32;
        core::arch::asm!("mov {}, cr3", out(reg) val, options(nomem, nostack, preserves_flags));
        return val;
    }
    #[cfg(test)]
    {
        0
    }
}

/// Load CR3 with a new page-directory physical base register value.
///
/// # Safety
/// `pdbr` must be the physical address of a valid, live page directory,
/// 4 KiB aligned.
#[inline]
pub unsafe fn write_cr3(pdbr: u32) {
    #[cfg(not(test))]
    {
        core::arch::asm!("mov cr3, {}", in(reg) pdbr, options(nostack, preserves_flags));
    }
    #[cfg(test)]
    {
        let _ = pdbr;
    }
}

/// Assert CR0.PG (bit 31, paging enable) is set, enabling it if not.
///
/// # Safety
/// Caller must have a valid CR3 loaded before enabling paging for the
/// first time.
#[inline]
pub unsafe fn enable_paging() {
    #[cfg(not(test))]
    {
        let mut cr0: u32;
        core::arch::asm!("mov {}, cr0", out(reg) cr0, options(nomem, nostack, preserves_flags));
        cr0 |= 1 << 31;
        core::arch::asm!("mov cr0, {}", in(reg) cr0, options(nostack, preserves_flags));
    }
}

/// Invalidate a single TLB entry for `va`.
///
/// # Safety
/// `va` should be a page-aligned virtual address that was just unmapped.
#[inline]
pub unsafe fn invlpg(va: u32) {
    #[cfg(not(test))]
    {
        core::arch::asm!("invlpg [{}]", in(reg) va, options(nostack, preserves_flags));
    }
    #[cfg(test)]
    {
        let _ = va;
    }
}

/// Disable interrupts and return whether they were previously enabled.
///
/// Pairs with [`irq_restore`]: `let state = irq_disable(); ...; irq_restore(state);`
#[inline]
pub fn irq_disable() -> bool {
    #[cfg(not(test))]
    unsafe {
        let flags: u32;
        core::arch::asm!("pushfd; pop {}", out(reg) flags, options(nomem, preserves_flags));
        core::arch::asm!("cli", options(nomem, nostack));
        (flags & (1 << 9)) != 0
    }
    #[cfg(test)]
    {
        use core::sync::atomic::Ordering;
        MOCK_IRQ_ENABLED.swap(false, Ordering::SeqCst)
    }
}

/// Restore interrupts to a previously saved state. Never unconditionally
/// enables interrupts: if `state` is false, this is a no-op.
#[inline]
pub fn irq_restore(state: bool) {
    if state {
        #[cfg(not(test))]
        unsafe {
            core::arch::asm!("sti", options(nomem, nostack));
        }
        #[cfg(test)]
        {
            use core::sync::atomic::Ordering;
            MOCK_IRQ_ENABLED.store(true, Ordering::SeqCst);
        }
    }
}

#[cfg(test)]
static MOCK_IRQ_ENABLED: core::sync::atomic::AtomicBool = core::sync::atomic::AtomicBool::new(true);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn irq_restore_does_not_unconditionally_enable() {
        MOCK_IRQ_ENABLED.store(false, core::sync::atomic::Ordering::SeqCst);
        irq_restore(false);
        assert!(!MOCK_IRQ_ENABLED.load(core::sync::atomic::Ordering::SeqCst));
    }

    #[test]
    fn irq_disable_then_restore_round_trips() {
        MOCK_IRQ_ENABLED.store(true, core::sync::atomic::Ordering::SeqCst);
        let state = irq_disable();
        assert!(state);
        assert!(!MOCK_IRQ_ENABLED.load(core::sync::atomic::Ordering::SeqCst));
        irq_restore(state);
        assert!(MOCK_IRQ_ENABLED.load(core::sync::atomic::Ordering::SeqCst));
    }
}
