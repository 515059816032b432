//! 256-entry Interrupt Descriptor Table.
//!
//! Grounded on the reference kernel's `gdt.rs` for the `OnceCell`-backed
//! singleton-plus-`lidt` idiom, and on the design's §4.2/§6 gate layout;
//! the reference kernel otherwise builds its IDT through
//! `x86_64::structures::idt::InterruptDescriptorTable`, which assumes
//! long mode and has no 32-bit counterpart, so the gate descriptor is
//! hand-rolled here to match the hardware's packed 8-byte layout.

use crate::config::VECTOR_SYSCALL;
use crate::gdt::SEL_KERNEL_CODE;
use crate::interrupts::handlers;
use conquer_once::spin::OnceCell;
use core::mem::size_of;

const NUM_GATES: usize = 256;

const GATE_TYPE_INTERRUPT_32: u8 = 0xE; // 32-bit interrupt gate, interrupts stay masked on entry
const GATE_PRESENT: u8 = 1 << 7;

const fn dpl(level: u8) -> u8 {
    level << 5
}

#[repr(C, packed)]
#[derive(Clone, Copy)]
pub struct IdtEntry {
    offset_low: u16,
    selector: u16,
    zero: u8,
    type_attr: u8,
    offset_high: u16,
}

impl IdtEntry {
    const fn missing() -> Self {
        IdtEntry { offset_low: 0, selector: 0, zero: 0, type_attr: 0, offset_high: 0 }
    }

    fn new(handler: u32, selector: u16, gate_dpl: u8) -> Self {
        IdtEntry {
            offset_low: (handler & 0xFFFF) as u16,
            selector,
            zero: 0,
            type_attr: GATE_PRESENT | gate_dpl | GATE_TYPE_INTERRUPT_32,
            offset_high: (handler >> 16) as u16,
        }
    }
}

#[repr(C, packed)]
struct IdtPointer {
    limit: u16,
    base: u32,
}

static IDT: OnceCell<[IdtEntry; NUM_GATES]> = OnceCell::uninit();

/// Build the IDT and load it with `lidt`: vectors 0-31 are trap/fault
/// stubs, 32-47 are IRQ stubs (installed later by
/// [`crate::interrupts::register_irq_stub`]), 128 is the syscall gate
/// at DPL 3, and every other gate stays DPL 0.
pub fn init() {
    let entries = IDT.init_once(|| {
        let mut table = [IdtEntry::missing(); NUM_GATES];

        table[14] = IdtEntry::new(handlers::page_fault_handler as u32, SEL_KERNEL_CODE, dpl(0));

        for vector in 0..32u8 {
            if vector != 14 {
                table[vector as usize] =
                    IdtEntry::new(handlers::generic_fault_handler as u32, SEL_KERNEL_CODE, dpl(0));
            }
        }

        for vector in 32..48u8 {
            table[vector as usize] =
                IdtEntry::new(handlers::irq_stub_addr(vector), SEL_KERNEL_CODE, dpl(0));
        }

        table[VECTOR_SYSCALL as usize] =
            IdtEntry::new(handlers::syscall_handler as u32, SEL_KERNEL_CODE, dpl(3));

        table
    });

    let ptr = IdtPointer {
        limit: (size_of::<[IdtEntry; NUM_GATES]>() - 1) as u16,
        base: entries.as_ptr() as u32,
    };

    unsafe { load_idt(&ptr) };
    log::info!("IDT loaded: {} gates", NUM_GATES);
}

#[cfg(not(test))]
unsafe fn load_idt(ptr: &IdtPointer) {
    core::arch::asm!("lidt [{}]", in(reg) ptr, options(nostack, preserves_flags));
}

#[cfg(test)]
unsafe fn load_idt(_ptr: &IdtPointer) {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gate_type_attr_marks_present_and_dpl() {
        let entry = IdtEntry::new(0x1234_5678, SEL_KERNEL_CODE, dpl(3));
        assert_eq!(entry.type_attr, GATE_PRESENT | dpl(3) | GATE_TYPE_INTERRUPT_32);
        assert_eq!(entry.offset_low, 0x5678);
        assert_eq!(entry.offset_high, 0x1234);
    }
}
