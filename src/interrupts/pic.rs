//! Legacy cascaded 8259 interrupt controller remap (component 3).
//!
//! Grounded on the design's §4.3/§6 ICW sequence and bit-exact port
//! layout; the reference kernel delegates this to the `pic8259` crate,
//! which targets the APIC-capable long-mode boot path and offers no
//! 32-bit equivalent here, so the remap sequence is hand-rolled the way
//! the original C core's `hal/i8259.c` programs it directly.

use crate::config::{PIC1_VECTOR_BASE, PIC2_VECTOR_BASE};
use crate::port::outb;

const PIC1_COMMAND: u16 = 0x20;
const PIC1_DATA: u16 = 0x21;
const PIC2_COMMAND: u16 = 0xA0;
const PIC2_DATA: u16 = 0xA1;

const ICW1_INIT: u8 = 0x11; // ICW1 with ICW4 requested
const ICW4_8086: u8 = 0x01;
const EOI: u8 = 0x20;

/// Remap IRQs 0-15 onto vectors `PIC1_VECTOR_BASE..PIC1_VECTOR_BASE+16`,
/// masking nothing (every line starts unmasked).
pub fn remap() {
    outb(PIC1_COMMAND, ICW1_INIT);
    outb(PIC2_COMMAND, ICW1_INIT);

    outb(PIC1_DATA, PIC1_VECTOR_BASE);
    outb(PIC2_DATA, PIC2_VECTOR_BASE);

    outb(PIC1_DATA, 0x04); // ICW3: slave attached on IRQ2
    outb(PIC2_DATA, 0x02); // ICW3: cascade identity

    outb(PIC1_DATA, ICW4_8086);
    outb(PIC2_DATA, ICW4_8086);

    outb(PIC1_DATA, 0x00);
    outb(PIC2_DATA, 0x00);

    log::info!(
        "PIC remapped: master vectors {:#x}-{:#x}, slave {:#x}-{:#x}",
        PIC1_VECTOR_BASE,
        PIC1_VECTOR_BASE + 7,
        PIC2_VECTOR_BASE,
        PIC2_VECTOR_BASE + 7
    );
}

/// Signal end-of-interrupt for `vector`: always to the master, and to
/// the slave as well if `vector` belongs to it.
pub fn interrupt_done(vector: u8) {
    if vector >= PIC2_VECTOR_BASE {
        outb(PIC2_COMMAND, EOI);
    }
    outb(PIC1_COMMAND, EOI);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vector_bases_are_sixteen_apart() {
        assert_eq!(PIC2_VECTOR_BASE - PIC1_VECTOR_BASE, 8);
    }
}
