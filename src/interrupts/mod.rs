//! Interrupt delivery facade: PIC remap, IDT install, and the timer IRQ
//! hook that drives the clock subsystem's tick.

pub mod handlers;
pub mod idt;
pub mod pic;

pub use handlers::{register_interrupt_handler, unregister_interrupt_handler, InterruptStackFrame, IrqHook};
pub use pic::interrupt_done;

const IRQ_TIMER: u8 = 0;

static TIMER_HOOK: IrqHook = IrqHook { callback: crate::time::timer_interrupt };

/// Remap the PIC, install the IDT, and wire IRQ0 to the clock
/// subsystem's tick. Interrupts are left masked (`cli`) on return; the
/// caller enables them once boot is otherwise complete.
pub fn init() {
    pic::remap();
    idt::init();
    register_interrupt_handler(IRQ_TIMER, &TIMER_HOOK);
    log::info!("Interrupt delivery initialized");
}
