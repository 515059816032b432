//! COM1 16550 UART driver backing the serial console.
//!
//! Grounded on the reference kernel's `serial.rs`, which wraps
//! `uart_16550::SerialPort` in a `spin::Mutex` and exposes
//! `serial_print!`/`serial_println!`. That crate's `SerialPort` type is
//! built on `x86_64::instructions::port::Port` and is long-mode only, so
//! this core drives the UART registers directly through [`crate::port`]
//! instead, keeping the same mutex-guarded, macro-fronted shape.

use crate::config::COM1_PORT;
use crate::port::{inb, outb};
use core::fmt;
use spin::Mutex;

pub static SERIAL1: Mutex<SerialPort> = Mutex::new(SerialPort::new(COM1_PORT));

pub struct SerialPort {
    base: u16,
}

impl SerialPort {
    pub const fn new(base: u16) -> Self {
        SerialPort { base }
    }

    pub fn init(&mut self) {
        outb(self.base + 1, 0x00); // disable all interrupts
        outb(self.base + 3, 0x80); // enable DLAB
        outb(self.base, 0x03); // divisor low byte: 38400 baud
        outb(self.base + 1, 0x00); // divisor high byte
        outb(self.base + 3, 0x03); // 8 bits, no parity, one stop bit
        outb(self.base + 2, 0xC7); // enable FIFO, clear, 14-byte threshold
        outb(self.base + 4, 0x0B); // IRQs enabled, RTS/DSR set
    }

    fn line_is_empty(&self) -> bool {
        (inb(self.base + 5) & 0x20) != 0
    }

    pub fn send(&mut self, byte: u8) {
        while !self.line_is_empty() {
            core::hint::spin_loop();
        }
        outb(self.base, byte);
    }
}

impl fmt::Write for SerialPort {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for byte in s.bytes() {
            self.send(byte);
        }
        Ok(())
    }
}

pub fn init() {
    SERIAL1.lock().init();
}

#[doc(hidden)]
pub fn _print(args: fmt::Arguments) {
    use core::fmt::Write;
    let state = crate::port::irq_disable();
    SERIAL1
        .lock()
        .write_fmt(args)
        .expect("printing to serial failed");
    crate::port::irq_restore(state);
}

#[macro_export]
macro_rules! serial_print {
    ($($arg:tt)*) => ($crate::serial::_print(format_args!($($arg)*)));
}

#[macro_export]
macro_rules! serial_println {
    () => ($crate::serial_print!("\n"));
    ($($arg:tt)*) => ($crate::serial_print!("{}\n", format_args!($($arg)*)));
}
