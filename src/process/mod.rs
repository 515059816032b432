//! Process table: the global process registry and the distinguished
//! `kernel_proc` every kernel thread is attached to (§4.8).
//!
//! Grounded on the reference kernel's `process/mod.rs` for the global-
//! `Mutex`-plus-guard-wrapper/`with_process_manager` idiom, narrowed to
//! this core's much smaller process-table surface (no ELF loading, no
//! fork, no userspace process creation) and re-pointed at
//! `crate::port::{irq_disable, irq_restore}` instead of
//! `x86_64::instructions::interrupts::without_interrupts`, since that
//! crate assumes long mode.

extern crate alloc;
use alloc::vec::Vec;

pub mod process;

pub use process::{Process, ProcessId};

use crate::task::thread::ThreadId;
use conquer_once::spin::OnceCell;
use spin::{Mutex, MutexGuard};

/// Wrapper around the table lock so interrupt state is restored exactly
/// once, on drop, regardless of how the caller's closure returns.
pub struct ProcessTableGuard {
    guard: MutexGuard<'static, Vec<Process>>,
    irq_state: bool,
}

impl core::ops::Deref for ProcessTableGuard {
    type Target = Vec<Process>;
    fn deref(&self) -> &Self::Target {
        &self.guard
    }
}

impl core::ops::DerefMut for ProcessTableGuard {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.guard
    }
}

impl Drop for ProcessTableGuard {
    fn drop(&mut self) {
        crate::port::irq_restore(self.irq_state);
    }
}

static PROCESS_TABLE: Mutex<Vec<Process>> = Mutex::new(Vec::new());
static KERNEL_PROC: OnceCell<ProcessId> = OnceCell::uninit();

/// Construct `kernel_proc` and install it as entry zero of the table.
/// Must run after `crate::memory::init`.
pub fn init() {
    let kernel_proc = Process::new_kernel("kernel");
    let pid = kernel_proc.id();
    with_process_table().push(kernel_proc);
    KERNEL_PROC.init_once(|| pid);
    log::info!("Process table initialized, kernel_proc = {}", pid);
}

/// The process every kernel thread is attached to absent an explicit owner.
pub fn kernel_proc_id() -> ProcessId {
    *KERNEL_PROC.get().expect("process::init not called yet")
}

/// Lock the process table with interrupts disabled, so the timer
/// interrupt's scheduler hooks can never deadlock against this lock.
pub fn with_process_table() -> ProcessTableGuard {
    let irq_state = crate::port::irq_disable();
    ProcessTableGuard { guard: PROCESS_TABLE.lock(), irq_state }
}

/// Allocate a fresh process with its own address space and install it
/// in the table (§4.8). `parent` defaults to `kernel_proc` if `None`.
pub fn process_create(name: &str, parent: Option<ProcessId>) -> crate::error::KernelResult<ProcessId> {
    let ctx = crate::memory::new_process_ctx()?;
    let parent = Some(parent.unwrap_or_else(kernel_proc_id));
    let proc = Process::new(name, ctx, parent);
    let pid = proc.id();
    with_process_table().push(proc);
    Ok(pid)
}

/// Attach `tid` to `pid`'s thread set. Panics if `pid` is not in the
/// table (a programmer error per §7, not a recoverable condition).
pub fn process_attach(pid: ProcessId, tid: ThreadId) {
    let mut table = with_process_table();
    let proc = table.iter_mut().find(|p| p.id() == pid).expect("process_attach: unknown process");
    proc.attach(tid);
}

/// Detach `tid` from `pid`'s thread set. A no-op if `pid` is unknown or
/// `tid` was never attached.
pub fn process_detach(pid: ProcessId, tid: ThreadId) {
    let mut table = with_process_table();
    if let Some(proc) = table.iter_mut().find(|p| p.id() == pid) {
        proc.detach(tid);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_guard_locks_and_unlocks() {
        let table = with_process_table();
        let _ = table.len();
    }
}
