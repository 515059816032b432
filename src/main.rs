#![no_std]
#![no_main]
#![feature(alloc_error_handler)]

//! Boot entry point: bring up the subsystems in dependency order, spawn
//! the first kernel thread, enable interrupts, and idle.
//!
//! Grounded on the reference kernel's `main.rs` for the
//! `entry_point!`-calls-`kernel_main`-calls-subsystem-`init`s shape;
//! re-pointed away from `bootloader_api`, which this core has no use
//! for (see DESIGN.md: no framebuffer, no bootloader-supplied memory
//! map), toward a plain `_start` that assumes a flat-mapped low-memory
//! boot stack the way the original C core's own entry assembly does.

extern crate alloc;

use matrix_core::task::thread::Thread;
use matrix_core::{config, gdt, hlt_loop, interrupts, logger, memory, percpu, process, task, time};

#[no_mangle]
pub extern "C" fn _start() -> ! {
    logger::init();
    log::info!("booting");

    gdt::init();
    interrupts::init();
    memory::init(config::BOOT_TOTAL_FRAMES, config::BOOT_RESERVED_FRAMES);
    time::init();
    process::init();
    percpu::init();

    let idle = alloc::boxed::Box::new(Thread::adopt_current("idle", process::kernel_proc_id()));
    task::scheduler::init(idle);

    let main_tid = task::thread_create("kmain", None, kernel_main_thread)
        .expect("failed to create the main kernel thread");
    task::thread_run(main_tid);

    // Dispatch off the idle thread now instead of waiting on the first
    // timer tick: nothing else will ever drain `need_resched` before
    // interrupts are enabled below.
    task::scheduler::request_reschedule();
    if task::scheduler::need_resched() {
        unsafe { task::scheduler::sched_reschedule(false) };
    }

    percpu::set_timer_enabled(true);
    matrix_core::port::irq_restore(true);

    hlt_loop()
}

extern "C" fn kernel_main_thread() {
    log::info!("kernel thread running");
    loop {
        time::pit_delay(1000);
        log::info!("uptime: {} ticks", time::get_uptime());
    }
}

#[alloc_error_handler]
fn alloc_error(layout: core::alloc::Layout) -> ! {
    panic!("allocation failed: {:?}", layout);
}
