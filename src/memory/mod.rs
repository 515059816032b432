//! Physical and virtual memory management: bitmap frame allocation and
//! the per-context page-table core.
//!
//! Grounded on the reference kernel's `memory/mod.rs` for the overall
//! init()-orchestrates-submodules shape and its `log::info!` narration
//! style, re-pointed at the bitmap/page_table core this kernel actually
//! needs instead of the reference's PML4 long-mode machinery.

pub mod allocator;
pub mod bitmap;
pub mod frame;
pub mod page_table;

pub use page_table::{MmuContext, PageEntry, PageFlags};

use conquer_once::spin::OnceCell;
use spin::Mutex;

static KERNEL_CTX: OnceCell<Mutex<MmuContext>> = OnceCell::uninit();

/// Bring up the memory subsystem: size the frame allocator, then build
/// and switch into the kernel's own address space.
///
/// `nr_frames` is the total physical frame count for the machine;
/// `reserved_frames` covers the kernel image and early boot placement
/// area, mirroring the original core's `init_mmu()` ordering.
pub fn init(nr_frames: usize, reserved_frames: usize) {
    log::info!(
        "Initializing memory management ({} frames, {} reserved)...",
        nr_frames,
        reserved_frames
    );

    frame::init(nr_frames, reserved_frames);

    #[cfg(not(test))]
    allocator::init();

    let ctx = page_table::create_kernel_ctx();
    log::info!("Kernel MMU context ready, pdbr = {:#x}", ctx.pdbr());
    KERNEL_CTX.init_once(|| Mutex::new(ctx));

    let guard = KERNEL_CTX.get().unwrap().lock();
    page_table::switch_ctx(&guard);
    drop(guard);

    #[cfg(not(test))]
    unsafe {
        crate::port::enable_paging();
    }

    log::info!("Memory management initialized");
}

/// Run `f` with the kernel's singleton MMU context locked.
pub fn with_kernel_ctx<R>(f: impl FnOnce(&MmuContext) -> R) -> R {
    let guard = KERNEL_CTX
        .get()
        .expect("memory::init not called yet")
        .lock();
    f(&guard)
}

/// Run `f` with the kernel's singleton MMU context locked, mutably.
pub fn with_kernel_ctx_mut<R>(f: impl FnOnce(&mut MmuContext) -> R) -> R {
    let mut guard = KERNEL_CTX
        .get()
        .expect("memory::init not called yet")
        .lock();
    f(&mut guard)
}

/// Create a fresh address space, sharing the kernel's page tables into
/// the kernel-region slots exactly as `copy_ctx` would for a clone.
pub fn new_process_ctx() -> crate::error::KernelResult<MmuContext> {
    let mut ctx = page_table::create_ctx();
    with_kernel_ctx(|kernel| page_table::copy_ctx(&mut ctx, kernel, kernel))?;
    Ok(ctx)
}
