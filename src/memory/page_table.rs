//! Per-context page-table operations: the 32-bit two-level paging core.
//!
//! Grounded on the original C core's `kernel/mm/mmu.c` (`mmu_get_page`,
//! `mmu_map_page`, `mmu_unmap_page`, `mmu_switch_ctx`, `mmu_copy_ctx`,
//! `mmu_create_ctx`, `mmu_destroy_ctx`, `clone_ptbl`) for the algorithms,
//! and on the reference kernel's `memory/paging.rs` (`OnceCell`-guarded
//! global mapper, `log::info!` on init) for the surrounding Rust idiom.
//!
//! Simplifying assumption (documented, see DESIGN.md): the kernel heap
//! that backs `Box<PageTable>`/`Box<PageDirectory>` allocations lives in
//! the identity-mapped low region the original core sets up in
//! `init_mmu()`, so a Rust heap pointer can be read directly as its own
//! physical address. Supplying that heap is an external collaborator
//! per the purpose-and-scope boundary (kernel heap allocator internals
//! are out of scope).

extern crate alloc;
use alloc::boxed::Box;

use crate::config::FRAME_SIZE;
use crate::error::{KernelError, KernelResult};
use crate::memory::frame::{frame_alloc, frame_free};
use crate::port;
use bitflags::bitflags;
use core::array;
use core::sync::atomic::{AtomicU32, Ordering};

const ENTRIES_PER_TABLE: usize = 1024;

bitflags! {
    #[derive(Clone, Copy, PartialEq, Eq)]
    pub struct PageFlags: u32 {
        const PRESENT        = 1 << 0;
        const WRITABLE       = 1 << 1;
        const USER           = 1 << 2;
        const WRITE_THROUGH  = 1 << 3;
        const CACHE_DISABLE  = 1 << 4;
        const ACCESSED       = 1 << 5;
        const DIRTY          = 1 << 6;
        const PAT            = 1 << 7;
        const GLOBAL         = 1 << 8;
    }
}

/// A single 32-bit page-table entry, matching the hardware layout
/// exactly: low 12 bits are flags, bits 12..32 are the frame number.
#[repr(transparent)]
#[derive(Clone, Copy, Default)]
pub struct PageEntry(u32);

impl PageEntry {
    pub const fn empty() -> Self {
        PageEntry(0)
    }

    pub fn present(&self) -> bool {
        self.flags().contains(PageFlags::PRESENT)
    }

    pub fn flags(&self) -> PageFlags {
        PageFlags::from_bits_truncate(self.0 & 0xFFF)
    }

    pub fn frame(&self) -> u32 {
        self.0 >> 12
    }

    pub fn set(&mut self, frame: u32, flags: PageFlags) {
        self.0 = (frame << 12) | flags.bits();
    }

    pub fn clear(&mut self) {
        self.0 = 0;
    }
}

/// A page table: 1024 entries, page-aligned so its address is a valid
/// page-directory-entry target.
#[repr(C, align(4096))]
pub struct PageTable {
    entries: [PageEntry; ENTRIES_PER_TABLE],
}

impl PageTable {
    fn zeroed() -> Box<Self> {
        Box::new(PageTable {
            entries: [PageEntry::empty(); ENTRIES_PER_TABLE],
        })
    }

    fn phys_addr(&self) -> u32 {
        self as *const PageTable as u32
    }
}

/// A directory slot: either a page table this context owns exclusively,
/// or a non-owning reference to one of the kernel context's tables
/// (shared into every address space).
enum TableSlot {
    Owned(Box<PageTable>),
    SharedKernel(*mut PageTable),
}

impl TableSlot {
    fn as_ptr(&self) -> *const PageTable {
        match self {
            TableSlot::Owned(t) => t.as_ref() as *const PageTable,
            TableSlot::SharedKernel(p) => *p as *const PageTable,
        }
    }

    fn as_mut_ptr(&mut self) -> *mut PageTable {
        match self {
            TableSlot::Owned(t) => t.as_mut() as *mut PageTable,
            TableSlot::SharedKernel(p) => *p,
        }
    }

    fn phys_addr(&self) -> u32 {
        self.as_ptr() as u32
    }
}

/// Page directory: the hardware-visible 32-bit PDEs (first field, so the
/// struct's own address is a valid PDBR) paired with the software-owning
/// table references used for traversal.
#[repr(C, align(4096))]
pub struct PageDirectory {
    pde: [u32; ENTRIES_PER_TABLE],
    ptbl: [Option<TableSlot>; ENTRIES_PER_TABLE],
}

impl PageDirectory {
    fn zeroed() -> Box<Self> {
        Box::new(PageDirectory {
            pde: [0u32; ENTRIES_PER_TABLE],
            ptbl: array::from_fn(|_| None),
        })
    }

    fn phys_addr(&self) -> u32 {
        self as *const PageDirectory as u32
    }
}

/// An address space: owns a page directory and caches its physical base
/// register value.
pub struct MmuContext {
    pdir: Box<PageDirectory>,
    pdbr: u32,
    is_kernel: bool,
}

static CURRENT_PDBR: AtomicU32 = AtomicU32::new(0);

impl MmuContext {
    fn new(is_kernel: bool) -> Self {
        let pdir = PageDirectory::zeroed();
        let pdbr = pdir.phys_addr();
        debug_assert_eq!(pdbr % FRAME_SIZE as u32, 0, "pdbr must be frame-aligned");
        MmuContext {
            pdir,
            pdbr,
            is_kernel,
        }
    }

    pub fn pdbr(&self) -> u32 {
        self.pdbr
    }

    pub fn is_kernel(&self) -> bool {
        self.is_kernel
    }

    fn dir_tbl_idx(va: u32) -> (usize, usize) {
        let page = (va / FRAME_SIZE as u32) as usize;
        (page / ENTRIES_PER_TABLE, page % ENTRIES_PER_TABLE)
    }

    /// Locate the page-table entry for `va`, optionally allocating the
    /// backing page table if one doesn't exist yet.
    pub fn get_page(&mut self, va: u32, make: bool) -> KernelResult<Option<&mut PageEntry>> {
        let (dir_idx, tbl_idx) = Self::dir_tbl_idx(va);

        if self.pdir.ptbl[dir_idx].is_none() {
            if !make {
                return Ok(None);
            }
            let table = PageTable::zeroed();
            let phys = table.phys_addr();
            self.pdir.ptbl[dir_idx] = Some(TableSlot::Owned(table));
            self.pdir.pde[dir_idx] =
                phys | (PageFlags::PRESENT | PageFlags::WRITABLE | PageFlags::USER).bits();
        }

        let slot = self.pdir.ptbl[dir_idx].as_mut().unwrap();
        let table = unsafe { &mut *slot.as_mut_ptr() };
        Ok(Some(&mut table.entries[tbl_idx]))
    }

    /// Map `va` to physical frame `pa`. Panics if `va` is already mapped:
    /// a double-map is a programmer error, not a recoverable failure.
    pub fn map_page(&mut self, va: u32, pa: u32, write: bool) -> KernelResult<()> {
        let is_user = !self.is_kernel;
        let entry = self
            .get_page(va, true)?
            .expect("get_page(make=true) always returns Some");

        if entry.present() {
            panic!("mmu_map_page: virtual address {:#x} already mapped", va);
        }

        let mut flags = PageFlags::PRESENT;
        if write {
            flags |= PageFlags::WRITABLE;
        }
        if is_user {
            flags |= PageFlags::USER;
        }
        entry.set(pa >> 12, flags);
        Ok(())
    }

    /// Unmap `va`, returning the physical address it was mapped to.
    /// `shared` is reserved for a future refcount on shared frames.
    pub fn unmap_page(&mut self, va: u32, _shared: bool) -> KernelResult<u32> {
        let entry = self.get_page(va, false)?.ok_or(KernelError::NotMapped)?;
        if !entry.present() {
            return Err(KernelError::NotMapped);
        }
        let phys = entry.frame() << 12;
        entry.clear();
        unsafe {
            port::invlpg(va);
        }

        Ok(phys)
    }
}

/// Switch the active address space. A no-op if `ctx` is already current.
/// Kernel threads never call this: the kernel mapping is identical in
/// every context, so whichever context is current remains valid.
pub fn switch_ctx(ctx: &MmuContext) {
    if ctx.pdbr == CURRENT_PDBR.load(Ordering::Acquire) {
        return;
    }
    debug_assert_eq!(ctx.pdbr % FRAME_SIZE as u32, 0);

    let state = port::irq_disable();
    CURRENT_PDBR.store(ctx.pdbr, Ordering::Release);
    unsafe {
        port::write_cr3(ctx.pdbr);
        port::enable_paging();
    }
    port::irq_restore(state);
}

/// Deep-clone `src` into `dst`, aliasing (not copying) any page table
/// that is shared with the kernel context.
pub fn copy_ctx(dst: &mut MmuContext, src: &MmuContext, kernel: &MmuContext) -> KernelResult<()> {
    for i in 0..ENTRIES_PER_TABLE {
        let Some(src_slot) = src.pdir.ptbl[i].as_ref() else {
            continue;
        };

        let kernel_ptr = kernel.pdir.ptbl[i].as_ref().map(|s| s.as_ptr());
        if kernel_ptr == Some(src_slot.as_ptr()) {
            // Shared kernel-region table: alias, don't clone.
            dst.pdir.ptbl[i] = Some(TableSlot::SharedKernel(src_slot.as_ptr() as *mut PageTable));
            dst.pdir.pde[i] = src.pdir.pde[i];
            continue;
        }

        // Owned, non-kernel table: deep clone, frame by frame.
        let src_table = unsafe { &*src_slot.as_ptr() };
        let mut new_table = PageTable::zeroed();
        for j in 0..ENTRIES_PER_TABLE {
            let src_entry = src_table.entries[j];
            if !src_entry.present() {
                continue;
            }
            let new_frame = frame_alloc();
            unsafe {
                copy_page_physical(new_frame, src_entry.frame() << 12);
            }
            let mut carried = PageFlags::empty();
            for f in [
                PageFlags::PRESENT,
                PageFlags::WRITABLE,
                PageFlags::USER,
                PageFlags::ACCESSED,
                PageFlags::DIRTY,
            ] {
                if src_entry.flags().contains(f) {
                    carried |= f;
                }
            }
            new_table.entries[j].set(new_frame >> 12, carried);
        }
        let new_phys = new_table.phys_addr();
        dst.pdir.ptbl[i] = Some(TableSlot::Owned(new_table));
        dst.pdir.pde[i] =
            new_phys | (PageFlags::PRESENT | PageFlags::WRITABLE | PageFlags::USER).bits();
    }
    Ok(())
}

/// Physically copy one frame's worth of data from `src` to `dst`.
///
/// Relies on the identity-mapped-kernel-heap assumption documented on
/// this module: both addresses are readable/writable directly.
unsafe fn copy_page_physical(dst: u32, src: u32) {
    core::ptr::copy_nonoverlapping(src as *const u8, dst as *mut u8, FRAME_SIZE);
}

/// Allocate a fresh, empty address space.
pub fn create_ctx() -> MmuContext {
    MmuContext::new(false)
}

/// Destroy a non-kernel context, freeing only the directory and the page
/// tables it owns. Frames reachable through those tables are NOT freed
/// here; the caller must reclaim them (via `unmap_page`, typically)
/// before calling this.
pub fn destroy_ctx(ctx: MmuContext) {
    assert!(!ctx.is_kernel, "must not destroy the kernel MMU context");
    drop(ctx);
}

/// Construct the singleton kernel context. Must be called exactly once,
/// at boot, before any other context is created.
pub fn create_kernel_ctx() -> MmuContext {
    MmuContext::new(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::frame;

    // `frame::init` repopulates a process-wide global, so tests that use
    // it must not run concurrently with each other.
    static TEST_LOCK: spin::Mutex<()> = spin::Mutex::new(());

    fn with_frames<R>(n: usize, f: impl FnOnce() -> R) -> R {
        let _guard = TEST_LOCK.lock();
        frame::init(n, 0);
        f()
    }

    #[test]
    fn map_then_get_round_trips() {
        with_frames(4096, || {
            let mut ctx = create_ctx();
            ctx.map_page(0x0040_0000, 0x0100_0000, true).unwrap();
            let entry = ctx.get_page(0x0040_0000, false).unwrap().unwrap();
            assert!(entry.present());
            assert!(entry.flags().contains(PageFlags::WRITABLE));
            assert_eq!(entry.frame(), 0x01000);
        });
    }

    #[test]
    #[should_panic(expected = "already mapped")]
    fn double_map_panics() {
        with_frames(4096, || {
            let mut ctx = create_ctx();
            ctx.map_page(0x0040_0000, 0x0100_0000, true).unwrap();
            ctx.map_page(0x0040_0000, 0x0200_0000, true).unwrap();
        });
    }

    #[test]
    fn unmap_returns_physical_address_and_clears_entry() {
        with_frames(4096, || {
            let mut ctx = create_ctx();
            ctx.map_page(0x0040_0000, 0x0100_0000, true).unwrap();
            let out = ctx.unmap_page(0x0040_0000, false).unwrap();
            assert_eq!(out, 0x0100_0000);
            let entry = ctx.get_page(0x0040_0000, false).unwrap();
            assert!(entry.map_or(true, |e| !e.present()));
        });
    }

    #[test]
    fn unmap_absent_mapping_is_not_mapped_error() {
        with_frames(16, || {
            let mut ctx = create_ctx();
            assert_eq!(ctx.unmap_page(0x1000, false), Err(KernelError::NotMapped));
        });
    }

    #[test]
    fn copy_ctx_shares_kernel_region_and_clones_the_rest() {
        with_frames(8192, || {
            let mut kernel = create_kernel_ctx();
            kernel.map_page(0x0000_1000, 0x0000_1000, true).unwrap();

            let mut src = create_ctx();
            copy_ctx(&mut src, &kernel, &kernel).unwrap();
            src.map_page(0x0040_0000, 0x0200_0000, true).unwrap();

            let mut dst = create_ctx();
            copy_ctx(&mut dst, &src, &kernel).unwrap();

            // Kernel-region table is aliased, not cloned.
            let kernel_dir_idx = 0usize;
            assert_eq!(
                dst.pdir.ptbl[kernel_dir_idx].as_ref().map(|s| s.as_ptr()),
                kernel.pdir.ptbl[kernel_dir_idx].as_ref().map(|s| s.as_ptr()),
            );

            // Non-kernel table was deep-cloned: present in dst, but at a
            // different physical frame than src's copy.
            let user_dir_idx = (0x0040_0000u32 / FRAME_SIZE as u32) as usize / ENTRIES_PER_TABLE;
            let src_frame = src.get_page(0x0040_0000, false).unwrap().unwrap().frame();
            let dst_frame = dst.get_page(0x0040_0000, false).unwrap().unwrap().frame();
            assert_ne!(src_frame, dst_frame, "deep clone must not alias src's frame");
            assert_ne!(
                dst.pdir.ptbl[user_dir_idx].as_ref().map(|s| s.as_ptr()),
                src.pdir.ptbl[user_dir_idx].as_ref().map(|s| s.as_ptr()),
            );
        });
    }

    #[test]
    fn pdbr_is_always_frame_aligned() {
        with_frames(16, || {
            let ctx = create_ctx();
            assert_eq!(ctx.pdbr() % FRAME_SIZE as u32, 0);
        });
    }

    #[test]
    #[should_panic(expected = "must not destroy the kernel")]
    fn destroying_kernel_ctx_panics() {
        with_frames(16, || {
            let kernel = create_kernel_ctx();
            destroy_ctx(kernel);
        });
    }
}
